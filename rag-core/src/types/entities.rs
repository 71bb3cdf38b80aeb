//! Durable entities owned by the persistence adapter and copied into
//! memory for the lifetime of a request (§3: "the core never retains
//! database cursors").

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A stable, verified-email user. Created by the identity provider.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// A book owned by a user, optionally readable anonymously.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Book {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub author: String,
    pub chapter_count: u32,
    pub public: bool,
}

impl Book {
    /// A book is readable by its owner, or by anyone if public (read-only).
    #[must_use]
    pub fn readable_by(&self, requester: Option<Uuid>) -> bool {
        self.public || requester == Some(self.owner_id)
    }

    /// Only the owner may write to a book, public or not.
    #[must_use]
    pub fn writable_by(&self, requester: Option<Uuid>) -> bool {
        requester == Some(self.owner_id)
    }
}

/// A chapter of a book. Chapter indices within a book form a dense prefix
/// `0..N-1` (enforced by the persistence adapter, not re-checked here).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Chapter {
    pub id: Uuid,
    pub book_id: Uuid,
    pub idx: u32,
    pub title: String,
    pub text: String,
    pub word_count: u32,
}

/// A `[start, end)` slice of a chapter's text, with its book/chapter
/// coordinates. `end > start` and both fall within the chapter's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ChunkRef {
    pub book_id: Uuid,
    pub chapter_idx: u32,
    pub start: usize,
    pub end: usize,
}

impl ChunkRef {
    /// Validate the half-open invariant against the chapter's own length.
    #[must_use]
    pub fn is_valid(&self, chapter_len: usize) -> bool {
        self.end > self.start && self.end <= chapter_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(public: bool, owner: Uuid) -> Book {
        Book {
            id: Uuid::new_v4(),
            owner_id: owner,
            title: "t".into(),
            author: "a".into(),
            chapter_count: 1,
            public,
        }
    }

    #[test]
    fn public_book_readable_anonymously_but_not_writable() {
        let owner = Uuid::new_v4();
        let b = book(true, owner);
        assert!(b.readable_by(None));
        assert!(!b.writable_by(None));
        assert!(!b.writable_by(Some(Uuid::new_v4())));
        assert!(b.writable_by(Some(owner)));
    }

    #[test]
    fn private_book_requires_owner() {
        let owner = Uuid::new_v4();
        let b = book(false, owner);
        assert!(!b.readable_by(None));
        assert!(b.readable_by(Some(owner)));
    }

    #[test]
    fn chunk_ref_validates_bounds() {
        let cr = ChunkRef {
            book_id: Uuid::new_v4(),
            chapter_idx: 0,
            start: 10,
            end: 20,
        };
        assert!(cr.is_valid(30));
        assert!(!cr.is_valid(15));
        let bad = ChunkRef {
            start: 20,
            end: 20,
            ..cr
        };
        assert!(!bad.is_valid(30));
    }
}
