//! Chapter chunker (§4.1): splits chapter text into overlapping windows
//! suitable for embedding.

use crate::config::ChunkerConfig;
use crate::types::ChunkRef;
use uuid::Uuid;

/// A chunker with a fixed target size and overlap. Stateless beyond its
/// configuration: calling `chunk` twice on the same text is a no-op in the
/// sense that it returns identical bounds both times (§8 round-trip law).
#[derive(Debug, Clone)]
pub struct Chunker {
    target: usize,
    overlap: usize,
}

impl Chunker {
    #[must_use]
    pub fn new(config: &ChunkerConfig) -> Self {
        Self {
            target: config.target.max(1),
            overlap: config.overlap.min(config.target.saturating_sub(1).max(1)),
        }
    }

    /// Split `text` into overlapping `[start, end)` windows.
    ///
    /// Texts shorter than the target size produce a single window spanning
    /// the full text. A stride of `target - overlap` advances the window;
    /// a tail window shorter than `min(target/3, 200)` chars is merged
    /// into the previous window instead of standing alone.
    #[must_use]
    pub fn chunk(&self, book_id: Uuid, chapter_idx: u32, text: &str) -> Vec<ChunkRef> {
        let len = text.len();
        if len == 0 {
            return Vec::new();
        }
        if len <= self.target {
            return vec![ChunkRef {
                book_id,
                chapter_idx,
                start: 0,
                end: len,
            }];
        }

        let stride = (self.target - self.overlap).max(1);
        let min_tail = (self.target / 3).min(200);

        let mut windows: Vec<(usize, usize)> = Vec::new();
        let mut start = 0usize;
        loop {
            let end = (start + self.target).min(len);
            windows.push((start, end));
            if end == len {
                break;
            }
            start += stride;
            if start >= len {
                break;
            }
        }

        // Merge a too-short tail window into its predecessor.
        if windows.len() > 1 {
            let last = windows[windows.len() - 1];
            if last.1 - last.0 < min_tail {
                windows.pop();
                let prev = windows.last_mut().expect("merge target exists");
                prev.1 = last.1;
            }
        }

        windows
            .into_iter()
            .map(|(start, end)| ChunkRef {
                book_id,
                chapter_idx,
                start,
                end,
            })
            .collect()
    }

    /// Slice the chunk's text out of the chapter's full text.
    #[must_use]
    pub fn text_of<'a>(chunk: &ChunkRef, chapter_text: &'a str) -> &'a str {
        &chapter_text[chunk.start..chunk.end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(target: usize, overlap: usize) -> Chunker {
        Chunker::new(&ChunkerConfig { target, overlap })
    }

    #[test]
    fn short_text_is_single_window() {
        let c = chunker(600, 150);
        let book = Uuid::new_v4();
        let windows = c.chunk(book, 0, "short text");
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].start, 0);
        assert_eq!(windows[0].end, "short text".len());
    }

    #[test]
    fn windows_overlap_by_configured_amount() {
        let c = chunker(100, 20);
        let book = Uuid::new_v4();
        let text = "a".repeat(350);
        let windows = c.chunk(book, 2, &text);
        for w in &windows {
            assert!(w.end > w.start);
            assert!(w.end <= text.len());
            assert_eq!(w.chapter_idx, 2);
        }
        // stride is target - overlap = 80
        assert_eq!(windows[1].start, 80);
        assert_eq!(windows[0].end, 100);
    }

    #[test]
    fn short_tail_is_merged_not_orphaned() {
        let c = chunker(100, 20);
        let book = Uuid::new_v4();
        // last window would be length < min(100/3, 200) = 33
        let text = "a".repeat(100 + 80 + 10);
        let windows = c.chunk(book, 0, &text);
        let last = windows.last().unwrap();
        assert_eq!(last.end, text.len());
        assert!(last.end - last.start >= 33);
    }

    #[test]
    fn chunking_is_deterministic() {
        let c = chunker(600, 150);
        let book = Uuid::new_v4();
        let text = "word ".repeat(500);
        let first = c.chunk(book, 0, &text);
        let second = c.chunk(book, 0, &text);
        assert_eq!(first, second);
    }

    #[test]
    fn all_bounds_are_within_text_range() {
        let c = chunker(600, 150);
        let book = Uuid::new_v4();
        let text = "lorem ipsum dolor sit amet ".repeat(100);
        for w in c.chunk(book, 0, &text) {
            assert!(w.is_valid(text.len()));
        }
    }
}
