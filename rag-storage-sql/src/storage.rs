use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{params, Row};
use rag_core::error::{Error, Result};
use rag_core::persistence::{AuditEventRow, AuditSeverity, ChapterEmbeddingRow, PersistenceAdapter, RateLimitEntry};
use rag_core::types::{Book, Chapter, User};
use uuid::Uuid;

use crate::SqlStorage;

fn map_err(context: &str) -> impl Fn(libsql::Error) -> Error + '_ {
    move |e| Error::Dependency(format!("{context}: {e}"))
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| Error::Internal(format!("corrupt uuid in storage: {e}")))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)).map_err(|e| Error::Internal(format!("corrupt timestamp in storage: {e}")))
}

fn user_from_row(row: &Row) -> Result<User> {
    Ok(User {
        id: parse_uuid(&row.get::<String>(0).map_err(map_err("read user.id"))?)?,
        email: row.get::<String>(1).map_err(map_err("read user.email"))?,
        created_at: parse_timestamp(&row.get::<String>(2).map_err(map_err("read user.created_at"))?)?,
    })
}

fn book_from_row(row: &Row) -> Result<Book> {
    Ok(Book {
        id: parse_uuid(&row.get::<String>(0).map_err(map_err("read book.id"))?)?,
        owner_id: parse_uuid(&row.get::<String>(1).map_err(map_err("read book.owner_id"))?)?,
        title: row.get::<String>(2).map_err(map_err("read book.title"))?,
        author: row.get::<String>(3).map_err(map_err("read book.author"))?,
        chapter_count: row.get::<i64>(4).map_err(map_err("read book.chapter_count"))? as u32,
        public: row.get::<i64>(5).map_err(map_err("read book.public"))? != 0,
    })
}

fn chapter_from_row(row: &Row) -> Result<Chapter> {
    Ok(Chapter {
        id: parse_uuid(&row.get::<String>(0).map_err(map_err("read chapter.id"))?)?,
        book_id: parse_uuid(&row.get::<String>(1).map_err(map_err("read chapter.book_id"))?)?,
        idx: row.get::<i64>(2).map_err(map_err("read chapter.idx"))? as u32,
        title: row.get::<String>(3).map_err(map_err("read chapter.title"))?,
        text: row.get::<String>(4).map_err(map_err("read chapter.text"))?,
        word_count: row.get::<i64>(5).map_err(map_err("read chapter.word_count"))? as u32,
    })
}

fn embedding_from_row(row: &Row) -> Result<ChapterEmbeddingRow> {
    let vector_json = row.get::<String>(5).map_err(map_err("read chapter_embeddings.vector"))?;
    let vector: Vec<f32> = serde_json::from_str(&vector_json).map_err(Error::Serialization)?;
    Ok(ChapterEmbeddingRow {
        id: parse_uuid(&row.get::<String>(0).map_err(map_err("read chapter_embeddings.id"))?)?,
        book_id: parse_uuid(&row.get::<String>(1).map_err(map_err("read chapter_embeddings.book_id"))?)?,
        chapter_idx: row.get::<i64>(2).map_err(map_err("read chapter_embeddings.chapter_idx"))? as u32,
        start: row.get::<i64>(3).map_err(map_err("read chapter_embeddings.start_offset"))? as usize,
        end: row.get::<i64>(4).map_err(map_err("read chapter_embeddings.end_offset"))? as usize,
        vector,
        content: row.get::<String>(6).map_err(map_err("read chapter_embeddings.content"))?,
    })
}

fn severity_str(severity: AuditSeverity) -> &'static str {
    match severity {
        AuditSeverity::Info => "info",
        AuditSeverity::Warning => "warning",
        AuditSeverity::Critical => "critical",
    }
}

#[async_trait]
impl PersistenceAdapter for SqlStorage {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let conn = self.connection()?;
        let mut rows = conn
            .query("SELECT id, email, created_at FROM users WHERE id = ?1", params![id.to_string()])
            .await
            .map_err(map_err("query users"))?;
        match rows.next().await.map_err(map_err("read users row"))? {
            Some(row) => Ok(Some(user_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.connection()?;
        let mut rows = conn
            .query("SELECT id, email, created_at FROM users WHERE email = ?1", params![email])
            .await
            .map_err(map_err("query users by email"))?;
        match rows.next().await.map_err(map_err("read users row"))? {
            Some(row) => Ok(Some(user_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_book(&self, id: Uuid) -> Result<Option<Book>> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(
                "SELECT id, owner_id, title, author, chapter_count, public FROM books WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(map_err("query books"))?;
        match rows.next().await.map_err(map_err("read books row"))? {
            Some(row) => Ok(Some(book_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_chapter(&self, book_id: Uuid, idx: u32) -> Result<Option<Chapter>> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(
                "SELECT id, book_id, idx, title, text, word_count FROM chapters WHERE book_id = ?1 AND idx = ?2",
                params![book_id.to_string(), idx],
            )
            .await
            .map_err(map_err("query chapters"))?;
        match rows.next().await.map_err(map_err("read chapters row"))? {
            Some(row) => Ok(Some(chapter_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_chapters(&self, book_id: Uuid) -> Result<Vec<Chapter>> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(
                "SELECT id, book_id, idx, title, text, word_count FROM chapters WHERE book_id = ?1 ORDER BY idx",
                params![book_id.to_string()],
            )
            .await
            .map_err(map_err("query chapters"))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(map_err("read chapters row"))? {
            out.push(chapter_from_row(&row)?);
        }
        Ok(out)
    }

    async fn get_chapter_embeddings(&self, book_id: Uuid) -> Result<Vec<ChapterEmbeddingRow>> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(
                "SELECT id, book_id, chapter_idx, start_offset, end_offset, vector, content FROM chapter_embeddings WHERE book_id = ?1",
                params![book_id.to_string()],
            )
            .await
            .map_err(map_err("query chapter_embeddings"))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(map_err("read chapter_embeddings row"))? {
            out.push(embedding_from_row(&row)?);
        }
        Ok(out)
    }

    async fn insert_chapter_embedding(&self, row: ChapterEmbeddingRow) -> Result<()> {
        let conn = self.connection()?;
        let vector_json = serde_json::to_string(&row.vector).map_err(Error::Serialization)?;
        conn.execute(
            "INSERT INTO chapter_embeddings (id, book_id, chapter_idx, start_offset, end_offset, vector, content) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                row.id.to_string(),
                row.book_id.to_string(),
                row.chapter_idx,
                row.start as i64,
                row.end as i64,
                vector_json,
                row.content,
            ],
        )
        .await
        .map_err(map_err("insert chapter_embedding"))?;
        Ok(())
    }

    async fn purge_rate_limit_entries_for_key(&self, key: &str, since: DateTime<Utc>) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "DELETE FROM rate_limit_entries WHERE key = ?1 AND timestamp < ?2",
            params![key, since.to_rfc3339()],
        )
        .await
        .map_err(map_err("purge rate_limit_entries"))?;
        Ok(())
    }

    async fn count_rate_limit_entries(&self, key: &str) -> Result<u32> {
        let conn = self.connection()?;
        let mut rows = conn
            .query("SELECT COUNT(*) FROM rate_limit_entries WHERE key = ?1", params![key])
            .await
            .map_err(map_err("count rate_limit_entries"))?;
        let row = rows.next().await.map_err(map_err("read rate_limit_entries count"))?;
        Ok(row.map(|r| r.get::<i64>(0).unwrap_or(0)).unwrap_or(0) as u32)
    }

    async fn insert_rate_limit_entry(&self, entry: RateLimitEntry) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO rate_limit_entries (key, timestamp, ip, user_agent, endpoint) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![entry.key, entry.timestamp.to_rfc3339(), entry.ip, entry.user_agent, entry.endpoint],
        )
        .await
        .map_err(map_err("insert rate_limit_entry"))?;
        Ok(())
    }

    async fn purge_all_rate_limit_entries(&self, since: DateTime<Utc>) -> Result<u64> {
        let conn = self.connection()?;
        conn.execute("DELETE FROM rate_limit_entries WHERE timestamp < ?1", params![since.to_rfc3339()])
            .await
            .map_err(map_err("purge all rate_limit_entries"))
    }

    async fn insert_audit_event(&self, event: AuditEventRow) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO audit_events (id, timestamp, event_type, user_id, ip, endpoint, details, severity) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                event.id.to_string(),
                event.timestamp.to_rfc3339(),
                event.event_type,
                event.user_id.map(|u| u.to_string()),
                event.ip,
                event.endpoint,
                event.details.to_string(),
                severity_str(event.severity),
            ],
        )
        .await
        .map_err(map_err("insert audit_event"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SqlStorage;

    async fn seeded() -> SqlStorage {
        let storage = SqlStorage::in_memory().await.unwrap();
        let conn = storage.connection().unwrap();
        let user_id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO users (id, email, created_at) VALUES (?1, ?2, ?3)",
            params![user_id.to_string(), "reader@example.com", Utc::now().to_rfc3339()],
        )
        .await
        .unwrap();
        storage
    }

    #[tokio::test]
    async fn get_user_by_email_round_trips() {
        let storage = seeded().await;
        let user = storage.get_user_by_email("reader@example.com").await.unwrap();
        assert!(user.is_some());
        assert_eq!(user.unwrap().email, "reader@example.com");
    }

    #[tokio::test]
    async fn rate_limit_entries_count_and_purge() {
        let storage = SqlStorage::in_memory().await.unwrap();
        storage
            .insert_rate_limit_entry(RateLimitEntry {
                key: "ip:9.9.9.9".into(),
                timestamp: Utc::now(),
                ip: "9.9.9.9".into(),
                user_agent: "test".into(),
                endpoint: "/ask".into(),
            })
            .await
            .unwrap();
        assert_eq!(storage.count_rate_limit_entries("ip:9.9.9.9").await.unwrap(), 1);
        storage.purge_rate_limit_entries_for_key("ip:9.9.9.9", Utc::now() + chrono::Duration::seconds(1)).await.unwrap();
        assert_eq!(storage.count_rate_limit_entries("ip:9.9.9.9").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn chapter_embedding_round_trips() {
        let storage = SqlStorage::in_memory().await.unwrap();
        let book_id = Uuid::new_v4();
        let row = ChapterEmbeddingRow {
            id: Uuid::new_v4(),
            book_id,
            chapter_idx: 0,
            start: 0,
            end: 100,
            vector: vec![0.1, 0.2, 0.3],
            content: "some chunk text".into(),
        };
        storage.insert_chapter_embedding(row.clone()).await.unwrap();
        let fetched = storage.get_chapter_embeddings(book_id).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].vector, row.vector);
    }
}
