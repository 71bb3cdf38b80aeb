//! Table definitions for the rows `rag_core::persistence::PersistenceAdapter`
//! depends on (spec §6). One `CREATE TABLE IF NOT EXISTS` per row shape;
//! applied once at connection time by [`crate::SqlStorage::migrate`].

pub const SCHEMA_STATEMENTS: &[&str] = &[
    r"CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        created_at TEXT NOT NULL
    )",
    r"CREATE TABLE IF NOT EXISTS books (
        id TEXT PRIMARY KEY,
        owner_id TEXT NOT NULL,
        title TEXT NOT NULL,
        author TEXT NOT NULL,
        chapter_count INTEGER NOT NULL,
        public INTEGER NOT NULL
    )",
    r"CREATE TABLE IF NOT EXISTS chapters (
        id TEXT PRIMARY KEY,
        book_id TEXT NOT NULL,
        idx INTEGER NOT NULL,
        title TEXT NOT NULL,
        text TEXT NOT NULL,
        word_count INTEGER NOT NULL,
        UNIQUE(book_id, idx)
    )",
    r"CREATE INDEX IF NOT EXISTS idx_chapters_book ON chapters(book_id)",
    r"CREATE TABLE IF NOT EXISTS chapter_embeddings (
        id TEXT PRIMARY KEY,
        book_id TEXT NOT NULL,
        chapter_idx INTEGER NOT NULL,
        start_offset INTEGER NOT NULL,
        end_offset INTEGER NOT NULL,
        vector TEXT NOT NULL,
        content TEXT NOT NULL
    )",
    r"CREATE INDEX IF NOT EXISTS idx_chapter_embeddings_book ON chapter_embeddings(book_id)",
    r"CREATE TABLE IF NOT EXISTS rate_limit_entries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        key TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        ip TEXT NOT NULL,
        user_agent TEXT NOT NULL,
        endpoint TEXT NOT NULL
    )",
    r"CREATE INDEX IF NOT EXISTS idx_rate_limit_key ON rate_limit_entries(key)",
    r"CREATE TABLE IF NOT EXISTS audit_events (
        id TEXT PRIMARY KEY,
        timestamp TEXT NOT NULL,
        event_type TEXT NOT NULL,
        user_id TEXT,
        ip TEXT NOT NULL,
        endpoint TEXT NOT NULL,
        details TEXT NOT NULL,
        severity TEXT NOT NULL
    )",
];
