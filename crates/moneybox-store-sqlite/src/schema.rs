//! SQL schema for the Money Box SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per document. Fields are kept as a JSON object so the store stays
-- schemaless like the collections it serves.
CREATE TABLE IF NOT EXISTS documents (
    collection  TEXT NOT NULL,   -- 'deposits' | 'loans' | 'users' | 'messages'
    doc_id      TEXT NOT NULL,
    fields_json TEXT NOT NULL,
    created_at  TEXT NOT NULL,   -- ISO 8601 UTC
    updated_at  TEXT NOT NULL,
    PRIMARY KEY (collection, doc_id)
);

-- Uploaded attachments. Uploading to an existing path replaces the row.
CREATE TABLE IF NOT EXISTS objects (
    path          TEXT PRIMARY KEY,
    data          BLOB NOT NULL,
    content_type  TEXT NOT NULL,
    metadata_json TEXT NOT NULL,
    uploaded_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS documents_collection_idx ON documents(collection);

PRAGMA user_version = 1;
";
