//! Database schema definition

/// SQL schema for the qaforge database
pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- Ingested support documents
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    source_name TEXT NOT NULL,
    kind TEXT NOT NULL,
    raw_text TEXT NOT NULL,
    ingested_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_documents_source ON documents(source_name);

-- Chunks in index insertion order
CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    position INTEGER NOT NULL,
    document_id TEXT NOT NULL,
    source_name TEXT NOT NULL,
    kind TEXT NOT NULL,
    text TEXT NOT NULL,
    start_offset INTEGER NOT NULL,
    end_offset INTEGER NOT NULL,
    sequence_index INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chunks_position ON chunks(position);
CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id);

-- One vector per chunk, little-endian f32
CREATE TABLE IF NOT EXISTS embeddings (
    chunk_id TEXT PRIMARY KEY,
    vector BLOB NOT NULL,
    FOREIGN KEY (chunk_id) REFERENCES chunks(id) ON DELETE CASCADE
);

-- Model and dimension the stored vectors were built with
CREATE TABLE IF NOT EXISTS index_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    model TEXT,
    dimension INTEGER,
    built_at TEXT NOT NULL
);

-- Raw markup of ingested HTML pages, used for selector resolution
CREATE TABLE IF NOT EXISTS pages (
    source_name TEXT PRIMARY KEY,
    html TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Generated test cases
CREATE TABLE IF NOT EXISTS test_cases (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    priority TEXT NOT NULL,
    category TEXT NOT NULL,
    body TEXT NOT NULL,
    query TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_test_cases_created ON test_cases(created_at);

-- Selector resolutions keyed by page and normalized target
CREATE TABLE IF NOT EXISTS selector_cache (
    page TEXT NOT NULL,
    target TEXT NOT NULL,
    resolution TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (page, target)
);
"#;
