//! SQLite storage layer for qaforge
//!
//! This module handles persistent storage of:
//! - Ingested documents and raw HTML pages
//! - Chunks and their embeddings, in index order
//! - Generated test cases
//! - Selector resolutions

mod schema;

pub use schema::SCHEMA;

use crate::error::{QaError, Result};
use crate::extract::{Chunk, Document, DocumentKind};
use crate::index::{EmbeddingRecord, IndexSnapshot, RecordMetadata};
use crate::llm::TestCase;
use crate::script::SelectorResolution;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// Database connection wrapper
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        tracing::debug!("Opened database at {:?}", path.as_ref());

        let db = Self { conn };
        db.initialize()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;

        let db = Self { conn };
        db.initialize()?;

        Ok(db)
    }

    /// Initialize the database schema
    fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Knowledge Base ====================

    /// Replace documents, chunks, vectors and index metadata in one transaction
    pub fn replace_knowledge_base(
        &self,
        documents: &[Document],
        snapshot: &IndexSnapshot,
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        write_knowledge_base(&tx, documents, snapshot)?;
        tx.commit()?;

        tracing::debug!(
            "Persisted {} documents and {} chunks",
            documents.len(),
            snapshot.entries.len()
        );

        Ok(())
    }

    /// Persist the outcome of a build in one transaction
    ///
    /// A full rebuild also drops every stored page and cached selector, so
    /// nothing from the previous knowledge base survives. `pages` are
    /// upserted afterwards, dropping their cached selectors.
    pub fn commit_build(
        &self,
        documents: &[Document],
        snapshot: &IndexSnapshot,
        pages: &[(String, String)],
        full_rebuild: bool,
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;

        if full_rebuild {
            tx.execute("DELETE FROM pages", [])?;
            tx.execute("DELETE FROM selector_cache", [])?;
        }
        for (source_name, html) in pages {
            write_page(&tx, source_name, html)?;
        }
        write_knowledge_base(&tx, documents, snapshot)?;

        tx.commit()?;

        tracing::debug!(
            "Committed build: {} documents, {} chunks, {} pages",
            documents.len(),
            snapshot.entries.len(),
            pages.len()
        );

        Ok(())
    }

    /// Load the persisted index contents in insertion order
    pub fn load_snapshot(&self) -> Result<IndexSnapshot> {
        let meta: Option<(Option<String>, Option<i64>)> = self
            .conn
            .query_row(
                "SELECT model, dimension FROM index_meta WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let mut stmt = self.conn.prepare(
            r#"
            SELECT c.id, c.document_id, c.source_name, c.kind, c.text,
                   c.start_offset, c.end_offset, c.sequence_index, e.vector
            FROM chunks c JOIN embeddings e ON e.chunk_id = c.id
            ORDER BY c.position
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(ChunkRow {
                id: row.get(0)?,
                document_id: row.get(1)?,
                source_name: row.get(2)?,
                kind: row.get(3)?,
                text: row.get(4)?,
                start_offset: row.get(5)?,
                end_offset: row.get(6)?,
                sequence_index: row.get(7)?,
                vector: row.get(8)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.into_entry());
        }

        let (model, dimension) = meta.unwrap_or((None, None));

        Ok(IndexSnapshot {
            model,
            dimension: dimension.map(|d| d as usize),
            entries,
        })
    }

    /// All stored documents, oldest first
    pub fn list_documents(&self) -> Result<Vec<Document>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, source_name, kind, raw_text FROM documents ORDER BY ingested_at, rowid",
        )?;

        let rows = stmt.query_map([], |row| {
            let kind: String = row.get(2)?;
            Ok(Document {
                id: row.get(0)?,
                source_name: row.get(1)?,
                raw_text: row.get(3)?,
                kind: kind.parse().unwrap_or(DocumentKind::Text),
            })
        })?;

        let mut documents = Vec::new();
        for row in rows {
            documents.push(row?);
        }

        Ok(documents)
    }

    /// Distinct source names with their chunk counts
    pub fn list_sources(&self) -> Result<Vec<(String, usize)>> {
        let mut stmt = self.conn.prepare(
            "SELECT source_name, COUNT(*) FROM chunks GROUP BY source_name ORDER BY source_name",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
        })?;

        let mut sources = Vec::new();
        for row in rows {
            sources.push(row?);
        }

        Ok(sources)
    }

    /// Remove the knowledge base, pages and selector cache
    ///
    /// Generated test cases are kept.
    pub fn clear_knowledge_base(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            BEGIN;
            DELETE FROM embeddings;
            DELETE FROM chunks;
            DELETE FROM documents;
            DELETE FROM index_meta;
            DELETE FROM pages;
            DELETE FROM selector_cache;
            COMMIT;
            "#,
        )?;
        Ok(())
    }

    // ==================== Pages ====================

    /// Get a page by name, or the first stored page when no name is given
    pub fn get_page(&self, source_name: Option<&str>) -> Result<Option<(String, String)>> {
        let result = match source_name {
            Some(name) => self
                .conn
                .query_row(
                    "SELECT source_name, html FROM pages WHERE source_name = ?1",
                    params![name],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?,
            None => self
                .conn
                .query_row(
                    "SELECT source_name, html FROM pages ORDER BY source_name LIMIT 1",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?,
        };

        Ok(result)
    }

    // ==================== Test Cases ====================

    /// Store generated test cases along with the request that produced them
    pub fn save_test_cases(&self, cases: &[TestCase], query: &str) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT OR REPLACE INTO test_cases (id, title, priority, category, body, query, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, datetime('now'))
                "#,
            )?;

            for case in cases {
                stmt.execute(params![
                    case.id,
                    case.title,
                    case.priority.as_str(),
                    case.category,
                    serde_json::to_string(case)?,
                    query,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Get a test case by id or unique id prefix
    pub fn find_test_case(&self, id_or_prefix: &str) -> Result<Option<TestCase>> {
        let mut stmt = self
            .conn
            .prepare("SELECT body FROM test_cases WHERE id = ?1 OR id LIKE ?2 ORDER BY id LIMIT 2")?;

        let pattern = format!("{}%", id_or_prefix.replace(['%', '_'], ""));
        let rows = stmt.query_map(params![id_or_prefix, pattern], |row| row.get::<_, String>(0))?;

        let mut bodies = Vec::new();
        for row in rows {
            bodies.push(row?);
        }

        match bodies.as_slice() {
            [body] => Ok(Some(serde_json::from_str(body)?)),
            [] => Ok(None),
            _ => match self.get_test_case(id_or_prefix)? {
                Some(case) => Ok(Some(case)),
                None => Err(QaError::invalid_argument(format!(
                    "test case prefix '{}' is ambiguous",
                    id_or_prefix
                ))),
            },
        }
    }

    /// Get a test case by exact id
    pub fn get_test_case(&self, id: &str) -> Result<Option<TestCase>> {
        let body: Option<String> = self
            .conn
            .query_row(
                "SELECT body FROM test_cases WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        body.map(|b| serde_json::from_str(&b).map_err(QaError::from))
            .transpose()
    }

    /// All stored test cases, oldest first
    pub fn list_test_cases(&self) -> Result<Vec<TestCase>> {
        let mut stmt = self
            .conn
            .prepare("SELECT body FROM test_cases ORDER BY created_at, rowid")?;

        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut cases = Vec::new();
        for row in rows {
            cases.push(serde_json::from_str(&row?)?);
        }

        Ok(cases)
    }

    // ==================== Selector Cache ====================

    /// Cached resolutions for targets on `page`
    pub fn load_selector_cache(&self, page: &str) -> Result<Vec<(String, SelectorResolution)>> {
        let mut stmt = self.conn.prepare(
            "SELECT target, resolution FROM selector_cache WHERE page = ?1 ORDER BY target",
        )?;

        let rows = stmt.query_map(params![page], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (target, resolution) = row?;
            match serde_json::from_str(&resolution) {
                Ok(resolution) => entries.push((target, resolution)),
                Err(e) => tracing::warn!("Dropping cached selector for '{}': {}", target, e),
            }
        }

        Ok(entries)
    }

    pub fn save_selector_cache(
        &self,
        page: &str,
        entries: &[(String, SelectorResolution)],
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO selector_cache (page, target, resolution, updated_at)
                VALUES (?1, ?2, ?3, datetime('now'))
                ON CONFLICT(page, target) DO UPDATE SET
                    resolution = excluded.resolution,
                    updated_at = datetime('now')
                "#,
            )?;

            for (target, resolution) in entries {
                stmt.execute(params![page, target, serde_json::to_string(resolution)?])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    // ==================== Statistics ====================

    /// Get database statistics
    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let count = |table: &str| -> Result<usize> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
            Ok(n as usize)
        };

        let meta: Option<(Option<String>, Option<i64>, String)> = self
            .conn
            .query_row(
                "SELECT model, dimension, built_at FROM index_meta WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        let (model, dimension, built_at) = match meta {
            Some((model, dimension, built_at)) => (model, dimension, parse_timestamp(&built_at)),
            None => (None, None, None),
        };

        Ok(DatabaseStats {
            documents: count("documents")?,
            chunks: count("chunks")?,
            embeddings: count("embeddings")?,
            pages: count("pages")?,
            test_cases: count("test_cases")?,
            model,
            dimension: dimension.map(|d| d as usize),
            built_at,
        })
    }
}

/// Parse a SQLite `datetime('now')` value
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|t| t.and_utc())
}

/// Database statistics
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DatabaseStats {
    pub documents: usize,
    pub chunks: usize,
    pub embeddings: usize,
    pub pages: usize,
    pub test_cases: usize,
    pub model: Option<String>,
    pub dimension: Option<usize>,
    /// When the index was last written
    pub built_at: Option<DateTime<Utc>>,
}

struct ChunkRow {
    id: String,
    document_id: String,
    source_name: String,
    kind: String,
    text: String,
    start_offset: i64,
    end_offset: i64,
    sequence_index: i64,
    vector: Vec<u8>,
}

impl ChunkRow {
    fn into_entry(self) -> (Chunk, EmbeddingRecord) {
        let kind: DocumentKind = self.kind.parse().unwrap_or(DocumentKind::Text);

        let record = EmbeddingRecord {
            chunk_id: self.id.clone(),
            vector: decode_vector(&self.vector),
            metadata: RecordMetadata {
                source_name: self.source_name.clone(),
                kind,
            },
        };

        let chunk = Chunk {
            id: self.id,
            document_id: self.document_id,
            source_name: self.source_name,
            kind,
            text: self.text,
            start_offset: self.start_offset as usize,
            end_offset: self.end_offset as usize,
            sequence_index: self.sequence_index as usize,
        };

        (chunk, record)
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks(4)
        .map(|chunk| {
            let arr: [u8; 4] = chunk.try_into().unwrap_or([0; 4]);
            f32::from_le_bytes(arr)
        })
        .collect()
}

fn write_knowledge_base(
    conn: &Connection,
    documents: &[Document],
    snapshot: &IndexSnapshot,
) -> Result<()> {
    conn.execute("DELETE FROM embeddings", [])?;
    conn.execute("DELETE FROM chunks", [])?;
    conn.execute("DELETE FROM documents", [])?;
    conn.execute("DELETE FROM index_meta", [])?;

    let mut insert_doc = conn.prepare(
        "INSERT OR REPLACE INTO documents (id, source_name, kind, raw_text, ingested_at)
         VALUES (?1, ?2, ?3, ?4, datetime('now'))",
    )?;
    for doc in documents {
        insert_doc.execute(params![doc.id, doc.source_name, doc.kind.as_str(), doc.raw_text])?;
    }

    let mut insert_chunk = conn.prepare(
        r#"
        INSERT INTO chunks (
            id, position, document_id, source_name, kind, text,
            start_offset, end_offset, sequence_index
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )?;
    let mut insert_vector =
        conn.prepare("INSERT INTO embeddings (chunk_id, vector) VALUES (?1, ?2)")?;

    for (position, (chunk, record)) in snapshot.entries.iter().enumerate() {
        insert_chunk.execute(params![
            chunk.id,
            position as i64,
            chunk.document_id,
            chunk.source_name,
            chunk.kind.as_str(),
            chunk.text,
            chunk.start_offset as i64,
            chunk.end_offset as i64,
            chunk.sequence_index as i64,
        ])?;
        insert_vector.execute(params![record.chunk_id, encode_vector(&record.vector)])?;
    }

    conn.execute(
        "INSERT INTO index_meta (id, model, dimension, built_at) VALUES (1, ?1, ?2, datetime('now'))",
        params![snapshot.model, snapshot.dimension.map(|d| d as i64)],
    )?;

    Ok(())
}

fn write_page(conn: &Connection, source_name: &str, html: &str) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO pages (source_name, html, updated_at) VALUES (?1, ?2, datetime('now'))
        ON CONFLICT(source_name) DO UPDATE SET
            html = excluded.html,
            updated_at = datetime('now')
        "#,
        params![source_name, html],
    )?;
    conn.execute(
        "DELETE FROM selector_cache WHERE page = ?1",
        params![source_name],
    )?;
    Ok(())
}
