//! Verse retrieval against the local NVI SQLite database.
//!
//! The database is populated externally (tables `book` and `verse`); this
//! module only reads it, apart from [`VerseStore::ensure_index`] which builds
//! the FTS5 index once after population. Connections are opened per call so
//! concurrent requests never share a `rusqlite::Connection`.

use std::fmt;
use std::path::{Path, PathBuf};

use regex::Regex;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Upper bound on verses folded into one prompt.
pub const MAX_CONTEXT_VERSES: usize = 5;

/// Name of the FTS5 virtual table. Matches the layout of existing
/// `NVI.sqlite.db` deployments so an already-indexed database works
/// unchanged.
const FTS_TABLE: &str = "full_text_search";

#[derive(Debug, Error)]
pub enum RetrieveError {
    /// The database file could not be opened at all.
    #[error("could not open verse database: {0}")]
    Unavailable(#[source] rusqlite::Error),

    /// A statement failed, e.g. the FTS index has not been built yet.
    #[error("verse lookup failed: {0}")]
    Query(#[from] rusqlite::Error),
}

/// One retrieved verse, kept structured until the final prompt formatting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub book: String,
    pub chapter: i64,
    pub verse: i64,
    pub text: String,
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} {}:{}]: {}",
            self.book, self.chapter, self.verse, self.text
        )
    }
}

/// Render citations to the newline-joined block embedded in the prompt.
pub fn format_context(citations: &[Citation]) -> String {
    citations
        .iter()
        .map(Citation::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct VerseStore {
    db_path: PathBuf,
    sanitizer: Regex,
}

impl VerseStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            // FTS5 treats punctuation as query syntax; strip everything
            // outside word/whitespace classes before matching.
            sanitizer: Regex::new(r"[^\w\s]").expect("sanitizer regex is valid"),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Opens a request-scoped connection. The database must already exist:
    /// opening without `SQLITE_OPEN_CREATE` makes a missing file a
    /// distinguishable [`RetrieveError::Unavailable`] instead of a silently
    /// created empty store.
    fn open(&self) -> Result<Connection, RetrieveError> {
        Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(RetrieveError::Unavailable)
    }

    /// Full-text search over verse text, capped at [`MAX_CONTEXT_VERSES`].
    ///
    /// A query that sanitizes to nothing (punctuation only) and a query with
    /// zero matches both return an empty `Vec` — only infrastructure
    /// failures surface as errors. Result order is whatever the store
    /// returns for the matched id set.
    pub fn search(&self, query: &str) -> Result<Vec<Citation>, RetrieveError> {
        let clean = self.sanitizer.replace_all(query, "");
        let clean = clean.trim();
        if clean.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.open()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT rowid FROM {FTS_TABLE} WHERE {FTS_TABLE} MATCH ?1 LIMIT ?2"
        ))?;
        let ids: Vec<i64> = stmt
            .query_map(
                rusqlite::params![format!("\"{clean}\""), MAX_CONTEXT_VERSES as i64],
                |row| row.get(0),
            )?
            .collect::<Result<_, _>>()?;

        if ids.is_empty() {
            debug!(query = clean, "no verses matched");
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(",");
        let mut stmt = conn.prepare(&format!(
            "SELECT b.name, v.chapter, v.verse, v.text
             FROM verse v
             JOIN book b ON v.book_id = b.id
             WHERE v.id IN ({placeholders})"
        ))?;
        let citations: Vec<Citation> = stmt
            .query_map(rusqlite::params_from_iter(ids.iter()), |row| {
                Ok(Citation {
                    book: row.get(0)?,
                    chapter: row.get(1)?,
                    verse: row.get(2)?,
                    text: row.get(3)?,
                })
            })?
            .collect::<Result<_, _>>()?;

        debug!(query = clean, hits = citations.len(), "verse search");
        Ok(citations)
    }

    /// Exact lookup by book name, chapter and verse number.
    pub fn verse_by_reference(
        &self,
        book: &str,
        chapter: i64,
        verse: i64,
    ) -> Result<Option<Citation>, RetrieveError> {
        let conn = self.open()?;
        let citation = conn
            .query_row(
                "SELECT b.name, v.chapter, v.verse, v.text
                 FROM verse v
                 JOIN book b ON v.book_id = b.id
                 WHERE b.name = ?1 AND v.chapter = ?2 AND v.verse = ?3",
                rusqlite::params![book, chapter, verse],
                |row| {
                    Ok(Citation {
                        book: row.get(0)?,
                        chapter: row.get(1)?,
                        verse: row.get(2)?,
                        text: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(citation)
    }

    /// Builds the FTS5 index over `verse.text` if it does not exist yet.
    /// Returns `true` when the index was created by this call.
    pub fn ensure_index(&self) -> Result<bool, RetrieveError> {
        let conn = self.open()?;

        let exists: Option<String> = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [FTS_TABLE],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Ok(false);
        }

        info!("building FTS5 index over verse text");
        conn.execute_batch(&format!(
            "BEGIN;
             CREATE VIRTUAL TABLE {FTS_TABLE} USING fts5(text, content='verse', content_rowid='id');
             INSERT INTO {FTS_TABLE}(rowid, text) SELECT id, text FROM verse;
             COMMIT;"
        ))?;
        Ok(true)
    }
}
