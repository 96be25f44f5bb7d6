//! Keyword (FTS) repository.
//!
//! One trigram-tokenized FTS5 row per symbol, covering name, qualified
//! name, content, and file path. BM25 rank is lower-is-better. Malformed
//! user queries are caught here and reported as an empty result with the
//! `syntax_error` flag set; they never become errors.

use crate::error::Result;
use crate::types::Symbol;
use parking_lot::Mutex;
use rusqlite::{Connection, params};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct KeywordHit {
    pub symbol_id: String,
    /// BM25 rank; more negative means a better match.
    pub rank: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeywordSearchOutcome {
    pub hits: Vec<KeywordHit>,
    /// True when the query text failed FTS5 parsing.
    pub syntax_error: bool,
}

pub struct KeywordRepo {
    conn: Arc<Mutex<Connection>>,
}

impl KeywordRepo {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub fn index(&self, symbol: &Symbol) -> Result<()> {
        let conn = self.conn.lock();
        insert_fts(&conn, symbol)?;
        Ok(())
    }

    pub fn search(&self, query: &str, branch: &str, limit: usize) -> Result<KeywordSearchOutcome> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Ok(KeywordSearchOutcome::default());
        }

        let conn = self.conn.lock();
        let result = (|| -> rusqlite::Result<Vec<KeywordHit>> {
            let mut stmt = conn.prepare(
                "SELECT symbol_id, rank FROM fts_symbols
                 WHERE fts_symbols MATCH ?1 AND branch = ?2
                 ORDER BY rank LIMIT ?3",
            )?;
            stmt.query_map(params![trimmed, branch, limit as i64], |row| {
                Ok(KeywordHit {
                    symbol_id: row.get(0)?,
                    rank: row.get(1)?,
                })
            })?
            .collect()
        })();

        match result {
            Ok(hits) => Ok(KeywordSearchOutcome {
                hits,
                syntax_error: false,
            }),
            Err(e) if is_fts_syntax_error(&e) => {
                tracing::debug!("malformed FTS query {trimmed:?}: {e}");
                Ok(KeywordSearchOutcome {
                    hits: Vec::new(),
                    syntax_error: true,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn delete(&self, symbol_id: &str, branch: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM fts_symbols WHERE symbol_id = ?1 AND branch = ?2",
            params![symbol_id, branch],
        )?;
        Ok(())
    }

    pub fn delete_by_file(&self, file_path: &str, branch: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM fts_symbols WHERE branch = ?2 AND symbol_id IN
                 (SELECT id FROM symbols WHERE file_path = ?1 AND branch = ?2)",
            params![file_path, branch],
        )?;
        Ok(())
    }

    /// Drop and re-materialize the whole index from the symbols table.
    pub fn rebuild(&self) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM fts_symbols", [])?;
        tx.execute(
            "INSERT INTO fts_symbols (name, qualified_name, content, file_path, symbol_id, branch)
             SELECT name, qualified_name, content, file_path, id, branch FROM symbols",
            [],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count = conn.query_row("SELECT COUNT(*) FROM fts_symbols", [], |row| row.get(0))?;
        Ok(count)
    }
}

pub(crate) fn insert_fts(conn: &Connection, symbol: &Symbol) -> rusqlite::Result<()> {
    // FTS5 has no ON CONFLICT; delete-then-insert keeps one row per symbol.
    conn.execute(
        "DELETE FROM fts_symbols WHERE symbol_id = ?1 AND branch = ?2",
        params![symbol.id, symbol.branch],
    )?;
    conn.execute(
        "INSERT INTO fts_symbols (name, qualified_name, content, file_path, symbol_id, branch)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            symbol.name,
            symbol.qualified_name,
            symbol.content,
            symbol.file_path,
            symbol.id,
            symbol.branch,
        ],
    )?;
    Ok(())
}

fn is_fts_syntax_error(e: &rusqlite::Error) -> bool {
    let message = e.to_string();
    message.contains("fts5") || message.contains("syntax error") || message.contains("malformed")
}
