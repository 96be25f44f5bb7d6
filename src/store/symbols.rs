//! Symbol repository.

use crate::error::Result;
use crate::types::{Symbol, SymbolKind};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::sync::Arc;

pub struct SymbolRepo {
    conn: Arc<Mutex<Connection>>,
}

impl SymbolRepo {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Idempotent upsert keyed on `(id, branch)`.
    pub fn upsert(&self, symbol: &Symbol) -> Result<()> {
        let conn = self.conn.lock();
        insert_symbol(&conn, symbol)?;
        Ok(())
    }

    /// Upsert a batch inside a single transaction.
    pub fn upsert_many(&self, symbols: &[Symbol]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for symbol in symbols {
            insert_symbol(&tx, symbol)?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn by_id(&self, id: &str, branch: &str) -> Result<Option<Symbol>> {
        let conn = self.conn.lock();
        let symbol = conn
            .query_row(
                &format!("{SELECT_SYMBOL} WHERE id = ?1 AND branch = ?2"),
                params![id, branch],
                symbol_from_row,
            )
            .optional()?;
        Ok(symbol)
    }

    pub fn by_file(&self, file_path: &str, branch: &str) -> Result<Vec<Symbol>> {
        self.query(
            &format!("{SELECT_SYMBOL} WHERE file_path = ?1 AND branch = ?2 ORDER BY start_line"),
            params![file_path, branch],
        )
    }

    pub fn by_name(&self, name: &str, branch: &str) -> Result<Vec<Symbol>> {
        self.query(
            &format!("{SELECT_SYMBOL} WHERE name = ?1 AND branch = ?2"),
            params![name, branch],
        )
    }

    pub fn by_qualified_name(&self, qualified_name: &str, branch: &str) -> Result<Option<Symbol>> {
        let conn = self.conn.lock();
        let symbol = conn
            .query_row(
                &format!("{SELECT_SYMBOL} WHERE qualified_name = ?1 AND branch = ?2"),
                params![qualified_name, branch],
                symbol_from_row,
            )
            .optional()?;
        Ok(symbol)
    }

    pub fn by_kind(&self, kind: SymbolKind, branch: &str) -> Result<Vec<Symbol>> {
        self.query(
            &format!("{SELECT_SYMBOL} WHERE kind = ?1 AND branch = ?2"),
            params![kind.as_str(), branch],
        )
    }

    pub fn by_branch(&self, branch: &str) -> Result<Vec<Symbol>> {
        self.query(
            &format!("{SELECT_SYMBOL} WHERE branch = ?1"),
            params![branch],
        )
    }

    pub fn all(&self, branch: &str, limit: usize) -> Result<Vec<Symbol>> {
        self.query(
            &format!("{SELECT_SYMBOL} WHERE branch = ?1 ORDER BY qualified_name LIMIT ?2"),
            params![branch, limit as i64],
        )
    }

    pub fn delete_by_file(&self, file_path: &str, branch: &str) -> Result<usize> {
        let conn = self.conn.lock();
        let count = conn.execute(
            "DELETE FROM symbols WHERE file_path = ?1 AND branch = ?2",
            params![file_path, branch],
        )?;
        Ok(count)
    }

    pub fn delete_by_branch(&self, branch: &str) -> Result<usize> {
        let conn = self.conn.lock();
        let count = conn.execute("DELETE FROM symbols WHERE branch = ?1", [branch])?;
        Ok(count)
    }

    pub fn count(&self, branch: Option<&str>) -> Result<u64> {
        let conn = self.conn.lock();
        let count = match branch {
            Some(branch) => conn.query_row(
                "SELECT COUNT(*) FROM symbols WHERE branch = ?1",
                [branch],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM symbols", [], |row| row.get(0))?,
        };
        Ok(count)
    }

    fn query(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Symbol>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, symbol_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

const SELECT_SYMBOL: &str = "SELECT id, branch, name, qualified_name, kind, language, file_path,
    start_line, end_line, content, signature, docstring, content_hash, is_external,
    embedding_model_id, updated_at, revision_id FROM symbols";

pub(crate) fn insert_symbol(conn: &Connection, symbol: &Symbol) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO symbols
             (id, branch, name, qualified_name, kind, language, file_path, start_line, end_line,
              content, signature, docstring, content_hash, is_external, embedding_model_id,
              updated_at, revision_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
         ON CONFLICT(id, branch) DO UPDATE SET
             name = excluded.name,
             qualified_name = excluded.qualified_name,
             kind = excluded.kind,
             language = excluded.language,
             file_path = excluded.file_path,
             start_line = excluded.start_line,
             end_line = excluded.end_line,
             content = excluded.content,
             signature = excluded.signature,
             docstring = excluded.docstring,
             content_hash = excluded.content_hash,
             is_external = excluded.is_external,
             embedding_model_id = excluded.embedding_model_id,
             updated_at = excluded.updated_at,
             revision_id = excluded.revision_id",
        params![
            symbol.id,
            symbol.branch,
            symbol.name,
            symbol.qualified_name,
            symbol.kind.as_str(),
            symbol.language,
            symbol.file_path,
            symbol.start_line,
            symbol.end_line,
            symbol.content,
            symbol.signature,
            symbol.docstring,
            symbol.content_hash,
            symbol.is_external,
            symbol.embedding_model_id,
            symbol.updated_at,
            symbol.revision_id,
        ],
    )?;
    Ok(())
}

fn symbol_from_row(row: &Row) -> rusqlite::Result<Symbol> {
    let kind_str: String = row.get(4)?;
    let kind = SymbolKind::parse(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown symbol kind {kind_str:?}").into(),
        )
    })?;
    Ok(Symbol {
        id: row.get(0)?,
        branch: row.get(1)?,
        name: row.get(2)?,
        qualified_name: row.get(3)?,
        kind,
        language: row.get(5)?,
        file_path: row.get(6)?,
        start_line: row.get(7)?,
        end_line: row.get(8)?,
        content: row.get(9)?,
        signature: row.get(10)?,
        docstring: row.get(11)?,
        content_hash: row.get(12)?,
        is_external: row.get(13)?,
        embedding_model_id: row.get(14)?,
        updated_at: row.get(15)?,
        revision_id: row.get(16)?,
    })
}
