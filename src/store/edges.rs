//! Edge repository.
//!
//! `callers`/`callees` are the hot paths for graph expansion and impact
//! analysis; both hit the `(branch, kind, {source,target}_id)` indexes.

use crate::error::Result;
use crate::types::{Edge, EdgeKind, EdgeOrigin};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::sync::Arc;

pub struct EdgeRepo {
    conn: Arc<Mutex<Connection>>,
}

impl EdgeRepo {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub fn upsert(&self, edge: &Edge) -> Result<()> {
        let conn = self.conn.lock();
        insert_edge(&conn, edge)?;
        Ok(())
    }

    pub fn upsert_many(&self, edges: &[Edge]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for edge in edges {
            insert_edge(&tx, edge)?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn by_id(&self, id: &str, branch: &str) -> Result<Option<Edge>> {
        let conn = self.conn.lock();
        let edge = conn
            .query_row(
                &format!("{SELECT_EDGE} WHERE id = ?1 AND branch = ?2"),
                params![id, branch],
                edge_from_row,
            )
            .optional()?;
        Ok(edge)
    }

    /// Edges of kind `calls` whose target is `target_id` (who calls this?).
    pub fn callers(&self, target_id: &str, branch: &str) -> Result<Vec<Edge>> {
        self.query(
            &format!(
                "{SELECT_EDGE} WHERE branch = ?1 AND kind = 'calls' AND target_id = ?2
                 ORDER BY confidence DESC"
            ),
            params![branch, target_id],
        )
    }

    /// Edges of kind `calls` whose source is `source_id` (whom does this call?).
    pub fn callees(&self, source_id: &str, branch: &str) -> Result<Vec<Edge>> {
        self.query(
            &format!(
                "{SELECT_EDGE} WHERE branch = ?1 AND kind = 'calls' AND source_id = ?2
                 ORDER BY confidence DESC"
            ),
            params![branch, source_id],
        )
    }

    pub fn by_source(&self, source_id: &str, branch: &str) -> Result<Vec<Edge>> {
        self.query(
            &format!("{SELECT_EDGE} WHERE branch = ?1 AND source_id = ?2"),
            params![branch, source_id],
        )
    }

    pub fn by_kind(&self, kind: EdgeKind, branch: &str) -> Result<Vec<Edge>> {
        self.query(
            &format!("{SELECT_EDGE} WHERE branch = ?1 AND kind = ?2"),
            params![branch, kind.as_str()],
        )
    }

    pub fn by_branch(&self, branch: &str) -> Result<Vec<Edge>> {
        self.query(&format!("{SELECT_EDGE} WHERE branch = ?1"), params![branch])
    }

    /// Delete edges touching any symbol of the given file.
    pub fn delete_by_file(&self, file_path: &str, branch: &str) -> Result<usize> {
        let conn = self.conn.lock();
        let count = conn.execute(
            "DELETE FROM edges WHERE branch = ?2 AND (
                 source_id IN (SELECT id FROM symbols WHERE file_path = ?1 AND branch = ?2)
                 OR target_id IN (SELECT id FROM symbols WHERE file_path = ?1 AND branch = ?2))",
            params![file_path, branch],
        )?;
        Ok(count)
    }

    pub fn delete_by_branch(&self, branch: &str) -> Result<usize> {
        let conn = self.conn.lock();
        let count = conn.execute("DELETE FROM edges WHERE branch = ?1", [branch])?;
        Ok(count)
    }

    pub fn count(&self, branch: Option<&str>) -> Result<u64> {
        let conn = self.conn.lock();
        let count = match branch {
            Some(branch) => conn.query_row(
                "SELECT COUNT(*) FROM edges WHERE branch = ?1",
                [branch],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))?,
        };
        Ok(count)
    }

    fn query(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Edge>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, edge_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

const SELECT_EDGE: &str = "SELECT id, branch, source_id, target_id, kind, confidence, origin,
    source_line, target_line, updated_at, metadata FROM edges";

pub(crate) fn insert_edge(conn: &Connection, edge: &Edge) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO edges
             (id, branch, source_id, target_id, kind, confidence, origin, source_line,
              target_line, updated_at, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(id, branch) DO UPDATE SET
             confidence = excluded.confidence,
             source_line = excluded.source_line,
             target_line = excluded.target_line,
             updated_at = excluded.updated_at,
             metadata = excluded.metadata",
        params![
            edge.id,
            edge.branch,
            edge.source_id,
            edge.target_id,
            edge.kind.as_str(),
            edge.confidence,
            edge.origin.as_str(),
            edge.source_line,
            edge.target_line,
            edge.updated_at,
            edge.metadata,
        ],
    )?;
    Ok(())
}

fn edge_from_row(row: &Row) -> rusqlite::Result<Edge> {
    let kind_str: String = row.get(4)?;
    let kind = EdgeKind::parse(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown edge kind {kind_str:?}").into(),
        )
    })?;
    let origin_str: String = row.get(6)?;
    let origin = EdgeOrigin::parse(&origin_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            rusqlite::types::Type::Text,
            format!("unknown edge origin {origin_str:?}").into(),
        )
    })?;
    Ok(Edge {
        id: row.get(0)?,
        branch: row.get(1)?,
        source_id: row.get(2)?,
        target_id: row.get(3)?,
        kind,
        confidence: row.get(5)?,
        origin,
        source_line: row.get(7)?,
        target_line: row.get(8)?,
        updated_at: row.get(9)?,
        metadata: row.get(10)?,
    })
}
