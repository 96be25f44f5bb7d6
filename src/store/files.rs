//! File record repository: the persisted indexing state machine.

use crate::error::Result;
use crate::types::{FileRecord, FileStatus};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::sync::Arc;

pub struct FileRepo {
    conn: Arc<Mutex<Connection>>,
}

impl FileRepo {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub fn upsert(&self, record: &FileRecord) -> Result<()> {
        let conn = self.conn.lock();
        insert_file(&conn, record)?;
        Ok(())
    }

    pub fn by_path(&self, file_path: &str, branch: &str) -> Result<Option<FileRecord>> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                &format!("{SELECT_FILE} WHERE file_path = ?1 AND branch = ?2"),
                params![file_path, branch],
                file_from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn by_status(&self, status: FileStatus, branch: &str) -> Result<Vec<FileRecord>> {
        self.query(
            &format!("{SELECT_FILE} WHERE branch = ?1 AND status = ?2 ORDER BY file_path"),
            params![branch, status.as_str()],
        )
    }

    pub fn by_branch(&self, branch: &str) -> Result<Vec<FileRecord>> {
        self.query(
            &format!("{SELECT_FILE} WHERE branch = ?1 ORDER BY file_path"),
            params![branch],
        )
    }

    pub fn update_status(
        &self,
        file_path: &str,
        branch: &str,
        status: FileStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE files SET status = ?3, error_message = ?4
             WHERE file_path = ?1 AND branch = ?2",
            params![file_path, branch, status.as_str(), error_message],
        )?;
        Ok(())
    }

    pub fn update_symbol_count(&self, file_path: &str, branch: &str, count: u32) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE files SET symbol_count = ?3 WHERE file_path = ?1 AND branch = ?2",
            params![file_path, branch, count],
        )?;
        Ok(())
    }

    pub fn delete_by_path(&self, file_path: &str, branch: &str) -> Result<usize> {
        let conn = self.conn.lock();
        let count = conn.execute(
            "DELETE FROM files WHERE file_path = ?1 AND branch = ?2",
            params![file_path, branch],
        )?;
        Ok(count)
    }

    pub fn delete_by_branch(&self, branch: &str) -> Result<usize> {
        let conn = self.conn.lock();
        let count = conn.execute("DELETE FROM files WHERE branch = ?1", [branch])?;
        Ok(count)
    }

    pub fn count(&self, branch: &str) -> Result<u64> {
        let conn = self.conn.lock();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM files WHERE branch = ?1",
            [branch],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn query(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<FileRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, file_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

const SELECT_FILE: &str = "SELECT file_path, branch, file_hash, mtime_ms, size_bytes, last_indexed,
    language, status, symbol_count, importance_rank, error_message FROM files";

pub(crate) fn insert_file(conn: &Connection, record: &FileRecord) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO files
             (file_path, branch, file_hash, mtime_ms, size_bytes, last_indexed, language,
              status, symbol_count, importance_rank, error_message)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(file_path, branch) DO UPDATE SET
             file_hash = excluded.file_hash,
             mtime_ms = excluded.mtime_ms,
             size_bytes = excluded.size_bytes,
             last_indexed = excluded.last_indexed,
             language = excluded.language,
             status = excluded.status,
             symbol_count = excluded.symbol_count,
             importance_rank = excluded.importance_rank,
             error_message = excluded.error_message",
        params![
            record.file_path,
            record.branch,
            record.file_hash,
            record.mtime_ms,
            record.size_bytes,
            record.last_indexed,
            record.language,
            record.status.as_str(),
            record.symbol_count,
            record.importance_rank,
            record.error_message,
        ],
    )?;
    Ok(())
}

fn file_from_row(row: &Row) -> rusqlite::Result<FileRecord> {
    let status_str: String = row.get(7)?;
    let status = FileStatus::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            7,
            rusqlite::types::Type::Text,
            format!("unknown file status {status_str:?}").into(),
        )
    })?;
    Ok(FileRecord {
        file_path: row.get(0)?,
        branch: row.get(1)?,
        file_hash: row.get(2)?,
        mtime_ms: row.get(3)?,
        size_bytes: row.get(4)?,
        last_indexed: row.get(5)?,
        language: row.get(6)?,
        status,
        symbol_count: row.get(8)?,
        importance_rank: row.get(9)?,
        error_message: row.get(10)?,
    })
}
