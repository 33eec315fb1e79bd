use crate::model::{CallEdge, Entrypoint, Package, Symbol, SymbolId, Tag};
use anyhow::Result;
use rusqlite::Connection;
use std::sync::MutexGuard;

/// A batched transaction over the write connection. High-throughput stages
/// (symbol extraction, call-edge extraction, tagging) insert through this so
/// readers only ever observe committed generations.
///
/// The write-connection mutex stays held for the lifetime of the batch.
/// Dropping an unfinished batch rolls it back.
pub struct BatchTx<'a> {
    conn: MutexGuard<'a, Connection>,
    done: bool,
}

impl<'a> BatchTx<'a> {
    pub(crate) fn begin(conn: MutexGuard<'a, Connection>) -> Result<Self> {
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Self { conn, done: false })
    }

    pub fn commit(mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        self.done = true;
        Ok(())
    }

    pub fn rollback(mut self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK")?;
        self.done = true;
        Ok(())
    }

    pub fn insert_package(&self, pkg: &Package) -> Result<()> {
        super::insert_package(&self.conn, pkg)
    }

    pub fn insert_symbol(&self, sym: &Symbol) -> Result<SymbolId> {
        super::insert_symbol(&self.conn, sym)
    }

    pub fn insert_call_edge(&self, edge: &CallEdge) -> Result<()> {
        super::insert_call_edge(&self.conn, edge)
    }

    pub fn insert_entrypoint(&self, ep: &Entrypoint) -> Result<i64> {
        super::insert_entrypoint(&self.conn, ep)
    }

    pub fn insert_tag(&self, tag: &Tag) -> Result<()> {
        super::insert_tag(&self.conn, tag)
    }

    pub fn get_symbol_id(
        &self,
        pkg_path: &str,
        name: &str,
        recv_type: &str,
    ) -> Result<Option<SymbolId>> {
        super::get_symbol_id(&self.conn, pkg_path, name, recv_type)
    }

    /// Symbol ids already registered as HTTP entrypoints, visible to this
    /// transaction (including its own uncommitted inserts).
    pub fn get_http_entrypoint_symbol_ids(&self) -> Result<Vec<SymbolId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT symbol_id FROM entrypoints WHERE type = 'http'")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

impl Drop for BatchTx<'_> {
    fn drop(&mut self) {
        if !self.done {
            let _ = self.conn.execute_batch("ROLLBACK");
        }
    }
}
