use crate::model::{
    CallEdge, CallKind, CalleeInfo, CallerInfo, Entrypoint, EntrypointFilter, EntrypointType,
    EntrypointWithSymbol, IndexMetadata, Package, Stats, Symbol, SymbolCallee, SymbolForTagging,
    SymbolId, SymbolKind, Tag,
};
use anyhow::{Context, Result, anyhow};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub mod batch;
pub mod schema;

pub use batch::BatchTx;

#[derive(Debug)]
struct ConnectionCustomizer;

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for ConnectionCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.busy_timeout(Duration::from_secs(30))?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;
        Ok(())
    }
}

/// Persistence for indexed data. One serialized write connection, a pool of
/// read connections. Lives at `<project>/.flowlens/index.db`.
pub struct Store {
    db_path: PathBuf,
    base_dir: PathBuf,
    write_conn: Arc<Mutex<Connection>>,
    read_pool: Pool<SqliteConnectionManager>,
}

impl Store {
    /// Create or open the index database for a project directory.
    pub fn open(project_dir: &Path) -> Result<Self> {
        let flowlens_dir = project_dir.join(".flowlens");
        std::fs::create_dir_all(&flowlens_dir)
            .with_context(|| format!("creating {}", flowlens_dir.display()))?;

        let db_path = flowlens_dir.join("index.db");
        let write_conn = Connection::open(&db_path)
            .with_context(|| format!("opening database {}", db_path.display()))?;
        write_conn.busy_timeout(Duration::from_secs(30))?;
        write_conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA cache_size = -64000;
            ",
        )?;
        schema::create(&write_conn)?;

        let manager = SqliteConnectionManager::file(&db_path);
        let read_pool = Pool::builder()
            .max_size(8)
            .connection_timeout(Duration::from_secs(30))
            .connection_customizer(Box::new(ConnectionCustomizer))
            .build(manager)
            .context("creating read connection pool")?;

        Ok(Self {
            db_path,
            base_dir: project_dir.to_path_buf(),
            write_conn: Arc::new(Mutex::new(write_conn)),
            read_pool,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn write(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.write_conn.lock().unwrap()
    }

    fn read(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.read_pool
            .get()
            .context("getting read connection from pool")
    }

    /// Remove all rows from every table, for re-indexing.
    pub fn clear(&self) -> Result<()> {
        let conn = self.write();
        for table in [
            "tags",
            "entrypoints",
            "call_edges",
            "symbols",
            "packages",
            "metadata",
        ] {
            conn.execute(&format!("DELETE FROM {table}"), [])
                .with_context(|| format!("clearing table {table}"))?;
        }
        Ok(())
    }

    /// Begin a batched transaction. The write connection stays locked for
    /// the lifetime of the returned value.
    pub fn begin_batch(&self) -> Result<BatchTx<'_>> {
        BatchTx::begin(self.write_conn.lock().unwrap())
    }

    // Single-row writes, used by detectors and metadata.

    pub fn insert_package(&self, pkg: &Package) -> Result<()> {
        insert_package(&self.write(), pkg)
    }

    pub fn insert_symbol(&self, sym: &Symbol) -> Result<SymbolId> {
        insert_symbol(&self.write(), sym)
    }

    pub fn insert_call_edge(&self, edge: &CallEdge) -> Result<()> {
        insert_call_edge(&self.write(), edge)
    }

    pub fn insert_entrypoint(&self, ep: &Entrypoint) -> Result<i64> {
        insert_entrypoint(&self.write(), ep)
    }

    pub fn insert_tag(&self, tag: &Tag) -> Result<()> {
        insert_tag(&self.write(), tag)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.write().execute(
            "INSERT INTO metadata (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let conn = self.read()?;
        let value = conn
            .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    pub fn get_symbol_id(&self, pkg_path: &str, name: &str, recv_type: &str) -> Result<Option<SymbolId>> {
        let conn = self.read()?;
        get_symbol_id(&conn, pkg_path, name, recv_type)
    }

    // Read queries.

    pub fn get_symbol_by_id(&self, id: SymbolId) -> Result<Option<Symbol>> {
        let conn = self.read()?;
        let sym = conn
            .query_row(
                "SELECT id, pkg_path, name, kind, recv_type, file, line, sig
                 FROM symbols WHERE id = ?1",
                [id],
                symbol_from_row,
            )
            .optional()?;
        Ok(sym)
    }

    pub fn get_symbol_tags(&self, id: SymbolId) -> Result<Vec<Tag>> {
        let conn = self.read()?;
        let mut stmt = conn.prepare(
            "SELECT symbol_id, tag, reason FROM tags WHERE symbol_id = ?1 ORDER BY tag",
        )?;
        let rows = stmt.query_map([id], |row| {
            Ok(Tag {
                symbol_id: row.get(0)?,
                tag: row.get(1)?,
                reason: row.get(2)?,
            })
        })?;
        collect(rows)
    }

    pub fn get_package_by_path(&self, pkg_path: &str) -> Result<Option<Package>> {
        let conn = self.read()?;
        let pkg = conn
            .query_row(
                "SELECT pkg_path, module, dir, layer FROM packages WHERE pkg_path = ?1",
                [pkg_path],
                |row| {
                    Ok(Package {
                        pkg_path: row.get(0)?,
                        module: row.get(1)?,
                        dir: row.get(2)?,
                        layer: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(pkg)
    }

    pub fn get_entrypoints(&self, filter: &EntrypointFilter) -> Result<Vec<EntrypointWithSymbol>> {
        let conn = self.read()?;
        let mut sql = String::from(
            "SELECT e.id, e.type, e.label, e.symbol_id, e.meta_json, e.discovery_method,
                    s.id, s.pkg_path, s.name, s.kind, s.recv_type, s.file, s.line, s.sig
             FROM entrypoints e JOIN symbols s ON s.id = e.symbol_id",
        );
        let mut clauses: Vec<String> = Vec::new();
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(ep_type) = filter.ep_type {
            clauses.push(format!("e.type = ?{}", args.len() + 1));
            args.push(Box::new(ep_type.as_str().to_string()));
        }
        if let Some(query) = filter.query.as_deref() {
            if !query.is_empty() {
                let pattern = format!("%{query}%");
                clauses.push(format!(
                    "(e.label LIKE ?{n} OR s.name LIKE ?{n})",
                    n = args.len() + 1
                ));
                args.push(Box::new(pattern));
            }
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY e.type, e.label");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::ToSql> = args.iter().map(|a| a.as_ref()).collect();
        let rows = stmt.query_map(params.as_slice(), entrypoint_with_symbol_from_row)?;
        collect(rows)
    }

    pub fn get_entrypoint_by_id(&self, id: i64) -> Result<Option<EntrypointWithSymbol>> {
        let conn = self.read()?;
        let ep = conn
            .query_row(
                "SELECT e.id, e.type, e.label, e.symbol_id, e.meta_json, e.discovery_method,
                        s.id, s.pkg_path, s.name, s.kind, s.recv_type, s.file, s.line, s.sig
                 FROM entrypoints e JOIN symbols s ON s.id = e.symbol_id
                 WHERE e.id = ?1",
                [id],
                entrypoint_with_symbol_from_row,
            )
            .optional()?;
        Ok(ep)
    }

    /// Substring search over symbol names and package paths, ordered by
    /// exact match, then prefix match, then alphabetically.
    pub fn search_symbols(&self, query: &str, limit: usize) -> Result<Vec<Symbol>> {
        let conn = self.read()?;
        let mut stmt = conn.prepare(
            "SELECT id, pkg_path, name, kind, recv_type, file, line, sig
             FROM symbols
             WHERE name LIKE '%' || ?1 || '%' OR pkg_path LIKE '%' || ?1 || '%'
             ORDER BY CASE
                 WHEN name = ?1 THEN 0
                 WHEN name LIKE ?1 || '%' THEN 1
                 ELSE 2
             END, name, pkg_path
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![query, limit as i64], symbol_from_row)?;
        collect(rows)
    }

    pub fn get_callees(&self, caller_id: SymbolId) -> Result<Vec<CalleeInfo>> {
        let conn = self.read()?;
        let mut stmt = conn.prepare(
            "SELECT s.id, s.pkg_path, s.name, s.kind, s.recv_type, s.file, s.line, s.sig,
                    e.call_kind, e.count, e.caller_file, e.caller_line
             FROM call_edges e JOIN symbols s ON s.id = e.callee_id
             WHERE e.caller_id = ?1
             ORDER BY e.caller_file, e.caller_line, s.id",
        )?;
        let rows = stmt.query_map([caller_id], |row| {
            Ok(CalleeInfo {
                symbol: symbol_from_row(row)?,
                call_kind: call_kind_from_row(row, 8)?,
                count: row.get(9)?,
                caller_file: row.get(10)?,
                caller_line: row.get(11)?,
            })
        })?;
        collect(rows)
    }

    pub fn get_callers(&self, callee_id: SymbolId) -> Result<Vec<CallerInfo>> {
        let conn = self.read()?;
        let mut stmt = conn.prepare(
            "SELECT s.id, s.pkg_path, s.name, s.kind, s.recv_type, s.file, s.line, s.sig,
                    e.call_kind, e.count, e.caller_file, e.caller_line
             FROM call_edges e JOIN symbols s ON s.id = e.caller_id
             WHERE e.callee_id = ?1
             ORDER BY e.caller_file, e.caller_line, s.id",
        )?;
        let rows = stmt.query_map([callee_id], |row| {
            Ok(CallerInfo {
                symbol: symbol_from_row(row)?,
                call_kind: call_kind_from_row(row, 8)?,
                count: row.get(9)?,
                caller_file: row.get(10)?,
                caller_line: row.get(11)?,
            })
        })?;
        collect(rows)
    }

    /// Every function and method symbol, for the tagging passes.
    pub fn get_all_symbols_for_tagging(&self) -> Result<Vec<SymbolForTagging>> {
        let conn = self.read()?;
        let mut stmt = conn.prepare(
            "SELECT id, pkg_path, name, kind, recv_type FROM symbols ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, pkg_path, name, kind, recv_type) = row?;
            let kind = SymbolKind::parse(&kind)
                .ok_or_else(|| anyhow!("unknown symbol kind in store: {kind}"))?;
            out.push(SymbolForTagging {
                id,
                pkg_path,
                name,
                kind,
                recv_type,
            });
        }
        Ok(out)
    }

    /// Distinct caller-package → callee-package pairs derived from call
    /// edges. Same-package pairs are omitted.
    pub fn get_package_imports(&self) -> Result<HashMap<String, Vec<String>>> {
        let conn = self.read()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT cs.pkg_path, es.pkg_path
             FROM call_edges e
             JOIN symbols cs ON cs.id = e.caller_id
             JOIN symbols es ON es.id = e.callee_id
             WHERE cs.pkg_path != es.pkg_path
             ORDER BY cs.pkg_path, es.pkg_path",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut imports: HashMap<String, Vec<String>> = HashMap::new();
        for row in rows {
            let (caller_pkg, callee_pkg) = row?;
            imports.entry(caller_pkg).or_default().push(callee_pkg);
        }
        Ok(imports)
    }

    /// Caller → callees-with-tags map for the purity pass.
    pub fn get_symbol_callees_with_tags(&self) -> Result<HashMap<SymbolId, Vec<SymbolCallee>>> {
        let conn = self.read()?;
        let mut stmt = conn.prepare(
            "SELECT e.caller_id, e.callee_id, t.tag
             FROM (SELECT DISTINCT caller_id, callee_id FROM call_edges) e
             LEFT JOIN tags t ON t.symbol_id = e.callee_id
             ORDER BY e.caller_id, e.callee_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;

        let mut map: HashMap<SymbolId, Vec<SymbolCallee>> = HashMap::new();
        for row in rows {
            let (caller_id, callee_id, tag) = row?;
            let callees = map.entry(caller_id).or_default();
            match callees.iter_mut().find(|c| c.callee_id == callee_id) {
                Some(callee) => {
                    if let Some(tag) = tag {
                        callee.tags.push(tag);
                    }
                }
                None => callees.push(SymbolCallee {
                    callee_id,
                    tags: tag.into_iter().collect(),
                }),
            }
        }
        Ok(map)
    }

    /// Symbol ids already registered as HTTP entrypoints, used by handler
    /// discovery to avoid duplicates.
    pub fn get_http_entrypoint_symbol_ids(&self) -> Result<Vec<SymbolId>> {
        let conn = self.read()?;
        let mut stmt =
            conn.prepare("SELECT DISTINCT symbol_id FROM entrypoints WHERE type = 'http'")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        collect(rows)
    }

    pub fn get_stats(&self) -> Result<Stats> {
        let conn = self.read()?;
        let count = |table: &str| -> Result<i64> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })
            .with_context(|| format!("counting {table}"))
        };
        let indexed_at = self.get_metadata("indexed_at")?.unwrap_or_default();
        Ok(Stats {
            package_count: count("packages")?,
            symbol_count: count("symbols")?,
            call_edge_count: count("call_edges")?,
            entrypoint_count: count("entrypoints")?,
            tag_count: count("tags")?,
            indexed_at,
        })
    }

    /// Write `index.json` next to the database for quick UI boot.
    pub fn write_index_json(&self) -> Result<()> {
        let stats = self.get_stats()?;

        let conn = self.read()?;
        let mut stmt = conn.prepare("SELECT pkg_path FROM packages ORDER BY pkg_path")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let packages: Vec<String> = collect(rows)?;

        let meta = IndexMetadata {
            version: "1".to_string(),
            project_path: self.base_dir.to_string_lossy().to_string(),
            indexed_at: stats.indexed_at,
            package_count: stats.package_count,
            symbol_count: stats.symbol_count,
            entrypoint_count: stats.entrypoint_count,
            packages,
        };

        let data = serde_json::to_string_pretty(&meta).context("marshaling index.json")?;
        let index_path = self
            .db_path
            .parent()
            .map(|dir| dir.join("index.json"))
            .ok_or_else(|| anyhow!("database path has no parent directory"))?;
        std::fs::write(&index_path, data)
            .with_context(|| format!("writing {}", index_path.display()))?;
        Ok(())
    }
}

// Row mappers and conn-level writes, shared with BatchTx.

fn collect<T>(
    rows: impl Iterator<Item = std::result::Result<T, rusqlite::Error>>,
) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub(crate) fn symbol_from_row(row: &Row<'_>) -> std::result::Result<Symbol, rusqlite::Error> {
    let kind: String = row.get(3)?;
    Ok(Symbol {
        id: row.get(0)?,
        pkg_path: row.get(1)?,
        name: row.get(2)?,
        kind: SymbolKind::parse(&kind).unwrap_or(SymbolKind::Func),
        recv_type: row.get(4)?,
        file: row.get(5)?,
        line: row.get(6)?,
        sig: row.get(7)?,
    })
}

fn call_kind_from_row(
    row: &Row<'_>,
    idx: usize,
) -> std::result::Result<CallKind, rusqlite::Error> {
    let kind: String = row.get(idx)?;
    Ok(CallKind::parse(&kind).unwrap_or(CallKind::Unknown))
}

fn entrypoint_with_symbol_from_row(
    row: &Row<'_>,
) -> std::result::Result<EntrypointWithSymbol, rusqlite::Error> {
    let ep_type: String = row.get(1)?;
    let kind: String = row.get(9)?;
    Ok(EntrypointWithSymbol {
        entrypoint: Entrypoint {
            id: row.get(0)?,
            ep_type: EntrypointType::parse(&ep_type).unwrap_or(EntrypointType::Main),
            label: row.get(2)?,
            symbol_id: row.get(3)?,
            meta_json: row.get(4)?,
            discovery_method: row.get(5)?,
        },
        symbol: Symbol {
            id: row.get(6)?,
            pkg_path: row.get(7)?,
            name: row.get(8)?,
            kind: SymbolKind::parse(&kind).unwrap_or(SymbolKind::Func),
            recv_type: row.get(10)?,
            file: row.get(11)?,
            line: row.get(12)?,
            sig: row.get(13)?,
        },
    })
}

pub(crate) fn insert_package(conn: &Connection, pkg: &Package) -> Result<()> {
    conn.execute(
        "INSERT INTO packages (pkg_path, module, dir, layer)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(pkg_path) DO UPDATE SET
             module = excluded.module,
             dir = excluded.dir,
             layer = excluded.layer",
        params![pkg.pkg_path, pkg.module, pkg.dir, pkg.layer],
    )?;
    Ok(())
}

/// Insert or upsert a symbol; the existing row id is preserved on conflict.
pub(crate) fn insert_symbol(conn: &Connection, sym: &Symbol) -> Result<SymbolId> {
    let id = conn.query_row(
        "INSERT INTO symbols (pkg_path, name, kind, recv_type, file, line, sig)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(pkg_path, name, recv_type) DO UPDATE SET
             kind = excluded.kind,
             file = excluded.file,
             line = excluded.line,
             sig = excluded.sig
         RETURNING id",
        params![
            sym.pkg_path,
            sym.name,
            sym.kind.as_str(),
            sym.recv_type,
            sym.file,
            sym.line,
            sym.sig
        ],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Insert a call edge; an identical primary key accumulates `count`.
pub(crate) fn insert_call_edge(conn: &Connection, edge: &CallEdge) -> Result<()> {
    conn.execute(
        "INSERT INTO call_edges (caller_id, callee_id, caller_file, caller_line, call_kind, count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(caller_id, callee_id, caller_file, caller_line) DO UPDATE SET
             count = call_edges.count + excluded.count",
        params![
            edge.caller_id,
            edge.callee_id,
            edge.caller_file,
            edge.caller_line,
            edge.call_kind.as_str(),
            edge.count
        ],
    )?;
    Ok(())
}

pub(crate) fn insert_entrypoint(conn: &Connection, ep: &Entrypoint) -> Result<i64> {
    conn.execute(
        "INSERT INTO entrypoints (type, label, symbol_id, meta_json, discovery_method)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            ep.ep_type.as_str(),
            ep.label,
            ep.symbol_id,
            ep.meta_json,
            ep.discovery_method
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn insert_tag(conn: &Connection, tag: &Tag) -> Result<()> {
    conn.execute(
        "INSERT INTO tags (symbol_id, tag, reason)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(symbol_id, tag) DO UPDATE SET reason = excluded.reason",
        params![tag.symbol_id, tag.tag, tag.reason],
    )?;
    Ok(())
}

pub(crate) fn get_symbol_id(
    conn: &Connection,
    pkg_path: &str,
    name: &str,
    recv_type: &str,
) -> Result<Option<SymbolId>> {
    let id = conn
        .query_row(
            "SELECT id FROM symbols
             WHERE pkg_path = ?1 AND name = ?2 AND recv_type = ?3",
            params![pkg_path, name, recv_type],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();
        (dir, store)
    }

    fn symbol(pkg: &str, name: &str, recv: &str, kind: SymbolKind) -> Symbol {
        Symbol {
            id: 0,
            pkg_path: pkg.to_string(),
            name: name.to_string(),
            kind,
            recv_type: recv.to_string(),
            file: "file.go".to_string(),
            line: 1,
            sig: String::new(),
        }
    }

    fn add_package(store: &Store, pkg_path: &str) {
        store
            .insert_package(&Package {
                pkg_path: pkg_path.to_string(),
                module: "myapp".to_string(),
                dir: format!("/{pkg_path}"),
                layer: String::new(),
            })
            .unwrap();
    }

    #[test]
    fn symbol_upsert_preserves_id() {
        let (_dir, store) = test_store();
        add_package(&store, "myapp/api");

        let first = store
            .insert_symbol(&symbol("myapp/api", "Handle", "", SymbolKind::Func))
            .unwrap();
        let mut updated = symbol("myapp/api", "Handle", "", SymbolKind::Func);
        updated.line = 42;
        let second = store.insert_symbol(&updated).unwrap();

        assert_eq!(first, second);
        let reloaded = store.get_symbol_by_id(first).unwrap().unwrap();
        assert_eq!(reloaded.line, 42);
    }

    #[test]
    fn duplicate_call_edge_accumulates_count() {
        let (_dir, store) = test_store();
        add_package(&store, "myapp/api");
        let a = store
            .insert_symbol(&symbol("myapp/api", "A", "", SymbolKind::Func))
            .unwrap();
        let b = store
            .insert_symbol(&symbol("myapp/api", "B", "", SymbolKind::Func))
            .unwrap();

        let edge = CallEdge {
            caller_id: a,
            callee_id: b,
            caller_file: "file.go".to_string(),
            caller_line: 10,
            call_kind: CallKind::Static,
            count: 1,
        };
        store.insert_call_edge(&edge).unwrap();
        store.insert_call_edge(&edge).unwrap();

        let callees = store.get_callees(a).unwrap();
        assert_eq!(callees.len(), 1);
        assert_eq!(callees[0].count, 2);
    }

    #[test]
    fn clear_leaves_no_residual_rows() {
        let (_dir, store) = test_store();
        add_package(&store, "myapp/api");
        let id = store
            .insert_symbol(&symbol("myapp/api", "A", "", SymbolKind::Func))
            .unwrap();
        store
            .insert_tag(&Tag {
                symbol_id: id,
                tag: "pure-ish".to_string(),
                reason: "No outgoing function calls".to_string(),
            })
            .unwrap();

        store.clear().unwrap();
        let stats = store.get_stats().unwrap();
        assert_eq!(stats.package_count, 0);
        assert_eq!(stats.symbol_count, 0);
        assert_eq!(stats.tag_count, 0);
    }

    #[test]
    fn search_orders_exact_prefix_alpha() {
        let (_dir, store) = test_store();
        add_package(&store, "myapp/api");
        for name in ["GetUserByEmail", "GetUser", "UserGetter", "GetUsers"] {
            store
                .insert_symbol(&symbol("myapp/api", name, "", SymbolKind::Func))
                .unwrap();
        }

        let results = store.search_symbols("GetUser", 10).unwrap();
        let names: Vec<&str> = results.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["GetUser", "GetUserByEmail", "GetUsers"]);
    }

    #[test]
    fn empty_search_query_returns_up_to_limit() {
        let (_dir, store) = test_store();
        add_package(&store, "myapp/api");
        for i in 0..5 {
            store
                .insert_symbol(&symbol("myapp/api", &format!("F{i}"), "", SymbolKind::Func))
                .unwrap();
        }
        let results = store.search_symbols("", 3).unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn batch_rollback_discards_writes() {
        let (_dir, store) = test_store();
        add_package(&store, "myapp/api");
        {
            let batch = store.begin_batch().unwrap();
            batch
                .insert_symbol(&symbol("myapp/api", "Dropped", "", SymbolKind::Func))
                .unwrap();
            batch.rollback().unwrap();
        }
        assert_eq!(store.get_stats().unwrap().symbol_count, 0);

        {
            let batch = store.begin_batch().unwrap();
            batch
                .insert_symbol(&symbol("myapp/api", "Kept", "", SymbolKind::Func))
                .unwrap();
            batch.commit().unwrap();
        }
        assert_eq!(store.get_stats().unwrap().symbol_count, 1);
    }

    #[test]
    fn package_imports_are_distinct_cross_package_pairs() {
        let (_dir, store) = test_store();
        add_package(&store, "myapp/service");
        add_package(&store, "myapp/store");
        let svc = store
            .insert_symbol(&symbol("myapp/service", "GetUser", "", SymbolKind::Func))
            .unwrap();
        let st = store
            .insert_symbol(&symbol(
                "myapp/store",
                "FindByID",
                "*UserStore",
                SymbolKind::Method,
            ))
            .unwrap();
        for line in [10, 20] {
            store
                .insert_call_edge(&CallEdge {
                    caller_id: svc,
                    callee_id: st,
                    caller_file: "service.go".to_string(),
                    caller_line: line,
                    call_kind: CallKind::Static,
                    count: 1,
                })
                .unwrap();
        }

        let imports = store.get_package_imports().unwrap();
        assert_eq!(
            imports.get("myapp/service"),
            Some(&vec!["myapp/store".to_string()])
        );
    }
}
