//! SQLite-backed file store.

use std::collections::BTreeSet;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use super::ordering::{self, Scope};
use super::StoreError;
use crate::model::{
    FileId, FileRecord, FileStatus, ListKind, NewFile, NewPackage, PackageId, PackageRecord,
    Position,
};

const FILE_COLUMNS: &str =
    "id, url, name, size, status_code, plugin, error, position, package_id";
const PACKAGE_COLUMNS: &str = "id, name, folder, site, password, list_flag, position, priority";

/// SQLite-backed store of files and packages.
///
/// Not `Sync`: a single owner (the executor thread) drives it.
pub struct FileStore {
    conn: Connection,
}

impl FileStore {
    /// Open the store at `path`, creating the database file and tables if needed.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS packages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                folder TEXT NOT NULL DEFAULT '',
                password TEXT NOT NULL DEFAULT '',
                site TEXT NOT NULL DEFAULT '',
                list_flag INTEGER NOT NULL DEFAULT 0,
                position INTEGER NOT NULL DEFAULT 0,
                priority INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                size INTEGER NOT NULL DEFAULT 0,
                status_code INTEGER NOT NULL DEFAULT 3,
                plugin TEXT NOT NULL DEFAULT 'BasePlugin',
                error TEXT NOT NULL DEFAULT '',
                position INTEGER NOT NULL DEFAULT 0,
                package_id INTEGER NOT NULL REFERENCES packages(id)
            );

            CREATE INDEX IF NOT EXISTS idx_files_package_id ON files(package_id);
            CREATE INDEX IF NOT EXISTS idx_packages_list_flag ON packages(list_flag);
            "#,
        )?;
        Ok(())
    }

    /// Open the write transaction if none is active.
    fn begin(&self) -> Result<(), StoreError> {
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }

    /// Make every write so far durable.
    pub fn commit(&self) -> Result<(), StoreError> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    /// Whether writes are pending a [`commit`](Self::commit).
    pub fn has_pending_writes(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn row_to_file(row: &rusqlite::Row) -> rusqlite::Result<FileRecord> {
        let code: i64 = row.get(4)?;
        Ok(FileRecord {
            id: row.get(0)?,
            url: row.get(1)?,
            name: row.get(2)?,
            size: row.get(3)?,
            // Unknown codes come from a newer schema; treat them as queued
            status: FileStatus::from_code(code).unwrap_or(FileStatus::Queued),
            plugin: row.get(5)?,
            error: row.get(6)?,
            position: row.get(7)?,
            package_id: row.get(8)?,
        })
    }

    fn row_to_package(row: &rusqlite::Row) -> rusqlite::Result<PackageRecord> {
        let flag: i64 = row.get(5)?;
        Ok(PackageRecord {
            id: row.get(0)?,
            name: row.get(1)?,
            folder: row.get(2)?,
            site: row.get(3)?,
            password: row.get(4)?,
            list: ListKind::from_flag(flag).unwrap_or(ListKind::Collector),
            position: row.get(6)?,
            priority: row.get(7)?,
        })
    }

    // ---------------------------------------------------------------------
    // Packages
    // ---------------------------------------------------------------------

    /// Insert a package at the tail of its list.
    pub fn add_package(&self, package: &NewPackage) -> Result<PackageId, StoreError> {
        self.begin()?;
        let position = ordering::next_position(&self.conn, Scope::List(package.list))?;
        self.conn.execute(
            "INSERT INTO packages (name, folder, list_flag, position) VALUES (?, ?, ?, ?)",
            params![package.name, package.folder, package.list.flag(), position],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_package(&self, id: PackageId) -> Result<Option<PackageRecord>, StoreError> {
        let package = self
            .conn
            .query_row(
                &format!("SELECT {} FROM packages WHERE id = ?", PACKAGE_COLUMNS),
                params![id],
                Self::row_to_package,
            )
            .optional()?;
        Ok(package)
    }

    fn require_package(&self, id: PackageId) -> Result<PackageRecord, StoreError> {
        self.get_package(id)?
            .ok_or(StoreError::PackageNotFound(id))
    }

    /// Write package metadata. List membership and position are only changed
    /// by [`move_package`](Self::move_package) and
    /// [`reorder_package`](Self::reorder_package).
    pub fn update_package(&self, package: &PackageRecord) -> Result<(), StoreError> {
        self.begin()?;
        self.conn.execute(
            "UPDATE packages SET name = ?, folder = ?, site = ?, password = ?, priority = ? WHERE id = ?",
            params![
                package.name,
                package.folder,
                package.site,
                package.password,
                package.priority,
                package.id,
            ],
        )?;
        Ok(())
    }

    /// Delete a package and its files, closing the gap in its list.
    pub fn delete_package(&mut self, id: PackageId) -> Result<PackageRecord, StoreError> {
        let package = self.require_package(id)?;
        self.begin()?;

        let sp = self.conn.savepoint()?;
        sp.execute("DELETE FROM files WHERE package_id = ?", params![id])?;
        sp.execute("DELETE FROM packages WHERE id = ?", params![id])?;
        let scope = Scope::List(package.list);
        ordering::close_gap(&sp, scope, package.position)?;
        ordering::verify_dense(&sp, scope)?;
        sp.commit()?;

        Ok(package)
    }

    /// Packages of a list in position order.
    pub fn packages_in_list(&self, list: ListKind) -> Result<Vec<PackageRecord>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM packages WHERE list_flag = ? ORDER BY position",
            PACKAGE_COLUMNS
        ))?;
        let rows = stmt.query_map(params![list.flag()], Self::row_to_package)?;

        let mut packages = Vec::new();
        for row in rows {
            packages.push(row?);
        }
        Ok(packages)
    }

    /// Move a package to the tail of `list`, closing its gap in the old list.
    pub fn move_package(
        &mut self,
        id: PackageId,
        list: ListKind,
    ) -> Result<PackageRecord, StoreError> {
        let package = self.require_package(id)?;
        if package.list == list {
            return Ok(package);
        }
        self.begin()?;

        let sp = self.conn.savepoint()?;
        let old_scope = Scope::List(package.list);
        let new_scope = Scope::List(list);
        // Park the row outside both scopes while the old one is renumbered
        sp.execute(
            "UPDATE packages SET position = -1, list_flag = -1 WHERE id = ?",
            params![id],
        )?;
        ordering::close_gap(&sp, old_scope, package.position)?;
        let position = ordering::next_position(&sp, new_scope)?;
        sp.execute(
            "UPDATE packages SET list_flag = ?, position = ? WHERE id = ?",
            params![list.flag(), position, id],
        )?;
        ordering::verify_dense(&sp, old_scope)?;
        ordering::verify_dense(&sp, new_scope)?;
        sp.commit()?;

        Ok(PackageRecord {
            list,
            position,
            ..package
        })
    }

    pub fn reorder_package(
        &mut self,
        id: PackageId,
        target: Position,
    ) -> Result<PackageRecord, StoreError> {
        let package = self.require_package(id)?;
        self.begin()?;

        let sp = self.conn.savepoint()?;
        let scope = Scope::List(package.list);
        let position = ordering::reorder(&sp, scope, id, package.position, target)?;
        ordering::verify_dense(&sp, scope)?;
        sp.commit()?;

        Ok(PackageRecord {
            position,
            ..package
        })
    }

    /// Put every file of a package back to `queued`.
    pub fn restart_package(&self, id: PackageId) -> Result<usize, StoreError> {
        self.begin()?;
        let n = self.conn.execute(
            "UPDATE files SET status_code = ? WHERE package_id = ?",
            params![FileStatus::Queued.code(), id],
        )?;
        Ok(n)
    }

    /// `(id, position)` of every package in a list.
    pub fn package_positions(&self, list: ListKind) -> Result<Vec<(PackageId, i64)>, StoreError> {
        ordering::positions(&self.conn, Scope::List(list))
    }

    // ---------------------------------------------------------------------
    // Files
    // ---------------------------------------------------------------------

    /// Insert a file at the tail of its package.
    pub fn add_file(&mut self, file: &NewFile, package: PackageId) -> Result<FileId, StoreError> {
        let ids = self.add_files(std::slice::from_ref(file), package)?;
        Ok(ids[0])
    }

    /// Insert files at the tail of a package with consecutive positions.
    pub fn add_files(
        &mut self,
        files: &[NewFile],
        package: PackageId,
    ) -> Result<Vec<FileId>, StoreError> {
        self.require_package(package)?;
        self.begin()?;

        let sp = self.conn.savepoint()?;
        let first = ordering::next_position(&sp, Scope::Package(package))?;
        let mut ids = Vec::with_capacity(files.len());
        {
            let mut stmt = sp.prepare(
                "INSERT INTO files (url, name, plugin, package_id, position) VALUES (?, ?, ?, ?, ?)",
            )?;
            for (offset, file) in files.iter().enumerate() {
                stmt.execute(params![
                    file.url,
                    file.name,
                    file.plugin,
                    package,
                    first + offset as i64,
                ])?;
                ids.push(sp.last_insert_rowid());
            }
        }
        sp.commit()?;

        Ok(ids)
    }

    pub fn get_file(&self, id: FileId) -> Result<Option<FileRecord>, StoreError> {
        let file = self
            .conn
            .query_row(
                &format!("SELECT {} FROM files WHERE id = ?", FILE_COLUMNS),
                params![id],
                Self::row_to_file,
            )
            .optional()?;
        Ok(file)
    }

    fn require_file(&self, id: FileId) -> Result<FileRecord, StoreError> {
        self.get_file(id)?.ok_or(StoreError::FileNotFound(id))
    }

    /// Write file fields. The position is owned by the ordering engine and
    /// is never written from a (possibly stale) record.
    pub fn update_file(&self, file: &FileRecord) -> Result<(), StoreError> {
        self.begin()?;
        self.conn.execute(
            "UPDATE files SET url = ?, name = ?, size = ?, status_code = ?, error = ?, plugin = ? WHERE id = ?",
            params![
                file.url,
                file.name,
                file.size,
                file.status.code(),
                file.error,
                file.plugin,
                file.id,
            ],
        )?;
        Ok(())
    }

    /// Delete a file, closing the gap in its package.
    pub fn delete_file(&mut self, id: FileId) -> Result<FileRecord, StoreError> {
        let file = self.require_file(id)?;
        self.begin()?;

        let sp = self.conn.savepoint()?;
        sp.execute("DELETE FROM files WHERE id = ?", params![id])?;
        let scope = Scope::Package(file.package_id);
        ordering::close_gap(&sp, scope, file.position)?;
        ordering::verify_dense(&sp, scope)?;
        sp.commit()?;

        Ok(file)
    }

    pub fn reorder_file(&mut self, id: FileId, target: Position) -> Result<FileRecord, StoreError> {
        let file = self.require_file(id)?;
        self.begin()?;

        let sp = self.conn.savepoint()?;
        let scope = Scope::Package(file.package_id);
        let position = ordering::reorder(&sp, scope, id, file.position, target)?;
        ordering::verify_dense(&sp, scope)?;
        sp.commit()?;

        Ok(FileRecord { position, ..file })
    }

    pub fn restart_file(&self, id: FileId) -> Result<(), StoreError> {
        self.begin()?;
        self.conn.execute(
            "UPDATE files SET status_code = ? WHERE id = ?",
            params![FileStatus::Queued.code(), id],
        )?;
        Ok(())
    }

    /// Files of a package in position order.
    pub fn files_in_package(&self, package: PackageId) -> Result<Vec<FileRecord>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM files WHERE package_id = ? ORDER BY position",
            FILE_COLUMNS
        ))?;
        let rows = stmt.query_map(params![package], Self::row_to_file)?;

        let mut files = Vec::new();
        for row in rows {
            files.push(row?);
        }
        Ok(files)
    }

    /// Files of every package in a list, ordered by package then file position.
    pub fn files_in_list(&self, list: ListKind) -> Result<Vec<FileRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT f.id, f.url, f.name, f.size, f.status_code, f.plugin, f.error, f.position, f.package_id \
             FROM files AS f INNER JOIN packages AS p ON f.package_id = p.id \
             WHERE p.list_flag = ? ORDER BY p.position, f.position",
        )?;
        let rows = stmt.query_map(params![list.flag()], Self::row_to_file)?;

        let mut files = Vec::new();
        for row in rows {
            files.push(row?);
        }
        Ok(files)
    }

    /// `(id, position)` of every file in a package.
    pub fn file_positions(&self, package: PackageId) -> Result<Vec<(FileId, i64)>, StoreError> {
        ordering::positions(&self.conn, Scope::Package(package))
    }

    /// Number of files whose package is in `list`.
    pub fn file_count(&self, list: ListKind) -> Result<i64, StoreError> {
        let n = self.conn.query_row(
            "SELECT COUNT(*) FROM files AS f INNER JOIN packages AS p ON f.package_id = p.id WHERE p.list_flag = ?",
            params![list.flag()],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    /// Ids of up to `limit` dispatchable files in the queue list whose plugin
    /// is not in `occupied`, in package then file order.
    pub fn job_candidates(
        &self,
        occupied: &BTreeSet<String>,
        limit: usize,
    ) -> Result<Vec<FileId>, StoreError> {
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(ListKind::Queue.flag())];

        let mut exclusion = String::new();
        if !occupied.is_empty() {
            let placeholders = vec!["?"; occupied.len()].join(", ");
            exclusion = format!("AND f.plugin NOT IN ({})", placeholders);
            for plugin in occupied {
                params.push(Box::new(plugin.clone()));
            }
        }

        let eligible = FileStatus::ELIGIBLE
            .iter()
            .map(|s| s.code().to_string())
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!(
            "SELECT f.id FROM files AS f INNER JOIN packages AS p ON f.package_id = p.id \
             WHERE p.list_flag = ? {} AND f.status_code IN ({}) \
             ORDER BY p.position, f.position LIMIT ?",
            exclusion, eligible
        );
        params.push(Box::new(limit as i64));

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), |row| row.get(0))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }
}
