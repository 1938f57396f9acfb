//! Dense position bookkeeping.
//!
//! Files are ordered within their package and packages within their list.
//! Every function here runs on the executor thread as part of a single store
//! operation, so no other operation can observe an intermediate gap.

use std::fmt;

use rusqlite::{params, Connection};

use super::StoreError;
use crate::model::{ListKind, PackageId, Position};

/// Grouping within which positions are unique and contiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Files sharing a package.
    Package(PackageId),
    /// Packages sharing a list.
    List(ListKind),
}

impl Scope {
    fn table(&self) -> &'static str {
        match self {
            Scope::Package(_) => "files",
            Scope::List(_) => "packages",
        }
    }

    fn column(&self) -> &'static str {
        match self {
            Scope::Package(_) => "package_id",
            Scope::List(_) => "list_flag",
        }
    }

    fn key(&self) -> i64 {
        match self {
            Scope::Package(id) => *id,
            Scope::List(list) => list.flag(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Package(id) => write!(f, "package {}", id),
            Scope::List(list) => write!(f, "list {}", list.as_str()),
        }
    }
}

/// `max(position) + 1`, or 0 for an empty scope.
pub fn next_position(conn: &Connection, scope: Scope) -> Result<i64, StoreError> {
    let sql = format!(
        "SELECT COALESCE(MAX(position), -1) + 1 FROM {} WHERE {} = ?",
        scope.table(),
        scope.column()
    );
    let next = conn.query_row(&sql, params![scope.key()], |row| row.get(0))?;
    Ok(next)
}

/// Number of entities in the scope.
pub fn count(conn: &Connection, scope: Scope) -> Result<i64, StoreError> {
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE {} = ?",
        scope.table(),
        scope.column()
    );
    let n = conn.query_row(&sql, params![scope.key()], |row| row.get(0))?;
    Ok(n)
}

/// Close the gap left by an entity that was at `vacated`.
pub fn close_gap(conn: &Connection, scope: Scope, vacated: i64) -> Result<usize, StoreError> {
    let sql = format!(
        "UPDATE {} SET position = position - 1 WHERE {} = ? AND position > ?",
        scope.table(),
        scope.column()
    );
    let shifted = conn.execute(&sql, params![scope.key(), vacated])?;
    Ok(shifted)
}

/// Resolve a requested slot against a scope of `len` entities.
///
/// `len` includes the entity being moved.
pub fn resolve_target(target: Position, len: i64) -> i64 {
    let last = (len - 1).max(0);
    match target {
        Position::Last => last,
        Position::At(slot) => slot.clamp(0, last),
    }
}

/// Move entity `id` from `old` to `target` inside the scope, shifting the
/// entities in between. Returns the slot the entity ended up in.
pub fn reorder(
    conn: &Connection,
    scope: Scope,
    id: i64,
    old: i64,
    target: Position,
) -> Result<i64, StoreError> {
    let len = count(conn, scope)?;
    let target = resolve_target(target, len);
    if target == old {
        return Ok(old);
    }

    let table = scope.table();
    let column = scope.column();

    conn.execute(
        &format!(
            "UPDATE {} SET position = position - 1 WHERE {} = ? AND position > ?",
            table, column
        ),
        params![scope.key(), old],
    )?;
    conn.execute(
        &format!(
            "UPDATE {} SET position = position + 1 WHERE {} = ? AND position >= ? AND id != ?",
            table, column
        ),
        params![scope.key(), target, id],
    )?;
    conn.execute(
        &format!("UPDATE {} SET position = ? WHERE id = ?", table),
        params![target, id],
    )?;

    Ok(target)
}

/// `(id, position)` pairs of the scope in position order.
pub fn positions(conn: &Connection, scope: Scope) -> Result<Vec<(i64, i64)>, StoreError> {
    let sql = format!(
        "SELECT id, position FROM {} WHERE {} = ? ORDER BY position, id",
        scope.table(),
        scope.column()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![scope.key()], |row| Ok((row.get(0)?, row.get(1)?)))?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Check that the scope's positions are exactly `0..n`.
pub fn verify_dense(conn: &Connection, scope: Scope) -> Result<(), StoreError> {
    for (expected, (id, position)) in positions(conn, scope)?.into_iter().enumerate() {
        if position != expected as i64 {
            return Err(StoreError::OrderingViolation {
                scope,
                detail: format!(
                    "entity {} has position {}, expected {}",
                    id, position, expected
                ),
            });
        }
    }
    Ok(())
}
