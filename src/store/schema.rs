//! Embedded SQL migrations

use rust_embed::Embed;
use rusqlite::{params, Connection, OptionalExtension};

use crate::core::error::{Error, Result};
use crate::store::sql::{fmt_ts, now};

#[derive(Embed)]
#[folder = "migrations/"]
struct EmbeddedMigrations;

/// Migration file names in application order
pub fn migration_names() -> Vec<String> {
    let mut names: Vec<String> = EmbeddedMigrations::iter()
        .map(|f| f.as_ref().to_string())
        .filter(|n| n.ends_with(".sql"))
        .collect();
    names.sort();
    names
}

/// Latest schema version compiled into this binary
pub fn latest_version() -> String {
    migration_names()
        .last()
        .map(|n| version_of(n).to_string())
        .unwrap_or_default()
}

fn version_of(name: &str) -> &str {
    name.split_once('_').map(|(v, _)| v).unwrap_or(name)
}

/// Apply every migration not yet recorded in `schema_migrations`.
///
/// Each file runs in its own transaction; returns the versions applied.
pub fn migrate(conn: &mut Connection) -> Result<Vec<String>> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        );",
    )?;

    let mut applied = Vec::new();
    for name in migration_names() {
        let version = version_of(&name).to_string();
        let done: Option<String> = conn
            .query_row(
                "SELECT version FROM schema_migrations WHERE version = ?1",
                params![version],
                |row| row.get(0),
            )
            .optional()?;
        if done.is_some() {
            continue;
        }

        let file = EmbeddedMigrations::get(&name)
            .ok_or_else(|| Error::storage(format!("embedded migration {} missing", name)))?;
        let sql = std::str::from_utf8(&file.data)
            .map_err(|e| Error::storage(format!("migration {} is not UTF-8: {}", name, e)))?;

        let tx = conn.transaction()?;
        tx.execute_batch(sql)
            .map_err(|e| Error::storage(format!("migration {} failed: {}", name, e)))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![version, name, fmt_ts(&now())],
        )?;
        tx.commit()?;

        tracing::info!(version = %version, name = %name, "applied migration");
        applied.push(version);
    }
    Ok(applied)
}

/// Version recorded in the database, if any migration has run
pub fn current_version(conn: &Connection) -> Result<Option<String>> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_migrations')",
        [],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(None);
    }
    Ok(conn
        .query_row(
            "SELECT version FROM schema_migrations ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_embedded_in_order() {
        let names = migration_names();
        assert!(names.len() >= 2);
        assert!(names[0].starts_with("0001_"));
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        let first = migrate(&mut conn).unwrap();
        assert_eq!(first.len(), migration_names().len());
        let second = migrate(&mut conn).unwrap();
        assert!(second.is_empty());
        assert_eq!(current_version(&conn).unwrap(), Some(latest_version()));
    }

    #[test]
    fn test_counters_seeded_by_schema() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM reference_counters", [], |r| r.get(0))
            .unwrap();
        assert_eq!(n, 4);
    }
}
