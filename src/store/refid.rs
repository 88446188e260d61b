//! Reference-ID allocation
//!
//! One counter row per entity kind, bumped inside the creating transaction.
//! The caller already holds SQLite's write lock (IMMEDIATE transaction), so
//! two creators of the same kind can never read the same value, and a rolled
//! back creation rolls the counter back with it.

use rusqlite::{params, Connection};

use crate::core::error::{Error, Result};
use crate::core::identity::{EntityKind, ReferenceId};

/// Allocate the next reference ID for `kind`
pub fn allocate(conn: &Connection, kind: EntityKind) -> Result<ReferenceId> {
    let next: i64 = conn
        .query_row(
            "UPDATE reference_counters SET last_value = last_value + 1 \
             WHERE entity_type = ?1 RETURNING last_value",
            params![kind.as_str()],
            |row| row.get(0),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                Error::storage(format!("reference counter for {} is missing", kind))
            }
            other => Error::from(other),
        })?;
    Ok(ReferenceId::new(kind, next))
}

/// Last number handed out for `kind` (0 when none)
pub fn current(conn: &Connection, kind: EntityKind) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT last_value FROM reference_counters WHERE entity_type = ?1",
        params![kind.as_str()],
        |row| row.get(0),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema;

    #[test]
    fn test_allocation_is_monotonic_per_kind() {
        let mut conn = Connection::open_in_memory().unwrap();
        schema::migrate(&mut conn).unwrap();

        assert_eq!(allocate(&conn, EntityKind::Epic).unwrap().to_string(), "EP-001");
        assert_eq!(allocate(&conn, EntityKind::Epic).unwrap().to_string(), "EP-002");
        assert_eq!(
            allocate(&conn, EntityKind::Requirement).unwrap().to_string(),
            "REQ-001"
        );
        assert_eq!(current(&conn, EntityKind::Epic).unwrap(), 2);
        assert_eq!(current(&conn, EntityKind::UserStory).unwrap(), 0);
    }

    #[test]
    fn test_rollback_returns_number() {
        let mut conn = Connection::open_in_memory().unwrap();
        schema::migrate(&mut conn).unwrap();
        {
            let tx = conn.transaction().unwrap();
            allocate(&tx, EntityKind::Epic).unwrap();
            tx.rollback().unwrap();
        }
        assert_eq!(allocate(&conn, EntityKind::Epic).unwrap().number(), 1);
    }
}
