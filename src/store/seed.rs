//! Default reference data for a fresh installation
//!
//! Every insert is `INSERT OR IGNORE` against a unique name, so seeding an
//! already seeded database changes nothing.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::core::error::Result;
use crate::core::identity::{EntityId, EntityKind};
use crate::core::principal::Role;
use crate::store::sql::{now, Timestamp};

pub const REQUIREMENT_TYPES: &[(&str, &str)] = &[
    ("Functional", "Behaviour the system must exhibit"),
    ("NonFunctional", "Quality attributes: performance, security, usability"),
    ("Constraint", "Limits imposed on the design or implementation"),
    ("Interface", "Contracts with external systems or users"),
];

pub const RELATIONSHIP_TYPES: &[(&str, &str)] = &[
    ("depends_on", "Source cannot be satisfied before the target"),
    ("blocks", "Source prevents progress on the target"),
    ("relates_to", "Informational link"),
    ("conflicts_with", "Source and target cannot both hold as written"),
    ("derives_from", "Source was refined out of the target"),
];

/// One default workflow: (name, initial, final, color)
struct ModelSeed {
    entity_type: EntityKind,
    name: &'static str,
    statuses: &'static [(&'static str, bool, bool, &'static str)],
    transitions: &'static [(&'static str, &'static str)],
}

const DEFAULT_MODELS: &[ModelSeed] = &[
    ModelSeed {
        entity_type: EntityKind::Epic,
        name: "Default Epic Workflow",
        statuses: &[
            ("Backlog", true, false, "#9e9e9e"),
            ("InProgress", false, false, "#2196f3"),
            ("Done", false, true, "#4caf50"),
            ("Cancelled", false, true, "#f44336"),
        ],
        transitions: &[
            ("Backlog", "InProgress"),
            ("InProgress", "Done"),
            ("Backlog", "Cancelled"),
            ("InProgress", "Cancelled"),
        ],
    },
    ModelSeed {
        entity_type: EntityKind::UserStory,
        name: "Default User Story Workflow",
        statuses: &[
            ("Backlog", true, false, "#9e9e9e"),
            ("InProgress", false, false, "#2196f3"),
            ("Done", false, true, "#4caf50"),
            ("Cancelled", false, true, "#f44336"),
        ],
        transitions: &[
            ("Backlog", "InProgress"),
            ("InProgress", "Done"),
            ("InProgress", "Backlog"),
            ("Done", "InProgress"),
            ("Backlog", "Cancelled"),
        ],
    },
    ModelSeed {
        entity_type: EntityKind::Requirement,
        name: "Default Requirement Workflow",
        statuses: &[
            ("Draft", true, false, "#9e9e9e"),
            ("Active", false, false, "#4caf50"),
            ("Obsolete", false, true, "#795548"),
        ],
        transitions: &[
            ("Draft", "Active"),
            ("Active", "Obsolete"),
            ("Active", "Draft"),
            ("Draft", "Obsolete"),
        ],
    },
];

/// What a seeding pass created
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub requirement_types: usize,
    pub relationship_types: usize,
    pub status_models: usize,
}

impl SeedSummary {
    pub fn is_empty(&self) -> bool {
        self.requirement_types == 0 && self.relationship_types == 0 && self.status_models == 0
    }
}

/// Insert the default types and workflows that are not there yet
pub fn seed_reference_data(conn: &Connection) -> Result<SeedSummary> {
    let ts = Timestamp(now());
    let mut summary = SeedSummary::default();

    for (name, description) in REQUIREMENT_TYPES {
        summary.requirement_types += conn.execute(
            "INSERT OR IGNORE INTO requirement_types (id, name, description, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![EntityId::new(), name, description, ts],
        )?;
    }
    for (name, description) in RELATIONSHIP_TYPES {
        summary.relationship_types += conn.execute(
            "INSERT OR IGNORE INTO relationship_types (id, name, description, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![EntityId::new(), name, description, ts],
        )?;
    }

    for model in DEFAULT_MODELS {
        let has_default: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM status_models WHERE entity_type = ?1 AND is_default = 1)",
            params![model.entity_type],
            |row| row.get(0),
        )?;
        if has_default {
            continue;
        }
        seed_model(conn, model, ts)?;
        summary.status_models += 1;
    }

    Ok(summary)
}

fn seed_model(conn: &Connection, model: &ModelSeed, ts: Timestamp) -> Result<()> {
    let model_id = EntityId::new();
    conn.execute(
        "INSERT INTO status_models (id, entity_type, name, description, is_default, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)",
        params![
            model_id,
            model.entity_type,
            model.name,
            format!("Seeded workflow for {}", model.entity_type.label()),
            ts
        ],
    )?;

    let mut ids = Vec::with_capacity(model.statuses.len());
    for (order, (name, initial, terminal, color)) in model.statuses.iter().enumerate() {
        let id = EntityId::new();
        conn.execute(
            "INSERT INTO statuses (id, status_model_id, name, color, is_initial, is_final, sort_order, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![id, model_id, name, color, initial, terminal, order as i64, ts],
        )?;
        ids.push((*name, id));
    }

    let lookup = |name: &str| ids.iter().find(|(n, _)| *n == name).map(|(_, id)| *id);
    for (from, to) in model.transitions {
        let (Some(from_id), Some(to_id)) = (lookup(from), lookup(to)) else {
            continue;
        };
        conn.execute(
            "INSERT INTO status_transitions (id, status_model_id, from_status_id, to_status_id, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![EntityId::new(), model_id, from_id, to_id, ts],
        )?;
    }
    Ok(())
}

/// Create the administrator `username` unless a user by that name exists.
///
/// Returns the user's ID and whether it was created.
pub fn ensure_admin(conn: &Connection, username: &str) -> Result<(EntityId, bool)> {
    let existing: Option<EntityId> = conn
        .query_row(
            "SELECT id FROM users WHERE username = ?1",
            params![username],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok((id, false));
    }
    let id = EntityId::new();
    let ts = Timestamp(now());
    conn.execute(
        "INSERT INTO users (id, username, display_name, role, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![id, username, username, Role::Administrator, ts],
    )?;
    Ok((id, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema;

    fn db() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        schema::migrate(&mut conn).unwrap();
        conn
    }

    #[test]
    fn test_seed_is_idempotent() {
        let conn = db();
        let first = seed_reference_data(&conn).unwrap();
        assert_eq!(first.requirement_types, 4);
        assert_eq!(first.relationship_types, 5);
        assert_eq!(first.status_models, 3);

        let second = seed_reference_data(&conn).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn test_epic_workflow_shape() {
        let conn = db();
        seed_reference_data(&conn).unwrap();
        let transitions: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM status_transitions st \
                 JOIN status_models m ON m.id = st.status_model_id \
                 WHERE m.entity_type = 'epic'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(transitions, 4);
        let initial: String = conn
            .query_row(
                "SELECT s.name FROM statuses s JOIN status_models m ON m.id = s.status_model_id \
                 WHERE m.entity_type = 'requirement' AND s.is_initial = 1",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(initial, "Draft");
    }

    #[test]
    fn test_ensure_admin_once() {
        let conn = db();
        let (id, created) = ensure_admin(&conn, "admin").unwrap();
        assert!(created);
        let (again, created) = ensure_admin(&conn, "ADMIN").unwrap();
        assert!(!created);
        assert_eq!(id, again);
    }
}
