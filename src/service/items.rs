//! Helpers shared by the four entity kinds

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::core::entity::Priority;
use crate::core::error::{Error, Result};
use crate::core::identity::{EntityId, EntityKey, EntityKind, ReferenceId};
use crate::core::query::{ListResponse, OrderBy, OrderField, Page};
use crate::store::sql::{Timestamp, WhereClause};

/// Resolve an ID or reference ID string to the internal ID of an existing entity
pub(super) fn resolve_id(conn: &Connection, kind: EntityKind, key: &str) -> Result<EntityId> {
    let parsed = EntityKey::parse(kind, key)?;
    lookup(conn, kind, parsed)?.ok_or_else(|| Error::not_found(kind.label(), key.trim()))
}

/// Like [`resolve_id`] when the kind is only known from a reference tag;
/// a bare ULID is tried against every kind
pub(super) fn resolve_any(conn: &Connection, key: &str) -> Result<(EntityKind, EntityId)> {
    let (kind, parsed) = EntityKey::parse_any(key)?;
    let kinds: Vec<EntityKind> = match kind {
        Some(k) => vec![k],
        None => EntityKind::all().to_vec(),
    };
    for kind in kinds {
        if let Some(id) = lookup(conn, kind, parsed)? {
            return Ok((kind, id));
        }
    }
    Err(Error::not_found("entity", key.trim()))
}

fn lookup(conn: &Connection, kind: EntityKind, key: EntityKey) -> Result<Option<EntityId>> {
    let table = kind.table();
    let found = match key {
        EntityKey::Id(id) => conn
            .query_row(
                &format!("SELECT id FROM {table} WHERE id = ?1"),
                params![id],
                |row| row.get(0),
            )
            .optional()?,
        EntityKey::Reference(reference) => conn
            .query_row(
                &format!("SELECT id FROM {table} WHERE reference_id = ?1"),
                params![reference],
                |row| row.get(0),
            )
            .optional()?,
    };
    Ok(found)
}

pub(super) fn exists(conn: &Connection, kind: EntityKind, id: EntityId) -> Result<bool> {
    Ok(conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", kind.table()),
        params![id],
        |row| row.get(0),
    )?)
}

/// Fetch one row by internal ID with `select` (aliased as `alias`)
pub(super) fn fetch<T>(
    conn: &Connection,
    kind: EntityKind,
    select: &str,
    alias: &str,
    id: EntityId,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<T> {
    conn.query_row(&format!("{select} WHERE {alias}.id = ?1"), params![id], map)
        .optional()?
        .ok_or_else(|| Error::not_found(kind.label(), id))
}

/// Reference ID and display title of an entity
pub(super) fn summary(
    conn: &Connection,
    kind: EntityKind,
    id: EntityId,
) -> Result<(ReferenceId, String)> {
    let title_col = match kind {
        EntityKind::AcceptanceCriteria => "description",
        _ => "title",
    };
    conn.query_row(
        &format!(
            "SELECT reference_id, {title_col} FROM {} WHERE id = ?1",
            kind.table()
        ),
        params![id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()?
    .ok_or_else(|| Error::not_found(kind.label(), id))
}

/// Current description of an entity (`None` when unset)
pub(super) fn description_of(
    conn: &Connection,
    kind: EntityKind,
    id: EntityId,
) -> Result<Option<String>> {
    conn.query_row(
        &format!("SELECT description FROM {} WHERE id = ?1", kind.table()),
        params![id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| Error::not_found(kind.label(), id))
}

pub(super) fn ensure_user(conn: &Connection, id: EntityId) -> Result<()> {
    let found: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
        params![id],
        |row| row.get(0),
    )?;
    if !found {
        return Err(Error::not_found("user", id));
    }
    Ok(())
}

/// Trimmed, non-empty
pub(super) fn required_text(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// Empty descriptions are stored as NULL
pub(super) fn optional_text(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// ORDER BY body for a list of `kind`, columns qualified with `alias`
pub(super) fn order_clause(kind: EntityKind, order: &OrderBy, alias: &str) -> Result<String> {
    if kind == EntityKind::AcceptanceCriteria {
        let column = match order.field {
            OrderField::Priority => {
                return Err(Error::validation(
                    "acceptance criteria have no priority to order by",
                ))
            }
            OrderField::Title => "description",
            other => other.column(),
        };
        return Ok(format!(
            "{alias}.{column} {}, {alias}.id ASC",
            order.order.sql()
        ));
    }
    Ok(order.sql_qualified(alias))
}

/// Count and fetch one page of `select` restricted by `filter`
pub(super) fn list_page<T>(
    conn: &Connection,
    select: &str,
    filter: &WhereClause,
    order_sql: &str,
    page: Page,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<ListResponse<T>> {
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM ({select}{})", filter.sql()),
        params_from_iter(filter.params()),
        |row| row.get(0),
    )?;

    let sql = format!("{select}{} ORDER BY {order_sql} LIMIT ? OFFSET ?", filter.sql());
    let limit = page.limit();
    let offset = page.offset();
    let mut stmt = conn.prepare(&sql)?;
    let data = stmt
        .query_map(params_from_iter(filter.params_with(&[&limit, &offset])), map)?
        .collect::<rusqlite::Result<Vec<T>>>()?;
    Ok(ListResponse::new(data, total, page))
}

/// Every row of `select` matching `condition = id`, in reference order
pub(super) fn children<T>(
    conn: &Connection,
    select: &str,
    alias: &str,
    parent_column: &str,
    parent: EntityId,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>> {
    let sql = format!(
        "{select} WHERE {alias}.{parent_column} = ?1 ORDER BY {alias}.reference_number ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![parent], map)?
        .collect::<rusqlite::Result<Vec<T>>>()?;
    Ok(rows)
}

/// Column changes for the title/description/priority trio
#[derive(Debug, Default)]
pub(super) struct FieldChanges {
    pub title: Option<String>,
    /// `Some(None)` clears the description
    pub description: Option<Option<String>>,
    pub priority: Option<Priority>,
}

impl FieldChanges {
    pub fn from_update(
        title: Option<String>,
        description: Option<String>,
        priority: Option<Priority>,
    ) -> Result<Self> {
        Ok(Self {
            title: title.map(|t| required_text("title", &t)).transpose()?,
            description: description.map(|d| optional_text(Some(d))),
            priority,
        })
    }
}

/// Apply `changes` to a titled entity, skipping fields already equal.
///
/// Returns whether anything was written. A changed description re-validates
/// the entity's inline comments in the same transaction.
pub(super) fn apply_changes(
    conn: &Connection,
    kind: EntityKind,
    id: EntityId,
    changes: &FieldChanges,
    ts: Timestamp,
) -> Result<bool> {
    let table = kind.table();
    let (title, description, priority): (String, Option<String>, Priority) = conn
        .query_row(
            &format!("SELECT title, description, priority FROM {table} WHERE id = ?1"),
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?
        .ok_or_else(|| Error::not_found(kind.label(), id))?;

    let mut sets: Vec<&str> = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(ref t) = changes.title {
        if *t != title {
            sets.push("title = ?");
            values.push(Box::new(t.clone()));
        }
    }
    let mut description_changed = false;
    if let Some(ref d) = changes.description {
        if *d != description {
            sets.push("description = ?");
            values.push(Box::new(d.clone()));
            description_changed = true;
        }
    }
    if let Some(p) = changes.priority {
        if p != priority {
            sets.push("priority = ?");
            values.push(Box::new(p));
        }
    }
    if sets.is_empty() {
        return Ok(false);
    }

    if description_changed {
        let new_description = changes.description.clone().flatten().unwrap_or_default();
        super::comments::restale_inline_comments(conn, kind, id, &new_description, ts)?;
    }

    sets.push("updated_at = ?");
    values.push(Box::new(ts));
    values.push(Box::new(id));
    conn.execute(
        &format!("UPDATE {table} SET {} WHERE id = ?", sets.join(", ")),
        params_from_iter(values.iter().map(|v| v.as_ref())),
    )?;
    Ok(true)
}

/// Set or clear the assignee; returns whether it changed
pub(super) fn set_assignee(
    conn: &Connection,
    kind: EntityKind,
    id: EntityId,
    assignee: Option<EntityId>,
    ts: Timestamp,
) -> Result<bool> {
    if let Some(user) = assignee {
        ensure_user(conn, user)?;
    }
    let table = kind.table();
    let current: Option<EntityId> = conn
        .query_row(
            &format!("SELECT assignee_id FROM {table} WHERE id = ?1"),
            params![id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| Error::not_found(kind.label(), id))?;
    if current == assignee {
        return Ok(false);
    }
    conn.execute(
        &format!("UPDATE {table} SET assignee_id = ?1, updated_at = ?2 WHERE id = ?3"),
        params![assignee, ts, id],
    )?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::query::SortOrder;

    #[test]
    fn test_required_text_trims() {
        assert_eq!(required_text("title", "  a  ").unwrap(), "a");
        assert!(required_text("title", "   ").is_err());
    }

    #[test]
    fn test_optional_text_drops_blank() {
        assert_eq!(optional_text(Some(" ".into())), None);
        assert_eq!(optional_text(Some("x".into())), Some("x".into()));
    }

    #[test]
    fn test_criteria_order_maps_title_to_description() {
        let order = OrderBy::new(OrderField::Title, SortOrder::Desc);
        assert_eq!(
            order_clause(EntityKind::AcceptanceCriteria, &order, "a").unwrap(),
            "a.description DESC, a.id ASC"
        );
        let by_priority = OrderBy::new(OrderField::Priority, SortOrder::Asc);
        assert!(order_clause(EntityKind::AcceptanceCriteria, &by_priority, "a").is_err());
        assert_eq!(
            order_clause(EntityKind::Epic, &by_priority, "e").unwrap(),
            "e.priority ASC, e.id ASC"
        );
    }
}
