//! SQL helpers: column conversions, timestamps and dynamic WHERE building

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

use crate::core::entity::Priority;
use crate::core::identity::{EntityId, EntityKind, ReferenceId};
use crate::core::principal::Role;
use crate::core::query::EntityFilter;

/// Current time at the precision the store keeps (microseconds)
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width RFC 3339 so lexical order equals chronological order
pub fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_ts(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

/// Timestamp column newtype
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(pub DateTime<Utc>);

impl FromSql for Timestamp {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        parse_ts(s)
            .map(Timestamp)
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for Timestamp {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(fmt_ts(&self.0)))
    }
}

impl FromSql for EntityId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        s.parse().map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for EntityId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for ReferenceId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        s.parse().map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for ReferenceId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for Priority {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let level = value.as_i64()?;
        Priority::from_level(level).ok_or(FromSqlError::OutOfRange(level))
    }
}

impl ToSql for Priority {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.level()))
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        s.parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for EntityKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        s.parse().map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for EntityKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

/// Dynamic `WHERE 1=1 AND ...` builder with boxed positional parameters
pub struct WhereClause {
    sql: String,
    params: Vec<Box<dyn ToSql>>,
}

impl WhereClause {
    pub fn new() -> Self {
        Self {
            sql: String::from(" WHERE 1=1"),
            params: Vec::new(),
        }
    }

    /// Number of bound parameters so far
    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Append `AND <condition>` with one `?` per parameter
    pub fn and<P: ToSql + 'static>(&mut self, condition: &str, param: P) -> &mut Self {
        self.sql.push_str(" AND ");
        self.sql.push_str(condition);
        self.params.push(Box::new(param));
        self
    }

    /// Append a parameterless condition
    pub fn and_raw(&mut self, condition: &str) -> &mut Self {
        self.sql.push_str(" AND ");
        self.sql.push_str(condition);
        self
    }

    /// Append the shared entity filters, columns qualified with `alias`
    pub fn entity_filter(
        &mut self,
        alias: &str,
        filter: &EntityFilter,
        kind: EntityKind,
    ) -> &mut Self {
        let creator_col = match kind {
            EntityKind::AcceptanceCriteria => "author_id",
            _ => "creator_id",
        };
        if let Some(creator) = filter.creator_id {
            self.and(&format!("{alias}.{creator_col} = ?"), creator);
        }
        if kind.has_status() {
            if let Some(assignee) = filter.assignee_id {
                self.and(&format!("{alias}.assignee_id = ?"), assignee);
            }
            if let Some(ref status) = filter.status {
                self.and(&format!("{alias}.status = ?"), status.clone());
            }
            if let Some(priority) = filter.priority {
                self.and(&format!("{alias}.priority = ?"), priority);
            }
        }
        if let Some(after) = filter.created.after {
            self.and(&format!("{alias}.created_at > ?"), Timestamp(after));
        }
        if let Some(before) = filter.created.before {
            self.and(&format!("{alias}.created_at < ?"), Timestamp(before));
        }
        if let Some(after) = filter.updated.after {
            self.and(&format!("{alias}.updated_at > ?"), Timestamp(after));
        }
        if let Some(before) = filter.updated.before {
            self.and(&format!("{alias}.updated_at < ?"), Timestamp(before));
        }
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Parameters in the order their placeholders appear
    pub fn params(&self) -> Vec<&dyn ToSql> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }

    /// Parameters followed by trailing extras (LIMIT/OFFSET)
    pub fn params_with<'a>(&'a self, extra: &'a [&'a dyn ToSql]) -> Vec<&'a dyn ToSql> {
        let mut all = self.params();
        all.extend_from_slice(extra);
        all
    }
}

impl Default for WhereClause {
    fn default() -> Self {
        Self::new()
    }
}

/// Escape a user string for use inside a LIKE pattern with `ESCAPE '\'`
pub fn like_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::query::DateRange;

    #[test]
    fn test_timestamps_sort_lexically() {
        let a = parse_ts("2024-01-01T00:00:00.000001Z").unwrap();
        let b = parse_ts("2024-01-01T00:00:00.5Z").unwrap();
        assert!(fmt_ts(&a) < fmt_ts(&b));
        assert_eq!(fmt_ts(&a), "2024-01-01T00:00:00.000001Z");
    }

    #[test]
    fn test_now_roundtrips_exactly() {
        let t = now();
        assert_eq!(parse_ts(&fmt_ts(&t)).unwrap(), t);
    }

    #[test]
    fn test_where_clause_builds_in_order() {
        let mut w = WhereClause::new();
        let filter = EntityFilter {
            status: Some("Backlog".into()),
            priority: Some(Priority::High),
            created: DateRange {
                after: Some(now()),
                before: None,
            },
            ..Default::default()
        };
        w.entity_filter("e", &filter, EntityKind::Epic);
        assert_eq!(
            w.sql(),
            " WHERE 1=1 AND e.status = ? AND e.priority = ? AND e.created_at > ?"
        );
        assert_eq!(w.params().len(), 3);
    }

    #[test]
    fn test_status_filters_skip_acceptance_criteria() {
        let mut w = WhereClause::new();
        let filter = EntityFilter {
            status: Some("Backlog".into()),
            creator_id: Some(EntityId::new()),
            ..Default::default()
        };
        w.entity_filter("a", &filter, EntityKind::AcceptanceCriteria);
        assert_eq!(w.sql(), " WHERE 1=1 AND a.author_id = ?");
    }

    #[test]
    fn test_like_escape() {
        assert_eq!(like_escape("50%_off\\"), "50\\%\\_off\\\\");
    }
}
