//! Listing primitives: pagination, ordering whitelist, filters and the list envelope

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::core::entity::Priority;
use crate::core::error::{Error, Result};
use crate::core::identity::EntityId;

pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 100;

/// Validated limit/offset pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPage")]
pub struct Page {
    limit: i64,
    offset: i64,
}

/// Unchecked wire form of a [`Page`]
#[derive(Deserialize)]
struct RawPage {
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    offset: Option<i64>,
}

impl TryFrom<RawPage> for Page {
    type Error = Error;

    fn try_from(raw: RawPage) -> Result<Self> {
        Page::new(raw.limit, raw.offset)
    }
}

impl Page {
    /// `limit` must be in 1..=100 (default 50); `offset` must be >= 0
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Result<Self> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT);
        let offset = offset.unwrap_or(0);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(Error::validation(format!(
                "limit must be between 1 and {} (got {})",
                MAX_LIMIT, limit
            )));
        }
        if offset < 0 {
            return Err(Error::validation(format!(
                "offset must be >= 0 (got {})",
                offset
            )));
        }
        Ok(Self { limit, offset })
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Rows a per-kind query must fetch so a merged page can be cut from it
    pub fn window(&self) -> i64 {
        self.limit.saturating_add(self.offset)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl std::str::FromStr for SortOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(Error::validation(format!(
                "invalid sort order '{}' (expected ASC or DESC)",
                s
            ))),
        }
    }
}

/// Columns entity lists may be ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OrderField {
    CreatedAt,
    UpdatedAt,
    Title,
    Priority,
    ReferenceId,
}

impl OrderField {
    /// Column expression; reference IDs order numerically
    pub fn column(&self) -> &'static str {
        match self {
            OrderField::CreatedAt => "created_at",
            OrderField::UpdatedAt => "updated_at",
            OrderField::Title => "title",
            OrderField::Priority => "priority",
            OrderField::ReferenceId => "reference_number",
        }
    }
}

impl std::str::FromStr for OrderField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "created_at" => Ok(OrderField::CreatedAt),
            "updated_at" => Ok(OrderField::UpdatedAt),
            "title" => Ok(OrderField::Title),
            "priority" => Ok(OrderField::Priority),
            "reference_id" => Ok(OrderField::ReferenceId),
            _ => Err(Error::validation(format!(
                "cannot order by '{}' (allowed: created_at, updated_at, title, priority, reference_id)",
                s
            ))),
        }
    }
}

/// A whitelisted ordering, e.g. `priority ASC`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: OrderField,
    pub order: SortOrder,
}

impl OrderBy {
    pub fn new(field: OrderField, order: SortOrder) -> Self {
        Self { field, order }
    }

    /// Parse `"<field>"` or `"<field> ASC|DESC"`; a bare field sorts ascending
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = s.split_whitespace();
        let field: OrderField = parts
            .next()
            .ok_or_else(|| Error::validation("order_by must not be empty"))?
            .parse()?;
        let order = match parts.next() {
            Some(o) => o.parse()?,
            None => SortOrder::Asc,
        };
        if parts.next().is_some() {
            return Err(Error::validation(format!("malformed order_by '{}'", s)));
        }
        Ok(Self { field, order })
    }

    /// ORDER BY clause body, with `id` as the final tiebreak
    pub fn sql(&self) -> String {
        format!("{} {}, id ASC", self.field.column(), self.order.sql())
    }

    /// ORDER BY clause body with every column qualified by a table alias
    pub fn sql_qualified(&self, alias: &str) -> String {
        format!(
            "{alias}.{} {}, {alias}.id ASC",
            self.field.column(),
            self.order.sql()
        )
    }
}

impl Default for OrderBy {
    fn default() -> Self {
        Self {
            field: OrderField::ReferenceId,
            order: SortOrder::Asc,
        }
    }
}

/// Half-open time window; either bound may be absent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn is_empty(&self) -> bool {
        self.after.is_none() && self.before.is_none()
    }

    pub fn validate(&self, field: &str) -> Result<()> {
        if let (Some(after), Some(before)) = (self.after, self.before) {
            if after >= before {
                return Err(Error::validation(format!(
                    "{field}_after must be earlier than {field}_before"
                )));
            }
        }
        Ok(())
    }
}

/// Filters shared by every entity list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFilter {
    pub creator_id: Option<EntityId>,
    pub assignee_id: Option<EntityId>,
    pub status: Option<String>,
    pub priority: Option<Priority>,
    pub created: DateRange,
    pub updated: DateRange,
}

impl EntityFilter {
    pub fn validate(&self) -> Result<()> {
        self.created.validate("created")?;
        self.updated.validate("updated")
    }

    /// Whether any filter only status-bearing kinds can satisfy is set
    pub fn has_status_bearing_filters(&self) -> bool {
        self.status.is_some() || self.priority.is_some() || self.assignee_id.is_some()
    }
}

/// Everything a list call needs
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub filter: EntityFilter,
    pub order: OrderBy,
    pub page: Page,
}

/// The standard list envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    pub total_count: i64,
    pub limit: i64,
    pub offset: i64,
}

impl<T> ListResponse<T> {
    pub fn new(data: Vec<T>, total_count: i64, page: Page) -> Self {
        Self {
            data,
            total_count,
            limit: page.limit(),
            offset: page.offset(),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> ListResponse<U> {
        ListResponse {
            data: self.data.into_iter().map(f).collect(),
            total_count: self.total_count,
            limit: self.limit,
            offset: self.offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorCode;

    #[test]
    fn test_page_deserialize_is_validated() {
        assert!(serde_json::from_str::<Page>(r#"{"limit":0,"offset":0}"#).is_err());
        assert!(serde_json::from_str::<Page>(r#"{"limit":10,"offset":-1}"#).is_err());
        let page: Page = serde_json::from_str(r#"{"offset":5}"#).unwrap();
        assert_eq!((page.limit(), page.offset()), (50, 5));
    }

    #[test]
    fn test_page_window_saturates() {
        let page = Page::new(Some(10), Some(i64::MAX)).unwrap();
        assert_eq!(page.window(), i64::MAX);
    }

    #[test]
    fn test_page_defaults() {
        let p = Page::new(None, None).unwrap();
        assert_eq!(p.limit(), 50);
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn test_page_limit_bounds() {
        assert_eq!(
            Page::new(Some(0), None).unwrap_err().code(),
            ErrorCode::ValidationError
        );
        assert_eq!(
            Page::new(Some(101), None).unwrap_err().code(),
            ErrorCode::ValidationError
        );
        assert!(Page::new(Some(1), None).is_ok());
        assert!(Page::new(Some(100), None).is_ok());
        assert!(Page::new(None, Some(-1)).is_err());
    }

    #[test]
    fn test_window_covers_offset() {
        assert_eq!(Page::new(Some(10), Some(20)).unwrap().window(), 30);
    }

    #[test]
    fn test_order_by_whitelist() {
        let o = OrderBy::parse("priority DESC").unwrap();
        assert_eq!(o.field, OrderField::Priority);
        assert_eq!(o.order, SortOrder::Desc);
        assert_eq!(o.sql(), "priority DESC, id ASC");

        let r = OrderBy::parse("reference_id").unwrap();
        assert_eq!(r.sql(), "reference_number ASC, id ASC");

        assert!(OrderBy::parse("title; DROP TABLE epics").is_err());
        assert!(OrderBy::parse("status").is_err());
        assert!(OrderBy::parse("title sideways").is_err());
    }

    #[test]
    fn test_date_range_ordering() {
        let now = Utc::now();
        let bad = DateRange {
            after: Some(now),
            before: Some(now - chrono::Duration::hours(1)),
        };
        assert!(bad.validate("created").is_err());
        assert!(DateRange::default().validate("created").is_ok());
    }
}
