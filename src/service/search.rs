//! Ranked full-text search across the searchable record kinds, and suggestions

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, Row};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::Service;
use crate::core::context::RequestContext;
use crate::core::entity::Priority;
use crate::core::error::{Error, Result};
use crate::core::identity::{EntityId, EntityKind, RecordKind, ReferenceId};
use crate::core::principal::Permission;
use crate::core::query::{EntityFilter, Page, SortOrder, MAX_LIMIT};
use crate::store::sql::{like_escape, Timestamp, WhereClause};

/// Title matches outweigh description/content matches by this factor
const TITLE_WEIGHT: f64 = 10.0;
const BODY_WEIGHT: f64 = 1.0;

pub const MIN_SUGGEST_PREFIX: usize = 2;
pub const DEFAULT_SUGGEST_LIMIT: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SearchSort {
    #[default]
    Relevance,
    CreatedAt,
    UpdatedAt,
    Title,
    Priority,
}

/// Search parameters. The JSON form of a normalized query is its cache key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Free text; empty lists everything with relevance disabled
    pub query: String,
    /// Kinds to search; empty means all
    pub entity_types: Vec<RecordKind>,
    pub filter: EntityFilter,
    pub sort_by: SearchSort,
    pub sort_order: SortOrder,
    pub page: Page,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// Trimmed text, kinds sorted and deduplicated (empty expands to all)
    fn normalized(&self) -> Result<Self> {
        self.filter.validate()?;
        let mut kinds = if self.entity_types.is_empty() {
            RecordKind::searchable().to_vec()
        } else {
            self.entity_types.clone()
        };
        if let Some(bad) = kinds.iter().find(|k| !k.is_searchable()) {
            return Err(Error::validation(format!("{} records are not searchable", bad)));
        }
        kinds.sort();
        kinds.dedup();
        Ok(Self {
            query: self.query.trim().to_string(),
            entity_types: kinds,
            ..self.clone()
        })
    }
}

/// One matching record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub entity_type: RecordKind,
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<ReferenceId>,
    /// Title; acceptance criteria show their description, comments nothing
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// For comments, the entity commented on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_type: Option<EntityKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<EntityId>,
    /// Text relevance (higher is better); 0 when the query is empty
    pub score: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SearchHit {
    fn from_row(kind: RecordKind, row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            entity_type: kind,
            id: row.get("id")?,
            reference_id: row.get("reference_id")?,
            title: row.get("title")?,
            body: row.get("body")?,
            status: row.get("status")?,
            priority: row.get("priority")?,
            target_type: row.get("target_type")?,
            target_id: row.get("target_id")?,
            score: row.get("score")?,
            created_at: row.get::<_, Timestamp>("created_at")?.0,
            updated_at: row.get::<_, Timestamp>("updated_at")?.0,
        })
    }
}

/// A search page. `total_count` sums the per-kind match counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub data: Vec<SearchHit>,
    pub total_count: i64,
    pub limit: i64,
    pub offset: i64,
    /// Whether the response came from the cache
    #[serde(skip)]
    pub cache_hit: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub entity_type: EntityKind,
    pub id: EntityId,
    pub reference_id: ReferenceId,
    pub title: String,
}

/// Prefix matches in three buckets
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Suggestions {
    pub titles: Vec<Suggestion>,
    pub reference_ids: Vec<Suggestion>,
    pub statuses: Vec<String>,
}

/// Turn free text into an FTS5 expression: every term quoted, all required
fn match_expression(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|t| t.chars().filter(|c| *c != '"').collect::<String>())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

fn table_of(kind: RecordKind) -> &'static str {
    match kind.entity_kind() {
        Some(entity) => entity.table(),
        None => "comments",
    }
}

fn columns_of(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::AcceptanceCriteria => {
            "x.id AS id, x.reference_id AS reference_id, x.description AS title, NULL AS body, \
             NULL AS status, NULL AS priority, NULL AS target_type, NULL AS target_id, \
             x.created_at AS created_at, x.updated_at AS updated_at"
        }
        RecordKind::Comment => {
            "x.id AS id, NULL AS reference_id, '' AS title, x.content AS body, \
             NULL AS status, NULL AS priority, x.entity_type AS target_type, x.entity_id AS target_id, \
             x.created_at AS created_at, x.updated_at AS updated_at"
        }
        _ => {
            "x.id AS id, x.reference_id AS reference_id, x.title AS title, x.description AS body, \
             x.status AS status, x.priority AS priority, NULL AS target_type, NULL AS target_id, \
             x.created_at AS created_at, x.updated_at AS updated_at"
        }
    }
}

fn has_priority(kind: RecordKind) -> bool {
    kind.entity_kind().is_some_and(|k| k.has_status())
}

/// ORDER BY matching [`compare_hits`] for one kind
fn order_sql(kind: RecordKind, sort: SearchSort, order: SortOrder, ranked: bool) -> String {
    let dir = order.sql();
    match sort {
        SearchSort::Relevance if ranked => "score DESC, updated_at DESC, id ASC".to_string(),
        SearchSort::Relevance => "updated_at DESC, id ASC".to_string(),
        SearchSort::CreatedAt => format!("created_at {dir}, id ASC"),
        SearchSort::UpdatedAt => format!("updated_at {dir}, id ASC"),
        SearchSort::Title => format!("title {dir}, id ASC"),
        SearchSort::Priority if has_priority(kind) => format!("priority {dir}, id ASC"),
        SearchSort::Priority => "id ASC".to_string(),
    }
}

fn directed(ordering: Ordering, order: SortOrder) -> Ordering {
    match order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    }
}

/// Total order used to merge the per-kind streams; ties always break on ID
fn compare_hits(
    a: &SearchHit,
    b: &SearchHit,
    sort: SearchSort,
    order: SortOrder,
    ranked: bool,
) -> Ordering {
    let primary = match sort {
        SearchSort::Relevance if ranked => b
            .score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.updated_at.cmp(&a.updated_at)),
        SearchSort::Relevance => b.updated_at.cmp(&a.updated_at),
        SearchSort::CreatedAt => directed(a.created_at.cmp(&b.created_at), order),
        SearchSort::UpdatedAt => directed(a.updated_at.cmp(&b.updated_at), order),
        SearchSort::Title => directed(a.title.cmp(&b.title), order),
        // Kinds without a priority go last either way
        SearchSort::Priority => match (a.priority, b.priority) {
            (Some(x), Some(y)) => directed(x.cmp(&y), order),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

fn comment_filter(clause: &mut WhereClause, filter: &EntityFilter) {
    if let Some(author) = filter.creator_id {
        clause.and("x.author_id = ?", author);
    }
    if let Some(after) = filter.created.after {
        clause.and("x.created_at > ?", Timestamp(after));
    }
    if let Some(before) = filter.created.before {
        clause.and("x.created_at < ?", Timestamp(before));
    }
    if let Some(after) = filter.updated.after {
        clause.and("x.updated_at > ?", Timestamp(after));
    }
    if let Some(before) = filter.updated.before {
        clause.and("x.updated_at < ?", Timestamp(before));
    }
}

/// One kind's share of a search: its FROM clause, score expression and filters
struct KindSearch {
    kind: RecordKind,
    from: String,
    score: String,
    clause: WhereClause,
}

impl KindSearch {
    fn new(kind: RecordKind, query: &SearchQuery, expression: Option<&str>) -> Self {
        let table = table_of(kind);
        let fts = format!("{table}_fts");
        let mut clause = WhereClause::new();
        let (from, score) = match expression {
            Some(expr) => {
                clause.and(&format!("{fts} MATCH ?"), expr.to_string());
                (
                    format!("{fts} JOIN {table} x ON x.row_id = {fts}.rowid"),
                    format!("-bm25({fts}, {TITLE_WEIGHT:.1}, {BODY_WEIGHT:.1})"),
                )
            }
            None => (format!("{table} x"), "0.0".to_string()),
        };
        match kind.entity_kind() {
            Some(entity) => {
                clause.entity_filter("x", &query.filter, entity);
            }
            None => comment_filter(&mut clause, &query.filter),
        }
        Self {
            kind,
            from,
            score,
            clause,
        }
    }

    fn count(&self, conn: &Connection) -> Result<i64> {
        Ok(conn.query_row(
            &format!("SELECT COUNT(*) FROM {}{}", self.from, self.clause.sql()),
            params_from_iter(self.clause.params()),
            |row| row.get(0),
        )?)
    }

    /// The first `window` rows in merge order
    fn fetch(
        &self,
        conn: &Connection,
        query: &SearchQuery,
        ranked: bool,
    ) -> Result<Vec<SearchHit>> {
        let sql = format!(
            "SELECT {}, {} AS score FROM {}{} ORDER BY {} LIMIT ?",
            columns_of(self.kind),
            self.score,
            self.from,
            self.clause.sql(),
            order_sql(self.kind, query.sort_by, query.sort_order, ranked),
        );
        let window = query.page.window();
        let kind = self.kind;
        let mut stmt = conn.prepare(&sql)?;
        let hits = stmt
            .query_map(params_from_iter(self.clause.params_with(&[&window])), |row| {
                SearchHit::from_row(kind, row)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(hits)
    }
}

fn run_search(conn: &Connection, query: &SearchQuery) -> Result<SearchResponse> {
    let expression = match_expression(&query.query);
    let ranked = expression.is_some();
    let skip_unstatused = query.filter.has_status_bearing_filters();

    let mut counted = Vec::new();
    let mut total_count: i64 = 0;
    for &kind in &query.entity_types {
        if skip_unstatused && !has_priority(kind) {
            continue;
        }
        let search = KindSearch::new(kind, query, expression.as_deref());
        let count = search.count(conn)?;
        total_count = total_count.saturating_add(count);
        if count > 0 {
            counted.push(search);
        }
    }

    let mut data: Vec<SearchHit> = Vec::new();
    if query.page.offset() < total_count {
        let mut hits = Vec::new();
        for search in &counted {
            hits.append(&mut search.fetch(conn, query, ranked)?);
        }
        hits.sort_by(|a, b| compare_hits(a, b, query.sort_by, query.sort_order, ranked));
        data = hits
            .into_iter()
            .skip(query.page.offset() as usize)
            .take(query.page.limit() as usize)
            .collect();
    }

    Ok(SearchResponse {
        data,
        total_count,
        limit: query.page.limit(),
        offset: query.page.offset(),
        cache_hit: false,
    })
}

fn suggestion_from_row(row: &Row<'_>) -> rusqlite::Result<Suggestion> {
    Ok(Suggestion {
        entity_type: row.get("entity_type")?,
        id: row.get("id")?,
        reference_id: row.get("reference_id")?,
        title: row.get("title")?,
    })
}

impl Service {
    /// Run a search, serving it from the cache when possible
    pub fn search(&self, ctx: &RequestContext, query: &SearchQuery) -> Result<SearchResponse> {
        let (json, cache_hit) = self.search_raw(ctx, query)?;
        let mut response: SearchResponse = serde_json::from_str(&json)?;
        response.cache_hit = cache_hit;
        Ok(response)
    }

    /// The serialized response and whether it was a cache hit.
    ///
    /// A hit returns exactly the bytes stored on the miss that filled it.
    pub fn search_raw(&self, ctx: &RequestContext, query: &SearchQuery) -> Result<(String, bool)> {
        ctx.require(Permission::Read)?;
        let query = query.normalized()?;
        // Taken before the read so a concurrent write makes it stale
        let key = match self.cache.key_for(&query, &query.entity_types) {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::warn!(error = %e, "search cache key failed, running uncached");
                None
            }
        };

        if let Some(ref key) = key {
            if let Some(cached) = self.cache.get(key) {
                return Ok((cached, true));
            }
        }

        let response = self.store.read(ctx, "search", |conn| run_search(conn, &query))?;
        tracing::debug!(
            query = %query.query,
            hits = response.data.len(),
            total = response.total_count,
            "search computed"
        );
        let json = serde_json::to_string(&response)?;
        if let Some(key) = key {
            self.cache.put(&key, &json, &query.entity_types);
        }
        Ok((json, false))
    }

    /// Prefix suggestions for titles, reference IDs and status names
    pub fn suggest(
        &self,
        ctx: &RequestContext,
        prefix: &str,
        limit: Option<i64>,
    ) -> Result<Suggestions> {
        ctx.require(Permission::Read)?;
        let prefix = prefix.trim();
        if prefix.chars().count() < MIN_SUGGEST_PREFIX {
            return Err(Error::validation(format!(
                "suggestion prefix must be at least {} characters",
                MIN_SUGGEST_PREFIX
            )));
        }
        let limit = limit.unwrap_or(DEFAULT_SUGGEST_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(Error::validation(format!(
                "limit must be between 1 and {} (got {})",
                MAX_LIMIT, limit
            )));
        }
        let pattern = format!("{}%", like_escape(prefix));

        self.store.read(ctx, "suggest", |conn| {
            let mut titles = conn.prepare(
                "SELECT 'epic' AS entity_type, id, reference_id, title FROM epics WHERE title LIKE ?1 ESCAPE '\\' \
                 UNION ALL SELECT 'user_story', id, reference_id, title FROM user_stories WHERE title LIKE ?1 ESCAPE '\\' \
                 UNION ALL SELECT 'acceptance_criteria', id, reference_id, description FROM acceptance_criteria WHERE description LIKE ?1 ESCAPE '\\' \
                 UNION ALL SELECT 'requirement', id, reference_id, title FROM requirements WHERE title LIKE ?1 ESCAPE '\\' \
                 ORDER BY title, reference_id LIMIT ?2",
            )?;
            let titles = titles
                .query_map(params![pattern, limit], suggestion_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut references = conn.prepare(
                "SELECT 'epic' AS entity_type, id, reference_id, title, reference_number FROM epics WHERE reference_id LIKE ?1 ESCAPE '\\' \
                 UNION ALL SELECT 'user_story', id, reference_id, title, reference_number FROM user_stories WHERE reference_id LIKE ?1 ESCAPE '\\' \
                 UNION ALL SELECT 'acceptance_criteria', id, reference_id, description, reference_number FROM acceptance_criteria WHERE reference_id LIKE ?1 ESCAPE '\\' \
                 UNION ALL SELECT 'requirement', id, reference_id, title, reference_number FROM requirements WHERE reference_id LIKE ?1 ESCAPE '\\' \
                 ORDER BY entity_type, reference_number LIMIT ?2",
            )?;
            let reference_ids = references
                .query_map(params![pattern, limit], suggestion_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut statuses = conn.prepare(
                "SELECT DISTINCT s.name FROM statuses s \
                 JOIN status_models m ON m.id = s.status_model_id \
                 WHERE m.is_default = 1 AND s.name LIKE ?1 ESCAPE '\\' \
                 ORDER BY s.name LIMIT ?2",
            )?;
            let statuses = statuses
                .query_map(params![pattern, limit], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;

            Ok(Suggestions {
                titles,
                reference_ids,
                statuses,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(score: f64, updated: i64, priority: Option<Priority>) -> SearchHit {
        let ts = DateTime::from_timestamp(updated, 0).unwrap();
        SearchHit {
            entity_type: RecordKind::Epic,
            id: EntityId::new(),
            reference_id: None,
            title: String::new(),
            body: None,
            status: None,
            priority,
            target_type: None,
            target_id: None,
            score,
            created_at: ts,
            updated_at: ts,
        }
    }

    #[test]
    fn test_match_expression_quotes_terms() {
        assert_eq!(
            match_expression("  OAuth \"login\" flow "),
            Some("\"OAuth\" \"login\" \"flow\"".to_string())
        );
        assert_eq!(match_expression("   "), None);
        assert_eq!(match_expression("\"\""), None);
    }

    #[test]
    fn test_relevance_orders_by_score_then_recency() {
        let mut hits = vec![hit(1.0, 100, None), hit(5.0, 10, None), hit(1.0, 200, None)];
        hits.sort_by(|a, b| compare_hits(a, b, SearchSort::Relevance, SortOrder::Desc, true));
        assert_eq!(hits[0].score, 5.0);
        assert_eq!(hits[1].updated_at.timestamp(), 200);
        assert_eq!(hits[2].updated_at.timestamp(), 100);
    }

    #[test]
    fn test_unranked_relevance_falls_back_to_updated_desc() {
        let mut hits = vec![hit(0.0, 1, None), hit(0.0, 3, None), hit(0.0, 2, None)];
        hits.sort_by(|a, b| compare_hits(a, b, SearchSort::Relevance, SortOrder::Asc, false));
        let order: Vec<i64> = hits.iter().map(|h| h.updated_at.timestamp()).collect();
        assert_eq!(order, vec![3, 2, 1]);
    }

    #[test]
    fn test_missing_priority_sorts_last_both_ways() {
        for order in [SortOrder::Asc, SortOrder::Desc] {
            let mut hits = vec![
                hit(0.0, 1, None),
                hit(0.0, 1, Some(Priority::Low)),
                hit(0.0, 1, Some(Priority::Critical)),
            ];
            hits.sort_by(|a, b| compare_hits(a, b, SearchSort::Priority, order, false));
            assert!(hits[2].priority.is_none());
        }
    }

    #[test]
    fn test_normalized_expands_and_sorts_kinds() {
        let query = SearchQuery {
            query: "  auth ".into(),
            entity_types: vec![RecordKind::Comment, RecordKind::Epic, RecordKind::Epic],
            ..SearchQuery::default()
        };
        let normalized = query.normalized().unwrap();
        assert_eq!(normalized.query, "auth");
        assert_eq!(normalized.entity_types, vec![RecordKind::Epic, RecordKind::Comment]);

        let all = SearchQuery::default().normalized().unwrap();
        assert_eq!(all.entity_types.len(), 5);

        let bad = SearchQuery {
            entity_types: vec![RecordKind::Relationship],
            ..SearchQuery::default()
        };
        assert!(bad.normalized().is_err());
    }
}
