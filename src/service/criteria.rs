//! Acceptance criteria operations

use rusqlite::{params, Connection};

use super::items::{self, list_page, order_clause, resolve_id};
use super::Service;
use crate::core::context::RequestContext;
use crate::core::error::Result;
use crate::core::identity::{EntityId, EntityKind, RecordKind};
use crate::core::principal::Permission;
use crate::core::query::{ListQuery, ListResponse};
use crate::entities::acceptance_criteria::{
    AcceptanceCriteria, AcceptanceCriteriaWithRequirements, NewAcceptanceCriteria,
};
use crate::entities::requirement::Requirement;
use crate::store::refid;
use crate::store::sql::{now, Timestamp, WhereClause};

const KIND: EntityKind = EntityKind::AcceptanceCriteria;

pub(super) fn get_criteria_in(conn: &Connection, id: EntityId) -> Result<AcceptanceCriteria> {
    items::fetch(
        conn,
        KIND,
        AcceptanceCriteria::SELECT,
        "a",
        id,
        AcceptanceCriteria::from_row,
    )
}

impl Service {
    /// Add a criterion to the story `story` (ID or `US-NNN`)
    pub fn create_acceptance_criteria(
        &self,
        ctx: &RequestContext,
        story: &str,
        input: NewAcceptanceCriteria,
    ) -> Result<AcceptanceCriteria> {
        let author = ctx.require(Permission::WriteEntities)?.user_id;
        let description = items::required_text("description", &input.description)?;

        let criteria = self.store.write(ctx, "create acceptance criteria", |tx| {
            let story_id = resolve_id(tx, EntityKind::UserStory, story)?;
            let reference = refid::allocate(tx, KIND)?;
            let id = EntityId::new();
            let ts = Timestamp(now());
            tx.execute(
                "INSERT INTO acceptance_criteria (id, reference_number, reference_id, user_story_id, \
                 description, author_id, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![id, reference.number(), reference, story_id, description, author, ts],
            )?;
            get_criteria_in(tx, id)
        })?;

        tracing::info!(
            kind = %KIND,
            reference_id = %criteria.reference_id,
            "created acceptance criteria",
        );
        self.invalidate(&[RecordKind::AcceptanceCriteria]);
        Ok(criteria)
    }

    pub fn get_acceptance_criteria(
        &self,
        ctx: &RequestContext,
        key: &str,
    ) -> Result<AcceptanceCriteria> {
        ctx.require(Permission::Read)?;
        self.store.read(ctx, "get acceptance criteria", |conn| {
            let id = resolve_id(conn, KIND, key)?;
            get_criteria_in(conn, id)
        })
    }

    /// List criteria, optionally only those of one story.
    ///
    /// Status, priority and assignee filters do not apply to criteria and are ignored.
    pub fn list_acceptance_criteria(
        &self,
        ctx: &RequestContext,
        story: Option<&str>,
        query: &ListQuery,
    ) -> Result<ListResponse<AcceptanceCriteria>> {
        ctx.require(Permission::Read)?;
        query.filter.validate()?;
        let order = order_clause(KIND, &query.order, "a")?;
        self.store.read(ctx, "list acceptance criteria", |conn| {
            let mut filter = WhereClause::new();
            if let Some(story) = story {
                let story_id = resolve_id(conn, EntityKind::UserStory, story)?;
                filter.and("a.user_story_id = ?", story_id);
            }
            filter.entity_filter("a", &query.filter, KIND);
            list_page(
                conn,
                AcceptanceCriteria::SELECT,
                &filter,
                &order,
                query.page,
                AcceptanceCriteria::from_row,
            )
        })
    }

    /// Replace the criterion text; inline comments are re-validated against it
    pub fn update_acceptance_criteria(
        &self,
        ctx: &RequestContext,
        key: &str,
        description: &str,
    ) -> Result<AcceptanceCriteria> {
        ctx.require(Permission::WriteEntities)?;
        let description = items::required_text("description", description)?;
        let (criteria, changed) = self.store.write(ctx, "update acceptance criteria", |tx| {
            let id = resolve_id(tx, KIND, key)?;
            let current = get_criteria_in(tx, id)?;
            if current.description == description {
                return Ok((current, false));
            }
            let ts = Timestamp(now());
            super::comments::restale_inline_comments(tx, KIND, id, &description, ts)?;
            tx.execute(
                "UPDATE acceptance_criteria SET description = ?1, updated_at = ?2 WHERE id = ?3",
                params![description, ts, id],
            )?;
            Ok((get_criteria_in(tx, id)?, true))
        })?;
        if changed {
            tracing::info!(reference_id = %criteria.reference_id, "updated acceptance criteria");
            self.invalidate(&[RecordKind::AcceptanceCriteria, RecordKind::Comment]);
        }
        Ok(criteria)
    }

    /// The criterion with the requirements linked to it
    pub fn get_acceptance_criteria_with_requirements(
        &self,
        ctx: &RequestContext,
        key: &str,
    ) -> Result<AcceptanceCriteriaWithRequirements> {
        ctx.require(Permission::Read)?;
        self.store.read(ctx, "get acceptance criteria tree", |conn| {
            let id = resolve_id(conn, KIND, key)?;
            let acceptance_criteria = get_criteria_in(conn, id)?;
            let requirements = items::children(
                conn,
                Requirement::SELECT,
                "r",
                "acceptance_criteria_id",
                id,
                Requirement::from_row,
            )?;
            Ok(AcceptanceCriteriaWithRequirements {
                acceptance_criteria,
                requirements,
            })
        })
    }
}
