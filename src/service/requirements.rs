//! Requirement operations

use rusqlite::{params, Connection, OptionalExtension};

use super::items::{self, apply_changes, list_page, order_clause, resolve_id, FieldChanges};
use super::relationships::relationships_in;
use super::workflow::{change_status_in, initial_status};
use super::Service;
use crate::core::context::RequestContext;
use crate::core::error::{Error, Result};
use crate::core::identity::{EntityId, EntityKind, RecordKind};
use crate::core::principal::Permission;
use crate::core::query::{ListQuery, ListResponse};
use crate::entities::requirement::{
    NewRequirement, Requirement, RequirementDetail, RequirementFilter, RequirementUpdate,
};
use crate::store::refid;
use crate::store::sql::{now, Timestamp, WhereClause};

const KIND: EntityKind = EntityKind::Requirement;

pub(super) fn get_requirement_in(conn: &Connection, id: EntityId) -> Result<Requirement> {
    items::fetch(conn, KIND, Requirement::SELECT, "r", id, Requirement::from_row)
}

/// Requirement type ID by (case-insensitive) name
fn requirement_type_id(conn: &Connection, name: &str) -> Result<EntityId> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::validation("requirement type must not be empty"));
    }
    conn.query_row(
        "SELECT id FROM requirement_types WHERE name = ?1",
        params![name],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| Error::not_found("requirement type", name))
}

/// Resolve a criterion and check it belongs to `story_id`
fn criteria_of_story(conn: &Connection, key: &str, story_id: EntityId) -> Result<EntityId> {
    let criteria_id = resolve_id(conn, EntityKind::AcceptanceCriteria, key)?;
    let owner: EntityId = conn.query_row(
        "SELECT user_story_id FROM acceptance_criteria WHERE id = ?1",
        params![criteria_id],
        |row| row.get(0),
    )?;
    if owner != story_id {
        return Err(Error::validation(format!(
            "acceptance criteria {} belongs to a different user story",
            key.trim()
        )));
    }
    Ok(criteria_id)
}

impl Service {
    /// Create a requirement under the story `story` (ID or `US-NNN`)
    pub fn create_requirement(
        &self,
        ctx: &RequestContext,
        story: &str,
        input: NewRequirement,
    ) -> Result<Requirement> {
        let creator = ctx.require(Permission::WriteEntities)?.user_id;
        let title = items::required_text("title", &input.title)?;
        let description = items::optional_text(input.description);
        let priority = input.priority.unwrap_or_default();

        let requirement = self.store.write(ctx, "create requirement", |tx| {
            let story_id = resolve_id(tx, EntityKind::UserStory, story)?;
            let type_id = requirement_type_id(tx, &input.requirement_type)?;
            let criteria_id = input
                .acceptance_criteria
                .as_deref()
                .map(|key| criteria_of_story(tx, key, story_id))
                .transpose()?;
            if let Some(assignee) = input.assignee_id {
                items::ensure_user(tx, assignee)?;
            }
            let status = initial_status(tx, KIND, input.status.as_deref())?;
            let reference = refid::allocate(tx, KIND)?;
            let id = EntityId::new();
            let ts = Timestamp(now());
            tx.execute(
                "INSERT INTO requirements (id, reference_number, reference_id, user_story_id, \
                 acceptance_criteria_id, requirement_type_id, title, description, priority, status, \
                 creator_id, assignee_id, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
                params![
                    id,
                    reference.number(),
                    reference,
                    story_id,
                    criteria_id,
                    type_id,
                    title,
                    description,
                    priority,
                    status,
                    creator,
                    input.assignee_id,
                    ts
                ],
            )?;
            get_requirement_in(tx, id)
        })?;

        tracing::info!(
            kind = %KIND,
            reference_id = %requirement.reference_id,
            "created requirement",
        );
        self.invalidate(&[RecordKind::Requirement]);
        Ok(requirement)
    }

    pub fn get_requirement(&self, ctx: &RequestContext, key: &str) -> Result<Requirement> {
        ctx.require(Permission::Read)?;
        self.store.read(ctx, "get requirement", |conn| {
            let id = resolve_id(conn, KIND, key)?;
            get_requirement_in(conn, id)
        })
    }

    /// The requirement with its incoming and outgoing relationships
    pub fn get_requirement_detail(
        &self,
        ctx: &RequestContext,
        key: &str,
    ) -> Result<RequirementDetail> {
        ctx.require(Permission::Read)?;
        self.store.read(ctx, "get requirement detail", |conn| {
            let id = resolve_id(conn, KIND, key)?;
            Ok(RequirementDetail {
                requirement: get_requirement_in(conn, id)?,
                relationships: relationships_in(conn, id)?,
            })
        })
    }

    /// List requirements, optionally of one story, by type or by linked criterion
    pub fn list_requirements(
        &self,
        ctx: &RequestContext,
        story: Option<&str>,
        extra: &RequirementFilter,
        query: &ListQuery,
    ) -> Result<ListResponse<Requirement>> {
        ctx.require(Permission::Read)?;
        query.filter.validate()?;
        let order = order_clause(KIND, &query.order, "r")?;
        self.store.read(ctx, "list requirements", |conn| {
            let mut filter = WhereClause::new();
            if let Some(story) = story {
                let story_id = resolve_id(conn, EntityKind::UserStory, story)?;
                filter.and("r.user_story_id = ?", story_id);
            }
            if let Some(ref name) = extra.requirement_type {
                filter.and("t.name = ? COLLATE NOCASE", name.trim().to_string());
            }
            if let Some(criteria) = extra.acceptance_criteria_id {
                filter.and("r.acceptance_criteria_id = ?", criteria);
            }
            filter.entity_filter("r", &query.filter, KIND);
            list_page(conn, Requirement::SELECT, &filter, &order, query.page, Requirement::from_row)
        })
    }

    pub fn update_requirement(
        &self,
        ctx: &RequestContext,
        key: &str,
        update: RequirementUpdate,
    ) -> Result<Requirement> {
        ctx.require(Permission::WriteEntities)?;
        let changes = FieldChanges::from_update(update.title, update.description, update.priority)?;
        let (requirement, changed) = self.store.write(ctx, "update requirement", |tx| {
            let id = resolve_id(tx, KIND, key)?;
            let ts = Timestamp(now());
            let mut changed = apply_changes(tx, KIND, id, &changes, ts)?;
            if let Some(ref name) = update.requirement_type {
                let type_id = requirement_type_id(tx, name)?;
                changed |= tx.execute(
                    "UPDATE requirements SET requirement_type_id = ?1, updated_at = ?2 \
                     WHERE id = ?3 AND requirement_type_id <> ?1",
                    params![type_id, ts, id],
                )? > 0;
            }
            Ok((get_requirement_in(tx, id)?, changed))
        })?;
        if changed {
            tracing::info!(reference_id = %requirement.reference_id, "updated requirement");
            self.invalidate(&[RecordKind::Requirement, RecordKind::Comment]);
        }
        Ok(requirement)
    }

    pub fn change_requirement_status(
        &self,
        ctx: &RequestContext,
        key: &str,
        status: &str,
    ) -> Result<Requirement> {
        ctx.require(Permission::WriteEntities)?;
        let (requirement, changed) = self.store.write(ctx, "change requirement status", |tx| {
            let id = resolve_id(tx, KIND, key)?;
            let changed = change_status_in(tx, KIND, id, status, Timestamp(now()))?;
            Ok((get_requirement_in(tx, id)?, changed))
        })?;
        if changed {
            self.invalidate(&[RecordKind::Requirement]);
        }
        Ok(requirement)
    }

    pub fn assign_requirement(
        &self,
        ctx: &RequestContext,
        key: &str,
        assignee: Option<EntityId>,
    ) -> Result<Requirement> {
        ctx.require(Permission::WriteEntities)?;
        let (requirement, changed) = self.store.write(ctx, "assign requirement", |tx| {
            let id = resolve_id(tx, KIND, key)?;
            let changed = items::set_assignee(tx, KIND, id, assignee, Timestamp(now()))?;
            Ok((get_requirement_in(tx, id)?, changed))
        })?;
        if changed {
            self.invalidate(&[RecordKind::Requirement]);
        }
        Ok(requirement)
    }

    /// Link the requirement to a criterion of its own story, or unlink with `None`
    pub fn link_acceptance_criteria(
        &self,
        ctx: &RequestContext,
        key: &str,
        criteria: Option<&str>,
    ) -> Result<Requirement> {
        ctx.require(Permission::WriteEntities)?;
        self.store.write(ctx, "link acceptance criteria", |tx| {
            let id = resolve_id(tx, KIND, key)?;
            let current = get_requirement_in(tx, id)?;
            let criteria_id = criteria
                .map(|c| criteria_of_story(tx, c, current.user_story_id))
                .transpose()?;
            if criteria_id == current.acceptance_criteria_id {
                return Ok(current);
            }
            tx.execute(
                "UPDATE requirements SET acceptance_criteria_id = ?1, updated_at = ?2 WHERE id = ?3",
                params![criteria_id, Timestamp(now()), id],
            )?;
            get_requirement_in(tx, id)
        })
    }
}
