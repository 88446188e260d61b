//! User story operations

use rusqlite::{params, Connection};

use super::items::{self, apply_changes, list_page, order_clause, resolve_id, FieldChanges};
use super::workflow::{change_status_in, initial_status};
use super::Service;
use crate::core::context::RequestContext;
use crate::core::error::Result;
use crate::core::identity::{EntityId, EntityKind, RecordKind};
use crate::core::principal::Permission;
use crate::core::query::{ListQuery, ListResponse};
use crate::entities::acceptance_criteria::AcceptanceCriteria;
use crate::entities::requirement::Requirement;
use crate::entities::user_story::{NewUserStory, UserStory, UserStoryTree, UserStoryUpdate};
use crate::store::refid;
use crate::store::sql::{now, Timestamp, WhereClause};

const KIND: EntityKind = EntityKind::UserStory;

pub(super) fn get_story_in(conn: &Connection, id: EntityId) -> Result<UserStory> {
    items::fetch(conn, KIND, UserStory::SELECT, "s", id, UserStory::from_row)
}

pub(super) fn story_tree_in(conn: &Connection, user_story: UserStory) -> Result<UserStoryTree> {
    let acceptance_criteria = items::children(
        conn,
        AcceptanceCriteria::SELECT,
        "a",
        "user_story_id",
        user_story.id,
        AcceptanceCriteria::from_row,
    )?;
    let requirements = items::children(
        conn,
        Requirement::SELECT,
        "r",
        "user_story_id",
        user_story.id,
        Requirement::from_row,
    )?;
    Ok(UserStoryTree {
        user_story,
        acceptance_criteria,
        requirements,
    })
}

impl Service {
    /// Create a story under the epic `epic` (ID or `EP-NNN`)
    pub fn create_user_story(
        &self,
        ctx: &RequestContext,
        epic: &str,
        input: NewUserStory,
    ) -> Result<UserStory> {
        let creator = ctx.require(Permission::WriteEntities)?.user_id;
        let title = items::required_text("title", &input.title)?;
        let description = items::optional_text(input.description);
        let priority = input.priority.unwrap_or_default();

        let story = self.store.write(ctx, "create user story", |tx| {
            let epic_id = resolve_id(tx, EntityKind::Epic, epic)?;
            if let Some(assignee) = input.assignee_id {
                items::ensure_user(tx, assignee)?;
            }
            let status = initial_status(tx, KIND, input.status.as_deref())?;
            let reference = refid::allocate(tx, KIND)?;
            let id = EntityId::new();
            let ts = Timestamp(now());
            tx.execute(
                "INSERT INTO user_stories (id, reference_number, reference_id, epic_id, title, description, \
                 priority, status, creator_id, assignee_id, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
                params![
                    id,
                    reference.number(),
                    reference,
                    epic_id,
                    title,
                    description,
                    priority,
                    status,
                    creator,
                    input.assignee_id,
                    ts
                ],
            )?;
            get_story_in(tx, id)
        })?;

        tracing::info!(kind = %KIND, reference_id = %story.reference_id, "created user story");
        self.invalidate(&[RecordKind::UserStory]);
        Ok(story)
    }

    pub fn get_user_story(&self, ctx: &RequestContext, key: &str) -> Result<UserStory> {
        ctx.require(Permission::Read)?;
        self.store.read(ctx, "get user story", |conn| {
            let id = resolve_id(conn, KIND, key)?;
            get_story_in(conn, id)
        })
    }

    /// List stories, optionally only those of one epic
    pub fn list_user_stories(
        &self,
        ctx: &RequestContext,
        epic: Option<&str>,
        query: &ListQuery,
    ) -> Result<ListResponse<UserStory>> {
        ctx.require(Permission::Read)?;
        query.filter.validate()?;
        let order = order_clause(KIND, &query.order, "s")?;
        self.store.read(ctx, "list user stories", |conn| {
            let mut filter = WhereClause::new();
            if let Some(epic) = epic {
                let epic_id = resolve_id(conn, EntityKind::Epic, epic)?;
                filter.and("s.epic_id = ?", epic_id);
            }
            filter.entity_filter("s", &query.filter, KIND);
            list_page(conn, UserStory::SELECT, &filter, &order, query.page, UserStory::from_row)
        })
    }

    pub fn update_user_story(
        &self,
        ctx: &RequestContext,
        key: &str,
        update: UserStoryUpdate,
    ) -> Result<UserStory> {
        ctx.require(Permission::WriteEntities)?;
        let changes = FieldChanges::from_update(update.title, update.description, update.priority)?;
        let (story, changed) = self.store.write(ctx, "update user story", |tx| {
            let id = resolve_id(tx, KIND, key)?;
            let changed = apply_changes(tx, KIND, id, &changes, Timestamp(now()))?;
            Ok((get_story_in(tx, id)?, changed))
        })?;
        if changed {
            tracing::info!(reference_id = %story.reference_id, "updated user story");
            self.invalidate(&[RecordKind::UserStory, RecordKind::Comment]);
        }
        Ok(story)
    }

    pub fn change_user_story_status(
        &self,
        ctx: &RequestContext,
        key: &str,
        status: &str,
    ) -> Result<UserStory> {
        ctx.require(Permission::WriteEntities)?;
        let (story, changed) = self.store.write(ctx, "change user story status", |tx| {
            let id = resolve_id(tx, KIND, key)?;
            let changed = change_status_in(tx, KIND, id, status, Timestamp(now()))?;
            Ok((get_story_in(tx, id)?, changed))
        })?;
        if changed {
            self.invalidate(&[RecordKind::UserStory]);
        }
        Ok(story)
    }

    pub fn assign_user_story(
        &self,
        ctx: &RequestContext,
        key: &str,
        assignee: Option<EntityId>,
    ) -> Result<UserStory> {
        ctx.require(Permission::WriteEntities)?;
        let (story, changed) = self.store.write(ctx, "assign user story", |tx| {
            let id = resolve_id(tx, KIND, key)?;
            let changed = items::set_assignee(tx, KIND, id, assignee, Timestamp(now()))?;
            Ok((get_story_in(tx, id)?, changed))
        })?;
        if changed {
            self.invalidate(&[RecordKind::UserStory]);
        }
        Ok(story)
    }

    /// The story with its acceptance criteria and requirements
    pub fn get_user_story_with_children(
        &self,
        ctx: &RequestContext,
        key: &str,
    ) -> Result<UserStoryTree> {
        ctx.require(Permission::Read)?;
        self.store.read(ctx, "get user story tree", |conn| {
            let id = resolve_id(conn, KIND, key)?;
            let story = get_story_in(conn, id)?;
            story_tree_in(conn, story)
        })
    }
}
