//! Epic operations

use rusqlite::{params, Connection};

use super::items::{self, apply_changes, list_page, order_clause, resolve_id, FieldChanges};
use super::workflow::{change_status_in, initial_status};
use super::Service;
use crate::core::context::RequestContext;
use crate::core::error::Result;
use crate::core::identity::{EntityId, EntityKind, RecordKind};
use crate::core::principal::Permission;
use crate::core::query::{ListQuery, ListResponse};
use crate::entities::epic::{Epic, EpicTree, EpicUpdate, NewEpic};
use crate::entities::user_story::{UserStory, UserStoryTree};
use crate::store::refid;
use crate::store::sql::{now, Timestamp, WhereClause};

const KIND: EntityKind = EntityKind::Epic;

pub(super) fn get_epic_in(conn: &Connection, id: EntityId) -> Result<Epic> {
    items::fetch(conn, KIND, Epic::SELECT, "e", id, Epic::from_row)
}

impl Service {
    pub fn create_epic(&self, ctx: &RequestContext, input: NewEpic) -> Result<Epic> {
        let creator = ctx.require(Permission::WriteEntities)?.user_id;
        let title = items::required_text("title", &input.title)?;
        let description = items::optional_text(input.description);
        let priority = input.priority.unwrap_or_default();

        let epic = self.store.write(ctx, "create epic", |tx| {
            if let Some(assignee) = input.assignee_id {
                items::ensure_user(tx, assignee)?;
            }
            let status = initial_status(tx, KIND, input.status.as_deref())?;
            let reference = refid::allocate(tx, KIND)?;
            let id = EntityId::new();
            let ts = Timestamp(now());
            tx.execute(
                "INSERT INTO epics (id, reference_number, reference_id, title, description, priority, \
                 status, creator_id, assignee_id, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
                params![
                    id,
                    reference.number(),
                    reference,
                    title,
                    description,
                    priority,
                    status,
                    creator,
                    input.assignee_id,
                    ts
                ],
            )?;
            get_epic_in(tx, id)
        })?;

        tracing::info!(kind = %KIND, reference_id = %epic.reference_id, "created epic");
        self.invalidate(&[RecordKind::Epic]);
        Ok(epic)
    }

    /// Fetch by internal ID or `EP-NNN`
    pub fn get_epic(&self, ctx: &RequestContext, key: &str) -> Result<Epic> {
        ctx.require(Permission::Read)?;
        self.store.read(ctx, "get epic", |conn| {
            let id = resolve_id(conn, KIND, key)?;
            get_epic_in(conn, id)
        })
    }

    pub fn list_epics(
        &self,
        ctx: &RequestContext,
        query: &ListQuery,
    ) -> Result<ListResponse<Epic>> {
        ctx.require(Permission::Read)?;
        query.filter.validate()?;
        let mut filter = WhereClause::new();
        filter.entity_filter("e", &query.filter, KIND);
        let order = order_clause(KIND, &query.order, "e")?;
        self.store.read(ctx, "list epics", |conn| {
            list_page(conn, Epic::SELECT, &filter, &order, query.page, Epic::from_row)
        })
    }

    pub fn update_epic(&self, ctx: &RequestContext, key: &str, update: EpicUpdate) -> Result<Epic> {
        ctx.require(Permission::WriteEntities)?;
        let changes = FieldChanges::from_update(update.title, update.description, update.priority)?;
        let (epic, changed) = self.store.write(ctx, "update epic", |tx| {
            let id = resolve_id(tx, KIND, key)?;
            let changed = apply_changes(tx, KIND, id, &changes, Timestamp(now()))?;
            Ok((get_epic_in(tx, id)?, changed))
        })?;
        if changed {
            tracing::info!(reference_id = %epic.reference_id, "updated epic");
            self.invalidate(&[RecordKind::Epic, RecordKind::Comment]);
        }
        Ok(epic)
    }

    /// Move an epic along its workflow; the same status again is a no-write
    pub fn change_epic_status(
        &self,
        ctx: &RequestContext,
        key: &str,
        status: &str,
    ) -> Result<Epic> {
        ctx.require(Permission::WriteEntities)?;
        let (epic, changed) = self.store.write(ctx, "change epic status", |tx| {
            let id = resolve_id(tx, KIND, key)?;
            let changed = change_status_in(tx, KIND, id, status, Timestamp(now()))?;
            Ok((get_epic_in(tx, id)?, changed))
        })?;
        if changed {
            self.invalidate(&[RecordKind::Epic]);
        }
        Ok(epic)
    }

    /// Set (or with `None`, clear) the assignee
    pub fn assign_epic(
        &self,
        ctx: &RequestContext,
        key: &str,
        assignee: Option<EntityId>,
    ) -> Result<Epic> {
        ctx.require(Permission::WriteEntities)?;
        let (epic, changed) = self.store.write(ctx, "assign epic", |tx| {
            let id = resolve_id(tx, KIND, key)?;
            let changed = items::set_assignee(tx, KIND, id, assignee, Timestamp(now()))?;
            Ok((get_epic_in(tx, id)?, changed))
        })?;
        if changed {
            self.invalidate(&[RecordKind::Epic]);
        }
        Ok(epic)
    }

    /// The epic with every story, criterion and requirement beneath it
    pub fn get_epic_with_children(&self, ctx: &RequestContext, key: &str) -> Result<EpicTree> {
        ctx.require(Permission::Read)?;
        self.store.read(ctx, "get epic tree", |conn| {
            let id = resolve_id(conn, KIND, key)?;
            let epic = get_epic_in(conn, id)?;
            let stories = items::children(
                conn,
                UserStory::SELECT,
                "s",
                "epic_id",
                id,
                UserStory::from_row,
            )?;
            let user_stories = stories
                .into_iter()
                .map(|story| super::stories::story_tree_in(conn, story))
                .collect::<Result<Vec<UserStoryTree>>>()?;
            Ok(EpicTree { epic, user_stories })
        })
    }
}
