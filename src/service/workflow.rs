//! Status workflow engine: the active model per entity kind, transition checks
//! and reconciliation of entities stranded by a change of default model

use rusqlite::{params, Connection, OptionalExtension};

use super::items::{self, resolve_id};
use super::Service;
use crate::core::context::RequestContext;
use crate::core::error::{Error, ErrorCode, Result};
use crate::core::identity::{EntityId, EntityKind, RecordKind};
use crate::core::principal::Permission;
use crate::core::workflow::{TransitionCheck, WorkflowError};
use crate::entities::reference::{
    Status, StatusModel, StatusTransition, UnreconciledEntity, Workflow,
};
use crate::store::sql::{now, Timestamp};

pub(super) fn require_status_kind(kind: EntityKind) -> Result<()> {
    if !kind.has_status() {
        return Err(Error::validation(format!(
            "{} have no status workflow",
            kind.label()
        )));
    }
    Ok(())
}

/// The default model for `kind`, with its statuses and transitions
pub(super) fn active_workflow(conn: &Connection, kind: EntityKind) -> Result<Workflow> {
    require_status_kind(kind)?;
    let model = conn
        .query_row(
            &format!(
                "SELECT {} FROM status_models WHERE entity_type = ?1 AND is_default = 1",
                StatusModel::COLUMNS
            ),
            params![kind],
            StatusModel::from_row,
        )
        .optional()?
        .ok_or_else(|| {
            Error::conflict(
                ErrorCode::Conflict,
                format!("no default status model configured for {}", kind.label()),
            )
        })?;
    load_workflow(conn, model)
}

pub(super) fn load_workflow(conn: &Connection, model: StatusModel) -> Result<Workflow> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM statuses WHERE status_model_id = ?1 ORDER BY sort_order, name",
        Status::COLUMNS
    ))?;
    let statuses = stmt
        .query_map(params![model.id], Status::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare(&format!(
        "{} WHERE st.status_model_id = ?1 ORDER BY f.sort_order, t.sort_order",
        StatusTransition::SELECT
    ))?;
    let transitions = stmt
        .query_map(params![model.id], StatusTransition::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(Workflow {
        model,
        statuses,
        transitions,
    })
}

/// Status a new entity starts in: the requested one if the model has it,
/// otherwise the model's initial status
pub(super) fn initial_status(
    conn: &Connection,
    kind: EntityKind,
    requested: Option<&str>,
) -> Result<String> {
    let workflow = active_workflow(conn, kind)?;
    let graph = workflow.graph();
    match requested.map(str::trim).filter(|s| !s.is_empty()) {
        Some(status) => {
            if !graph.contains(status) {
                return Err(WorkflowError::UnknownStatus {
                    status: status.to_string(),
                    model: graph.model().to_string(),
                }
                .into());
            }
            Ok(status.to_string())
        }
        None => graph.initial_status().map(str::to_string).ok_or_else(|| {
            Error::conflict(
                ErrorCode::Conflict,
                format!("status model '{}' has no initial status", graph.model()),
            )
        }),
    }
}

fn current_status(conn: &Connection, kind: EntityKind, id: EntityId) -> Result<String> {
    conn.query_row(
        &format!("SELECT status FROM {} WHERE id = ?1", kind.table()),
        params![id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| Error::not_found(kind.label(), id))
}

/// Move an entity to `to` under the active model.
///
/// Returns `false` for the `from == to` no-op, which writes nothing.
pub(super) fn change_status_in(
    conn: &Connection,
    kind: EntityKind,
    id: EntityId,
    to: &str,
    ts: Timestamp,
) -> Result<bool> {
    let to = to.trim();
    let workflow = active_workflow(conn, kind)?;
    let from = current_status(conn, kind, id)?;
    match workflow.graph().check_transition(&from, to)? {
        TransitionCheck::NoOp => Ok(false),
        TransitionCheck::Allowed => {
            conn.execute(
                &format!(
                    "UPDATE {} SET status = ?1, updated_at = ?2 WHERE id = ?3",
                    kind.table()
                ),
                params![to, ts, id],
            )?;
            tracing::info!(kind = %kind, id = %id, from = %from, to = %to, "status changed");
            Ok(true)
        }
    }
}

impl Service {
    /// The default status model for `kind`
    pub fn get_active_workflow(&self, ctx: &RequestContext, kind: EntityKind) -> Result<Workflow> {
        ctx.require(Permission::Read)?;
        self.store
            .read(ctx, "get active workflow", |conn| active_workflow(conn, kind))
    }

    /// Statuses reachable in one step from `current_status`
    pub fn list_allowed_transitions(
        &self,
        ctx: &RequestContext,
        kind: EntityKind,
        current_status: &str,
    ) -> Result<Vec<String>> {
        ctx.require(Permission::Read)?;
        let workflow = self
            .store
            .read(ctx, "list allowed transitions", |conn| active_workflow(conn, kind))?;
        let graph = workflow.graph();
        if !graph.contains(current_status) {
            return Err(WorkflowError::UnknownStatus {
                status: current_status.to_string(),
                model: graph.model().to_string(),
            }
            .into());
        }
        Ok(graph
            .allowed_transitions(current_status)
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    /// Check `from → to` against the active model without touching any entity
    pub fn validate_transition(
        &self,
        ctx: &RequestContext,
        kind: EntityKind,
        from: &str,
        to: &str,
    ) -> Result<TransitionCheck> {
        ctx.require(Permission::Read)?;
        let workflow = self
            .store
            .read(ctx, "validate transition", |conn| active_workflow(conn, kind))?;
        Ok(workflow.graph().check_transition(from, to)?)
    }

    /// An entity's current status and where it may go next
    pub fn entity_transitions(
        &self,
        ctx: &RequestContext,
        kind: EntityKind,
        key: &str,
    ) -> Result<(String, Vec<String>)> {
        ctx.require(Permission::Read)?;
        self.store.read(ctx, "entity transitions", |conn| {
            let id = resolve_id(conn, kind, key)?;
            let status = current_status(conn, kind, id)?;
            let workflow = active_workflow(conn, kind)?;
            let allowed = workflow
                .graph()
                .allowed_transitions(&status)
                .into_iter()
                .map(str::to_string)
                .collect();
            Ok((status, allowed))
        })
    }

    /// Entities of `kind` whose status is missing from the active model
    pub fn list_unreconciled(
        &self,
        ctx: &RequestContext,
        kind: EntityKind,
    ) -> Result<Vec<UnreconciledEntity>> {
        ctx.require(Permission::Read)?;
        self.store.read(ctx, "list unreconciled", |conn| {
            let workflow = active_workflow(conn, kind)?;
            let sql = format!(
                "SELECT x.id, x.reference_id, x.title, x.status FROM {} x \
                 WHERE x.status NOT IN (SELECT name FROM statuses WHERE status_model_id = ?1) \
                 ORDER BY x.reference_number",
                kind.table()
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![workflow.model.id], |row| {
                    Ok(UnreconciledEntity {
                        entity_type: kind,
                        id: row.get(0)?,
                        reference_id: row.get(1)?,
                        title: row.get(2)?,
                        status: row.get(3)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Force an entity onto a status of the active model, bypassing the
    /// transition table. Administrators only.
    pub fn reconcile_status(
        &self,
        ctx: &RequestContext,
        kind: EntityKind,
        key: &str,
        status: &str,
    ) -> Result<String> {
        ctx.require(Permission::ReconcileStatus)?;
        let status = status.trim().to_string();
        let reference = self.store.write(ctx, "reconcile status", |tx| {
            let id = resolve_id(tx, kind, key)?;
            let workflow = active_workflow(tx, kind)?;
            if workflow.status(&status).is_none() {
                return Err(WorkflowError::UnknownStatus {
                    status: status.clone(),
                    model: workflow.model.name.clone(),
                }
                .into());
            }
            tx.execute(
                &format!(
                    "UPDATE {} SET status = ?1, updated_at = ?2 WHERE id = ?3",
                    kind.table()
                ),
                params![status, Timestamp(now()), id],
            )?;
            let (reference, _) = items::summary(tx, kind, id)?;
            Ok(reference.to_string())
        })?;
        tracing::info!(
            kind = %kind,
            reference_id = %reference,
            status = %status,
            "status reconciled",
        );
        self.invalidate(&[RecordKind::from(kind)]);
        Ok(reference)
    }
}
