//! Reference-data administration: requirement and relationship types, status
//! models, statuses and transitions

use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;

use super::workflow::{load_workflow, require_status_kind};
use super::Service;
use crate::core::context::RequestContext;
use crate::core::error::{Error, ErrorCode, Result};
use crate::core::identity::{EntityId, EntityKind, RecordKind};
use crate::core::principal::Permission;
use crate::entities::reference::{
    ModelValidation, NamedType, NewStatus, Status, StatusModel, StatusTransition, StatusUpdate,
    TypeTable, Workflow,
};
use crate::store::sql::{now, Timestamp};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewNamedType {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewStatusModel {
    pub entity_type: EntityKind,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTransition {
    pub from: String,
    pub to: String,
    pub name: Option<String>,
}

fn type_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::validation("type name must not be empty"));
    }
    Ok(name.to_string())
}

fn get_type_in(conn: &Connection, table: TypeTable, name: &str) -> Result<NamedType> {
    conn.query_row(
        &format!(
            "SELECT {} FROM {} WHERE name = ?1",
            NamedType::COLUMNS,
            table.table()
        ),
        params![name.trim()],
        NamedType::from_row,
    )
    .optional()?
    .ok_or_else(|| Error::not_found(table.label(), name.trim()))
}

fn type_name_taken(
    conn: &Connection,
    table: TypeTable,
    name: &str,
    except: Option<EntityId>,
) -> Result<bool> {
    let id: Option<EntityId> = conn
        .query_row(
            &format!("SELECT id FROM {} WHERE name = ?1", table.table()),
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id.is_some_and(|id| Some(id) != except))
}

fn type_usage(conn: &Connection, table: TypeTable, id: EntityId) -> Result<i64> {
    let sql = match table {
        TypeTable::Requirement => {
            "SELECT COUNT(*) FROM requirements WHERE requirement_type_id = ?1"
        }
        TypeTable::Relationship => {
            "SELECT COUNT(*) FROM requirement_relationships WHERE relationship_type_id = ?1"
        }
    };
    Ok(conn.query_row(sql, params![id], |row| row.get(0))?)
}

/// A model by ULID, or by name when that name is unambiguous
fn resolve_model(conn: &Connection, key: &str) -> Result<StatusModel> {
    let key = key.trim();
    if let Ok(id) = EntityId::parse(key) {
        if let Some(model) = conn
            .query_row(
                &format!("SELECT {} FROM status_models WHERE id = ?1", StatusModel::COLUMNS),
                params![id],
                StatusModel::from_row,
            )
            .optional()?
        {
            return Ok(model);
        }
    }
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM status_models WHERE name = ?1",
        StatusModel::COLUMNS
    ))?;
    let mut matches = stmt
        .query_map(params![key], StatusModel::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    match matches.len() {
        0 => Err(Error::not_found("status model", key)),
        1 => Ok(matches.remove(0)),
        _ => Err(Error::validation(format!(
            "status model name '{}' is used by several entity types; use its ID",
            key
        ))),
    }
}

fn get_model_in(conn: &Connection, id: EntityId) -> Result<StatusModel> {
    conn.query_row(
        &format!("SELECT {} FROM status_models WHERE id = ?1", StatusModel::COLUMNS),
        params![id],
        StatusModel::from_row,
    )
    .optional()?
    .ok_or_else(|| Error::not_found("status model", id))
}

fn get_status_in(conn: &Connection, model: &StatusModel, name: &str) -> Result<Status> {
    conn.query_row(
        &format!(
            "SELECT {} FROM statuses WHERE status_model_id = ?1 AND name = ?2",
            Status::COLUMNS
        ),
        params![model.id, name.trim()],
        Status::from_row,
    )
    .optional()?
    .ok_or_else(|| Error::NotFound {
        what: "status",
        key: format!("{} (workflow '{}')", name.trim(), model.name),
    })
}

fn validation_of(workflow: &Workflow) -> ModelValidation {
    let issues: Vec<String> = workflow.graph().validate().iter().map(ToString::to_string).collect();
    ModelValidation {
        valid: issues.is_empty(),
        issues,
    }
}

fn require_model_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::validation("status model name must not be empty"));
    }
    Ok(name.to_string())
}

impl Service {
    // Requirement and relationship types

    pub fn list_types(&self, ctx: &RequestContext, table: TypeTable) -> Result<Vec<NamedType>> {
        ctx.require(Permission::Read)?;
        self.store.read(ctx, "list types", |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM {} ORDER BY name",
                NamedType::COLUMNS,
                table.table()
            ))?;
            let rows = stmt
                .query_map([], NamedType::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn get_type(
        &self,
        ctx: &RequestContext,
        table: TypeTable,
        name: &str,
    ) -> Result<NamedType> {
        ctx.require(Permission::Read)?;
        self.store
            .read(ctx, "get type", |conn| get_type_in(conn, table, name))
    }

    pub fn create_type(
        &self,
        ctx: &RequestContext,
        table: TypeTable,
        input: NewNamedType,
    ) -> Result<NamedType> {
        ctx.require(Permission::ManageReferenceData)?;
        let name = type_name(&input.name)?;
        let created = self.store.write(ctx, "create type", |tx| {
            if type_name_taken(tx, table, &name, None)? {
                return Err(Error::conflict(
                    ErrorCode::Conflict,
                    format!("{} '{}' already exists", table.label(), name),
                ));
            }
            let ts = Timestamp(now());
            tx.execute(
                &format!(
                    "INSERT INTO {} (id, name, description, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
                    table.table()
                ),
                params![EntityId::new(), name, input.description, ts],
            )?;
            get_type_in(tx, table, &name)
        })?;
        tracing::info!(table = table.table(), name = %created.name, "created type");
        Ok(created)
    }

    /// Rename a type or change its description
    pub fn update_type(
        &self,
        ctx: &RequestContext,
        table: TypeTable,
        name: &str,
        update: NewNamedType,
    ) -> Result<NamedType> {
        ctx.require(Permission::ManageReferenceData)?;
        let new_name = type_name(&update.name)?;
        self.store.write(ctx, "update type", |tx| {
            let current = get_type_in(tx, table, name)?;
            if type_name_taken(tx, table, &new_name, Some(current.id))? {
                return Err(Error::conflict(
                    ErrorCode::Conflict,
                    format!("{} '{}' already exists", table.label(), new_name),
                ));
            }
            let description = update.description.clone().or(current.description.clone());
            if new_name == current.name && description == current.description {
                return Ok(current);
            }
            tx.execute(
                &format!(
                    "UPDATE {} SET name = ?1, description = ?2, updated_at = ?3 WHERE id = ?4",
                    table.table()
                ),
                params![new_name, description, Timestamp(now()), current.id],
            )?;
            get_type_in(tx, table, &new_name)
        })
    }

    /// Delete a type nothing references
    pub fn delete_type(
        &self,
        ctx: &RequestContext,
        table: TypeTable,
        name: &str,
    ) -> Result<NamedType> {
        ctx.require(Permission::ManageReferenceData)?;
        let deleted = self.store.write(ctx, "delete type", |tx| {
            let current = get_type_in(tx, table, name)?;
            let usage = type_usage(tx, table, current.id)?;
            if usage > 0 {
                return Err(Error::in_use(format!(
                    "{} '{}' is used by {} record(s)",
                    table.label(),
                    current.name,
                    usage
                )));
            }
            tx.execute(
                &format!("DELETE FROM {} WHERE id = ?1", table.table()),
                params![current.id],
            )?;
            Ok(current)
        })?;
        tracing::info!(table = table.table(), name = %deleted.name, "deleted type");
        Ok(deleted)
    }

    // Status models

    pub fn list_status_models(
        &self,
        ctx: &RequestContext,
        kind: Option<EntityKind>,
    ) -> Result<Vec<StatusModel>> {
        ctx.require(Permission::Read)?;
        self.store.read(ctx, "list status models", |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM status_models WHERE ?1 IS NULL OR entity_type = ?1 \
                 ORDER BY entity_type, is_default DESC, name",
                StatusModel::COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![kind], StatusModel::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// A model with its statuses and transitions
    pub fn get_status_model(&self, ctx: &RequestContext, key: &str) -> Result<Workflow> {
        ctx.require(Permission::Read)?;
        self.store.read(ctx, "get status model", |conn| {
            let model = resolve_model(conn, key)?;
            load_workflow(conn, model)
        })
    }

    /// A new, empty, non-default model
    pub fn create_status_model(
        &self,
        ctx: &RequestContext,
        input: NewStatusModel,
    ) -> Result<StatusModel> {
        ctx.require(Permission::ManageReferenceData)?;
        require_status_kind(input.entity_type)?;
        let name = require_model_name(&input.name)?;
        let model = self.store.write(ctx, "create status model", |tx| {
            let taken: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM status_models WHERE entity_type = ?1 AND name = ?2)",
                params![input.entity_type, name],
                |row| row.get(0),
            )?;
            if taken {
                return Err(Error::conflict(
                    ErrorCode::Conflict,
                    format!(
                        "{} already has a status model named '{}'",
                        input.entity_type.label(),
                        name
                    ),
                ));
            }
            let id = EntityId::new();
            let ts = Timestamp(now());
            tx.execute(
                "INSERT INTO status_models (id, entity_type, name, description, is_default, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)",
                params![id, input.entity_type, name, input.description, ts],
            )?;
            get_model_in(tx, id)
        })?;
        tracing::info!(kind = %model.entity_type, name = %model.name, "created status model");
        Ok(model)
    }

    pub fn update_status_model(
        &self,
        ctx: &RequestContext,
        key: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<StatusModel> {
        ctx.require(Permission::ManageReferenceData)?;
        let name = name.map(require_model_name).transpose()?;
        self.store.write(ctx, "update status model", |tx| {
            let model = resolve_model(tx, key)?;
            let new_name = name.clone().unwrap_or_else(|| model.name.clone());
            let new_description = description
                .map(str::to_string)
                .or_else(|| model.description.clone());
            if new_name == model.name && new_description == model.description {
                return Ok(model);
            }
            tx.execute(
                "UPDATE status_models SET name = ?1, description = ?2, updated_at = ?3 WHERE id = ?4",
                params![new_name, new_description, Timestamp(now()), model.id],
            )?;
            get_model_in(tx, model.id)
        })
    }

    /// Delete a non-default model with its statuses and transitions
    pub fn delete_status_model(&self, ctx: &RequestContext, key: &str) -> Result<StatusModel> {
        ctx.require(Permission::ManageReferenceData)?;
        let model = self.store.write(ctx, "delete status model", |tx| {
            let model = resolve_model(tx, key)?;
            if model.is_default {
                return Err(Error::in_use(format!(
                    "status model '{}' is the default for {}",
                    model.name,
                    model.entity_type.label()
                )));
            }
            tx.execute("DELETE FROM status_models WHERE id = ?1", params![model.id])?;
            Ok(model)
        })?;
        tracing::info!(name = %model.name, "deleted status model");
        Ok(model)
    }

    /// Structural check: at least one initial status, everything reachable
    pub fn validate_status_model(
        &self,
        ctx: &RequestContext,
        key: &str,
    ) -> Result<ModelValidation> {
        ctx.require(Permission::Read)?;
        self.store.read(ctx, "validate status model", |conn| {
            let model = resolve_model(conn, key)?;
            Ok(validation_of(&load_workflow(conn, model)?))
        })
    }

    /// Make a valid model the default for its entity type.
    ///
    /// Entities whose status the new model lacks keep it, but cannot change
    /// status until reconciled.
    pub fn set_default_status_model(&self, ctx: &RequestContext, key: &str) -> Result<StatusModel> {
        ctx.require(Permission::ManageReferenceData)?;
        let (model, stranded) = self.store.write(ctx, "set default status model", |tx| {
            let model = resolve_model(tx, key)?;
            let workflow = load_workflow(tx, model.clone())?;
            let validation = validation_of(&workflow);
            if !validation.valid {
                return Err(Error::validation(format!(
                    "status model '{}' is not valid: {}",
                    model.name,
                    validation.issues.join("; ")
                )));
            }
            if model.is_default {
                return Ok((model, 0));
            }
            let ts = Timestamp(now());
            tx.execute(
                "UPDATE status_models SET is_default = 0, updated_at = ?1 WHERE entity_type = ?2 AND is_default = 1",
                params![ts, model.entity_type],
            )?;
            tx.execute(
                "UPDATE status_models SET is_default = 1, updated_at = ?1 WHERE id = ?2",
                params![ts, model.id],
            )?;
            let stranded: i64 = tx.query_row(
                &format!(
                    "SELECT COUNT(*) FROM {} WHERE status NOT IN (SELECT name FROM statuses WHERE status_model_id = ?1)",
                    model.entity_type.table()
                ),
                params![model.id],
                |row| row.get(0),
            )?;
            Ok((get_model_in(tx, model.id)?, stranded))
        })?;
        if stranded > 0 {
            tracing::warn!(
                kind = %model.entity_type,
                model = %model.name,
                stranded,
                "entities need status reconciliation after default model change"
            );
        }
        tracing::info!(
            kind = %model.entity_type,
            model = %model.name,
            "default status model changed",
        );
        Ok(model)
    }

    // Statuses

    pub fn add_status(
        &self,
        ctx: &RequestContext,
        model: &str,
        input: NewStatus,
    ) -> Result<Status> {
        ctx.require(Permission::ManageReferenceData)?;
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::validation("status name must not be empty"));
        }
        self.store.write(ctx, "add status", |tx| {
            let model = resolve_model(tx, model)?;
            let taken: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM statuses WHERE status_model_id = ?1 AND name = ?2)",
                params![model.id, name],
                |row| row.get(0),
            )?;
            if taken {
                return Err(Error::conflict(
                    ErrorCode::Conflict,
                    format!("workflow '{}' already has status '{}'", model.name, name),
                ));
            }
            let sort_order = match input.sort_order {
                Some(order) => order,
                None => tx.query_row(
                    "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM statuses WHERE status_model_id = ?1",
                    params![model.id],
                    |row| row.get(0),
                )?,
            };
            let ts = Timestamp(now());
            tx.execute(
                "INSERT INTO statuses (id, status_model_id, name, description, color, is_initial, is_final, \
                 sort_order, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                params![
                    EntityId::new(),
                    model.id,
                    name,
                    input.description,
                    input.color,
                    input.is_initial,
                    input.is_final,
                    sort_order,
                    ts
                ],
            )?;
            get_status_in(tx, &model, &name)
        })
    }

    /// Update a status. Renaming one in a default model renames the stored
    /// status of every affected entity in the same transaction.
    pub fn update_status(
        &self,
        ctx: &RequestContext,
        model: &str,
        status: &str,
        update: StatusUpdate,
    ) -> Result<Status> {
        ctx.require(Permission::ManageReferenceData)?;
        let (updated, renamed_kind) = self.store.write(ctx, "update status", |tx| {
            let model = resolve_model(tx, model)?;
            let current = get_status_in(tx, &model, status)?;
            let name = match update.name.as_deref().map(str::trim) {
                Some("") => return Err(Error::validation("status name must not be empty")),
                Some(name) => name.to_string(),
                None => current.name.clone(),
            };
            let renamed = name != current.name;
            if renamed {
                let taken: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM statuses WHERE status_model_id = ?1 AND name = ?2)",
                    params![model.id, name],
                    |row| row.get(0),
                )?;
                if taken {
                    return Err(Error::conflict(
                        ErrorCode::Conflict,
                        format!("workflow '{}' already has status '{}'", model.name, name),
                    ));
                }
            }

            let ts = Timestamp(now());
            tx.execute(
                "UPDATE statuses SET name = ?1, description = ?2, color = ?3, is_initial = ?4, is_final = ?5, \
                 sort_order = ?6, updated_at = ?7 WHERE id = ?8",
                params![
                    name,
                    update.description.clone().or(current.description.clone()),
                    update.color.clone().or(current.color.clone()),
                    update.is_initial.unwrap_or(current.is_initial),
                    update.is_final.unwrap_or(current.is_final),
                    update.sort_order.unwrap_or(current.sort_order),
                    ts,
                    current.id
                ],
            )?;

            let mut renamed_kind = None;
            if renamed && model.is_default {
                let moved = tx.execute(
                    &format!(
                        "UPDATE {} SET status = ?1, updated_at = ?2 WHERE status = ?3",
                        model.entity_type.table()
                    ),
                    params![name, ts, current.name],
                )?;
                tracing::info!(
                    kind = %model.entity_type,
                    from = %current.name,
                    to = %name,
                    entities = moved,
                    "renamed status on entities"
                );
                renamed_kind = Some(model.entity_type);
            }
            Ok((get_status_in(tx, &model, &name)?, renamed_kind))
        })?;
        if let Some(kind) = renamed_kind {
            self.invalidate(&[RecordKind::from(kind)]);
        }
        Ok(updated)
    }

    /// Delete a status no transition and (under a default model) no entity uses
    pub fn delete_status(&self, ctx: &RequestContext, model: &str, status: &str) -> Result<Status> {
        ctx.require(Permission::ManageReferenceData)?;
        self.store.write(ctx, "delete status", |tx| {
            let model = resolve_model(tx, model)?;
            let current = get_status_in(tx, &model, status)?;
            let transitions: i64 = tx.query_row(
                "SELECT COUNT(*) FROM status_transitions WHERE from_status_id = ?1 OR to_status_id = ?1",
                params![current.id],
                |row| row.get(0),
            )?;
            if transitions > 0 {
                return Err(Error::in_use(format!(
                    "status '{}' is used by {} transition(s)",
                    current.name, transitions
                )));
            }
            if model.is_default {
                let entities: i64 = tx.query_row(
                    &format!(
                        "SELECT COUNT(*) FROM {} WHERE status = ?1",
                        model.entity_type.table()
                    ),
                    params![current.name],
                    |row| row.get(0),
                )?;
                if entities > 0 {
                    return Err(Error::in_use(format!(
                        "status '{}' is held by {} {}",
                        current.name,
                        entities,
                        model.entity_type.label()
                    )));
                }
            }
            tx.execute("DELETE FROM statuses WHERE id = ?1", params![current.id])?;
            Ok(current)
        })
    }

    // Transitions

    pub fn add_transition(
        &self,
        ctx: &RequestContext,
        model: &str,
        input: NewTransition,
    ) -> Result<StatusTransition> {
        ctx.require(Permission::ManageReferenceData)?;
        if input.from.trim() == input.to.trim() {
            return Err(Error::validation(
                "a transition must connect two different statuses",
            ));
        }
        self.store.write(ctx, "add transition", |tx| {
            let model = resolve_model(tx, model)?;
            let from = get_status_in(tx, &model, &input.from)?;
            let to = get_status_in(tx, &model, &input.to)?;
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM status_transitions WHERE from_status_id = ?1 AND to_status_id = ?2)",
                params![from.id, to.id],
                |row| row.get(0),
            )?;
            if exists {
                return Err(Error::conflict(
                    ErrorCode::Conflict,
                    format!("transition {}→{} already exists", from.name, to.name),
                ));
            }
            let id = EntityId::new();
            tx.execute(
                "INSERT INTO status_transitions (id, status_model_id, from_status_id, to_status_id, name, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, model.id, from.id, to.id, input.name, Timestamp(now())],
            )?;
            Ok(tx.query_row(
                &format!("{} WHERE st.id = ?1", StatusTransition::SELECT),
                params![id],
                StatusTransition::from_row,
            )?)
        })
    }

    /// Remove a transition; always permitted
    pub fn delete_transition(
        &self,
        ctx: &RequestContext,
        model: &str,
        from: &str,
        to: &str,
    ) -> Result<StatusTransition> {
        ctx.require(Permission::ManageReferenceData)?;
        self.store.write(ctx, "delete transition", |tx| {
            let model = resolve_model(tx, model)?;
            let transition = tx
                .query_row(
                    &format!(
                        "{} WHERE st.status_model_id = ?1 AND f.name = ?2 AND t.name = ?3",
                        StatusTransition::SELECT
                    ),
                    params![model.id, from.trim(), to.trim()],
                    StatusTransition::from_row,
                )
                .optional()?
                .ok_or_else(|| Error::NotFound {
                    what: "transition",
                    key: format!("{}→{} (workflow '{}')", from.trim(), to.trim(), model.name),
                })?;
            tx.execute("DELETE FROM status_transitions WHERE id = ?1", params![transition.id])?;
            Ok(transition)
        })
    }
}
