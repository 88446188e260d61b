//! Reference data: requirement types, relationship types and status workflows

use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::core::identity::{EntityId, EntityKind};
use crate::core::workflow::{StatusNode, WorkflowGraph};
use crate::store::sql::Timestamp;

/// A named type (requirement types and relationship types share this shape)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedType {
    pub id: EntityId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub type RequirementType = NamedType;
pub type RelationshipType = NamedType;

impl NamedType {
    pub(crate) const COLUMNS: &'static str = "id, name, description, created_at, updated_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            created_at: row.get::<_, Timestamp>("created_at")?.0,
            updated_at: row.get::<_, Timestamp>("updated_at")?.0,
        })
    }
}

/// Which reference table a [`NamedType`] lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTable {
    Requirement,
    Relationship,
}

impl TypeTable {
    pub fn table(&self) -> &'static str {
        match self {
            TypeTable::Requirement => "requirement_types",
            TypeTable::Relationship => "relationship_types",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TypeTable::Requirement => "requirement type",
            TypeTable::Relationship => "relationship type",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusModel {
    pub id: EntityId,
    pub entity_type: EntityKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StatusModel {
    pub(crate) const COLUMNS: &'static str =
        "id, entity_type, name, description, is_default, created_at, updated_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            entity_type: row.get("entity_type")?,
            name: row.get("name")?,
            description: row.get("description")?,
            is_default: row.get("is_default")?,
            created_at: row.get::<_, Timestamp>("created_at")?.0,
            updated_at: row.get::<_, Timestamp>("updated_at")?.0,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub id: EntityId,
    pub status_model_id: EntityId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub is_initial: bool,
    pub is_final: bool,
    pub sort_order: i64,
}

impl Status {
    pub(crate) const COLUMNS: &'static str =
        "id, status_model_id, name, description, color, is_initial, is_final, sort_order";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            status_model_id: row.get("status_model_id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            color: row.get("color")?,
            is_initial: row.get("is_initial")?,
            is_final: row.get("is_final")?,
            sort_order: row.get("sort_order")?,
        })
    }

    pub fn node(&self) -> StatusNode {
        StatusNode {
            name: self.name.clone(),
            is_initial: self.is_initial,
            is_final: self.is_final,
            sort_order: self.sort_order,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub id: EntityId,
    pub status_model_id: EntityId,
    pub from_status_id: EntityId,
    pub from_status: String,
    pub to_status_id: EntityId,
    pub to_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl StatusTransition {
    pub(crate) const SELECT: &'static str = "SELECT st.id, st.status_model_id, st.from_status_id, f.name AS from_status, \
         st.to_status_id, t.name AS to_status, st.name \
         FROM status_transitions st \
         JOIN statuses f ON f.id = st.from_status_id \
         JOIN statuses t ON t.id = st.to_status_id";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            status_model_id: row.get("status_model_id")?,
            from_status_id: row.get("from_status_id")?,
            from_status: row.get("from_status")?,
            to_status_id: row.get("to_status_id")?,
            to_status: row.get("to_status")?,
            name: row.get("name")?,
        })
    }
}

/// A status model with its statuses and transitions
#[derive(Debug, Clone, Serialize)]
pub struct Workflow {
    pub model: StatusModel,
    pub statuses: Vec<Status>,
    pub transitions: Vec<StatusTransition>,
}

impl Workflow {
    pub fn graph(&self) -> WorkflowGraph {
        WorkflowGraph::new(
            self.model.name.clone(),
            self.statuses.iter().map(Status::node),
            self.transitions
                .iter()
                .map(|t| (t.from_status.clone(), t.to_status.clone())),
        )
    }

    pub fn status(&self, name: &str) -> Option<&Status> {
        self.statuses.iter().find(|s| s.name == name)
    }
}

/// Outcome of structural validation of a model
#[derive(Debug, Clone, Serialize)]
pub struct ModelValidation {
    pub valid: bool,
    pub issues: Vec<String>,
}

/// Input for a new status
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewStatus {
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub is_initial: bool,
    pub is_final: bool,
    pub sort_order: Option<i64>,
}

/// Partial status update; renaming cascades to entities under a default model
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub is_initial: Option<bool>,
    pub is_final: Option<bool>,
    pub sort_order: Option<i64>,
}

/// An entity whose stored status is absent from its active workflow
#[derive(Debug, Clone, Serialize)]
pub struct UnreconciledEntity {
    pub entity_type: EntityKind,
    pub id: EntityId,
    pub reference_id: String,
    pub title: String,
    pub status: String,
}
