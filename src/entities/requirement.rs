//! Requirement entity type

use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::core::entity::{Entity, Priority};
use crate::core::identity::{EntityId, EntityKind, ReferenceId};
use crate::entities::relationship::RequirementRelationships;
use crate::store::sql::Timestamp;

/// A requirement, owned by a user story and optionally linked to one of its criteria
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: EntityId,
    pub reference_id: ReferenceId,
    pub user_story_id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceptance_criteria_id: Option<EntityId>,
    pub requirement_type_id: EntityId,
    /// Type name, joined for display
    pub requirement_type: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub priority: Priority,
    pub status: String,
    pub creator_id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<EntityId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Requirement {
    pub(crate) const SELECT: &'static str = "SELECT r.id, r.reference_id, r.user_story_id, r.acceptance_criteria_id, \
         r.requirement_type_id, t.name AS requirement_type, r.title, r.description, r.priority, r.status, \
         r.creator_id, r.assignee_id, r.created_at, r.updated_at \
         FROM requirements r JOIN requirement_types t ON t.id = r.requirement_type_id";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            reference_id: row.get("reference_id")?,
            user_story_id: row.get("user_story_id")?,
            acceptance_criteria_id: row.get("acceptance_criteria_id")?,
            requirement_type_id: row.get("requirement_type_id")?,
            requirement_type: row.get("requirement_type")?,
            title: row.get("title")?,
            description: row.get("description")?,
            priority: row.get("priority")?,
            status: row.get("status")?,
            creator_id: row.get("creator_id")?,
            assignee_id: row.get("assignee_id")?,
            created_at: row.get::<_, Timestamp>("created_at")?.0,
            updated_at: row.get::<_, Timestamp>("updated_at")?.0,
        })
    }
}

impl Entity for Requirement {
    const KIND: EntityKind = EntityKind::Requirement;

    fn id(&self) -> EntityId {
        self.id
    }

    fn reference_id(&self) -> ReferenceId {
        self.reference_id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn status(&self) -> Option<&str> {
        Some(&self.status)
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewRequirement {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<String>,
    /// Requirement type name (case-insensitive)
    pub requirement_type: String,
    pub assignee_id: Option<EntityId>,
    /// Acceptance criterion of the same story, by ID or reference
    pub acceptance_criteria: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequirementUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub requirement_type: Option<String>,
}

/// Filters specific to requirement listing
#[derive(Debug, Clone, Default)]
pub struct RequirementFilter {
    pub requirement_type: Option<String>,
    pub acceptance_criteria_id: Option<EntityId>,
}

/// A requirement with its incoming and outgoing relationship edges
#[derive(Debug, Clone, Serialize)]
pub struct RequirementDetail {
    #[serde(flatten)]
    pub requirement: Requirement,
    pub relationships: RequirementRelationships,
}
