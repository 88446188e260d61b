//! Epic entity type

use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::core::entity::{Entity, Priority};
use crate::core::identity::{EntityId, EntityKind, ReferenceId};
use crate::entities::user_story::UserStoryTree;
use crate::store::sql::Timestamp;

/// Top of the planning hierarchy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Epic {
    pub id: EntityId,
    pub reference_id: ReferenceId,
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

impl Epic {
    pub(crate) const SELECT: &'static str = "SELECT e.id, e.reference_id, e.title, e.description, e.priority, e.status, \
         e.creator_id, e.assignee_id, e.created_at, e.updated_at FROM epics e";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            reference_id: row.get("reference_id")?,
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

impl Entity for Epic {
    const KIND: EntityKind = EntityKind::Epic;

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

/// Input for creating an epic
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewEpic {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    /// Initial status; defaults to the workflow's initial status
    pub status: Option<String>,
    pub assignee_id: Option<EntityId>,
}

/// Partial update; `None` leaves a field unchanged, an empty description clears it
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EpicUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
}

/// An epic with its stories, their criteria and requirements
#[derive(Debug, Clone, Serialize)]
pub struct EpicTree {
    #[serde(flatten)]
    pub epic: Epic,
    pub user_stories: Vec<UserStoryTree>,
}
