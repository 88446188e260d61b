//! User story entity type

use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::core::entity::{Entity, Priority};
use crate::core::identity::{EntityId, EntityKind, ReferenceId};
use crate::entities::acceptance_criteria::AcceptanceCriteria;
use crate::entities::requirement::Requirement;
use crate::store::sql::Timestamp;

/// A user story, exclusively owned by one epic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStory {
    pub id: EntityId,
    pub reference_id: ReferenceId,
    pub epic_id: EntityId,
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

impl UserStory {
    pub(crate) const SELECT: &'static str = "SELECT s.id, s.reference_id, s.epic_id, s.title, s.description, s.priority, \
         s.status, s.creator_id, s.assignee_id, s.created_at, s.updated_at FROM user_stories s";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            reference_id: row.get("reference_id")?,
            epic_id: row.get("epic_id")?,
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

impl Entity for UserStory {
    const KIND: EntityKind = EntityKind::UserStory;

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
pub struct NewUserStory {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<String>,
    pub assignee_id: Option<EntityId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserStoryUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
}

/// A story with its acceptance criteria and requirements
#[derive(Debug, Clone, Serialize)]
pub struct UserStoryTree {
    #[serde(flatten)]
    pub user_story: UserStory,
    pub acceptance_criteria: Vec<AcceptanceCriteria>,
    pub requirements: Vec<Requirement>,
}
