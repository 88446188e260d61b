//! Acceptance criteria entity type

use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::core::entity::Entity;
use crate::core::identity::{EntityId, EntityKind, ReferenceId};
use crate::entities::requirement::Requirement;
use crate::store::sql::Timestamp;

/// EARS-style acceptance criterion, owned by a user story. Has no workflow status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptanceCriteria {
    pub id: EntityId,
    pub reference_id: ReferenceId,
    pub user_story_id: EntityId,
    pub description: String,
    pub author_id: EntityId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AcceptanceCriteria {
    pub(crate) const SELECT: &'static str = "SELECT a.id, a.reference_id, a.user_story_id, a.description, a.author_id, \
         a.created_at, a.updated_at FROM acceptance_criteria a";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            reference_id: row.get("reference_id")?,
            user_story_id: row.get("user_story_id")?,
            description: row.get("description")?,
            author_id: row.get("author_id")?,
            created_at: row.get::<_, Timestamp>("created_at")?.0,
            updated_at: row.get::<_, Timestamp>("updated_at")?.0,
        })
    }
}

impl Entity for AcceptanceCriteria {
    const KIND: EntityKind = EntityKind::AcceptanceCriteria;

    fn id(&self) -> EntityId {
        self.id
    }

    fn reference_id(&self) -> ReferenceId {
        self.reference_id
    }

    fn title(&self) -> &str {
        &self.description
    }

    fn description(&self) -> Option<&str> {
        Some(&self.description)
    }

    fn status(&self) -> Option<&str> {
        None
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAcceptanceCriteria {
    pub description: String,
}

/// Criteria with the requirements linked to them
#[derive(Debug, Clone, Serialize)]
pub struct AcceptanceCriteriaWithRequirements {
    #[serde(flatten)]
    pub acceptance_criteria: AcceptanceCriteria,
    pub requirements: Vec<Requirement>,
}
