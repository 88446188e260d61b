//! Typed directed edges between requirements

use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::core::identity::{EntityId, ReferenceId};
use crate::store::sql::Timestamp;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementRelationship {
    pub id: EntityId,
    pub source_requirement_id: EntityId,
    pub source_reference_id: ReferenceId,
    pub target_requirement_id: EntityId,
    pub target_reference_id: ReferenceId,
    pub relationship_type_id: EntityId,
    pub relationship_type: String,
    pub created_by: EntityId,
    pub created_at: DateTime<Utc>,
}

impl RequirementRelationship {
    pub(crate) const SELECT: &'static str = "SELECT rr.id, rr.source_requirement_id, src.reference_id AS source_reference_id, \
         rr.target_requirement_id, tgt.reference_id AS target_reference_id, rr.relationship_type_id, \
         rt.name AS relationship_type, rr.created_by, rr.created_at \
         FROM requirement_relationships rr \
         JOIN requirements src ON src.id = rr.source_requirement_id \
         JOIN requirements tgt ON tgt.id = rr.target_requirement_id \
         JOIN relationship_types rt ON rt.id = rr.relationship_type_id";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            source_requirement_id: row.get("source_requirement_id")?,
            source_reference_id: row.get("source_reference_id")?,
            target_requirement_id: row.get("target_requirement_id")?,
            target_reference_id: row.get("target_reference_id")?,
            relationship_type_id: row.get("relationship_type_id")?,
            relationship_type: row.get("relationship_type")?,
            created_by: row.get("created_by")?,
            created_at: row.get::<_, Timestamp>("created_at")?.0,
        })
    }
}

/// Edges touching one requirement, split by direction
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequirementRelationships {
    /// Edges where the requirement is the source
    pub source_edges: Vec<RequirementRelationship>,
    /// Edges where the requirement is the target
    pub target_edges: Vec<RequirementRelationship>,
}

impl RequirementRelationships {
    pub fn len(&self) -> usize {
        self.source_edges.len() + self.target_edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source_edges.is_empty() && self.target_edges.is_empty()
    }
}

/// One strongly connected group found by a diagnostic scan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub relationship_type: String,
    pub requirements: Vec<ReferenceId>,
}
