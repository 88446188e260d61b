//! Deletion impact: dependency and deletion reports

use serde::Serialize;
use std::collections::BTreeMap;

use crate::core::identity::{EntityId, EntityKind, RecordKind};

/// How a node entered the dependency closure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DependencyType {
    #[serde(rename = "child")]
    Child,
    #[serde(rename = "comment")]
    Comment,
    #[serde(rename = "relationship-edge")]
    RelationshipEdge,
}

impl std::fmt::Display for DependencyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencyType::Child => write!(f, "child"),
            DependencyType::Comment => write!(f, "comment"),
            DependencyType::RelationshipEdge => write!(f, "relationship-edge"),
        }
    }
}

/// The entity a report is about
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionTarget {
    pub entity_type: EntityKind,
    pub entity_id: EntityId,
    pub reference_id: String,
    pub title: String,
}

impl std::fmt::Display for DeletionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.entity_type, self.reference_id)
    }
}

/// One record in the closure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyNode {
    pub entity_type: RecordKind,
    pub entity_id: EntityId,
    /// Reference ID for entities; empty for comments and edges
    pub reference_id: String,
    pub title: String,
    pub dependency_type: DependencyType,
    /// The closure node this one was discovered from
    pub via: EntityId,
}

/// A record outside the closure that points into it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockingReference {
    pub entity_type: RecordKind,
    pub entity_id: EntityId,
    pub reference_id: String,
    pub references: EntityId,
    pub reason: String,
}

/// Result of `validate`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DependencyReport {
    pub target: DeletionTarget,
    pub can_delete: bool,
    pub dependencies: Vec<DependencyNode>,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocking: Vec<BlockingReference>,
}

impl DependencyReport {
    pub fn count_of(&self, kind: RecordKind) -> usize {
        self.dependencies
            .iter()
            .filter(|d| d.entity_type == kind)
            .count()
    }

    /// Dependents grouped by kind, target excluded
    pub fn counts(&self) -> BTreeMap<RecordKind, usize> {
        let mut counts = BTreeMap::new();
        for d in &self.dependencies {
            *counts.entry(d.entity_type).or_insert(0) += 1;
        }
        counts
    }

    /// Entity dependents of a kind (children, not comments or edges)
    pub fn ids_of(&self, kind: RecordKind) -> Vec<EntityId> {
        self.dependencies
            .iter()
            .filter(|d| d.entity_type == kind)
            .map(|d| d.entity_id)
            .collect()
    }
}

/// Result of `delete`, executed or dry-run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeletionReport {
    pub target: DeletionTarget,
    pub dry_run: bool,
    pub cascade: bool,
    /// Whether the transaction committed
    pub committed: bool,
    /// Dependents removed (or that would be removed), target excluded
    pub deleted: Vec<DependencyNode>,
    /// Rows removed per kind, target included
    pub counts: BTreeMap<RecordKind, usize>,
    pub warnings: Vec<String>,
    /// Failure context when the transaction rolled back
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl DeletionReport {
    pub fn from_dependencies(report: &DependencyReport, dry_run: bool, cascade: bool) -> Self {
        let mut counts = report.counts();
        *counts.entry(RecordKind::from(report.target.entity_type)).or_insert(0) += 1;
        Self {
            target: report.target.clone(),
            dry_run,
            cascade,
            committed: false,
            deleted: report.dependencies.clone(),
            counts,
            warnings: report.warnings.clone(),
            failure: None,
        }
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(kind: RecordKind, dep: DependencyType) -> DependencyNode {
        DependencyNode {
            entity_type: kind,
            entity_id: EntityId::new(),
            reference_id: String::new(),
            title: String::new(),
            dependency_type: dep,
            via: EntityId::new(),
        }
    }

    #[test]
    fn test_counts_include_target_in_deletion_report() {
        let report = DependencyReport {
            target: DeletionTarget {
                entity_type: EntityKind::Epic,
                entity_id: EntityId::new(),
                reference_id: "EP-001".into(),
                title: "t".into(),
            },
            can_delete: true,
            dependencies: vec![
                node(RecordKind::UserStory, DependencyType::Child),
                node(RecordKind::UserStory, DependencyType::Child),
                node(RecordKind::Comment, DependencyType::Comment),
            ],
            warnings: vec![],
            blocking: vec![],
        };
        assert_eq!(report.count_of(RecordKind::UserStory), 2);
        let deletion = DeletionReport::from_dependencies(&report, true, true);
        assert_eq!(deletion.counts[&RecordKind::Epic], 1);
        assert_eq!(deletion.total(), 4);
    }

    #[test]
    fn test_dependency_type_wire_names() {
        let json = serde_json::to_string(&DependencyType::RelationshipEdge).unwrap();
        assert_eq!(json, "\"relationship-edge\"");
    }
}
