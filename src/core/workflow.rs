//! Workflow engine for status transitions
//!
//! Statuses and transitions are data: each status model is loaded from the store
//! and turned into a [`WorkflowGraph`], which answers every transition question
//! without touching the database.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use thiserror::Error;

/// A status as the engine sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusNode {
    pub name: String,
    pub is_initial: bool,
    pub is_final: bool,
    pub sort_order: i64,
}

impl StatusNode {
    pub fn new(name: impl Into<String>, sort_order: i64) -> Self {
        Self {
            name: name.into(),
            is_initial: false,
            is_final: false,
            sort_order,
        }
    }

    pub fn initial(mut self) -> Self {
        self.is_initial = true;
        self
    }

    pub fn terminal(mut self) -> Self {
        self.is_final = true;
        self
    }
}

/// Errors that can occur when checking a status change
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("invalid status transition {from}→{to}")]
    InvalidTransition { from: String, to: String },

    #[error("status '{status}' does not exist in workflow '{model}'")]
    UnknownStatus { status: String, model: String },

    #[error(
        "current status '{status}' is not part of active workflow '{model}'; reconcile it before changing status"
    )]
    Unreconciled { status: String, model: String },
}

/// Result of a successful transition check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionCheck {
    /// `from == to`; nothing to write
    NoOp,
    /// A transition record permits the change
    Allowed,
}

/// Structural problems that make a status model unusable as a default
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum ModelIssue {
    NoStatuses,
    NoInitialStatus,
    Unreachable { status: String },
    DanglingTransition { from: String, to: String },
}

impl std::fmt::Display for ModelIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelIssue::NoStatuses => write!(f, "model has no statuses"),
            ModelIssue::NoInitialStatus => write!(f, "model has no initial status"),
            ModelIssue::Unreachable { status } => {
                write!(f, "status '{}' is unreachable from any initial status", status)
            }
            ModelIssue::DanglingTransition { from, to } => {
                write!(f, "transition {}→{} references an unknown status", from, to)
            }
        }
    }
}

/// In-memory view of one status model
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    model: String,
    statuses: Vec<StatusNode>,
    edges: HashMap<String, Vec<String>>,
    dangling: Vec<(String, String)>,
}

impl WorkflowGraph {
    pub fn new<S, T>(model: impl Into<String>, statuses: S, transitions: T) -> Self
    where
        S: IntoIterator<Item = StatusNode>,
        T: IntoIterator<Item = (String, String)>,
    {
        let mut statuses: Vec<StatusNode> = statuses.into_iter().collect();
        statuses.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then(a.name.cmp(&b.name)));

        let known: HashSet<&str> = statuses.iter().map(|s| s.name.as_str()).collect();
        let mut edges: HashMap<String, Vec<String>> = HashMap::new();
        let mut dangling = Vec::new();
        for (from, to) in transitions {
            if known.contains(from.as_str()) && known.contains(to.as_str()) {
                let targets = edges.entry(from).or_default();
                if !targets.contains(&to) {
                    targets.push(to);
                }
            } else {
                dangling.push((from, to));
            }
        }

        Self {
            model: model.into(),
            statuses,
            edges,
            dangling,
        }
    }

    /// Name of the underlying status model
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Statuses in display order
    pub fn statuses(&self) -> &[StatusNode] {
        &self.statuses
    }

    pub fn contains(&self, status: &str) -> bool {
        self.statuses.iter().any(|s| s.name == status)
    }

    pub fn status(&self, name: &str) -> Option<&StatusNode> {
        self.statuses.iter().find(|s| s.name == name)
    }

    /// The status new entities start in (lowest sort order among initial statuses)
    pub fn initial_status(&self) -> Option<&str> {
        self.statuses
            .iter()
            .find(|s| s.is_initial)
            .map(|s| s.name.as_str())
    }

    /// Check if a status transition is valid
    pub fn is_valid_transition(&self, from: &str, to: &str) -> bool {
        self.check_transition(from, to).is_ok()
    }

    /// Get allowed transitions from the current status, in status order
    pub fn allowed_transitions(&self, current: &str) -> Vec<&str> {
        let Some(targets) = self.edges.get(current) else {
            return Vec::new();
        };
        self.statuses
            .iter()
            .filter(|s| targets.contains(&s.name))
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Decide whether `from → to` may be committed under this model
    pub fn check_transition(&self, from: &str, to: &str) -> Result<TransitionCheck, WorkflowError> {
        // Staying put is allowed even for statuses the model no longer knows
        if from == to {
            return Ok(TransitionCheck::NoOp);
        }
        if !self.contains(from) {
            return Err(WorkflowError::Unreconciled {
                status: from.to_string(),
                model: self.model.clone(),
            });
        }
        if !self.contains(to) {
            return Err(WorkflowError::UnknownStatus {
                status: to.to_string(),
                model: self.model.clone(),
            });
        }
        let allowed = self
            .edges
            .get(from)
            .is_some_and(|targets| targets.iter().any(|t| t == to));
        if allowed {
            Ok(TransitionCheck::Allowed)
        } else {
            Err(WorkflowError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            })
        }
    }

    /// Structural validation: at least one initial status, every status reachable
    /// from some initial status, no transitions to unknown statuses.
    pub fn validate(&self) -> Vec<ModelIssue> {
        let mut issues = Vec::new();
        if self.statuses.is_empty() {
            issues.push(ModelIssue::NoStatuses);
            return issues;
        }

        for (from, to) in &self.dangling {
            issues.push(ModelIssue::DanglingTransition {
                from: from.clone(),
                to: to.clone(),
            });
        }

        let initials: Vec<&str> = self
            .statuses
            .iter()
            .filter(|s| s.is_initial)
            .map(|s| s.name.as_str())
            .collect();
        if initials.is_empty() {
            issues.push(ModelIssue::NoInitialStatus);
            return issues;
        }

        let mut seen: HashSet<&str> = initials.iter().copied().collect();
        let mut queue: VecDeque<&str> = initials.into_iter().collect();
        while let Some(current) = queue.pop_front() {
            if let Some(targets) = self.edges.get(current) {
                for t in targets {
                    if seen.insert(t.as_str()) {
                        queue.push_back(t.as_str());
                    }
                }
            }
        }

        for s in &self.statuses {
            if !seen.contains(s.name.as_str()) {
                issues.push(ModelIssue::Unreachable {
                    status: s.name.clone(),
                });
            }
        }
        issues
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    /// Transition table keyed by source status, for display
    pub fn transition_table(&self) -> BTreeMap<String, Vec<String>> {
        self.statuses
            .iter()
            .map(|s| {
                let targets = self
                    .allowed_transitions(&s.name)
                    .into_iter()
                    .map(String::from)
                    .collect();
                (s.name.clone(), targets)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epic_graph() -> WorkflowGraph {
        WorkflowGraph::new(
            "Epic Default",
            vec![
                StatusNode::new("Backlog", 1).initial(),
                StatusNode::new("InProgress", 2),
                StatusNode::new("Done", 3).terminal(),
            ],
            vec![
                ("Backlog".to_string(), "InProgress".to_string()),
                ("InProgress".to_string(), "Done".to_string()),
            ],
        )
    }

    #[test]
    fn test_forward_transitions_allowed() {
        let g = epic_graph();
        assert_eq!(
            g.check_transition("Backlog", "InProgress"),
            Ok(TransitionCheck::Allowed)
        );
        assert!(g.is_valid_transition("InProgress", "Done"));
    }

    #[test]
    fn test_skipping_a_step_is_rejected_with_both_names() {
        let g = epic_graph();
        let err = g.check_transition("Backlog", "Done").unwrap_err();
        assert_eq!(err.to_string(), "invalid status transition Backlog→Done");
    }

    #[test]
    fn test_same_status_is_noop() {
        let g = epic_graph();
        assert_eq!(
            g.check_transition("InProgress", "InProgress"),
            Ok(TransitionCheck::NoOp)
        );
    }

    #[test]
    fn test_same_status_is_noop_even_when_unreconciled() {
        let g = epic_graph();
        assert_eq!(
            g.check_transition("Legacy", "Legacy"),
            Ok(TransitionCheck::NoOp)
        );
    }

    #[test]
    fn test_unknown_target_and_unreconciled_source() {
        let g = epic_graph();
        assert!(matches!(
            g.check_transition("Backlog", "Shipped"),
            Err(WorkflowError::UnknownStatus { .. })
        ));
        assert!(matches!(
            g.check_transition("Legacy", "Backlog"),
            Err(WorkflowError::Unreconciled { .. })
        ));
    }

    #[test]
    fn test_allowed_transitions_follow_status_order() {
        let g = WorkflowGraph::new(
            "m",
            vec![
                StatusNode::new("A", 1).initial(),
                StatusNode::new("C", 3),
                StatusNode::new("B", 2),
            ],
            vec![
                ("A".to_string(), "C".to_string()),
                ("A".to_string(), "B".to_string()),
            ],
        );
        assert_eq!(g.allowed_transitions("A"), vec!["B", "C"]);
        assert!(g.allowed_transitions("C").is_empty());
    }

    #[test]
    fn test_initial_status() {
        assert_eq!(epic_graph().initial_status(), Some("Backlog"));
    }

    #[test]
    fn test_valid_model_has_no_issues() {
        assert!(epic_graph().is_valid());
    }

    #[test]
    fn test_model_without_initial_status_is_invalid() {
        let g = WorkflowGraph::new(
            "m",
            vec![StatusNode::new("A", 1), StatusNode::new("B", 2)],
            vec![("A".to_string(), "B".to_string())],
        );
        assert_eq!(g.validate(), vec![ModelIssue::NoInitialStatus]);
    }

    #[test]
    fn test_unreachable_status_is_reported() {
        let g = WorkflowGraph::new(
            "m",
            vec![
                StatusNode::new("A", 1).initial(),
                StatusNode::new("B", 2),
                StatusNode::new("Orphan", 3),
            ],
            vec![("A".to_string(), "B".to_string())],
        );
        assert_eq!(
            g.validate(),
            vec![ModelIssue::Unreachable {
                status: "Orphan".to_string()
            }]
        );
    }

    #[test]
    fn test_empty_model_is_invalid() {
        let g = WorkflowGraph::new("m", Vec::new(), Vec::new());
        assert_eq!(g.validate(), vec![ModelIssue::NoStatuses]);
    }

    #[test]
    fn test_dangling_transition_is_reported() {
        let g = WorkflowGraph::new(
            "m",
            vec![StatusNode::new("A", 1).initial()],
            vec![("A".to_string(), "Gone".to_string())],
        );
        assert!(g.validate().contains(&ModelIssue::DanglingTransition {
            from: "A".to_string(),
            to: "Gone".to_string()
        }));
    }
}
