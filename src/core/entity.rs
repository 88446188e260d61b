//! Entity trait - common interface for the four artifact kinds

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::identity::{EntityId, EntityKind, ReferenceId};

/// Common trait for epics, user stories, acceptance criteria and requirements
pub trait Entity: Serialize {
    /// The artifact kind
    const KIND: EntityKind;

    /// Internal identifier
    fn id(&self) -> EntityId;

    /// Human-readable reference ID
    fn reference_id(&self) -> ReferenceId;

    /// Display title (acceptance criteria use their description)
    fn title(&self) -> &str;

    /// Free-text body that inline comments anchor into
    fn description(&self) -> Option<&str>;

    /// Workflow status, if the kind has one
    fn status(&self) -> Option<&str>;

    fn created_at(&self) -> DateTime<Utc>;

    fn updated_at(&self) -> DateTime<Utc>;
}

/// Priority levels, stored as 1 (Critical) through 4 (Low)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum Priority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Numeric level as persisted (1..=4)
    pub fn level(&self) -> i64 {
        match self {
            Priority::Critical => 1,
            Priority::High => 2,
            Priority::Medium => 3,
            Priority::Low => 4,
        }
    }

    pub fn from_level(level: i64) -> Option<Self> {
        match level {
            1 => Some(Priority::Critical),
            2 => Some(Priority::High),
            3 => Some(Priority::Medium),
            4 => Some(Priority::Low),
            _ => None,
        }
    }

    pub fn all() -> &'static [Priority] {
        &[
            Priority::Critical,
            Priority::High,
            Priority::Medium,
            Priority::Low,
        ]
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Critical => write!(f, "critical"),
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" | "1" => Ok(Priority::Critical),
            "high" | "2" => Ok(Priority::High),
            "medium" | "3" => Ok(Priority::Medium),
            "low" | "4" => Ok(Priority::Low),
            _ => Err(format!(
                "Unknown priority: {} (expected critical, high, medium, low or 1-4)",
                s
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_levels() {
        for p in Priority::all() {
            assert_eq!(Priority::from_level(p.level()), Some(*p));
        }
        assert_eq!(Priority::from_level(0), None);
        assert_eq!(Priority::from_level(5), None);
    }

    #[test]
    fn test_priority_parse_accepts_names_and_levels() {
        assert_eq!("High".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!("1".parse::<Priority>().unwrap(), Priority::Critical);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_critical_sorts_first() {
        let mut v = vec![Priority::Low, Priority::Critical, Priority::Medium];
        v.sort();
        assert_eq!(v, vec![Priority::Critical, Priority::Medium, Priority::Low]);
    }
}
