//! Entity identity: internal ULIDs and human-readable reference IDs
//!
//! Every planning artifact carries two identifiers:
//! - an opaque internal [`EntityId`] (a ULID, globally unique)
//! - a [`ReferenceId`] such as `EP-001`, allocated per kind and never reused
//!
//! Lookups accept either form through [`EntityKey`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use ulid::Ulid;

/// The four hierarchical artifact kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Epic (top of the hierarchy)
    Epic,
    /// User story, owned by an epic
    UserStory,
    /// Acceptance criteria, owned by a user story
    AcceptanceCriteria,
    /// Requirement, owned by a user story
    Requirement,
}

impl EntityKind {
    /// Reference-ID tag (e.g. `EP` in `EP-001`)
    pub fn tag(&self) -> &'static str {
        match self {
            EntityKind::Epic => "EP",
            EntityKind::UserStory => "US",
            EntityKind::AcceptanceCriteria => "AC",
            EntityKind::Requirement => "REQ",
        }
    }

    /// Stable machine name, used in the comment target column and cache tags
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Epic => "epic",
            EntityKind::UserStory => "user_story",
            EntityKind::AcceptanceCriteria => "acceptance_criteria",
            EntityKind::Requirement => "requirement",
        }
    }

    /// Backing table
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Epic => "epics",
            EntityKind::UserStory => "user_stories",
            EntityKind::AcceptanceCriteria => "acceptance_criteria",
            EntityKind::Requirement => "requirements",
        }
    }

    /// Human label for messages
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Epic => "epic",
            EntityKind::UserStory => "user story",
            EntityKind::AcceptanceCriteria => "acceptance criteria",
            EntityKind::Requirement => "requirement",
        }
    }

    /// Whether this kind participates in a status workflow
    pub fn has_status(&self) -> bool {
        !matches!(self, EntityKind::AcceptanceCriteria)
    }

    /// All kinds, parents before children
    pub fn all() -> &'static [EntityKind] {
        &[
            EntityKind::Epic,
            EntityKind::UserStory,
            EntityKind::AcceptanceCriteria,
            EntityKind::Requirement,
        ]
    }

    /// Kinds governed by a status workflow
    pub fn with_status() -> &'static [EntityKind] {
        &[
            EntityKind::Epic,
            EntityKind::UserStory,
            EntityKind::Requirement,
        ]
    }

    /// Resolve a kind from its reference tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_uppercase().as_str() {
            "EP" => Some(EntityKind::Epic),
            "US" => Some(EntityKind::UserStory),
            "AC" => Some(EntityKind::AcceptanceCriteria),
            "REQ" => Some(EntityKind::Requirement),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "epic" | "epics" | "ep" => Ok(EntityKind::Epic),
            "user_story" | "user_stories" | "userstory" | "story" | "us" => {
                Ok(EntityKind::UserStory)
            }
            "acceptance_criteria" | "acceptancecriteria" | "criteria" | "ac" => {
                Ok(EntityKind::AcceptanceCriteria)
            }
            "requirement" | "requirements" | "req" => Ok(EntityKind::Requirement),
            _ => Err(IdParseError::InvalidKind(s.to_string())),
        }
    }
}

/// Every kind of record the search index and the deletion planner deal with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Epic,
    UserStory,
    AcceptanceCriteria,
    Requirement,
    Comment,
    Relationship,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Epic => "epic",
            RecordKind::UserStory => "user_story",
            RecordKind::AcceptanceCriteria => "acceptance_criteria",
            RecordKind::Requirement => "requirement",
            RecordKind::Comment => "comment",
            RecordKind::Relationship => "relationship",
        }
    }

    /// Kinds covered by full-text search
    pub fn searchable() -> &'static [RecordKind] {
        &[
            RecordKind::Epic,
            RecordKind::UserStory,
            RecordKind::AcceptanceCriteria,
            RecordKind::Requirement,
            RecordKind::Comment,
        ]
    }

    pub fn is_searchable(&self) -> bool {
        !matches!(self, RecordKind::Relationship)
    }

    /// The entity kind, if this record is one of the four artifacts
    pub fn entity_kind(&self) -> Option<EntityKind> {
        match self {
            RecordKind::Epic => Some(EntityKind::Epic),
            RecordKind::UserStory => Some(EntityKind::UserStory),
            RecordKind::AcceptanceCriteria => Some(EntityKind::AcceptanceCriteria),
            RecordKind::Requirement => Some(EntityKind::Requirement),
            RecordKind::Comment | RecordKind::Relationship => None,
        }
    }
}

impl From<EntityKind> for RecordKind {
    fn from(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Epic => RecordKind::Epic,
            EntityKind::UserStory => RecordKind::UserStory,
            EntityKind::AcceptanceCriteria => RecordKind::AcceptanceCriteria,
            EntityKind::Requirement => RecordKind::Requirement,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "comment" | "comments" => Ok(RecordKind::Comment),
            "relationship" | "relationships" => Ok(RecordKind::Relationship),
            other => other.parse::<EntityKind>().map(RecordKind::from),
        }
    }
}

/// Opaque internal identifier (ULID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(Ulid);

impl EntityId {
    /// Generate a fresh identifier
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    pub fn ulid(&self) -> Ulid {
        self.0
    }

    pub fn parse(s: &str) -> Result<Self, IdParseError> {
        s.parse()
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s.trim())
            .map(Self)
            .map_err(|e| IdParseError::InvalidUlid(s.to_string(), e.to_string()))
    }
}

impl Serialize for EntityId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Minimum zero-padded width of the numeric suffix
pub const REFERENCE_WIDTH: usize = 3;

/// Human-readable reference ID, e.g. `REQ-042`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReferenceId {
    kind: EntityKind,
    number: i64,
}

impl ReferenceId {
    pub fn new(kind: EntityKind, number: i64) -> Self {
        Self { kind, number }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn number(&self) -> i64 {
        self.number
    }

    pub fn parse(s: &str) -> Result<Self, IdParseError> {
        s.parse()
    }

    /// Quick syntactic check without allocating
    pub fn looks_like(s: &str) -> bool {
        match s.trim().split_once('-') {
            Some((tag, digits)) => {
                EntityKind::from_tag(tag).is_some()
                    && !digits.is_empty()
                    && digits.bytes().all(|b| b.is_ascii_digit())
            }
            None => false,
        }
    }
}

impl fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{:0width$}",
            self.kind.tag(),
            self.number,
            width = REFERENCE_WIDTH
        )
    }
}

impl FromStr for ReferenceId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (tag, digits) = s
            .split_once('-')
            .ok_or_else(|| IdParseError::MissingDelimiter(s.to_string()))?;

        let kind =
            EntityKind::from_tag(tag).ok_or_else(|| IdParseError::InvalidTag(tag.to_string()))?;

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(IdParseError::InvalidNumber(s.to_string()));
        }
        let number: i64 = digits
            .parse()
            .map_err(|_| IdParseError::InvalidNumber(s.to_string()))?;
        if number < 1 {
            return Err(IdParseError::InvalidNumber(s.to_string()));
        }

        Ok(Self { kind, number })
    }
}

impl Serialize for ReferenceId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ReferenceId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A lookup key: either the internal ID or the reference ID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKey {
    Id(EntityId),
    Reference(ReferenceId),
}

impl EntityKey {
    /// Parse a lookup string for an entity of the given kind.
    ///
    /// A reference ID with another kind's tag is rejected so `get_epic("US-001")`
    /// cannot silently return nothing.
    pub fn parse(kind: EntityKind, s: &str) -> Result<Self, IdParseError> {
        let s = s.trim();
        if ReferenceId::looks_like(s) {
            let reference = ReferenceId::parse(s)?;
            if reference.kind() != kind {
                return Err(IdParseError::WrongKind {
                    value: s.to_string(),
                    expected: kind,
                });
            }
            return Ok(EntityKey::Reference(reference));
        }
        Ok(EntityKey::Id(EntityId::parse(s)?))
    }

    /// Parse without knowing the kind up front (reference IDs carry it)
    pub fn parse_any(s: &str) -> Result<(Option<EntityKind>, Self), IdParseError> {
        let s = s.trim();
        if ReferenceId::looks_like(s) {
            let reference = ReferenceId::parse(s)?;
            return Ok((Some(reference.kind()), EntityKey::Reference(reference)));
        }
        Ok((None, EntityKey::Id(EntityId::parse(s)?)))
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Id(id) => write!(f, "{}", id),
            EntityKey::Reference(r) => write!(f, "{}", r),
        }
    }
}

/// Errors that can occur when parsing identifiers
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdParseError {
    #[error("invalid reference tag: '{0}' (valid: EP, US, AC, REQ)")]
    InvalidTag(String),

    #[error("invalid entity kind: '{0}' (valid: epic, user_story, acceptance_criteria, requirement)")]
    InvalidKind(String),

    #[error("missing '-' delimiter in reference ID: '{0}'")]
    MissingDelimiter(String),

    #[error("invalid reference number in '{0}'")]
    InvalidNumber(String),

    #[error("invalid ULID '{0}': {1}")]
    InvalidUlid(String, String),

    #[error("'{value}' is not a {} reference", expected.label())]
    WrongKind { value: String, expected: EntityKind },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_id_formatting_pads_to_three() {
        assert_eq!(ReferenceId::new(EntityKind::Epic, 1).to_string(), "EP-001");
        assert_eq!(ReferenceId::new(EntityKind::UserStory, 42).to_string(), "US-042");
        assert_eq!(
            ReferenceId::new(EntityKind::Requirement, 1234).to_string(),
            "REQ-1234"
        );
        assert_eq!(
            ReferenceId::new(EntityKind::AcceptanceCriteria, 7).to_string(),
            "AC-007"
        );
    }

    #[test]
    fn test_reference_id_parsing() {
        let r = ReferenceId::parse("REQ-017").unwrap();
        assert_eq!(r.kind(), EntityKind::Requirement);
        assert_eq!(r.number(), 17);

        let lower = ReferenceId::parse("ep-003").unwrap();
        assert_eq!(lower.kind(), EntityKind::Epic);
        assert_eq!(lower.to_string(), "EP-003");
    }

    #[test]
    fn test_reference_id_rejects_garbage() {
        assert!(matches!(
            ReferenceId::parse("XX-001"),
            Err(IdParseError::InvalidTag(_))
        ));
        assert!(matches!(
            ReferenceId::parse("EP001"),
            Err(IdParseError::MissingDelimiter(_))
        ));
        assert!(matches!(
            ReferenceId::parse("EP-01a"),
            Err(IdParseError::InvalidNumber(_))
        ));
        assert!(matches!(
            ReferenceId::parse("EP-000"),
            Err(IdParseError::InvalidNumber(_))
        ));
    }

    #[test]
    fn test_entity_key_accepts_both_forms() {
        let id = EntityId::new();
        assert_eq!(
            EntityKey::parse(EntityKind::Epic, &id.to_string()).unwrap(),
            EntityKey::Id(id)
        );
        assert_eq!(
            EntityKey::parse(EntityKind::Epic, "EP-002").unwrap(),
            EntityKey::Reference(ReferenceId::new(EntityKind::Epic, 2))
        );
    }

    #[test]
    fn test_entity_key_rejects_other_kind_reference() {
        let err = EntityKey::parse(EntityKind::Epic, "US-001").unwrap_err();
        assert!(matches!(err, IdParseError::WrongKind { .. }));
    }

    #[test]
    fn test_entity_id_roundtrip_through_string() {
        let id = EntityId::new();
        let parsed: EntityId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!(matches!(
            EntityId::parse("not-a-ulid"),
            Err(IdParseError::InvalidUlid(_, _))
        ));
    }

    #[test]
    fn test_kind_parsing_aliases() {
        assert_eq!("story".parse::<EntityKind>().unwrap(), EntityKind::UserStory);
        assert_eq!("AC".parse::<EntityKind>().unwrap(), EntityKind::AcceptanceCriteria);
        assert_eq!("comment".parse::<RecordKind>().unwrap(), RecordKind::Comment);
        assert_eq!("req".parse::<RecordKind>().unwrap(), RecordKind::Requirement);
        assert!("widget".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_only_acceptance_criteria_lack_status() {
        assert!(EntityKind::Epic.has_status());
        assert!(!EntityKind::AcceptanceCriteria.has_status());
        assert_eq!(EntityKind::with_status().len(), 3);
    }
}
