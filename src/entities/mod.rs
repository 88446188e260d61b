//! Entity type definitions
//!
//! storyline stores a four-level planning hierarchy:
//!
//! - [`Epic`] - top-level initiative
//! - [`UserStory`] - owned by an epic
//! - [`AcceptanceCriteria`] - EARS-style criteria, owned by a user story
//! - [`Requirement`] - owned by a user story, optionally linked to one criterion
//!
//! plus the collaboration layer ([`Comment`], [`RequirementRelationship`]),
//! reference data ([`reference`]), [`User`] accounts and deletion [`impact`] reports.

pub mod acceptance_criteria;
pub mod comment;
pub mod epic;
pub mod impact;
pub mod reference;
pub mod relationship;
pub mod requirement;
pub mod user;
pub mod user_story;

pub use acceptance_criteria::AcceptanceCriteria;
pub use comment::{Comment, CommentState, CommentThread};
pub use epic::Epic;
pub use impact::{DeletionReport, DependencyReport};
pub use reference::{
    RelationshipType, RequirementType, Status, StatusModel, StatusTransition, Workflow,
};
pub use relationship::{RequirementRelationship, RequirementRelationships};
pub use requirement::Requirement;
pub use user::User;
pub use user_story::UserStory;
