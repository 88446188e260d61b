//! Core module - fundamental types and utilities

pub mod anchor;
pub mod config;
pub mod context;
pub mod entity;
pub mod error;
pub mod identity;
pub mod links;
pub mod principal;
pub mod project;
pub mod query;
pub mod workflow;

pub use anchor::Anchor;
pub use config::Config;
pub use context::RequestContext;
pub use entity::{Entity, Priority};
pub use error::{Error, ErrorCode, ErrorResponse, Result};
pub use identity::{EntityId, EntityKey, EntityKind, IdParseError, RecordKind, ReferenceId};
pub use principal::{Permission, Principal, Role};
pub use project::{Project, ProjectError};
pub use query::{
    DateRange, EntityFilter, ListQuery, ListResponse, OrderBy, OrderField, Page, SortOrder,
};
pub use workflow::{ModelIssue, StatusNode, TransitionCheck, WorkflowError, WorkflowGraph};
