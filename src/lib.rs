//! Storyline: product requirements management
//!
//! Epics own user stories; stories own acceptance criteria and
//! requirements. Every status-bearing entity moves through a data-driven
//! workflow, any entity can carry threaded or inline comments, and
//! requirements relate to each other through typed, cycle-checked edges.
//!
//! The [`service::Service`] is the operation surface; the `storyline`
//! binary is a thin CLI over it.

pub mod cache;
pub mod cli;
pub mod core;
pub mod entities;
pub mod service;
pub mod store;
