//! The operation surface
//!
//! [`Service`] ties the store, the search cache and the resolved
//! configuration together. Its methods are split across submodules by
//! concern; every one takes a [`RequestContext`] carrying the principal and
//! the deadline, checks the role matrix first, then runs against the store.
//!
//! Writes invalidate the search cache only after their transaction commits.

mod admin;
mod comments;
mod criteria;
mod deletion;
mod epics;
mod health;
mod items;
mod relationships;
mod requirements;
mod search;
mod stories;
mod users;
mod workflow;

pub use admin::{NewNamedType, NewStatusModel, NewTransition};
pub use comments::{NewComment, NewInlineComment};
pub use deletion::DeleteOptions;
pub use health::{ComponentHealth, Liveness, Readiness};
pub use search::{SearchHit, SearchQuery, SearchResponse, SearchSort, Suggestion, Suggestions};
pub use users::InitSummary;

use std::time::Duration;

use crate::cache::SearchCache;
use crate::core::config::Config;
use crate::core::context::RequestContext;
use crate::core::error::{Error, Result};
use crate::core::identity::RecordKind;
use crate::core::project::Project;
use crate::store::Store;

/// Readiness checks give up after this long
pub const READINESS_TIMEOUT: Duration = Duration::from_secs(2);

/// Requirements-management service
#[derive(Debug, Clone)]
pub struct Service {
    store: Store,
    cache: SearchCache,
    config: Config,
}

impl Service {
    pub fn new(store: Store, cache: SearchCache, config: Config) -> Self {
        Self {
            store,
            cache,
            config,
        }
    }

    /// Open the database the configuration points at (relative to the
    /// installation root when one is given) with a cache built from config
    pub fn open(config: Config, project: Option<&Project>) -> Result<Self> {
        let path = config.database_path(project);
        let store = Store::open(&path, &config.database)?;
        let cache = SearchCache::from_config(&config.cache);
        Ok(Self::new(store, cache, config))
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn cache(&self) -> &SearchCache {
        &self.cache
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Context for `username`, with the configured request deadline
    pub fn context_for(&self, username: &str) -> Result<RequestContext> {
        let bootstrap = RequestContext::anonymous().with_timeout(self.config.request_timeout());
        let user = self
            .find_user(&bootstrap, username)?
            .ok_or_else(|| Error::Unauthenticated {
                code: crate::core::error::ErrorCode::InvalidToken,
                message: format!("unknown user '{}'", username),
            })?;
        Ok(RequestContext::new(user.principal()).with_timeout(self.config.request_timeout()))
    }

    /// Drop cached search responses covering `kinds`
    fn invalidate(&self, kinds: &[RecordKind]) {
        self.cache.invalidate(kinds);
    }
}
