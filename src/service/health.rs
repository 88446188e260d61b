//! Liveness and readiness checks

use serde::Serialize;
use std::time::Instant;

use super::{Service, READINESS_TIMEOUT};
use crate::core::context::RequestContext;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Liveness {
    pub status: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentHealth {
    pub ok: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentHealth {
    fn from_check<E: std::fmt::Display>(check: impl FnOnce() -> Result<(), E>) -> Self {
        let started = Instant::now();
        let outcome = check();
        let elapsed = started.elapsed();
        let latency_ms = elapsed.as_millis() as u64;
        match outcome {
            Ok(()) if elapsed > READINESS_TIMEOUT => Self {
                ok: false,
                latency_ms,
                error: Some(format!("no answer within {}ms", READINESS_TIMEOUT.as_millis())),
            },
            Ok(()) => Self {
                ok: true,
                latency_ms,
                error: None,
            },
            Err(e) => Self {
                ok: false,
                latency_ms,
                error: Some(e.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Readiness {
    pub ready: bool,
    pub schema_version: Option<String>,
    pub database: ComponentHealth,
    pub cache: ComponentHealth,
}

impl Service {
    /// Always OK while the process runs
    pub fn liveness(&self) -> Liveness {
        Liveness { status: "ok" }
    }

    /// OK only if the database and the cache both answer within the
    /// readiness timeout. A disabled cache counts as healthy.
    pub fn readiness(&self) -> Readiness {
        let ctx = RequestContext::anonymous().with_timeout(READINESS_TIMEOUT);
        let database = ComponentHealth::from_check(|| self.store.ping(&ctx));
        let cache = ComponentHealth::from_check(|| self.cache.ping());
        let schema_version = if database.ok {
            self.store.schema_version(&ctx).ok().flatten()
        } else {
            None
        };
        let ready = database.ok && cache.ok;
        if !ready {
            tracing::warn!(database = database.ok, cache = cache.ok, "service not ready");
        }
        Readiness {
            ready,
            schema_version,
            database,
            cache,
        }
    }
}
