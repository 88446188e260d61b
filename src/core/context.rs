//! Per-request context: who is asking and by when they need an answer

use std::time::{Duration, Instant};

use crate::core::error::{Error, Result};
use crate::core::principal::{Permission, Principal};

/// Carried into every service call
#[derive(Debug, Clone)]
pub struct RequestContext {
    principal: Option<Principal>,
    deadline: Option<Instant>,
    correlation_id: String,
}

impl RequestContext {
    /// Context for an authenticated principal, with no deadline
    pub fn new(principal: Principal) -> Self {
        Self {
            principal: Some(principal),
            deadline: None,
            correlation_id: ulid::Ulid::new().to_string(),
        }
    }

    /// Context with no principal (health checks, bootstrap)
    pub fn anonymous() -> Self {
        Self {
            principal: None,
            deadline: None,
            correlation_id: ulid::Ulid::new().to_string(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = id.into();
        self
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fail with `Timeout` once the deadline has passed
    pub fn check_deadline(&self, operation: &str) -> Result<()> {
        if self.is_expired() {
            return Err(Error::Timeout {
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    /// The authenticated principal, or `AUTHENTICATION_REQUIRED`
    pub fn principal(&self) -> Result<&Principal> {
        self.principal
            .as_ref()
            .ok_or_else(|| Error::unauthenticated("authentication required"))
    }

    /// The principal, provided its role grants `permission`
    pub fn require(&self, permission: Permission) -> Result<&Principal> {
        let principal = self.principal()?;
        if !principal.can(permission) {
            return Err(Error::Forbidden {
                role: principal.role,
                action: permission.describe().to_string(),
            });
        }
        Ok(principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorCode;
    use crate::core::identity::EntityId;
    use crate::core::principal::Role;

    fn ctx(role: Role) -> RequestContext {
        RequestContext::new(Principal::new(EntityId::new(), "pat", role))
    }

    #[test]
    fn test_anonymous_requires_authentication() {
        let err = RequestContext::anonymous().principal().unwrap_err();
        assert_eq!(err.code(), ErrorCode::AuthenticationRequired);
    }

    #[test]
    fn test_require_checks_role() {
        assert!(ctx(Role::User).require(Permission::WriteEntities).is_ok());
        let err = ctx(Role::Commenter)
            .require(Permission::WriteEntities)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InsufficientPermissions);
    }

    #[test]
    fn test_expired_deadline() {
        let c = ctx(Role::User).with_deadline(Instant::now() - Duration::from_millis(1));
        assert!(c.is_expired());
        assert_eq!(c.check_deadline("list").unwrap_err().code(), ErrorCode::Timeout);
        assert_eq!(c.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn test_no_deadline_never_expires() {
        let c = ctx(Role::User);
        assert!(!c.is_expired());
        assert!(c.remaining().is_none());
    }
}
