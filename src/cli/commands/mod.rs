//! Command implementations
//!
//! Each module exposes `run(cmd, &global)`. Commands that act on data open a
//! [`Session`]: the installation, the service over its database, the acting
//! user's request context and a printer for the chosen format.

pub mod ac;
pub mod admin;
pub mod comment;
pub mod completions;
pub mod epic;
pub mod health;
pub mod impact;
pub mod init;
pub mod link;
pub mod req;
pub mod search;
pub mod story;
pub mod user;
pub mod workflow;

use chrono::{DateTime, NaiveDate, Utc};
use miette::Result;

use crate::cli::output::Printer;
use crate::cli::GlobalOpts;
use crate::core::config::Config;
use crate::core::context::RequestContext;
use crate::core::entity::Priority;
use crate::core::error::Error;
use crate::core::identity::EntityId;
use crate::core::project::Project;
use crate::core::query::{DateRange, EntityFilter, ListQuery, OrderBy, Page};
use crate::service::Service;

/// Locate the installation from `--project` or the working directory
pub fn discover_project(global: &GlobalOpts) -> Result<Project> {
    let found = match &global.project {
        Some(path) => Project::discover_from(path),
        None => Project::discover(),
    };
    found.map_err(|e| miette::miette!("{}", e))
}

/// Open the service for an installation
pub fn open_service(project: &Project) -> Result<Service> {
    let config = Config::load(Some(project));
    tracing::debug!(db = %config.database_path(Some(project)).display(), "opening service");
    Ok(Service::open(config, Some(project))?)
}

/// An authenticated command invocation
pub struct Session {
    pub service: Service,
    pub ctx: RequestContext,
    pub out: Printer,
}

impl Session {
    /// Discover the installation and authenticate as the acting user:
    /// `--as`, then `STORYLINE_USER`, then the configured `user`
    pub fn open(global: &GlobalOpts) -> Result<Self> {
        let project = discover_project(global)?;
        let service = open_service(&project)?;
        let username = global
            .user
            .clone()
            .or_else(|| service.config().user.clone())
            .ok_or_else(|| {
                Error::unauthenticated("no acting user; pass --as <username> or set STORYLINE_USER")
            })?;
        let ctx = service.context_for(&username)?;
        tracing::debug!(user = %username, correlation_id = %ctx.correlation_id(), "session opened");
        Ok(Self {
            service,
            ctx,
            out: Printer::new(global),
        })
    }

    /// A user by username or ULID
    pub fn user_id(&self, key: &str) -> Result<EntityId> {
        Ok(self.service.get_user(&self.ctx, key)?.id)
    }

    /// `none` (or an empty value) clears an assignment
    pub fn assignee(&self, key: &str) -> Result<Option<EntityId>> {
        let key = key.trim();
        if key.is_empty() || key.eq_ignore_ascii_case("none") {
            return Ok(None);
        }
        self.user_id(key).map(Some)
    }
}

/// Filters shared by list and search commands
#[derive(clap::Args, Debug, Default)]
pub struct FilterArgs {
    /// Filter by status
    #[arg(long, short = 's')]
    pub status: Option<String>,

    /// Filter by priority (critical, high, medium, low)
    #[arg(long, short = 'p')]
    pub priority: Option<Priority>,

    /// Filter by creator (username)
    #[arg(long)]
    pub creator: Option<String>,

    /// Filter by assignee (username)
    #[arg(long)]
    pub assignee: Option<String>,

    /// Created at or after (RFC 3339 or YYYY-MM-DD)
    #[arg(long, value_parser = parse_time)]
    pub created_after: Option<DateTime<Utc>>,

    /// Created before (RFC 3339 or YYYY-MM-DD)
    #[arg(long, value_parser = parse_time)]
    pub created_before: Option<DateTime<Utc>>,

    /// Updated at or after (RFC 3339 or YYYY-MM-DD)
    #[arg(long, value_parser = parse_time)]
    pub updated_after: Option<DateTime<Utc>>,

    /// Updated before (RFC 3339 or YYYY-MM-DD)
    #[arg(long, value_parser = parse_time)]
    pub updated_before: Option<DateTime<Utc>>,
}

/// Filter, ordering and paging flags shared by list commands
#[derive(clap::Args, Debug, Default)]
pub struct ListArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Ordering, e.g. "priority" or "updated_at DESC"
    #[arg(long)]
    pub order_by: Option<String>,

    /// Page size (1-100)
    #[arg(long, short = 'n')]
    pub limit: Option<i64>,

    /// Rows to skip
    #[arg(long)]
    pub offset: Option<i64>,
}

impl FilterArgs {
    pub fn filter(&self, session: &Session) -> Result<EntityFilter> {
        let creator_id = match &self.creator {
            Some(name) => Some(session.user_id(name)?),
            None => None,
        };
        let assignee_id = match &self.assignee {
            Some(name) => Some(session.user_id(name)?),
            None => None,
        };
        Ok(EntityFilter {
            creator_id,
            assignee_id,
            status: self.status.clone(),
            priority: self.priority,
            created: DateRange {
                after: self.created_after,
                before: self.created_before,
            },
            updated: DateRange {
                after: self.updated_after,
                before: self.updated_before,
            },
        })
    }
}

impl ListArgs {
    pub fn page(&self) -> Result<Page> {
        Ok(Page::new(self.limit, self.offset)?)
    }

    pub fn query(&self, session: &Session) -> Result<ListQuery> {
        let order = match &self.order_by {
            Some(order) => OrderBy::parse(order)?,
            None => OrderBy::default(),
        };
        Ok(ListQuery {
            filter: self.filter.filter(session)?,
            order,
            page: self.page()?,
        })
    }
}

/// RFC 3339 timestamp or a bare date (midnight UTC)
pub fn parse_time(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| format!("invalid time '{}' (expected RFC 3339 or YYYY-MM-DD)", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time_accepts_date_and_rfc3339() {
        let day = parse_time("2024-03-01").unwrap();
        assert_eq!(day.to_rfc3339(), "2024-03-01T00:00:00+00:00");
        let ts = parse_time("2024-03-01T10:30:00+02:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-01T08:30:00+00:00");
        assert!(parse_time("yesterday").is_err());
    }
}
