//! `storyline req` command - requirement management

use clap::Subcommand;
use miette::Result;

use crate::cli::commands::{ListArgs, Session};
use crate::cli::helpers::text_arg;
use crate::cli::output::Tabular;
use crate::cli::GlobalOpts;
use crate::core::entity::Priority;
use crate::core::identity::EntityKind;
use crate::entities::requirement::{NewRequirement, RequirementFilter, RequirementUpdate};

#[derive(Subcommand, Debug)]
pub enum ReqCommands {
    /// Create a requirement under a user story
    New(NewArgs),
    /// Show a requirement with its relationships
    Show { key: String },
    /// List requirements
    List(ReqListArgs),
    /// Change title, description, priority or type
    Edit(EditArgs),
    /// Move a requirement to another status
    Status { key: String, status: String },
    /// Set or clear (with "none") the assignee
    Assign { key: String, user: String },
    /// Link to an acceptance criterion of the same story ("none" unlinks)
    Criteria { key: String, criteria: String },
    /// Current status and where it may go next
    Transitions { key: String },
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Owning story (US-NNN or ULID)
    pub story: String,
    pub title: String,
    /// Requirement type, e.g. functional
    #[arg(long = "type", short = 't')]
    pub requirement_type: String,
    /// Description ("-" reads stdin)
    #[arg(long, short = 'd')]
    pub description: Option<String>,
    #[arg(long, short = 'p')]
    pub priority: Option<Priority>,
    #[arg(long, short = 's')]
    pub status: Option<String>,
    #[arg(long, short = 'a')]
    pub assignee: Option<String>,
    /// Acceptance criterion of the same story
    #[arg(long)]
    pub ac: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct ReqListArgs {
    /// Only requirements of this story
    #[arg(long, short = 'u')]
    pub story: Option<String>,
    /// Only this requirement type
    #[arg(long = "type", short = 't')]
    pub requirement_type: Option<String>,
    /// Only requirements linked to this acceptance criterion
    #[arg(long)]
    pub ac: Option<String>,
    #[command(flatten)]
    pub list: ListArgs,
}

#[derive(clap::Args, Debug)]
pub struct EditArgs {
    pub key: String,
    #[arg(long)]
    pub title: Option<String>,
    /// New description ("-" reads stdin, "" clears)
    #[arg(long, short = 'd')]
    pub description: Option<String>,
    #[arg(long, short = 'p')]
    pub priority: Option<Priority>,
    #[arg(long = "type", short = 't')]
    pub requirement_type: Option<String>,
}

pub fn run(cmd: ReqCommands, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let Session { service, ctx, out } = &session;
    match cmd {
        ReqCommands::New(args) => {
            let assignee_id = match &args.assignee {
                Some(user) => session.assignee(user)?,
                None => None,
            };
            let req = service.create_requirement(
                ctx,
                &args.story,
                NewRequirement {
                    title: args.title,
                    description: args.description.as_deref().map(text_arg).transpose()?,
                    priority: args.priority,
                    status: args.status,
                    requirement_type: args.requirement_type,
                    assignee_id,
                    acceptance_criteria: args.ac,
                },
            )?;
            if !out.structured(&req)? {
                out.success(format!("Created {} {}", req.key(), req.title));
            }
        }
        ReqCommands::Show { key } => {
            let detail = service.get_requirement_detail(ctx, &key)?;
            if !out.structured(&detail)? {
                let req = &detail.requirement;
                out.record(req, req.description.as_deref())?;
                let edges: Vec<_> = detail
                    .relationships
                    .source_edges
                    .iter()
                    .chain(&detail.relationships.target_edges)
                    .cloned()
                    .collect();
                if !edges.is_empty() {
                    println!();
                    out.list(&edges)?;
                }
            }
        }
        ReqCommands::List(args) => {
            let acceptance_criteria_id = match &args.ac {
                Some(ac) => Some(service.get_acceptance_criteria(ctx, ac)?.id),
                None => None,
            };
            let extra = RequirementFilter {
                requirement_type: args.requirement_type.clone(),
                acceptance_criteria_id,
            };
            let query = args.list.query(&session)?;
            let page = service.list_requirements(ctx, args.story.as_deref(), &extra, &query)?;
            out.page(&page, "requirement(s)")?;
        }
        ReqCommands::Edit(args) => {
            let update = RequirementUpdate {
                title: args.title,
                description: args.description.as_deref().map(text_arg).transpose()?,
                priority: args.priority,
                requirement_type: args.requirement_type,
            };
            let stale = match &update.description {
                Some(text) => {
                    service.validate_inline_anchors(ctx, EntityKind::Requirement, &args.key, text)?
                }
                None => Vec::new(),
            };
            let req = service.update_requirement(ctx, &args.key, update)?;
            if !out.structured(&req)? {
                out.success(format!("Updated {}", req.key()));
                if !stale.is_empty() {
                    out.warn(format!("{} inline comment(s) are now stale", stale.len()));
                }
            }
        }
        ReqCommands::Status { key, status } => {
            let req = service.change_requirement_status(ctx, &key, &status)?;
            if !out.structured(&req)? {
                out.success(format!("{} is now {}", req.key(), req.status));
            }
        }
        ReqCommands::Assign { key, user } => {
            let assignee = session.assignee(&user)?;
            let req = service.assign_requirement(ctx, &key, assignee)?;
            if !out.structured(&req)? {
                match assignee {
                    Some(_) => out.success(format!("Assigned {} to {}", req.key(), user)),
                    None => out.success(format!("Unassigned {}", req.key())),
                }
            }
        }
        ReqCommands::Criteria { key, criteria } => {
            let target = criteria.trim();
            let target =
                (!target.is_empty() && !target.eq_ignore_ascii_case("none")).then_some(target);
            let req = service.link_acceptance_criteria(ctx, &key, target)?;
            if !out.structured(&req)? {
                match target {
                    Some(ac) => out.success(format!("Linked {} to {}", req.key(), ac)),
                    None => out.success(format!("Unlinked {} from its criteria", req.key())),
                }
            }
        }
        ReqCommands::Transitions { key } => {
            super::workflow::print_transitions(&session, EntityKind::Requirement, &key)?;
        }
    }
    Ok(())
}
