//! `storyline epic` command - epic management

use clap::Subcommand;
use miette::Result;

use crate::cli::commands::{ListArgs, Session};
use crate::cli::helpers::text_arg;
use crate::cli::output::Tabular;
use crate::cli::GlobalOpts;
use crate::core::entity::Priority;
use crate::core::identity::EntityKind;
use crate::entities::epic::{EpicUpdate, NewEpic};

#[derive(Subcommand, Debug)]
pub enum EpicCommands {
    /// Create an epic
    New(NewArgs),
    /// Show an epic
    Show { key: String },
    /// List epics
    List(ListArgs),
    /// Change title, description or priority
    Edit(EditArgs),
    /// Move an epic to another status
    Status { key: String, status: String },
    /// Set or clear (with "none") the assignee
    Assign { key: String, user: String },
    /// Show an epic with its stories, criteria and requirements
    Tree { key: String },
    /// Current status and where it may go next
    Transitions { key: String },
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    pub title: String,
    /// Description ("-" reads stdin)
    #[arg(long, short = 'd')]
    pub description: Option<String>,
    #[arg(long, short = 'p')]
    pub priority: Option<Priority>,
    /// Initial status (default: the workflow's initial status)
    #[arg(long, short = 's')]
    pub status: Option<String>,
    /// Assignee username
    #[arg(long, short = 'a')]
    pub assignee: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct EditArgs {
    pub key: String,
    #[arg(long, short = 't')]
    pub title: Option<String>,
    /// New description ("-" reads stdin, "" clears)
    #[arg(long, short = 'd')]
    pub description: Option<String>,
    #[arg(long, short = 'p')]
    pub priority: Option<Priority>,
}

pub fn run(cmd: EpicCommands, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let Session { service, ctx, out } = &session;
    match cmd {
        EpicCommands::New(args) => {
            let assignee_id = match &args.assignee {
                Some(user) => session.assignee(user)?,
                None => None,
            };
            let epic = service.create_epic(
                ctx,
                NewEpic {
                    title: args.title,
                    description: args.description.as_deref().map(text_arg).transpose()?,
                    priority: args.priority,
                    status: args.status,
                    assignee_id,
                },
            )?;
            if !out.structured(&epic)? {
                out.success(format!("Created {} {}", epic.key(), epic.title));
            }
        }
        EpicCommands::Show { key } => {
            let epic = service.get_epic(ctx, &key)?;
            out.record(&epic, epic.description.as_deref())?;
        }
        EpicCommands::List(args) => {
            let query = args.query(&session)?;
            out.page(&service.list_epics(ctx, &query)?, "epic(s)")?;
        }
        EpicCommands::Edit(args) => {
            let update = EpicUpdate {
                title: args.title,
                description: args.description.as_deref().map(text_arg).transpose()?,
                priority: args.priority,
            };
            let epic = service.update_epic(ctx, &args.key, update)?;
            if !out.structured(&epic)? {
                out.success(format!("Updated {}", epic.key()));
            }
        }
        EpicCommands::Status { key, status } => {
            let epic = service.change_epic_status(ctx, &key, &status)?;
            if !out.structured(&epic)? {
                out.success(format!("{} is now {}", epic.key(), epic.status));
            }
        }
        EpicCommands::Assign { key, user } => {
            let assignee = session.assignee(&user)?;
            let epic = service.assign_epic(ctx, &key, assignee)?;
            if !out.structured(&epic)? {
                match assignee {
                    Some(_) => out.success(format!("Assigned {} to {}", epic.key(), user)),
                    None => out.success(format!("Unassigned {}", epic.key())),
                }
            }
        }
        EpicCommands::Tree { key } => {
            let tree = service.get_epic_with_children(ctx, &key)?;
            if !out.structured(&tree)? {
                out.record(&tree.epic, tree.epic.description.as_deref())?;
                for story in &tree.user_stories {
                    println!();
                    println!("{} {}", story.user_story.key(), story.user_story.title);
                    for ac in &story.acceptance_criteria {
                        println!("  {} {}", ac.key(), ac.description);
                    }
                    for req in &story.requirements {
                        println!("  {} [{}] {}", req.key(), req.status, req.title);
                    }
                }
            }
        }
        EpicCommands::Transitions { key } => {
            super::workflow::print_transitions(&session, EntityKind::Epic, &key)?;
        }
    }
    Ok(())
}
