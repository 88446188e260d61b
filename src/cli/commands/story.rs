//! `storyline story` command - user story management

use clap::Subcommand;
use miette::Result;

use crate::cli::commands::{ListArgs, Session};
use crate::cli::helpers::text_arg;
use crate::cli::output::Tabular;
use crate::cli::GlobalOpts;
use crate::core::entity::Priority;
use crate::core::identity::EntityKind;
use crate::entities::user_story::{NewUserStory, UserStoryUpdate};

#[derive(Subcommand, Debug)]
pub enum StoryCommands {
    /// Create a user story under an epic
    New(NewArgs),
    /// Show a user story
    Show { key: String },
    /// List user stories
    List {
        /// Only stories of this epic
        #[arg(long, short = 'e')]
        epic: Option<String>,
        #[command(flatten)]
        list: ListArgs,
    },
    /// Change title, description or priority
    Edit(EditArgs),
    /// Move a story to another status
    Status { key: String, status: String },
    /// Set or clear (with "none") the assignee
    Assign { key: String, user: String },
    /// Show a story with its criteria and requirements
    Tree { key: String },
    /// Current status and where it may go next
    Transitions { key: String },
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Owning epic (EP-NNN or ULID)
    pub epic: String,
    pub title: String,
    /// Description ("-" reads stdin)
    #[arg(long, short = 'd')]
    pub description: Option<String>,
    #[arg(long, short = 'p')]
    pub priority: Option<Priority>,
    #[arg(long, short = 's')]
    pub status: Option<String>,
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

pub fn run(cmd: StoryCommands, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let Session { service, ctx, out } = &session;
    match cmd {
        StoryCommands::New(args) => {
            let assignee_id = match &args.assignee {
                Some(user) => session.assignee(user)?,
                None => None,
            };
            let story = service.create_user_story(
                ctx,
                &args.epic,
                NewUserStory {
                    title: args.title,
                    description: args.description.as_deref().map(text_arg).transpose()?,
                    priority: args.priority,
                    status: args.status,
                    assignee_id,
                },
            )?;
            if !out.structured(&story)? {
                out.success(format!("Created {} {}", story.key(), story.title));
            }
        }
        StoryCommands::Show { key } => {
            let story = service.get_user_story(ctx, &key)?;
            out.record(&story, story.description.as_deref())?;
        }
        StoryCommands::List { epic, list } => {
            let query = list.query(&session)?;
            let page = service.list_user_stories(ctx, epic.as_deref(), &query)?;
            out.page(&page, "user story(ies)")?;
        }
        StoryCommands::Edit(args) => {
            let update = UserStoryUpdate {
                title: args.title,
                description: args.description.as_deref().map(text_arg).transpose()?,
                priority: args.priority,
            };
            let story = service.update_user_story(ctx, &args.key, update)?;
            if !out.structured(&story)? {
                out.success(format!("Updated {}", story.key()));
            }
        }
        StoryCommands::Status { key, status } => {
            let story = service.change_user_story_status(ctx, &key, &status)?;
            if !out.structured(&story)? {
                out.success(format!("{} is now {}", story.key(), story.status));
            }
        }
        StoryCommands::Assign { key, user } => {
            let assignee = session.assignee(&user)?;
            let story = service.assign_user_story(ctx, &key, assignee)?;
            if !out.structured(&story)? {
                match assignee {
                    Some(_) => out.success(format!("Assigned {} to {}", story.key(), user)),
                    None => out.success(format!("Unassigned {}", story.key())),
                }
            }
        }
        StoryCommands::Tree { key } => {
            let tree = service.get_user_story_with_children(ctx, &key)?;
            if !out.structured(&tree)? {
                out.record(&tree.user_story, tree.user_story.description.as_deref())?;
                if !tree.acceptance_criteria.is_empty() {
                    println!();
                    out.list(&tree.acceptance_criteria)?;
                }
                if !tree.requirements.is_empty() {
                    println!();
                    out.list(&tree.requirements)?;
                }
            }
        }
        StoryCommands::Transitions { key } => {
            super::workflow::print_transitions(&session, EntityKind::UserStory, &key)?;
        }
    }
    Ok(())
}
