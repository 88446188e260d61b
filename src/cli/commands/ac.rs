//! `storyline ac` command - acceptance criteria

use clap::Subcommand;
use miette::Result;

use crate::cli::commands::{ListArgs, Session};
use crate::cli::helpers::text_arg;
use crate::cli::output::Tabular;
use crate::cli::GlobalOpts;
use crate::core::identity::EntityKind;
use crate::entities::acceptance_criteria::NewAcceptanceCriteria;

#[derive(Subcommand, Debug)]
pub enum AcCommands {
    /// Add acceptance criteria to a user story
    New {
        /// Owning story (US-NNN or ULID)
        story: String,
        /// EARS-style text ("-" reads stdin)
        description: String,
    },
    /// Show criteria with the requirements linked to them
    Show { key: String },
    /// List acceptance criteria
    List {
        /// Only criteria of this story
        #[arg(long, short = 'u')]
        story: Option<String>,
        #[command(flatten)]
        list: ListArgs,
    },
    /// Replace the description; reports inline comments that went stale
    Edit {
        key: String,
        /// New text ("-" reads stdin)
        description: String,
    },
}

pub fn run(cmd: AcCommands, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let Session { service, ctx, out } = &session;
    match cmd {
        AcCommands::New { story, description } => {
            let ac = service.create_acceptance_criteria(
                ctx,
                &story,
                NewAcceptanceCriteria {
                    description: text_arg(&description)?,
                },
            )?;
            if !out.structured(&ac)? {
                out.success(format!("Created {}", ac.key()));
            }
        }
        AcCommands::Show { key } => {
            let detail = service.get_acceptance_criteria_with_requirements(ctx, &key)?;
            if !out.structured(&detail)? {
                let ac = &detail.acceptance_criteria;
                out.record(ac, Some(&ac.description))?;
                if !detail.requirements.is_empty() {
                    println!();
                    out.list(&detail.requirements)?;
                }
            }
        }
        AcCommands::List { story, list } => {
            let query = list.query(&session)?;
            let page = service.list_acceptance_criteria(ctx, story.as_deref(), &query)?;
            out.page(&page, "acceptance criteria")?;
        }
        AcCommands::Edit { key, description } => {
            let description = text_arg(&description)?;
            let stale = service.validate_inline_anchors(
                ctx,
                EntityKind::AcceptanceCriteria,
                &key,
                &description,
            )?;
            let ac = service.update_acceptance_criteria(ctx, &key, &description)?;
            if !out.structured(&ac)? {
                out.success(format!("Updated {}", ac.key()));
                if !stale.is_empty() {
                    out.warn(format!("{} inline comment(s) are now stale", stale.len()));
                }
            }
        }
    }
    Ok(())
}
