//! `storyline link` command - typed requirement relationships

use clap::Subcommand;
use console::style;
use miette::Result;

use crate::cli::commands::Session;
use crate::cli::GlobalOpts;

#[derive(Subcommand, Debug)]
pub enum LinkCommands {
    /// Relate SOURCE to TARGET, e.g. `link add REQ-001 depends_on REQ-002`
    Add {
        source: String,
        /// Relationship type (case-insensitive)
        relationship: String,
        target: String,
    },
    /// Show one relationship
    Show { id: String },
    /// Remove a relationship by ID
    Rm { id: String },
    /// Incoming and outgoing relationships of a requirement
    List { requirement: String },
    /// Report existing cycles per relationship type
    Cycles {
        /// Only this relationship type
        #[arg(long = "type", short = 't')]
        relationship: Option<String>,
    },
}

pub fn run(cmd: LinkCommands, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let Session { service, ctx, out } = &session;
    match cmd {
        LinkCommands::Add {
            source,
            relationship,
            target,
        } => {
            let edge = service.create_relationship(ctx, &source, &target, &relationship)?;
            if !out.structured(&edge)? {
                out.success(format!(
                    "{} {} {} ({})",
                    edge.source_reference_id,
                    style(&edge.relationship_type).cyan(),
                    edge.target_reference_id,
                    edge.id
                ));
            }
        }
        LinkCommands::Show { id } => {
            let edge = service.get_relationship(ctx, &id)?;
            out.record(&edge, None)?;
        }
        LinkCommands::Rm { id } => {
            let edge = service.delete_relationship(ctx, &id)?;
            if !out.structured(&edge)? {
                out.success(format!(
                    "Removed {} {} {}",
                    edge.source_reference_id, edge.relationship_type, edge.target_reference_id
                ));
            }
        }
        LinkCommands::List { requirement } => {
            let edges = service.list_relationships(ctx, &requirement)?;
            if out.structured(&edges)? {
                return Ok(());
            }
            let all: Vec<_> = edges
                .source_edges
                .iter()
                .chain(&edges.target_edges)
                .cloned()
                .collect();
            out.list(&all)?;
            if all.is_empty() {
                out.note(style(format!("{} has no relationships", requirement)).dim());
            }
        }
        LinkCommands::Cycles { relationship } => {
            let cycles = service.detect_cycles(ctx, relationship.as_deref())?;
            out.list(&cycles)?;
            if cycles.is_empty() {
                out.note(style("No cycles").dim());
            }
        }
    }
    Ok(())
}
