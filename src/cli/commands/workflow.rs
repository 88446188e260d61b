//! `storyline workflow` command - inspect status workflows

use clap::Subcommand;
use console::style;
use miette::Result;
use serde::Serialize;

use crate::cli::commands::Session;
use crate::cli::GlobalOpts;
use crate::core::identity::EntityKind;
use crate::core::workflow::TransitionCheck;

#[derive(Subcommand, Debug)]
pub enum WorkflowCommands {
    /// Show the active workflow for a kind (epic, story, req)
    Show { kind: EntityKind },
    /// Statuses reachable in one step from a status
    Allowed { kind: EntityKind, status: String },
    /// Check whether FROM → TO is a legal move
    Check {
        kind: EntityKind,
        from: String,
        to: String,
    },
    /// Entities whose status is missing from the active workflow
    Unreconciled { kind: EntityKind },
    /// Force an entity onto a status of the active workflow (administrators)
    Reconcile {
        kind: EntityKind,
        key: String,
        status: String,
    },
}

#[derive(Serialize)]
struct Transitions<'a> {
    reference_id: &'a str,
    status: &'a str,
    allowed: &'a [String],
}

/// Shared by the `transitions` subcommand of every status-bearing kind
pub fn print_transitions(session: &Session, kind: EntityKind, key: &str) -> Result<()> {
    let (status, allowed) = session.service.entity_transitions(&session.ctx, kind, key)?;
    let view = Transitions {
        reference_id: key,
        status: &status,
        allowed: &allowed,
    };
    if session.out.structured(&view)? {
        return Ok(());
    }
    println!("{} is {}", key, style(&status).cyan());
    if allowed.is_empty() {
        println!("{}", style("No transitions out of this status").dim());
    } else {
        for next in &allowed {
            println!("  → {}", next);
        }
    }
    Ok(())
}

pub fn run(cmd: WorkflowCommands, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let Session { service, ctx, out } = &session;
    match cmd {
        WorkflowCommands::Show { kind } => {
            let workflow = service.get_active_workflow(ctx, kind)?;
            if !out.structured(&workflow)? {
                out.note(format!(
                    "{} ({})",
                    style(&workflow.model.name).bold(),
                    workflow.model.entity_type
                ));
                out.list(&workflow.statuses)?;
                out.list(&workflow.transitions)?;
            }
        }
        WorkflowCommands::Allowed { kind, status } => {
            let allowed = service.list_allowed_transitions(ctx, kind, &status)?;
            if !out.structured(&allowed)? {
                for next in &allowed {
                    println!("{}", next);
                }
            }
        }
        WorkflowCommands::Check { kind, from, to } => {
            match service.validate_transition(ctx, kind, &from, &to)? {
                TransitionCheck::NoOp => out.success(format!("{} is already {}", kind, to)),
                TransitionCheck::Allowed => out.success(format!("{}→{} is allowed", from, to)),
            }
        }
        WorkflowCommands::Unreconciled { kind } => {
            let rows = service.list_unreconciled(ctx, kind)?;
            out.list(&rows)?;
            if rows.is_empty() {
                out.note(style("Every status is reconciled").dim());
            }
        }
        WorkflowCommands::Reconcile { kind, key, status } => {
            let reference = service.reconcile_status(ctx, kind, &key, &status)?;
            out.success(format!("{} set to {}", reference, status.trim()));
        }
    }
    Ok(())
}
