//! `storyline admin` command - reference data management
//!
//! Requirement types, relationship types, status models with their
//! statuses and transitions. Every write here needs an administrator.

use clap::Subcommand;
use console::style;
use miette::Result;

use crate::cli::commands::Session;
use crate::cli::output::Printer;
use crate::cli::GlobalOpts;
use crate::core::identity::EntityKind;
use crate::entities::reference::{NewStatus, StatusUpdate, TypeTable, Workflow};
use crate::service::{NewNamedType, NewStatusModel, NewTransition};

#[derive(Subcommand, Debug)]
pub enum AdminCommands {
    /// Requirement types (functional, non_functional, ...)
    #[command(subcommand, name = "req-type")]
    ReqType(TypeCommands),
    /// Relationship types (depends_on, relates_to, ...)
    #[command(subcommand, name = "rel-type")]
    RelType(TypeCommands),
    /// Status models
    #[command(subcommand)]
    Model(ModelCommands),
    /// Statuses of a model
    #[command(subcommand)]
    Status(StatusCommands),
    /// Transitions of a model
    #[command(subcommand)]
    Transition(TransitionCommands),
}

#[derive(Subcommand, Debug)]
pub enum TypeCommands {
    List,
    Show { name: String },
    Add {
        name: String,
        #[arg(long, short = 'd')]
        description: Option<String>,
    },
    /// Rename or re-describe a type
    Edit {
        name: String,
        #[arg(long)]
        rename: Option<String>,
        #[arg(long, short = 'd')]
        description: Option<String>,
    },
    /// Delete a type nothing uses
    Rm { name: String },
}

#[derive(Subcommand, Debug)]
pub enum ModelCommands {
    List {
        /// Only models for this kind
        #[arg(long, short = 'k')]
        kind: Option<EntityKind>,
    },
    /// Show a model with its statuses and transitions
    Show { model: String },
    Add {
        kind: EntityKind,
        name: String,
        #[arg(long, short = 'd')]
        description: Option<String>,
    },
    Edit {
        model: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, short = 'd')]
        description: Option<String>,
    },
    /// Delete a model that is not the default
    Rm { model: String },
    /// Check the model is structurally sound
    Validate { model: String },
    /// Make the model its kind's default
    Default { model: String },
}

#[derive(Subcommand, Debug)]
pub enum StatusCommands {
    Add {
        model: String,
        name: String,
        #[arg(long, short = 'd')]
        description: Option<String>,
        #[arg(long)]
        color: Option<String>,
        /// Mark as the model's initial status
        #[arg(long)]
        initial: bool,
        /// Mark as a final status
        #[arg(long = "final")]
        is_final: bool,
        /// Position (default: last)
        #[arg(long)]
        order: Option<i64>,
    },
    Edit {
        model: String,
        status: String,
        /// New name; under a default model entities follow the rename
        #[arg(long)]
        rename: Option<String>,
        #[arg(long, short = 'd')]
        description: Option<String>,
        #[arg(long)]
        color: Option<String>,
        #[arg(long)]
        initial: Option<bool>,
        #[arg(long = "final")]
        is_final: Option<bool>,
        #[arg(long)]
        order: Option<i64>,
    },
    /// Delete a status no transition or entity uses
    Rm { model: String, status: String },
}

#[derive(Subcommand, Debug)]
pub enum TransitionCommands {
    Add {
        model: String,
        from: String,
        to: String,
        #[arg(long)]
        name: Option<String>,
    },
    Rm {
        model: String,
        from: String,
        to: String,
    },
}

fn print_workflow(out: &Printer, workflow: &Workflow) -> Result<()> {
    if out.structured(workflow)? {
        return Ok(());
    }
    out.note(format!(
        "{} {} ({}){}",
        style(&workflow.model.name).bold(),
        style(workflow.model.id).dim(),
        workflow.model.entity_type,
        if workflow.model.is_default { ", default" } else { "" }
    ));
    out.list(&workflow.statuses)?;
    out.list(&workflow.transitions)
}

fn run_types(session: &Session, table: TypeTable, cmd: TypeCommands) -> Result<()> {
    let Session { service, ctx, out } = session;
    match cmd {
        TypeCommands::List => out.list(&service.list_types(ctx, table)?)?,
        TypeCommands::Show { name } => {
            let named = service.get_type(ctx, table, &name)?;
            out.record(&named, None)?;
        }
        TypeCommands::Add { name, description } => {
            let named = service.create_type(ctx, table, NewNamedType { name, description })?;
            if !out.structured(&named)? {
                out.success(format!("Added {} '{}'", table.label(), named.name));
            }
        }
        TypeCommands::Edit {
            name,
            rename,
            description,
        } => {
            let new_name = match rename {
                Some(rename) => rename,
                None => service.get_type(ctx, table, &name)?.name,
            };
            let update = NewNamedType {
                name: new_name,
                description,
            };
            let named = service.update_type(ctx, table, &name, update)?;
            if !out.structured(&named)? {
                out.success(format!("Updated {} '{}'", table.label(), named.name));
            }
        }
        TypeCommands::Rm { name } => {
            let named = service.delete_type(ctx, table, &name)?;
            out.success(format!("Deleted {} '{}'", table.label(), named.name));
        }
    }
    Ok(())
}

pub fn run(cmd: AdminCommands, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let Session { service, ctx, out } = &session;
    match cmd {
        AdminCommands::ReqType(cmd) => run_types(&session, TypeTable::Requirement, cmd)?,
        AdminCommands::RelType(cmd) => run_types(&session, TypeTable::Relationship, cmd)?,
        AdminCommands::Model(cmd) => match cmd {
            ModelCommands::List { kind } => out.list(&service.list_status_models(ctx, kind)?)?,
            ModelCommands::Show { model } => {
                print_workflow(out, &service.get_status_model(ctx, &model)?)?
            }
            ModelCommands::Add {
                kind,
                name,
                description,
            } => {
                let model = service.create_status_model(
                    ctx,
                    NewStatusModel {
                        entity_type: kind,
                        name,
                        description,
                    },
                )?;
                if !out.structured(&model)? {
                    out.success(format!("Created status model '{}' ({})", model.name, model.id));
                }
            }
            ModelCommands::Edit {
                model,
                name,
                description,
            } => {
                let model = service.update_status_model(
                    ctx,
                    &model,
                    name.as_deref(),
                    description.as_deref(),
                )?;
                if !out.structured(&model)? {
                    out.success(format!("Updated status model '{}'", model.name));
                }
            }
            ModelCommands::Rm { model } => {
                let model = service.delete_status_model(ctx, &model)?;
                out.success(format!("Deleted status model '{}'", model.name));
            }
            ModelCommands::Validate { model } => {
                let validation = service.validate_status_model(ctx, &model)?;
                if !out.structured(&validation)? {
                    if validation.valid {
                        out.success("Model is valid");
                    } else {
                        for issue in &validation.issues {
                            out.warn(issue);
                        }
                        return Err(miette::miette!(
                            "model has {} issue(s)",
                            validation.issues.len()
                        ));
                    }
                }
            }
            ModelCommands::Default { model } => {
                let model = service.set_default_status_model(ctx, &model)?;
                if !out.structured(&model)? {
                    out.success(format!(
                        "'{}' is now the default {} model",
                        model.name, model.entity_type
                    ));
                }
            }
        },
        AdminCommands::Status(cmd) => match cmd {
            StatusCommands::Add {
                model,
                name,
                description,
                color,
                initial,
                is_final,
                order,
            } => {
                let status = service.add_status(
                    ctx,
                    &model,
                    NewStatus {
                        name,
                        description,
                        color,
                        is_initial: initial,
                        is_final,
                        sort_order: order,
                    },
                )?;
                if !out.structured(&status)? {
                    out.success(format!("Added status '{}'", status.name));
                }
            }
            StatusCommands::Edit {
                model,
                status,
                rename,
                description,
                color,
                initial,
                is_final,
                order,
            } => {
                let update = StatusUpdate {
                    name: rename,
                    description,
                    color,
                    is_initial: initial,
                    is_final,
                    sort_order: order,
                };
                let updated = service.update_status(ctx, &model, &status, update)?;
                if !out.structured(&updated)? {
                    out.success(format!("Updated status '{}'", updated.name));
                }
            }
            StatusCommands::Rm { model, status } => {
                let status = service.delete_status(ctx, &model, &status)?;
                out.success(format!("Deleted status '{}'", status.name));
            }
        },
        AdminCommands::Transition(cmd) => match cmd {
            TransitionCommands::Add {
                model,
                from,
                to,
                name,
            } => {
                let transition =
                    service.add_transition(ctx, &model, NewTransition { from, to, name })?;
                if !out.structured(&transition)? {
                    out.success(format!(
                        "Added transition {}→{}",
                        transition.from_status, transition.to_status
                    ));
                }
            }
            TransitionCommands::Rm { model, from, to } => {
                let transition = service.delete_transition(ctx, &model, &from, &to)?;
                out.success(format!(
                    "Removed transition {}→{}",
                    transition.from_status, transition.to_status
                ));
            }
        },
    }
    Ok(())
}
