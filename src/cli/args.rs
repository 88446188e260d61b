//! CLI argument definitions

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::cli::commands::{
    ac::AcCommands, admin::AdminCommands, comment::CommentCommands, completions::CompletionsArgs,
    epic::EpicCommands, health::HealthArgs, impact::{DeleteArgs, ImpactArgs}, init::InitArgs,
    link::LinkCommands, req::ReqCommands, search::{SearchArgs, SuggestArgs}, story::StoryCommands,
    user::UserCommands, workflow::WorkflowCommands,
};

#[derive(Parser)]
#[command(name = "storyline")]
#[command(author, version, about = "Storyline - product requirements management")]
#[command(propagate_version = true)]
#[command(after_help = "Examples:
  storyline init --admin alice                Create an installation
  storyline epic new \"Checkout\"               Create an epic (EP-001)
  storyline story new EP-001 \"Pay by card\"    Add a user story to it
  storyline req new US-001 \"Card form\" -t functional
  storyline search \"payment\" --type requirement
  storyline delete EP-001 --dry-run           Show what a delete would remove")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Debug, Clone)]
pub struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "table")]
    pub format: OutputFormat,

    /// Act as this user (overrides STORYLINE_USER and the configured user)
    #[arg(long = "as", global = true, value_name = "USERNAME")]
    pub user: Option<String>,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Installation root (default: auto-detect)
    #[arg(long, global = true)]
    pub project: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// JSON (pipeable, lossless)
    Json,
    /// YAML
    Yaml,
    /// CSV with a header row
    Csv,
    /// Markdown table
    Md,
    /// Reference IDs (or ULIDs) only, one per line
    Id,
}

impl OutputFormat {
    /// Machine formats never carry decoration
    pub fn is_structured(&self) -> bool {
        matches!(self, OutputFormat::Json | OutputFormat::Yaml)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create an installation, seed reference data and the first administrator
    Init(InitArgs),

    /// Epics
    #[command(subcommand)]
    Epic(EpicCommands),

    /// User stories
    #[command(subcommand)]
    Story(StoryCommands),

    /// Acceptance criteria
    #[command(subcommand)]
    Ac(AcCommands),

    /// Requirements
    #[command(subcommand)]
    Req(ReqCommands),

    /// Comments and inline annotations
    #[command(subcommand)]
    Comment(CommentCommands),

    /// Typed requirement relationships
    #[command(subcommand)]
    Link(LinkCommands),

    /// Status workflows
    #[command(subcommand)]
    Workflow(WorkflowCommands),

    /// Ranked full-text search
    Search(SearchArgs),

    /// Typeahead suggestions for a prefix
    Suggest(SuggestArgs),

    /// Show what deleting an entity would remove
    Impact(ImpactArgs),

    /// Delete an entity, optionally with everything under it
    Delete(DeleteArgs),

    /// Reference data: types, status models, statuses, transitions
    #[command(subcommand)]
    Admin(AdminCommands),

    /// User accounts
    #[command(subcommand)]
    User(UserCommands),

    /// Liveness and readiness
    Health(HealthArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}
