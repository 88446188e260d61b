//! `storyline init` command - create an installation and bootstrap it

use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::commands::open_service;
use crate::cli::output::Printer;
use crate::cli::GlobalOpts;
use crate::core::project::{Project, ProjectError};

#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// Directory to initialize (default: current directory)
    #[arg(default_value = ".")]
    pub path: std::path::PathBuf,

    /// Username of the first administrator
    #[arg(long, env = "STORYLINE_ADMIN", default_value = "admin")]
    pub admin: String,

    /// Rewrite the configuration even if .storyline/ already exists
    #[arg(long)]
    pub force: bool,
}

pub fn run(args: InitArgs, global: &GlobalOpts) -> Result<()> {
    let out = Printer::new(global);
    let path = if args.path.as_os_str() == "." {
        std::env::current_dir().into_diagnostic()?
    } else {
        args.path.clone()
    };

    if !path.exists() {
        std::fs::create_dir_all(&path).into_diagnostic()?;
    }

    let project = if args.force {
        Project::init_force(&path)
    } else {
        Project::init(&path)
    };
    let project = match project {
        Ok(project) => {
            out.success(format!(
                "Initialized storyline installation at {}",
                style(project.root().display()).cyan()
            ));
            project
        }
        Err(ProjectError::AlreadyExists(root)) => {
            out.note(format!(
                "{} Installation already exists at {}; re-seeding",
                style("!").yellow(),
                style(root.display()).cyan()
            ));
            Project::discover_from(&root).map_err(|e| miette::miette!("{}", e))?
        }
        Err(e) => return Err(miette::miette!("{}", e)),
    };

    let service = open_service(&project)?;
    let summary = service.initialize(&args.admin)?;
    if out.structured(&summary)? {
        return Ok(());
    }

    if summary.seed.is_empty() {
        out.note("Reference data already present");
    } else {
        out.success(format!(
            "Seeded {} requirement type(s), {} relationship type(s), {} status model(s)",
            summary.seed.requirement_types,
            summary.seed.relationship_types,
            summary.seed.status_models
        ));
    }
    if summary.admin_created {
        out.success(format!(
            "Created administrator {}",
            style(&summary.admin.username).cyan()
        ));
    } else {
        out.note(format!(
            "User {} already exists ({})",
            style(&summary.admin.username).cyan(),
            summary.admin.role
        ));
    }
    out.note("");
    out.note("Next steps:");
    out.note(format!(
        "  {} Create your first epic",
        style(format!("storyline --as {} epic new \"Title\"", summary.admin.username)).yellow()
    ));
    out.note(format!(
        "  {} Add teammates",
        style("storyline user add <username> --role user").yellow()
    ));
    Ok(())
}
