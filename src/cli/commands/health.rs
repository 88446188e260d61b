//! `storyline health` command - liveness and readiness checks

use console::style;
use miette::Result;

use crate::cli::commands::{discover_project, open_service};
use crate::cli::output::Printer;
use crate::cli::GlobalOpts;
use crate::service::ComponentHealth;

#[derive(clap::Args, Debug)]
pub struct HealthArgs {
    /// Only report liveness
    #[arg(long)]
    pub live: bool,
}

fn component(name: &str, health: &ComponentHealth) {
    let mark = if health.ok {
        style("✓").green()
    } else {
        style("✗").red()
    };
    match &health.error {
        Some(error) => println!("{} {:<9} {}ms  {}", mark, name, health.latency_ms, error),
        None => println!("{} {:<9} {}ms", mark, name, health.latency_ms),
    }
}

/// Health checks need no user; a failed readiness check exits non-zero
pub fn run(args: HealthArgs, global: &GlobalOpts) -> Result<()> {
    let out = Printer::new(global);
    let project = discover_project(global)?;
    let service = open_service(&project)?;

    if args.live {
        let liveness = service.liveness();
        if !out.structured(&liveness)? {
            out.success(liveness.status);
        }
        return Ok(());
    }

    let readiness = service.readiness();
    if !out.structured(&readiness)? {
        component("database", &readiness.database);
        component("cache", &readiness.cache);
        if let Some(version) = &readiness.schema_version {
            println!("  schema    {}", version);
        }
    }
    if readiness.ready {
        Ok(())
    } else {
        Err(miette::miette!("not ready"))
    }
}
