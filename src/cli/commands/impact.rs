//! `storyline impact` and `storyline delete` commands

use console::style;
use miette::Result;

use crate::cli::commands::Session;
use crate::cli::helpers::confirm;
use crate::cli::output::Printer;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::identity::{EntityKey, EntityKind};
use crate::entities::impact::{DeletionReport, DependencyReport};
use crate::service::DeleteOptions;

#[derive(clap::Args, Debug)]
pub struct ImpactArgs {
    /// Reference ID (EP-001, US-002, ...) or ULID with --kind
    pub key: String,

    /// Entity kind; required only for bare ULIDs
    #[arg(long, short = 'k')]
    pub kind: Option<EntityKind>,
}

#[derive(clap::Args, Debug)]
pub struct DeleteArgs {
    /// Reference ID (EP-001, US-002, ...) or ULID with --kind
    pub key: String,

    /// Entity kind; required only for bare ULIDs
    #[arg(long, short = 'k')]
    pub kind: Option<EntityKind>,

    /// Delete everything that depends on the entity as well
    #[arg(long)]
    pub cascade: bool,

    /// Report what would be deleted without deleting
    #[arg(long)]
    pub dry_run: bool,

    /// Skip confirmation
    #[arg(long, short = 'y')]
    pub yes: bool,
}

/// The kind named by `--kind`, else the reference tag
fn target_kind(key: &str, kind: Option<EntityKind>) -> Result<EntityKind> {
    if let Some(kind) = kind {
        return Ok(kind);
    }
    let (tagged, _) = EntityKey::parse_any(key).map_err(crate::core::error::Error::from)?;
    tagged.ok_or_else(|| miette::miette!("'{}' has no reference tag; pass --kind", key))
}

fn print_dependencies(out: &Printer, report: &DependencyReport) -> Result<()> {
    println!(
        "{} {}",
        style(report.target.to_string()).bold(),
        report.target.title
    );
    if report.dependencies.is_empty() {
        println!("{}", style("Nothing depends on it").dim());
    } else {
        let counts = report
            .counts()
            .iter()
            .map(|(kind, n)| format!("{} {}", n, kind))
            .collect::<Vec<_>>()
            .join(", ");
        println!("{} dependent record(s): {}", report.dependencies.len(), counts);
        out.list(&report.dependencies)?;
    }
    for warning in &report.warnings {
        out.warn(warning);
    }
    if !report.blocking.is_empty() {
        println!("{}", style("Blocked by records outside the deletion:").red());
        out.list(&report.blocking)?;
    }
    Ok(())
}

fn print_deletion(out: &Printer, report: &DeletionReport) -> Result<()> {
    if out.structured(report)? {
        return Ok(());
    }
    if report.dry_run {
        out.note(format!(
            "Would delete {} and {} dependent record(s) (dry run)",
            report.target,
            report.total().saturating_sub(1)
        ));
        out.list(&report.deleted)?;
    } else {
        out.success(format!(
            "Deleted {} ({} record(s) in total)",
            report.target,
            report.total()
        ));
    }
    for warning in &report.warnings {
        out.warn(warning);
    }
    Ok(())
}

pub fn run_impact(args: ImpactArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let kind = target_kind(&args.key, args.kind)?;
    let report = session.service.validate_deletion(&session.ctx, kind, &args.key)?;
    if session.out.structured(&report)? {
        return Ok(());
    }
    if session.out.format() != OutputFormat::Table {
        return session.out.list(&report.dependencies);
    }
    print_dependencies(&session.out, &report)
}

pub fn run_delete(args: DeleteArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let Session { service, ctx, out } = &session;
    let kind = target_kind(&args.key, args.kind)?;
    let options = DeleteOptions {
        cascade: args.cascade,
        dry_run: args.dry_run,
    };

    if !args.dry_run && !args.yes {
        let report = service.validate_deletion(ctx, kind, &args.key)?;
        print_dependencies(out, &report)?;
        let prompt = if report.dependencies.is_empty() || !args.cascade {
            format!("Delete {}?", report.target)
        } else {
            format!(
                "Delete {} and {} dependent record(s)?",
                report.target,
                report.dependencies.len()
            )
        };
        if !confirm(&prompt)? {
            out.note("Aborted.");
            return Ok(());
        }
    }

    let report = service.delete_entity(ctx, kind, &args.key, options)?;
    print_deletion(out, &report)
}
