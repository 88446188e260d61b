use clap::Parser;
use miette::Result;
use storyline::cli::commands;
use storyline::cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Terminate quietly on a closed pipe (`storyline epic list | head`)
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    let global = cli.global;

    // RUST_LOG wins; otherwise warnings only, or debug with --verbose
    let default_level = if global.verbose { "storyline=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Init(args) => commands::init::run(args, &global),
        Commands::Epic(cmd) => commands::epic::run(cmd, &global),
        Commands::Story(cmd) => commands::story::run(cmd, &global),
        Commands::Ac(cmd) => commands::ac::run(cmd, &global),
        Commands::Req(cmd) => commands::req::run(cmd, &global),
        Commands::Comment(cmd) => commands::comment::run(cmd, &global),
        Commands::Link(cmd) => commands::link::run(cmd, &global),
        Commands::Workflow(cmd) => commands::workflow::run(cmd, &global),
        Commands::Search(args) => commands::search::run_search(args, &global),
        Commands::Suggest(args) => commands::search::run_suggest(args, &global),
        Commands::Impact(args) => commands::impact::run_impact(args, &global),
        Commands::Delete(args) => commands::impact::run_delete(args, &global),
        Commands::Admin(cmd) => commands::admin::run(cmd, &global),
        Commands::User(cmd) => commands::user::run(cmd, &global),
        Commands::Health(args) => commands::health::run(args, &global),
        Commands::Completions(args) => commands::completions::run(args),
    }
}
