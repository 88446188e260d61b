//! `storyline search` and `storyline suggest` commands

use console::style;
use miette::Result;

use crate::cli::commands::{FilterArgs, Session};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::identity::RecordKind;
use crate::core::query::{Page, SortOrder};
use crate::service::{SearchQuery, SearchSort};

#[derive(clap::Args, Debug)]
pub struct SearchArgs {
    /// Search text; omit to list everything matching the filters
    #[arg(default_value = "")]
    pub query: String,

    /// Kinds to search (repeatable): epic, story, ac, req, comment
    #[arg(long = "type", short = 't')]
    pub entity_types: Vec<RecordKind>,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// Sort key
    #[arg(long, value_enum, default_value_t = SearchSort::Relevance)]
    pub sort: SearchSort,

    /// Sort direction (ignored for relevance)
    #[arg(long, value_enum, default_value_t = SortOrder::Desc)]
    pub order: SortOrder,

    #[arg(long, short = 'n')]
    pub limit: Option<i64>,

    #[arg(long)]
    pub offset: Option<i64>,
}

#[derive(clap::Args, Debug)]
pub struct SuggestArgs {
    /// At least two characters
    pub prefix: String,

    /// Maximum suggestions per bucket
    #[arg(long, short = 'n')]
    pub limit: Option<i64>,
}

pub fn run_search(args: SearchArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let Session { service, ctx, out } = &session;

    let query = SearchQuery {
        query: args.query,
        entity_types: args.entity_types,
        filter: args.filter.filter(&session)?,
        sort_by: args.sort,
        sort_order: args.order,
        page: Page::new(args.limit, args.offset)?,
    };

    // JSON goes out exactly as cached so repeated searches are byte-identical
    if out.format() == OutputFormat::Json {
        let (body, cache_hit) = service.search_raw(ctx, &query)?;
        tracing::debug!(cache_hit, "search served");
        println!("{}", body);
        return Ok(());
    }

    let response = service.search(ctx, &query)?;
    if out.structured(&response)? {
        return Ok(());
    }
    out.list(&response.data)?;
    if response.data.is_empty() {
        out.note(style("No matches").dim());
    } else {
        out.note(
            style(format!(
                "{}-{} of {} match(es){}",
                response.offset + 1,
                response.offset + response.data.len() as i64,
                response.total_count,
                if response.cache_hit { " (cached)" } else { "" }
            ))
            .dim(),
        );
    }
    Ok(())
}

pub fn run_suggest(args: SuggestArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let Session { service, ctx, out } = &session;
    let suggestions = service.suggest(ctx, &args.prefix, args.limit)?;
    if out.structured(&suggestions)? {
        return Ok(());
    }
    if out.format() != OutputFormat::Table {
        let mut all = suggestions.reference_ids.clone();
        all.extend(suggestions.titles.iter().cloned());
        return out.list(&all);
    }
    if !suggestions.reference_ids.is_empty() {
        println!("{}", style("Reference IDs").bold());
        out.list(&suggestions.reference_ids)?;
    }
    if !suggestions.titles.is_empty() {
        println!("{}", style("Titles").bold());
        out.list(&suggestions.titles)?;
    }
    if !suggestions.statuses.is_empty() {
        println!("{}", style("Statuses").bold());
        for status in &suggestions.statuses {
            println!("  {}", status);
        }
    }
    Ok(())
}
