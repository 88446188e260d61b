//! `storyline comment` command - threaded and inline comments

use clap::Subcommand;
use console::style;
use miette::Result;

use crate::cli::commands::Session;
use crate::cli::helpers::{confirm, text_arg};
use crate::cli::output::Printer;
use crate::cli::GlobalOpts;
use crate::core::identity::EntityKind;
use crate::core::query::Page;
use crate::entities::comment::{CommentState, CommentThread};
use crate::service::{NewComment, NewInlineComment};

#[derive(Subcommand, Debug)]
pub enum CommentCommands {
    /// Comment on an entity
    Add {
        kind: EntityKind,
        key: String,
        /// Comment text ("-" reads stdin)
        content: String,
    },
    /// Reply to a comment
    Reply {
        parent: String,
        /// Reply text ("-" reads stdin)
        content: String,
    },
    /// Anchor a comment to a span of the entity's description
    Inline {
        kind: EntityKind,
        key: String,
        /// First character of the span (0-based)
        #[arg(long)]
        start: i64,
        /// One past the last character of the span
        #[arg(long)]
        end: i64,
        /// The quoted text, which must equal the span
        #[arg(long)]
        text: String,
        content: String,
    },
    /// Show a comment with all its replies
    Show { id: String },
    /// Replace a comment's text (author or administrator)
    Edit { id: String, content: String },
    /// Mark a root comment resolved
    Resolve { id: String },
    /// Reopen a resolved comment
    Unresolve { id: String },
    /// List comments on an entity, or across entities by state
    List(ListCommentArgs),
    /// Direct replies to a comment
    Replies { id: String },
    /// Delete a comment and its replies
    Delete {
        id: String,
        /// Skip confirmation
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

#[derive(clap::Args, Debug)]
pub struct ListCommentArgs {
    /// Entity kind (with KEY)
    pub kind: Option<EntityKind>,
    /// Entity reference or ULID
    #[arg(requires = "kind")]
    pub key: Option<String>,
    /// Only open or only resolved root comments
    #[arg(long, value_enum)]
    pub state: Option<CommentState>,
    /// Only inline comments whose anchor still holds
    #[arg(long, conflicts_with = "state")]
    pub visible_inline: bool,
    #[arg(long, short = 'n')]
    pub limit: Option<i64>,
    #[arg(long)]
    pub offset: Option<i64>,
}

fn print_thread(out: &Printer, thread: &CommentThread) -> Result<()> {
    if out.structured(thread)? {
        return Ok(());
    }
    fn walk(thread: &CommentThread) {
        let c = &thread.comment;
        let indent = "  ".repeat(c.depth.max(0) as usize);
        let mut tags = Vec::new();
        if c.is_resolved {
            tags.push(style("resolved").green().to_string());
        }
        if c.is_stale {
            tags.push(style("stale").yellow().to_string());
        }
        println!(
            "{}{} {}{}",
            indent,
            style(c.id).dim(),
            c.created_at.format("%Y-%m-%d %H:%M"),
            if tags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", tags.join(", "))
            }
        );
        if let Some(linked) = &c.linked_text {
            println!("{}  > {}", indent, style(linked).italic());
        }
        for line in c.content.lines() {
            println!("{}  {}", indent, line);
        }
        for reply in &thread.replies {
            walk(reply);
        }
    }
    walk(thread);
    Ok(())
}

pub fn run(cmd: CommentCommands, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let Session { service, ctx, out } = &session;
    match cmd {
        CommentCommands::Add { kind, key, content } => {
            let comment = service.create_comment(
                ctx,
                NewComment {
                    entity_type: kind,
                    entity: key,
                    content: text_arg(&content)?,
                    parent_comment_id: None,
                },
            )?;
            if !out.structured(&comment)? {
                out.success(format!("Added comment {}", comment.id));
            }
        }
        CommentCommands::Reply { parent, content } => {
            let comment = service.reply_to_comment(ctx, &parent, &text_arg(&content)?)?;
            if !out.structured(&comment)? {
                out.success(format!("Replied with {} (depth {})", comment.id, comment.depth));
            }
        }
        CommentCommands::Inline {
            kind,
            key,
            start,
            end,
            text,
            content,
        } => {
            let comment = service.create_inline_comment(
                ctx,
                NewInlineComment {
                    entity_type: kind,
                    entity: key,
                    content: text_arg(&content)?,
                    linked_text: text,
                    text_position_start: start,
                    text_position_end: end,
                },
            )?;
            if !out.structured(&comment)? {
                out.success(format!("Added inline comment {} on {}..{}", comment.id, start, end));
            }
        }
        CommentCommands::Show { id } => {
            let thread = service.get_thread(ctx, &id)?;
            print_thread(out, &thread)?;
        }
        CommentCommands::Edit { id, content } => {
            let comment = service.update_comment_content(ctx, &id, &text_arg(&content)?)?;
            if !out.structured(&comment)? {
                out.success(format!("Updated comment {}", comment.id));
            }
        }
        CommentCommands::Resolve { id } => {
            let comment = service.resolve_comment(ctx, &id)?;
            if !out.structured(&comment)? {
                out.success(format!("Resolved {}", comment.id));
            }
        }
        CommentCommands::Unresolve { id } => {
            let comment = service.unresolve_comment(ctx, &id)?;
            if !out.structured(&comment)? {
                out.success(format!("Reopened {}", comment.id));
            }
        }
        CommentCommands::List(args) => {
            let target = match (args.kind, args.key.as_deref()) {
                (Some(kind), Some(key)) => Some((kind, key)),
                (Some(_), None) => return Err(miette::miette!("an entity kind needs a KEY")),
                _ => None,
            };
            if let Some(state) = args.state {
                let page = Page::new(args.limit, args.offset)?;
                let comments = service.list_comments_by_status(ctx, state, target, page)?;
                out.page(&comments, "comment(s)")?;
                return Ok(());
            }
            let (kind, key) =
                target.ok_or_else(|| miette::miette!("pass KIND KEY, or --state open|resolved"))?;
            let comments = if args.visible_inline {
                service.get_visible_inline_comments(ctx, kind, key)?
            } else {
                service.list_comments_by_entity(ctx, kind, key)?
            };
            out.list(&comments)?;
        }
        CommentCommands::Replies { id } => {
            out.list(&service.list_replies(ctx, &id)?)?;
        }
        CommentCommands::Delete { id, yes } => {
            if !yes && !confirm(&format!("Delete comment {} and all its replies?", id))? {
                out.note("Aborted.");
                return Ok(());
            }
            let removed = service.delete_comment(ctx, &id)?;
            out.success(format!("Deleted {} comment(s)", removed));
        }
    }
    Ok(())
}
