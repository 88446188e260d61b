//! Comments: threading, inline anchors, resolution

use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;

use super::items::{self, resolve_id};
use super::Service;
use crate::core::anchor::{stale_anchors, Anchor};
use crate::core::context::RequestContext;
use crate::core::error::{Error, Result};
use crate::core::identity::{EntityId, EntityKind, RecordKind};
use crate::core::principal::{Permission, Principal};
use crate::core::query::{ListResponse, Page};
use crate::entities::comment::{Comment, CommentState, CommentThread};
use crate::store::sql::{now, Timestamp, WhereClause};

/// A plain (optionally threaded) comment
#[derive(Debug, Clone, Deserialize)]
pub struct NewComment {
    pub entity_type: EntityKind,
    /// Target entity, by ID or reference ID
    pub entity: String,
    pub content: String,
    /// Comment being replied to; its target must match
    pub parent_comment_id: Option<EntityId>,
}

/// A root comment anchored to `[start, end)` of the target's description
#[derive(Debug, Clone, Deserialize)]
pub struct NewInlineComment {
    pub entity_type: EntityKind,
    pub entity: String,
    pub content: String,
    pub linked_text: String,
    pub text_position_start: i64,
    pub text_position_end: i64,
}

fn get_comment_in(conn: &Connection, id: EntityId) -> Result<Comment> {
    conn.query_row(
        &format!("{} WHERE c.id = ?1", Comment::SELECT),
        params![id],
        Comment::from_row,
    )
    .optional()?
    .ok_or_else(|| Error::not_found("comment", id))
}

fn parse_comment_id(s: &str) -> Result<EntityId> {
    Ok(EntityId::parse(s.trim())?)
}

/// Comments on one entity, oldest first
fn comments_of(conn: &Connection, kind: EntityKind, id: EntityId) -> Result<Vec<Comment>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE c.entity_type = ?1 AND c.entity_id = ?2 ORDER BY c.created_at, c.id",
        Comment::SELECT
    ))?;
    let rows = stmt
        .query_map(params![kind, id], Comment::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn inline_comments_of(conn: &Connection, kind: EntityKind, id: EntityId) -> Result<Vec<Comment>> {
    Ok(comments_of(conn, kind, id)?
        .into_iter()
        .filter(Comment::is_inline)
        .collect())
}

/// `comment` plus every reply beneath it
fn subtree_of(conn: &Connection, root: EntityId) -> Result<Vec<Comment>> {
    let mut stmt = conn.prepare(&format!(
        "WITH RECURSIVE tree(id) AS ( \
             SELECT ?1 \
             UNION ALL \
             SELECT c.id FROM comments c JOIN tree ON c.parent_comment_id = tree.id \
         ) \
         {} WHERE c.id IN (SELECT id FROM tree) ORDER BY c.depth DESC, c.created_at, c.id",
        Comment::SELECT
    ))?;
    let rows = stmt
        .query_map(params![root], Comment::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn ensure_author(principal: &Principal, comment: &Comment, action: &str) -> Result<()> {
    if comment.author_id != principal.user_id && !principal.is_admin() {
        return Err(Error::Forbidden {
            role: principal.role,
            action: format!("{action} another user's comment"),
        });
    }
    Ok(())
}

/// Recompute `is_stale` for every inline comment on an entity against a new
/// description. Returns the comments that became stale.
pub(super) fn restale_inline_comments(
    conn: &Connection,
    kind: EntityKind,
    id: EntityId,
    new_description: &str,
    ts: Timestamp,
) -> Result<Vec<EntityId>> {
    let inline = inline_comments_of(conn, kind, id)?;
    let anchored: Vec<(EntityId, Anchor)> = inline
        .iter()
        .filter_map(|c| c.anchor().map(|a| (c.id, a)))
        .collect();
    let stale = stale_anchors(new_description, anchored.iter().map(|(id, a)| (*id, a)));

    let mut newly_stale = Vec::new();
    for comment in &inline {
        let should_be_stale = stale.contains(&comment.id);
        if comment.is_stale == should_be_stale {
            continue;
        }
        conn.execute(
            "UPDATE comments SET is_stale = ?1, updated_at = ?2 WHERE id = ?3",
            params![should_be_stale, ts, comment.id],
        )?;
        if should_be_stale {
            newly_stale.push(comment.id);
        }
    }
    if !newly_stale.is_empty() {
        tracing::debug!(
            kind = %kind,
            id = %id,
            count = newly_stale.len(),
            "inline comments marked stale",
        );
    }
    Ok(newly_stale)
}

impl Service {
    fn insert_comment(
        &self,
        conn: &Connection,
        author: EntityId,
        kind: EntityKind,
        target: EntityId,
        content: &str,
        parent: Option<&Comment>,
        anchor: Option<&Anchor>,
    ) -> Result<Comment> {
        let depth = match parent {
            Some(p) => {
                let depth = p.depth + 1;
                let max = self.config.comments.max_depth();
                if depth > max {
                    return Err(Error::validation(format!(
                        "replies may nest at most {} levels deep",
                        self.config.comments.max_thread_levels
                    )));
                }
                depth
            }
            None => 0,
        };
        let id = EntityId::new();
        let ts = Timestamp(now());
        conn.execute(
            "INSERT INTO comments (id, entity_type, entity_id, parent_comment_id, depth, author_id, content, \
             linked_text, text_position_start, text_position_end, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
            params![
                id,
                kind,
                target,
                parent.map(|p| p.id),
                depth,
                author,
                content,
                anchor.map(|a| a.linked_text.as_str()),
                anchor.map(|a| a.start),
                anchor.map(|a| a.end),
                ts
            ],
        )?;
        get_comment_in(conn, id)
    }

    /// Comment on an entity, or reply when `parent_comment_id` is set
    pub fn create_comment(&self, ctx: &RequestContext, input: NewComment) -> Result<Comment> {
        let author = ctx.require(Permission::Comment)?.user_id;
        let content = items::required_text("content", &input.content)?;
        let comment = self.store.write(ctx, "create comment", |tx| {
            let target = resolve_id(tx, input.entity_type, &input.entity)?;
            let parent = match input.parent_comment_id {
                Some(parent_id) => {
                    let parent = get_comment_in(tx, parent_id)?;
                    if parent.entity_type != input.entity_type || parent.entity_id != target {
                        return Err(Error::validation(format!(
                            "reply target {} {} does not match parent comment target {} {}",
                            input.entity_type, target, parent.entity_type, parent.entity_id
                        )));
                    }
                    Some(parent)
                }
                None => None,
            };
            self.insert_comment(
                tx,
                author,
                input.entity_type,
                target,
                &content,
                parent.as_ref(),
                None,
            )
        })?;
        tracing::info!(
            kind = %comment.entity_type,
            entity_id = %comment.entity_id,
            depth = comment.depth,
            "created comment",
        );
        self.invalidate(&[RecordKind::Comment]);
        Ok(comment)
    }

    /// Reply to a comment; the reply inherits its parent's target
    pub fn reply_to_comment(
        &self,
        ctx: &RequestContext,
        parent: &str,
        content: &str,
    ) -> Result<Comment> {
        let author = ctx.require(Permission::Comment)?.user_id;
        let content = items::required_text("content", content)?;
        let parent_id = parse_comment_id(parent)?;
        let comment = self.store.write(ctx, "reply to comment", |tx| {
            let parent = get_comment_in(tx, parent_id)?;
            self.insert_comment(
                tx,
                author,
                parent.entity_type,
                parent.entity_id,
                &content,
                Some(&parent),
                None,
            )
        })?;
        self.invalidate(&[RecordKind::Comment]);
        Ok(comment)
    }

    /// Root comment anchored to text of the target's current description
    pub fn create_inline_comment(
        &self,
        ctx: &RequestContext,
        input: NewInlineComment,
    ) -> Result<Comment> {
        let author = ctx.require(Permission::Comment)?.user_id;
        let content = items::required_text("content", &input.content)?;
        let anchor = Anchor::new(
            input.linked_text.clone(),
            input.text_position_start,
            input.text_position_end,
        )?;
        let comment = self.store.write(ctx, "create inline comment", |tx| {
            let target = resolve_id(tx, input.entity_type, &input.entity)?;
            let description =
                items::description_of(tx, input.entity_type, target)?.unwrap_or_default();
            anchor.verify(&description)?;
            self.insert_comment(
                tx,
                author,
                input.entity_type,
                target,
                &content,
                None,
                Some(&anchor),
            )
        })?;
        self.invalidate(&[RecordKind::Comment]);
        Ok(comment)
    }

    pub fn get_comment(&self, ctx: &RequestContext, id: &str) -> Result<Comment> {
        ctx.require(Permission::Read)?;
        let id = parse_comment_id(id)?;
        self.store.read(ctx, "get comment", |conn| get_comment_in(conn, id))
    }

    /// A comment and all replies beneath it, nested
    pub fn get_thread(&self, ctx: &RequestContext, id: &str) -> Result<CommentThread> {
        ctx.require(Permission::Read)?;
        let id = parse_comment_id(id)?;
        self.store.read(ctx, "get comment thread", |conn| {
            let mut all = subtree_of(conn, id)?;
            let root_pos = all
                .iter()
                .position(|c| c.id == id)
                .ok_or_else(|| Error::not_found("comment", id))?;
            let root = all.remove(root_pos);
            Ok(CommentThread::build(root, all))
        })
    }

    /// Edit content; only the author or an administrator may
    pub fn update_comment_content(
        &self,
        ctx: &RequestContext,
        id: &str,
        content: &str,
    ) -> Result<Comment> {
        let principal = ctx.require(Permission::Comment)?.clone();
        let content = items::required_text("content", content)?;
        let id = parse_comment_id(id)?;
        let (comment, changed) = self.store.write(ctx, "update comment", |tx| {
            let current = get_comment_in(tx, id)?;
            ensure_author(&principal, &current, "edit")?;
            if current.content == content {
                return Ok((current, false));
            }
            tx.execute(
                "UPDATE comments SET content = ?1, updated_at = ?2 WHERE id = ?3",
                params![content, Timestamp(now()), id],
            )?;
            Ok((get_comment_in(tx, id)?, true))
        })?;
        if changed {
            self.invalidate(&[RecordKind::Comment]);
        }
        Ok(comment)
    }

    /// Mark resolved; resolving twice keeps the first resolver and time
    pub fn resolve_comment(&self, ctx: &RequestContext, id: &str) -> Result<Comment> {
        let resolver = ctx.require(Permission::ResolveComment)?.user_id;
        let id = parse_comment_id(id)?;
        self.store.write(ctx, "resolve comment", |tx| {
            let current = get_comment_in(tx, id)?;
            if current.is_resolved {
                return Ok(current);
            }
            tx.execute(
                "UPDATE comments SET is_resolved = 1, resolved_by = ?1, resolved_at = ?2, updated_at = ?2 \
                 WHERE id = ?3",
                params![resolver, Timestamp(now()), id],
            )?;
            get_comment_in(tx, id)
        })
    }

    /// Clear resolution; a no-op on open comments
    pub fn unresolve_comment(&self, ctx: &RequestContext, id: &str) -> Result<Comment> {
        ctx.require(Permission::ResolveComment)?;
        let id = parse_comment_id(id)?;
        self.store.write(ctx, "unresolve comment", |tx| {
            let current = get_comment_in(tx, id)?;
            if !current.is_resolved {
                return Ok(current);
            }
            tx.execute(
                "UPDATE comments SET is_resolved = 0, resolved_by = NULL, resolved_at = NULL, updated_at = ?1 \
                 WHERE id = ?2",
                params![Timestamp(now()), id],
            )?;
            get_comment_in(tx, id)
        })
    }

    /// Delete a comment with its replies; only the author or an administrator
    /// may. Returns how many comments were removed.
    pub fn delete_comment(&self, ctx: &RequestContext, id: &str) -> Result<usize> {
        let principal = ctx.require(Permission::Comment)?.clone();
        let id = parse_comment_id(id)?;
        let removed = self.store.write(ctx, "delete comment", |tx| {
            let root = get_comment_in(tx, id)?;
            ensure_author(&principal, &root, "delete")?;
            let subtree = subtree_of(tx, id)?;
            for comment in &subtree {
                tx.execute("DELETE FROM comments WHERE id = ?1", params![comment.id])?;
            }
            Ok(subtree.len())
        })?;
        tracing::info!(comment_id = %id, removed, "deleted comment");
        self.invalidate(&[RecordKind::Comment]);
        Ok(removed)
    }

    /// Every comment on an entity, oldest first
    pub fn list_comments_by_entity(
        &self,
        ctx: &RequestContext,
        kind: EntityKind,
        key: &str,
    ) -> Result<Vec<Comment>> {
        ctx.require(Permission::Read)?;
        self.store.read(ctx, "list comments", |conn| {
            let id = resolve_id(conn, kind, key)?;
            comments_of(conn, kind, id)
        })
    }

    /// Direct replies to a comment
    pub fn list_replies(&self, ctx: &RequestContext, id: &str) -> Result<Vec<Comment>> {
        ctx.require(Permission::Read)?;
        let id = parse_comment_id(id)?;
        self.store.read(ctx, "list replies", |conn| {
            get_comment_in(conn, id)?;
            let mut stmt = conn.prepare(&format!(
                "{} WHERE c.parent_comment_id = ?1 ORDER BY c.created_at, c.id",
                Comment::SELECT
            ))?;
            let rows = stmt
                .query_map(params![id], Comment::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Open or resolved comments, across all entities or on one
    pub fn list_comments_by_status(
        &self,
        ctx: &RequestContext,
        state: CommentState,
        target: Option<(EntityKind, &str)>,
        page: Page,
    ) -> Result<ListResponse<Comment>> {
        ctx.require(Permission::Read)?;
        self.store.read(ctx, "list comments by status", |conn| {
            let mut filter = WhereClause::new();
            filter.and("c.is_resolved = ?", state == CommentState::Resolved);
            if let Some((kind, key)) = target {
                let id = resolve_id(conn, kind, key)?;
                filter.and("c.entity_type = ?", kind);
                filter.and("c.entity_id = ?", id);
            }
            items::list_page(
                conn,
                Comment::SELECT,
                &filter,
                "c.created_at ASC, c.id ASC",
                page,
                Comment::from_row,
            )
        })
    }

    /// Inline comments whose anchors still hold
    pub fn get_visible_inline_comments(
        &self,
        ctx: &RequestContext,
        kind: EntityKind,
        key: &str,
    ) -> Result<Vec<Comment>> {
        ctx.require(Permission::Read)?;
        self.store.read(ctx, "visible inline comments", |conn| {
            let id = resolve_id(conn, kind, key)?;
            Ok(inline_comments_of(conn, kind, id)?
                .into_iter()
                .filter(|c| !c.is_stale)
                .collect())
        })
    }

    /// Inline comments that `new_description` would strand, without writing
    pub fn validate_inline_anchors(
        &self,
        ctx: &RequestContext,
        kind: EntityKind,
        key: &str,
        new_description: &str,
    ) -> Result<Vec<Comment>> {
        ctx.require(Permission::Read)?;
        self.store.read(ctx, "validate inline anchors", |conn| {
            let id = resolve_id(conn, kind, key)?;
            Ok(inline_comments_of(conn, kind, id)?
                .into_iter()
                .filter(|c| c.anchor().is_some_and(|a| !a.matches(new_description)))
                .collect())
        })
    }
}
