//! Comment entity type: threaded, optionally anchored inline

use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::core::anchor::Anchor;
use crate::core::identity::{EntityId, EntityKind};
use crate::store::sql::Timestamp;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: EntityId,
    pub entity_type: EntityKind,
    pub entity_id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_comment_id: Option<EntityId>,
    /// Thread depth, root = 0
    pub depth: i64,
    pub author_id: EntityId,
    pub content: String,
    pub is_resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_position_start: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_position_end: Option<i64>,
    pub is_stale: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    pub(crate) const SELECT: &'static str = "SELECT c.id, c.entity_type, c.entity_id, c.parent_comment_id, c.depth, \
         c.author_id, c.content, c.is_resolved, c.resolved_by, c.resolved_at, c.linked_text, \
         c.text_position_start, c.text_position_end, c.is_stale, c.created_at, c.updated_at \
         FROM comments c";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            entity_type: row.get("entity_type")?,
            entity_id: row.get("entity_id")?,
            parent_comment_id: row.get("parent_comment_id")?,
            depth: row.get("depth")?,
            author_id: row.get("author_id")?,
            content: row.get("content")?,
            is_resolved: row.get("is_resolved")?,
            resolved_by: row.get("resolved_by")?,
            resolved_at: row
                .get::<_, Option<Timestamp>>("resolved_at")?
                .map(|t| t.0),
            linked_text: row.get("linked_text")?,
            text_position_start: row.get("text_position_start")?,
            text_position_end: row.get("text_position_end")?,
            is_stale: row.get("is_stale")?,
            created_at: row.get::<_, Timestamp>("created_at")?.0,
            updated_at: row.get::<_, Timestamp>("updated_at")?.0,
        })
    }

    pub fn is_inline(&self) -> bool {
        self.linked_text.is_some()
    }

    pub fn is_root(&self) -> bool {
        self.parent_comment_id.is_none()
    }

    /// The anchor, for inline comments
    pub fn anchor(&self) -> Option<Anchor> {
        match (
            &self.linked_text,
            self.text_position_start,
            self.text_position_end,
        ) {
            (Some(text), Some(start), Some(end)) => Some(Anchor {
                linked_text: text.clone(),
                start,
                end,
            }),
            _ => None,
        }
    }
}

/// Resolution filter for listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CommentState {
    Open,
    Resolved,
}

/// A comment with its replies, recursively
#[derive(Debug, Clone, Serialize)]
pub struct CommentThread {
    #[serde(flatten)]
    pub comment: Comment,
    pub replies: Vec<CommentThread>,
}

impl CommentThread {
    /// Assemble a thread from a flat list holding the root and its descendants
    pub fn build(root: Comment, mut rest: Vec<Comment>) -> Self {
        rest.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Self::attach(root, &rest)
    }

    fn attach(comment: Comment, pool: &[Comment]) -> Self {
        let replies = pool
            .iter()
            .filter(|c| c.parent_comment_id == Some(comment.id))
            .cloned()
            .map(|c| Self::attach(c, pool))
            .collect();
        Self { comment, replies }
    }

    /// Number of comments in the thread, including the root
    pub fn count(&self) -> usize {
        1 + self.replies.iter().map(CommentThread::count).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sql::now;

    fn comment(id: EntityId, parent: Option<EntityId>, depth: i64) -> Comment {
        let ts = now();
        Comment {
            id,
            entity_type: EntityKind::Epic,
            entity_id: EntityId::new(),
            parent_comment_id: parent,
            depth,
            author_id: EntityId::new(),
            content: "c".into(),
            is_resolved: false,
            resolved_by: None,
            resolved_at: None,
            linked_text: None,
            text_position_start: None,
            text_position_end: None,
            is_stale: false,
            created_at: ts,
            updated_at: ts,
        }
    }

    #[test]
    fn test_thread_assembly() {
        let (r, a, b, c) = (EntityId::new(), EntityId::new(), EntityId::new(), EntityId::new());
        let thread = CommentThread::build(
            comment(r, None, 0),
            vec![
                comment(a, Some(r), 1),
                comment(b, Some(a), 2),
                comment(c, Some(r), 1),
            ],
        );
        assert_eq!(thread.count(), 4);
        assert_eq!(thread.replies.len(), 2);
        let nested: usize = thread.replies.iter().map(|t| t.replies.len()).sum();
        assert_eq!(nested, 1);
    }

    #[test]
    fn test_anchor_only_for_inline() {
        let mut c = comment(EntityId::new(), None, 0);
        assert!(c.anchor().is_none());
        c.linked_text = Some("abc".into());
        c.text_position_start = Some(0);
        c.text_position_end = Some(3);
        assert_eq!(c.anchor().unwrap().end, 3);
        assert!(c.is_inline());
    }
}
