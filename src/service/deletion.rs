//! Deletion planner: dependency closure, impact reports and cascading deletes

use rusqlite::{params, Connection};
use std::collections::{HashSet, VecDeque};

use super::items::{self, resolve_id};
use super::Service;
use crate::core::context::RequestContext;
use crate::core::error::{Error, ErrorCode, Result};
use crate::core::identity::{EntityId, EntityKind, RecordKind, ReferenceId};
use crate::core::principal::Permission;
use crate::entities::impact::{
    BlockingReference, DeletionReport, DeletionTarget, DependencyNode, DependencyReport,
    DependencyType,
};

/// Comment excerpts in reports are cut to this many characters
const EXCERPT_CHARS: usize = 60;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Remove dependents too; without it any dependent fails the delete
    pub cascade: bool,
    /// Report what would be removed without removing it
    pub dry_run: bool,
}

fn excerpt(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(EXCERPT_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

/// Entity children of `parent`: (kind, id, reference, title)
fn children_of(
    conn: &Connection,
    kind: EntityKind,
    parent: EntityId,
) -> Result<Vec<(EntityKind, EntityId, ReferenceId, String)>> {
    let sources: &[(EntityKind, &str, &str)] = match kind {
        EntityKind::Epic => &[(EntityKind::UserStory, "title", "epic_id")],
        EntityKind::UserStory => &[
            (EntityKind::AcceptanceCriteria, "description", "user_story_id"),
            (EntityKind::Requirement, "title", "user_story_id"),
        ],
        EntityKind::AcceptanceCriteria | EntityKind::Requirement => &[],
    };
    let mut found = Vec::new();
    for &(child, title_col, parent_col) in sources {
        let mut stmt = conn.prepare(&format!(
            "SELECT id, reference_id, {title_col} FROM {} WHERE {parent_col} = ?1 ORDER BY reference_number",
            child.table()
        ))?;
        let rows = stmt
            .query_map(params![parent], |row| {
                Ok((child, row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        found.extend(rows);
    }
    Ok(found)
}

/// Every comment attached to an entity, replies included
fn comments_on(
    conn: &Connection,
    kind: EntityKind,
    id: EntityId,
) -> Result<Vec<(EntityId, String)>> {
    let mut stmt = conn.prepare(
        "SELECT id, content FROM comments WHERE entity_type = ?1 AND entity_id = ?2 \
         ORDER BY depth, created_at, id",
    )?;
    let rows = stmt
        .query_map(params![kind, id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

struct Edge {
    id: EntityId,
    source: EntityId,
    target: EntityId,
    label: String,
}

fn edges_touching(conn: &Connection, requirement: EntityId) -> Result<Vec<Edge>> {
    let mut stmt = conn.prepare(
        "SELECT rr.id, rr.source_requirement_id, rr.target_requirement_id, \
                src.reference_id, rt.name, tgt.reference_id \
         FROM requirement_relationships rr \
         JOIN requirements src ON src.id = rr.source_requirement_id \
         JOIN requirements tgt ON tgt.id = rr.target_requirement_id \
         JOIN relationship_types rt ON rt.id = rr.relationship_type_id \
         WHERE rr.source_requirement_id = ?1 OR rr.target_requirement_id = ?1 \
         ORDER BY src.reference_number, tgt.reference_number",
    )?;
    let rows = stmt
        .query_map(params![requirement], |row| {
            let source: ReferenceId = row.get(3)?;
            let name: String = row.get(4)?;
            let target: ReferenceId = row.get(5)?;
            Ok(Edge {
                id: row.get(0)?,
                source: row.get(1)?,
                target: row.get(2)?,
                label: format!("{source} {name} {target}"),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Breadth-first closure from the target through children, attached
/// comments and touching relationship edges
fn plan(conn: &Connection, kind: EntityKind, id: EntityId) -> Result<DependencyReport> {
    let (reference, title) = items::summary(conn, kind, id)?;
    let target = DeletionTarget {
        entity_type: kind,
        entity_id: id,
        reference_id: reference.to_string(),
        title,
    };

    let mut dependencies = Vec::new();
    let mut entities: HashSet<EntityId> = HashSet::from([id]);
    let mut seen_edges: HashSet<EntityId> = HashSet::new();
    let mut edges = Vec::new();
    let mut criteria = Vec::new();
    let mut queue = VecDeque::from([(kind, id)]);

    while let Some((node_kind, node)) = queue.pop_front() {
        if node_kind == EntityKind::AcceptanceCriteria {
            criteria.push(node);
        }
        for (child_kind, child, child_ref, child_title) in children_of(conn, node_kind, node)? {
            if entities.insert(child) {
                dependencies.push(DependencyNode {
                    entity_type: child_kind.into(),
                    entity_id: child,
                    reference_id: child_ref.to_string(),
                    title: child_title,
                    dependency_type: DependencyType::Child,
                    via: node,
                });
                queue.push_back((child_kind, child));
            }
        }
        for (comment, content) in comments_on(conn, node_kind, node)? {
            dependencies.push(DependencyNode {
                entity_type: RecordKind::Comment,
                entity_id: comment,
                reference_id: String::new(),
                title: excerpt(&content),
                dependency_type: DependencyType::Comment,
                via: node,
            });
        }
        if node_kind == EntityKind::Requirement {
            for edge in edges_touching(conn, node)? {
                if seen_edges.insert(edge.id) {
                    dependencies.push(DependencyNode {
                        entity_type: RecordKind::Relationship,
                        entity_id: edge.id,
                        reference_id: String::new(),
                        title: edge.label.clone(),
                        dependency_type: DependencyType::RelationshipEdge,
                        via: node,
                    });
                    edges.push(edge);
                }
            }
        }
    }

    let mut warnings = Vec::new();
    for edge in &edges {
        if !entities.contains(&edge.source) || !entities.contains(&edge.target) {
            warnings.push(format!(
                "relationship {} links outside the deleted set and will be removed",
                edge.label
            ));
        }
    }

    let mut blocking = Vec::new();
    let mut stmt = conn.prepare(
        "SELECT id, reference_id FROM requirements WHERE acceptance_criteria_id = ?1 ORDER BY reference_number",
    )?;
    for criterion in criteria {
        let linked = stmt
            .query_map(params![criterion], |row| {
                Ok((row.get::<_, EntityId>(0)?, row.get::<_, ReferenceId>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for (requirement, requirement_ref) in linked {
            if !entities.contains(&requirement) {
                blocking.push(BlockingReference {
                    entity_type: RecordKind::Requirement,
                    entity_id: requirement,
                    reference_id: requirement_ref.to_string(),
                    references: criterion,
                    reason: format!("{requirement_ref} is linked to this acceptance criterion"),
                });
            }
        }
    }

    Ok(DependencyReport {
        target,
        can_delete: blocking.is_empty(),
        dependencies,
        warnings,
        blocking,
    })
}

/// Delete everything in `report`, leaves first, recording progress in `progress`
fn execute(
    conn: &Connection,
    report: &DependencyReport,
    progress: &mut DeletionReport,
) -> Result<()> {
    progress.counts.clear();

    let mut removed = 0;
    for edge in report.ids_of(RecordKind::Relationship) {
        removed += conn.execute(
            "DELETE FROM requirement_relationships WHERE id = ?1",
            params![edge],
        )?;
    }
    progress.counts.insert(RecordKind::Relationship, removed);

    let target_kind = report.target.entity_type;
    let mut entities: Vec<(EntityKind, EntityId)> = vec![(target_kind, report.target.entity_id)];
    entities.extend(
        report
            .dependencies
            .iter()
            .filter(|d| d.dependency_type == DependencyType::Child)
            .filter_map(|d| d.entity_type.entity_kind().map(|k| (k, d.entity_id))),
    );

    let mut removed = 0;
    for &(kind, id) in &entities {
        // Replies go before the comments they answer
        let mut stmt = conn.prepare_cached(
            "SELECT id FROM comments WHERE entity_type = ?1 AND entity_id = ?2 ORDER BY depth DESC",
        )?;
        let comments = stmt
            .query_map(params![kind, id], |row| row.get::<_, EntityId>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for comment in comments {
            removed += conn.execute("DELETE FROM comments WHERE id = ?1", params![comment])?;
        }
    }
    progress.counts.insert(RecordKind::Comment, removed);

    for kind in [
        EntityKind::Requirement,
        EntityKind::AcceptanceCriteria,
        EntityKind::UserStory,
        EntityKind::Epic,
    ] {
        let sql = format!("DELETE FROM {} WHERE id = ?1", kind.table());
        let mut removed = 0;
        for &(_, id) in entities.iter().filter(|(k, _)| *k == kind) {
            removed += conn.execute(&sql, params![id])?;
        }
        if removed > 0 {
            progress.counts.insert(kind.into(), removed);
        }
    }
    progress.counts.retain(|_, n| *n > 0);
    Ok(())
}

impl Service {
    /// Impact report for deleting an entity
    pub fn validate_deletion(
        &self,
        ctx: &RequestContext,
        kind: EntityKind,
        key: &str,
    ) -> Result<DependencyReport> {
        ctx.require(Permission::Read)?;
        self.store.read(ctx, "validate deletion", |conn| {
            let id = resolve_id(conn, kind, key)?;
            plan(conn, kind, id)
        })
    }

    /// Delete an entity, cascading to its dependents when asked.
    ///
    /// The closure is recomputed inside the write transaction. Without
    /// `cascade`, any dependent fails with `HAS_DEPENDENCIES`; blocking
    /// references always fail with `CONFLICT`. A failure mid-way rolls back and
    /// carries the partial report.
    pub fn delete_entity(
        &self,
        ctx: &RequestContext,
        kind: EntityKind,
        key: &str,
        options: DeleteOptions,
    ) -> Result<DeletionReport> {
        ctx.require(Permission::DeleteEntities)?;

        if options.dry_run {
            let report = self.store.read(ctx, "plan deletion", |conn| {
                let id = resolve_id(conn, kind, key)?;
                plan(conn, kind, id)
            })?;
            return Ok(DeletionReport::from_dependencies(&report, true, options.cascade));
        }

        let deletion = self.store.write(ctx, "delete entity", |tx| {
            let id = resolve_id(tx, kind, key)?;
            let report = plan(tx, kind, id)?;
            if !report.can_delete {
                let refs: Vec<&str> = report
                    .blocking
                    .iter()
                    .map(|b| b.reference_id.as_str())
                    .collect();
                return Err(Error::conflict(
                    ErrorCode::Conflict,
                    format!(
                        "{} is referenced from outside its dependency closure by {}",
                        report.target,
                        refs.join(", ")
                    ),
                ));
            }
            if !report.dependencies.is_empty() && !options.cascade {
                return Err(Error::HasDependencies {
                    message: format!(
                        "{} has {} dependent record(s); delete with cascade to remove them",
                        report.target,
                        report.dependencies.len()
                    ),
                    report: Box::new(report),
                });
            }

            let mut progress = DeletionReport::from_dependencies(&report, false, options.cascade);
            match execute(tx, &report, &mut progress) {
                Ok(()) => {
                    progress.committed = true;
                    Ok(progress)
                }
                Err(e) if e.is_transient() || matches!(e, Error::Timeout { .. }) => Err(e),
                Err(e) => {
                    tracing::error!(target = %report.target, error = %e, "cascading delete failed");
                    progress.failure = Some(e.to_string());
                    Err(Error::DeletionFailed {
                        target: report.target.to_string(),
                        message: e.to_string(),
                        report: Box::new(progress),
                    })
                }
            }
        })?;

        let destroyed: Vec<RecordKind> = deletion.counts.keys().copied().collect();
        tracing::info!(
            target = %deletion.target,
            total = deletion.total(),
            cascade = options.cascade,
            "deleted entity"
        );
        self.invalidate(&destroyed);
        Ok(deletion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_truncates_on_char_boundary() {
        let long = "é".repeat(EXCERPT_CHARS + 5);
        let cut = excerpt(&long);
        assert_eq!(cut.chars().count(), EXCERPT_CHARS + 1);
        assert!(cut.ends_with('…'));
        assert_eq!(excerpt("short"), "short");
    }
}
