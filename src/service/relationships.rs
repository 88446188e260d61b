//! Typed requirement relationships; each type's graph stays acyclic

use rusqlite::{params, Connection, OptionalExtension};

use super::items::resolve_id;
use super::Service;
use crate::core::context::RequestContext;
use crate::core::error::{Error, ErrorCode, Result};
use crate::core::identity::{EntityId, EntityKind, ReferenceId};
use crate::core::links::{find_cycles, would_create_cycle};
use crate::core::principal::Permission;
use crate::entities::reference::NamedType;
use crate::entities::relationship::{CycleReport, RequirementRelationship, RequirementRelationships};
use crate::store::sql::{now, Timestamp};

fn get_edge_in(conn: &Connection, id: EntityId) -> Result<RequirementRelationship> {
    conn.query_row(
        &format!("{} WHERE rr.id = ?1", RequirementRelationship::SELECT),
        params![id],
        RequirementRelationship::from_row,
    )
    .optional()?
    .ok_or_else(|| Error::not_found("relationship", id))
}

fn edges_where(
    conn: &Connection,
    condition: &str,
    id: EntityId,
) -> Result<Vec<RequirementRelationship>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE {condition} ORDER BY rt.name, src.reference_number, tgt.reference_number",
        RequirementRelationship::SELECT
    ))?;
    let rows = stmt
        .query_map(params![id], RequirementRelationship::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub(super) fn relationships_in(
    conn: &Connection,
    id: EntityId,
) -> Result<RequirementRelationships> {
    Ok(RequirementRelationships {
        source_edges: edges_where(conn, "rr.source_requirement_id = ?1", id)?,
        target_edges: edges_where(conn, "rr.target_requirement_id = ?1", id)?,
    })
}

fn relationship_type(conn: &Connection, name: &str) -> Result<NamedType> {
    let name = name.trim();
    conn.query_row(
        &format!(
            "SELECT {} FROM relationship_types WHERE name = ?1",
            NamedType::COLUMNS
        ),
        params![name],
        NamedType::from_row,
    )
    .optional()?
    .ok_or_else(|| Error::not_found("relationship type", name))
}

fn circular(message: String) -> Error {
    Error::Validation {
        code: ErrorCode::CircularRelationship,
        message,
    }
}

impl Service {
    /// Add `source → target` of the named type.
    ///
    /// Runs the cycle search inside the write transaction, so two concurrent
    /// inserts cannot close a cycle between them.
    pub fn create_relationship(
        &self,
        ctx: &RequestContext,
        source: &str,
        target: &str,
        relationship: &str,
    ) -> Result<RequirementRelationship> {
        let creator = ctx.require(Permission::ManageRelationships)?.user_id;
        if source.trim() == target.trim() {
            return Err(circular(format!(
                "a requirement cannot relate to itself ({})",
                source.trim()
            )));
        }

        let edge = self.store.write(ctx, "create relationship", |tx| {
            let source_id = resolve_id(tx, EntityKind::Requirement, source)?;
            let target_id = resolve_id(tx, EntityKind::Requirement, target)?;
            if source_id == target_id {
                return Err(circular(format!(
                    "a requirement cannot relate to itself ({})",
                    source.trim()
                )));
            }
            let rel_type = relationship_type(tx, relationship)?;

            let duplicate: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM requirement_relationships \
                 WHERE source_requirement_id = ?1 AND target_requirement_id = ?2 AND relationship_type_id = ?3)",
                params![source_id, target_id, rel_type.id],
                |row| row.get(0),
            )?;
            if duplicate {
                return Err(Error::conflict(
                    ErrorCode::DuplicateRelationship,
                    format!(
                        "{} already {} {}",
                        source.trim(),
                        rel_type.name,
                        target.trim()
                    ),
                ));
            }

            let mut stmt = tx.prepare_cached(
                "SELECT target_requirement_id FROM requirement_relationships \
                 WHERE relationship_type_id = ?1 AND source_requirement_id = ?2",
            )?;
            let closes_cycle = would_create_cycle(&source_id, &target_id, |node: &EntityId| {
                stmt.query_map(params![rel_type.id, node], |row| row.get::<_, EntityId>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()
            })?;
            drop(stmt);
            if closes_cycle {
                return Err(Error::conflict(
                    ErrorCode::Cycle,
                    format!(
                        "{} → {} would create a {} cycle",
                        source.trim(),
                        target.trim(),
                        rel_type.name
                    ),
                ));
            }

            let id = EntityId::new();
            tx.execute(
                "INSERT INTO requirement_relationships \
                 (id, source_requirement_id, target_requirement_id, relationship_type_id, created_by, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, source_id, target_id, rel_type.id, creator, Timestamp(now())],
            )?;
            get_edge_in(tx, id)
        })?;

        tracing::info!(
            source = %edge.source_reference_id,
            target = %edge.target_reference_id,
            relationship = %edge.relationship_type,
            "created relationship"
        );
        Ok(edge)
    }

    pub fn get_relationship(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> Result<RequirementRelationship> {
        ctx.require(Permission::Read)?;
        let id = EntityId::parse(id.trim())?;
        self.store.read(ctx, "get relationship", |conn| get_edge_in(conn, id))
    }

    pub fn delete_relationship(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> Result<RequirementRelationship> {
        ctx.require(Permission::ManageRelationships)?;
        let id = EntityId::parse(id.trim())?;
        let edge = self.store.write(ctx, "delete relationship", |tx| {
            let edge = get_edge_in(tx, id)?;
            tx.execute("DELETE FROM requirement_relationships WHERE id = ?1", params![id])?;
            Ok(edge)
        })?;
        tracing::info!(edge = %id, "deleted relationship");
        Ok(edge)
    }

    /// Edges touching a requirement, split by direction
    pub fn list_relationships(
        &self,
        ctx: &RequestContext,
        requirement: &str,
    ) -> Result<RequirementRelationships> {
        ctx.require(Permission::Read)?;
        self.store.read(ctx, "list relationships", |conn| {
            let id = resolve_id(conn, EntityKind::Requirement, requirement)?;
            relationships_in(conn, id)
        })
    }

    /// Full scan for cycles, per relationship type (or just the named one).
    ///
    /// Inserts are checked incrementally so this should find nothing; it
    /// exists to audit data written by other means.
    pub fn detect_cycles(
        &self,
        ctx: &RequestContext,
        relationship: Option<&str>,
    ) -> Result<Vec<CycleReport>> {
        ctx.require(Permission::Read)?;
        self.store.read(ctx, "detect cycles", |conn| {
            let types: Vec<NamedType> = match relationship {
                Some(name) => vec![relationship_type(conn, name)?],
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {} FROM relationship_types ORDER BY name",
                        NamedType::COLUMNS
                    ))?;
                    let rows = stmt
                        .query_map([], NamedType::from_row)?
                        .collect::<rusqlite::Result<Vec<_>>>()?;
                    rows
                }
            };

            let mut reports = Vec::new();
            let mut stmt = conn.prepare(
                "SELECT src.reference_id, tgt.reference_id FROM requirement_relationships rr \
                 JOIN requirements src ON src.id = rr.source_requirement_id \
                 JOIN requirements tgt ON tgt.id = rr.target_requirement_id \
                 WHERE rr.relationship_type_id = ?1",
            )?;
            for rel_type in types {
                let edges = stmt
                    .query_map(params![rel_type.id], |row| {
                        Ok((row.get::<_, ReferenceId>(0)?, row.get::<_, ReferenceId>(1)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                for requirements in find_cycles(&edges) {
                    tracing::warn!(
                        relationship = %rel_type.name,
                        size = requirements.len(),
                        "relationship cycle found",
                    );
                    reports.push(CycleReport {
                        relationship_type: rel_type.name.clone(),
                        requirements,
                    });
                }
            }
            Ok(reports)
        })
    }
}
