//! Users and installation bootstrap

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use super::Service;
use crate::core::context::RequestContext;
use crate::core::error::{Error, ErrorCode, Result};
use crate::core::identity::EntityId;
use crate::core::principal::{Permission, Role};
use crate::entities::user::{NewUser, User};
use crate::store::seed::{ensure_admin, seed_reference_data, SeedSummary};
use crate::store::sql::{now, Timestamp};

/// What `initialize` did
#[derive(Debug, Clone, Serialize)]
pub struct InitSummary {
    pub seed: SeedSummary,
    pub admin: User,
    pub admin_created: bool,
}

/// Columns that point at a user, as (table, column)
const USER_REFERENCES: &[(&str, &str)] = &[
    ("epics", "creator_id"),
    ("epics", "assignee_id"),
    ("user_stories", "creator_id"),
    ("user_stories", "assignee_id"),
    ("acceptance_criteria", "author_id"),
    ("requirements", "creator_id"),
    ("requirements", "assignee_id"),
    ("comments", "author_id"),
    ("comments", "resolved_by"),
    ("requirement_relationships", "created_by"),
];

fn username(value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::validation("username must not be empty"));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(Error::validation(format!(
            "username '{}' must not contain whitespace",
            value
        )));
    }
    Ok(value.to_string())
}

fn find_user_in(conn: &Connection, name: &str) -> Result<Option<User>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM users WHERE username = ?1", User::COLUMNS),
            params![name.trim()],
            User::from_row,
        )
        .optional()?)
}

/// A user by ULID or username
fn resolve_user(conn: &Connection, key: &str) -> Result<User> {
    if let Ok(id) = EntityId::parse(key.trim()) {
        let found = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", User::COLUMNS),
                params![id],
                User::from_row,
            )
            .optional()?;
        if let Some(user) = found {
            return Ok(user);
        }
    }
    find_user_in(conn, key)?.ok_or_else(|| Error::not_found("user", key.trim()))
}

fn other_admins(conn: &Connection, except: EntityId) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM users WHERE role = ?1 AND id <> ?2",
        params![Role::Administrator, except],
        |row| row.get(0),
    )?)
}

impl Service {
    /// Seed reference data and make sure `admin` exists. Safe to repeat.
    pub fn initialize(&self, admin: &str) -> Result<InitSummary> {
        let admin = username(admin)?;
        let ctx = RequestContext::anonymous().with_timeout(self.config.request_timeout());
        let summary = self.store.write(&ctx, "initialize", |tx| {
            let seed = seed_reference_data(tx)?;
            let (_, admin_created) = ensure_admin(tx, &admin)?;
            let user = find_user_in(tx, &admin)?.ok_or_else(|| Error::not_found("user", &admin))?;
            Ok(InitSummary {
                seed,
                admin: user,
                admin_created,
            })
        })?;
        if summary.admin.role != Role::Administrator {
            tracing::warn!(
                username = %summary.admin.username,
                role = %summary.admin.role,
                "existing user kept its role",
            );
        }
        tracing::info!(
            requirement_types = summary.seed.requirement_types,
            relationship_types = summary.seed.relationship_types,
            status_models = summary.seed.status_models,
            admin_created = summary.admin_created,
            "installation initialized"
        );
        Ok(summary)
    }

    /// Look up a user for authentication; no principal required
    pub fn find_user(&self, ctx: &RequestContext, username: &str) -> Result<Option<User>> {
        self.store
            .read(ctx, "find user", |conn| find_user_in(conn, username))
    }

    pub fn create_user(&self, ctx: &RequestContext, input: NewUser) -> Result<User> {
        ctx.require(Permission::ManageUsers)?;
        let name = username(&input.username)?;
        let user = self.store.write(ctx, "create user", |tx| {
            if find_user_in(tx, &name)?.is_some() {
                return Err(Error::conflict(
                    ErrorCode::Conflict,
                    format!("user '{}' already exists", name),
                ));
            }
            let id = EntityId::new();
            let ts = Timestamp(now());
            tx.execute(
                "INSERT INTO users (id, username, display_name, email, role, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![id, name, input.display_name, input.email, input.role, ts],
            )?;
            resolve_user(tx, &name)
        })?;
        tracing::info!(username = %user.username, role = %user.role, "created user");
        Ok(user)
    }

    pub fn get_user(&self, ctx: &RequestContext, key: &str) -> Result<User> {
        ctx.require(Permission::Read)?;
        self.store.read(ctx, "get user", |conn| resolve_user(conn, key))
    }

    pub fn list_users(&self, ctx: &RequestContext) -> Result<Vec<User>> {
        ctx.require(Permission::Read)?;
        self.store.read(ctx, "list users", |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM users ORDER BY username",
                User::COLUMNS
            ))?;
            let rows = stmt
                .query_map([], User::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Change a user's role; the last administrator cannot be demoted
    pub fn update_user_role(&self, ctx: &RequestContext, key: &str, role: Role) -> Result<User> {
        ctx.require(Permission::ManageUsers)?;
        let user = self.store.write(ctx, "update user role", |tx| {
            let user = resolve_user(tx, key)?;
            if user.role == role {
                return Ok(user);
            }
            if user.role == Role::Administrator && other_admins(tx, user.id)? == 0 {
                return Err(Error::conflict(
                    ErrorCode::Conflict,
                    format!("'{}' is the last administrator", user.username),
                ));
            }
            tx.execute(
                "UPDATE users SET role = ?1, updated_at = ?2 WHERE id = ?3",
                params![role, Timestamp(now()), user.id],
            )?;
            resolve_user(tx, &user.username)
        })?;
        tracing::info!(username = %user.username, role = %user.role, "user role set");
        Ok(user)
    }

    /// Delete a user nothing references
    pub fn delete_user(&self, ctx: &RequestContext, key: &str) -> Result<User> {
        ctx.require(Permission::ManageUsers)?;
        let user = self.store.write(ctx, "delete user", |tx| {
            let user = resolve_user(tx, key)?;
            let mut references = 0i64;
            for (table, column) in USER_REFERENCES {
                references += tx.query_row(
                    &format!("SELECT COUNT(*) FROM {table} WHERE {column} = ?1"),
                    params![user.id],
                    |row| row.get::<_, i64>(0),
                )?;
            }
            if references > 0 {
                return Err(Error::in_use(format!(
                    "user '{}' is referenced by {} record(s)",
                    user.username, references
                )));
            }
            if user.role == Role::Administrator && other_admins(tx, user.id)? == 0 {
                return Err(Error::conflict(
                    ErrorCode::Conflict,
                    format!("'{}' is the last administrator", user.username),
                ));
            }
            tx.execute("DELETE FROM users WHERE id = ?1", params![user.id])?;
            Ok(user)
        })?;
        tracing::info!(username = %user.username, "deleted user");
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_rules() {
        assert_eq!(username("  alice ").unwrap(), "alice");
        assert!(username("").is_err());
        assert!(username("bob smith").is_err());
    }
}
