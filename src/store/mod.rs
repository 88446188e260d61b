//! SQLite persistence
//!
//! A [`Store`] owns an r2d2 pool of SQLite connections. Reads run on a pooled
//! connection; writes run inside a `BEGIN IMMEDIATE` transaction, which takes
//! SQLite's single writer lock up front and so serializes every multi-row
//! invariant (reference-ID allocation, cycle checks, cascading deletes).
//!
//! Both paths honour the request deadline: a progress handler interrupts the
//! running statement once the deadline passes and the operation surfaces
//! `Timeout` after rolling back.

pub mod refid;
pub mod schema;
pub mod seed;
pub mod sql;

use std::path::Path;
use std::time::{Duration, Instant};

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rand::Rng;
use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::core::config::DatabaseConfig;
use crate::core::context::RequestContext;
use crate::core::error::{Error, Result};

/// Statements between deadline checks
const PROGRESS_OPS: i32 = 1000;

/// First retry delay; doubles per attempt
const BACKOFF_BASE_MS: u64 = 20;

type Conn = PooledConnection<SqliteConnectionManager>;

/// Pooled SQLite store
#[derive(Clone)]
pub struct Store {
    pool: Pool<SqliteConnectionManager>,
    max_retries: u32,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("connections", &self.pool.state().connections)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl Store {
    /// Open (creating if needed) the database at `path` and apply migrations
    pub fn open(path: &Path, config: &DatabaseConfig) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::storage(format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
        }

        let busy = Duration::from_millis(config.busy_timeout_ms);
        let manager = SqliteConnectionManager::file(path).with_init(move |c| {
            c.execute_batch(
                "PRAGMA foreign_keys = ON;
                 PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;",
            )?;
            c.busy_timeout(busy)
        });
        let pool = Pool::builder()
            .max_size(config.max_connections.max(1))
            .build(manager)?;

        let store = Self {
            pool,
            max_retries: config.max_retries,
        };
        store.migrate()?;
        tracing::debug!(path = %path.display(), "opened store");
        Ok(store)
    }

    /// Single-connection in-memory store, for tests
    pub fn open_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|c| c.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder().max_size(1).build(manager)?;
        let store = Self {
            pool,
            max_retries: DatabaseConfig::default().max_retries,
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let mut conn = self.pool.get()?;
        let applied = schema::migrate(&mut conn)?;
        if !applied.is_empty() {
            tracing::info!(count = applied.len(), "database schema upgraded");
        }
        Ok(())
    }

    fn conn(&self) -> Result<Conn> {
        Ok(self.pool.get()?)
    }

    /// Run a read-only closure on a pooled connection
    pub fn read<T, F>(&self, ctx: &RequestContext, op: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        ctx.check_deadline(op)?;
        let conn = self.conn()?;
        arm_deadline(&conn, ctx);
        let result = f(&conn);
        disarm_deadline(&conn);
        result.map_err(|e| name_timeout(e, op))
    }

    /// Run `f` inside an IMMEDIATE transaction, committing on success.
    ///
    /// Busy/locked failures are retried up to `max_retries` times with
    /// jittered exponential backoff, never sleeping past the deadline. `f`
    /// may therefore run more than once and must not have side effects outside
    /// the transaction.
    pub fn write<T, F>(&self, ctx: &RequestContext, op: &str, mut f: F) -> Result<T>
    where
        F: FnMut(&Transaction<'_>) -> Result<T>,
    {
        let mut attempt: u32 = 0;
        loop {
            ctx.check_deadline(op)?;
            match self.write_once(ctx, &mut f) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = backoff(attempt);
                    if ctx.remaining().is_some_and(|left| left <= delay) {
                        return Err(Error::Timeout {
                            operation: op.to_string(),
                        });
                    }
                    attempt += 1;
                    tracing::warn!(
                        op,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying write",
                    );
                    std::thread::sleep(delay);
                }
                Err(e) => return Err(name_timeout(e, op)),
            }
        }
    }

    fn write_once<T, F>(&self, ctx: &RequestContext, f: &mut F) -> Result<T>
    where
        F: FnMut(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.conn()?;
        arm_deadline(&conn, ctx);
        let result = (|| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let value = f(&tx)?;
            tx.commit()?;
            Ok(value)
        })();
        disarm_deadline(&conn);
        result
    }

    /// Cheap round trip for readiness checks
    pub fn ping(&self, ctx: &RequestContext) -> Result<()> {
        self.read(ctx, "ping", |conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
    }

    /// Schema version the database is at
    pub fn schema_version(&self, ctx: &RequestContext) -> Result<Option<String>> {
        self.read(ctx, "schema version", schema::current_version)
    }
}

fn arm_deadline(conn: &Connection, ctx: &RequestContext) {
    match ctx.deadline() {
        Some(deadline) => {
            conn.progress_handler(PROGRESS_OPS, Some(move || Instant::now() >= deadline))
        }
        None => conn.progress_handler(PROGRESS_OPS, None::<fn() -> bool>),
    }
}

fn disarm_deadline(conn: &Connection) {
    conn.progress_handler(PROGRESS_OPS, None::<fn() -> bool>);
}

fn name_timeout(e: Error, op: &str) -> Error {
    match e {
        Error::Timeout { .. } => Error::Timeout {
            operation: op.to_string(),
        },
        other => other,
    }
}

fn backoff(attempt: u32) -> Duration {
    let base = BACKOFF_BASE_MS.saturating_mul(1u64 << attempt.min(10));
    let jitter = rand::rng().random_range(0..=base / 2);
    Duration::from_millis(base + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorCode;

    #[test]
    fn test_write_commits_and_read_sees_it() {
        let store = Store::open_in_memory().unwrap();
        let ctx = RequestContext::anonymous();
        store
            .write(&ctx, "bump", |tx| {
                tx.execute(
                    "UPDATE reference_counters SET last_value = 7 WHERE entity_type = 'epic'",
                    [],
                )?;
                Ok(())
            })
            .unwrap();
        let v: i64 = store
            .read(&ctx, "read", |c| {
                Ok(c.query_row(
                    "SELECT last_value FROM reference_counters WHERE entity_type = 'epic'",
                    [],
                    |r| r.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(v, 7);
    }

    #[test]
    fn test_failed_write_rolls_back() {
        let store = Store::open_in_memory().unwrap();
        let ctx = RequestContext::anonymous();
        let result: Result<()> = store.write(&ctx, "bump", |tx| {
            tx.execute(
                "UPDATE reference_counters SET last_value = 9 WHERE entity_type = 'epic'",
                [],
            )?;
            Err(Error::validation("nope"))
        });
        assert!(result.is_err());
        let v: i64 = store
            .read(&ctx, "read", |c| {
                Ok(c.query_row(
                    "SELECT last_value FROM reference_counters WHERE entity_type = 'epic'",
                    [],
                    |r| r.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(v, 0);
    }

    #[test]
    fn test_expired_deadline_times_out() {
        let store = Store::open_in_memory().unwrap();
        let ctx = RequestContext::anonymous().with_deadline(Instant::now());
        let err = store.ping(&ctx).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Timeout);
    }

    #[test]
    fn test_long_query_interrupted_by_deadline() {
        let store = Store::open_in_memory().unwrap();
        let ctx = RequestContext::anonymous().with_timeout(Duration::from_millis(50));
        let err = store
            .read(&ctx, "spin", |c| {
                c.query_row(
                    "WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n) \
                     SELECT COUNT(*) FROM n",
                    [],
                    |r| r.get::<_, i64>(0),
                )?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { ref operation } if operation == "spin"));
    }

    #[test]
    fn test_backoff_grows() {
        assert!(backoff(0) >= Duration::from_millis(20));
        assert!(backoff(3) >= Duration::from_millis(160));
    }
}
