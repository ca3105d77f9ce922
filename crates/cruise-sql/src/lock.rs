//! The process-global advisory lock that serializes sync runs across
//! replicas (§4.5, §6.2). `pg_try_advisory_lock` takes a single `bigint` key;
//! `hashtext` folds the named lock into that space the same way the logical
//! schema in §6.2 specifies.

use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, PgPool, Postgres};

const LOCK_NAME: &str = "cruise_sync_lock";

async fn try_acquire_raw(conn: &mut PgConnection) -> sqlx::Result<bool> {
    sqlx::query_scalar("select pg_try_advisory_lock(hashtext($1)::bigint)")
        .bind(LOCK_NAME)
        .fetch_one(conn)
        .await
}

async fn release_raw(conn: &mut PgConnection) -> sqlx::Result<bool> {
    sqlx::query_scalar("select pg_advisory_unlock(hashtext($1)::bigint)")
        .bind(LOCK_NAME)
        .fetch_one(conn)
        .await
}

/// Holds a dedicated connection with the named advisory lock taken out on
/// it. Release is an explicit, fallible `async fn`, not a `Drop` impl —
/// `pg_advisory_unlock` can itself fail, and `Drop` has no way to await or
/// report that. Callers must call [`release`](AdvisoryLock::release) on
/// every exit path, success or failure; an undropped-but-unreleased guard
/// only logs, it cannot recover the connection for reuse.
pub struct AdvisoryLock {
    conn: PoolConnection<Postgres>,
    released: bool,
}

impl AdvisoryLock {
    /// Checks out a dedicated connection and attempts the lock on it.
    /// Returns `Ok(None)` if another session already holds it.
    pub async fn try_acquire(pool: &PgPool) -> sqlx::Result<Option<Self>> {
        let mut conn = pool.acquire().await?;
        if try_acquire_raw(&mut conn).await? {
            Ok(Some(AdvisoryLock {
                conn,
                released: false,
            }))
        } else {
            Ok(None)
        }
    }

    /// Releases the lock and returns the connection to the pool. Must be
    /// called on every exit path of the guarded section, including the
    /// error path, so a failed unit of work never leaves the lock held.
    pub async fn release(mut self) -> sqlx::Result<()> {
        let result = release_raw(&mut self.conn).await;
        self.released = true;
        result.map(|_| ())
    }
}

impl Drop for AdvisoryLock {
    fn drop(&mut self) {
        if !self.released {
            tracing::error!(
                "advisory lock guard dropped without release; the connection returns to the \
                 pool with pg_advisory_unlock never called"
            );
        }
    }
}
