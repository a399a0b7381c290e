//! SQLite plumbing shared by the ledger and the order store.

use std::sync::{Mutex, MutexGuard};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Open (or create) `path`, apply `schema`, switch to WAL and restrict the
/// file to its owner on Unix.
pub(crate) fn open_sqlite(path: &str, schema: &str) -> Result<rusqlite::Connection, rusqlite::Error> {
    let conn = rusqlite::Connection::open(path)?;
    conn.execute_batch(schema)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
            tracing::warn!(
                path = %path,
                error = %e,
                "failed to set database file permissions to 0600"
            );
        }
    }
    Ok(conn)
}

pub(crate) fn lock(conn: &Mutex<rusqlite::Connection>) -> MutexGuard<'_, rusqlite::Connection> {
    match conn.lock() {
        Ok(c) => c,
        Err(poisoned) => {
            tracing::error!("database mutex poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// Current unix time. A clock before the epoch yields `i64::MAX`, so rows
/// written then outlive any purge cutoff.
pub(crate) fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or_else(|_| {
            tracing::error!("system clock before UNIX epoch, using max timestamp");
            i64::MAX
        })
}

/// Delete rows of `table` whose `column` is older than `max_age_secs`,
/// unless the stored timestamps show the clock has jumped.
pub(crate) fn purge_older_than(
    conn: &rusqlite::Connection,
    table: &str,
    column: &str,
    max_age_secs: u64,
) -> usize {
    let now = unix_now();

    let (min_recorded, max_recorded): (i64, i64) = conn
        .query_row(
            &format!("SELECT COALESCE(MIN({column}), 0), COALESCE(MAX({column}), 0) FROM {table}"),
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap_or((0, 0));

    if min_recorded > 0 && now < min_recorded {
        tracing::warn!(
            table,
            now,
            min_recorded,
            "clock appears to have jumped backward, skipping purge"
        );
        return 0;
    }

    let window = i64::try_from(max_age_secs).unwrap_or(i64::MAX);
    if max_recorded > min_recorded && now.saturating_sub(max_recorded) > window.saturating_mul(2) {
        tracing::warn!(
            table,
            now,
            max_recorded,
            min_recorded,
            "clock appears to have jumped forward, skipping purge"
        );
        return 0;
    }

    let cutoff = now.saturating_sub(window);
    conn.execute(
        &format!("DELETE FROM {table} WHERE {column} < ?1"),
        rusqlite::params![cutoff],
    )
    .unwrap_or(0)
}
