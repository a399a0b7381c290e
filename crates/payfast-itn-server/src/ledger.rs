//! Record of ITNs already acted on.
//!
//! The gateway retries a notification until it sees a 200, and a retried or
//! replayed ITN passes every validation stage again. The ledger makes sure
//! each one is fulfilled and forwarded once.

use dashmap::DashMap;
use std::sync::Mutex;
use std::time::Instant;

use crate::storage::{self, StoreError};

/// Processed-payment storage backends. Must be thread-safe.
pub trait PaymentLedger: Send + Sync {
    /// Atomically claim `key`. `Ok(true)` if it was not claimed before,
    /// `Ok(false)` if it was. A storage failure is an error, never a
    /// duplicate.
    fn claim(&self, key: &str) -> Result<bool, StoreError>;

    /// Number of claimed keys.
    fn len(&self) -> Result<usize, StoreError>;

    /// Purge entries older than `max_age_secs`. Returns number purged.
    fn purge_expired(&self, max_age_secs: u64) -> usize;
}

/// DashMap-backed ledger. Lost on restart.
#[derive(Default)]
pub struct InMemoryLedger {
    entries: DashMap<String, Instant>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PaymentLedger for InMemoryLedger {
    fn claim(&self, key: &str) -> Result<bool, StoreError> {
        use dashmap::mapref::entry::Entry;
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(v) => {
                v.insert(Instant::now());
                Ok(true)
            }
        }
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.entries.len())
    }

    fn purge_expired(&self, max_age_secs: u64) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, claimed| claimed.elapsed().as_secs() < max_age_secs);
        before - self.entries.len()
    }
}

/// SQLite-backed ledger. Survives restarts.
pub struct SqliteLedger {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteLedger {
    /// Open (or create) the ledger table in the database at `path`.
    pub fn open(path: &str) -> Result<Self, rusqlite::Error> {
        let conn = storage::open_sqlite(
            path,
            "CREATE TABLE IF NOT EXISTS processed_itns (
                payment_key TEXT PRIMARY KEY,
                processed_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_itns_processed_at ON processed_itns(processed_at);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl PaymentLedger for SqliteLedger {
    fn claim(&self, key: &str) -> Result<bool, StoreError> {
        let conn = storage::lock(&self.conn);
        // PRIMARY KEY conflict makes this atomic across processes.
        match conn.execute(
            "INSERT INTO processed_itns (payment_key, processed_at) VALUES (?1, ?2)",
            rusqlite::params![key, storage::unix_now()],
        ) {
            Ok(_) => Ok(true),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn len(&self) -> Result<usize, StoreError> {
        let conn = storage::lock(&self.conn);
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM processed_itns", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn purge_expired(&self, max_age_secs: u64) -> usize {
        let conn = storage::lock(&self.conn);
        storage::purge_older_than(&conn, "processed_itns", "processed_at", max_age_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite(dir: &tempfile::TempDir) -> SqliteLedger {
        let path = dir.path().join("ledger.db");
        SqliteLedger::open(path.to_str().unwrap()).unwrap()
    }

    #[test]
    fn in_memory_claim_is_once_only() {
        let ledger = InMemoryLedger::new();
        assert!(ledger.claim("1089250:COMPLETE").unwrap());
        assert!(!ledger.claim("1089250:COMPLETE").unwrap());
        assert!(ledger.claim("1089251:COMPLETE").unwrap());
        assert_eq!(ledger.len().unwrap(), 2);
    }

    #[test]
    fn in_memory_purge_keeps_fresh_entries() {
        let ledger = InMemoryLedger::new();
        ledger.claim("a").unwrap();
        assert_eq!(ledger.purge_expired(3600), 0);
        assert_eq!(ledger.len().unwrap(), 1);
        assert_eq!(ledger.purge_expired(0), 1);
        assert!(ledger.claim("a").unwrap());
    }

    #[test]
    fn sqlite_claim_is_once_only() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = sqlite(&dir);
        assert!(ledger.claim("1089250:COMPLETE").unwrap());
        assert!(!ledger.claim("1089250:COMPLETE").unwrap());
        assert!(ledger.claim("1089250:CANCELLED").unwrap());
        assert_eq!(ledger.len().unwrap(), 2);
    }

    #[test]
    fn sqlite_failure_is_an_error_not_a_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = sqlite(&dir);
        storage::lock(&ledger.conn)
            .execute_batch("DROP TABLE processed_itns;")
            .unwrap();

        assert!(matches!(
            ledger.claim("never-seen:COMPLETE"),
            Err(StoreError::Sqlite(_))
        ));
        assert!(ledger.len().is_err());
    }

    #[test]
    fn sqlite_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let ledger = sqlite(&dir);
            assert!(ledger.claim("k").unwrap());
        }
        let ledger = sqlite(&dir);
        assert!(!ledger.claim("k").unwrap());
    }

    #[test]
    fn sqlite_purges_old_entries() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = sqlite(&dir);
        storage::lock(&ledger.conn)
            .execute(
                "INSERT INTO processed_itns (payment_key, processed_at) VALUES (?1, ?2)",
                rusqlite::params!["old", 1000i64],
            )
            .unwrap();

        assert_eq!(ledger.purge_expired(60), 1);
        assert!(ledger.claim("old").unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn sqlite_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let _ledger = sqlite(&dir);
        let mode = std::fs::metadata(dir.path().join("ledger.db"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
