//! Amount the merchant expects for each `m_payment_id`.
//!
//! Filled through `POST /orders` before the buyer is sent to checkout. Entries
//! outlive the first payment so that recurring charges on the same id can
//! still be matched, and are only dropped by an explicit retention window.

use dashmap::DashMap;
use std::sync::Mutex;
use std::time::Instant;

use crate::storage::{self, StoreError};

/// Order storage backends. Must be thread-safe.
pub trait OrderStore: Send + Sync {
    /// Register (or re-price) an order. Returns the previous amount.
    fn register(&self, m_payment_id: &str, amount: f64) -> Result<Option<f64>, StoreError>;

    fn expected_amount(&self, m_payment_id: &str) -> Result<Option<f64>, StoreError>;

    /// Number of registered orders.
    fn len(&self) -> Result<usize, StoreError>;

    /// Drop orders registered more than `max_age_secs` ago. Returns number
    /// purged.
    fn purge_expired(&self, max_age_secs: u64) -> usize;
}

/// DashMap-backed orders. Lost on restart.
#[derive(Default)]
pub struct InMemoryOrders {
    orders: DashMap<String, (f64, Instant)>,
}

impl InMemoryOrders {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OrderStore for InMemoryOrders {
    fn register(&self, m_payment_id: &str, amount: f64) -> Result<Option<f64>, StoreError> {
        Ok(self
            .orders
            .insert(m_payment_id.to_string(), (amount, Instant::now()))
            .map(|(previous, _)| previous))
    }

    fn expected_amount(&self, m_payment_id: &str) -> Result<Option<f64>, StoreError> {
        Ok(self.orders.get(m_payment_id).map(|entry| entry.value().0))
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.orders.len())
    }

    fn purge_expired(&self, max_age_secs: u64) -> usize {
        let before = self.orders.len();
        self.orders
            .retain(|_, (_, registered)| registered.elapsed().as_secs() < max_age_secs);
        before - self.orders.len()
    }
}

/// SQLite-backed orders. Survives restarts.
pub struct SqliteOrders {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteOrders {
    /// Open (or create) the orders table in the database at `path`.
    pub fn open(path: &str) -> Result<Self, rusqlite::Error> {
        let conn = storage::open_sqlite(
            path,
            "CREATE TABLE IF NOT EXISTS orders (
                m_payment_id TEXT PRIMARY KEY,
                amount REAL NOT NULL,
                registered_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_orders_registered_at ON orders(registered_at);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl OrderStore for SqliteOrders {
    fn register(&self, m_payment_id: &str, amount: f64) -> Result<Option<f64>, StoreError> {
        let mut conn = storage::lock(&self.conn);
        let tx = conn.transaction()?;
        let previous = match tx.query_row(
            "SELECT amount FROM orders WHERE m_payment_id = ?1",
            rusqlite::params![m_payment_id],
            |row| row.get::<_, f64>(0),
        ) {
            Ok(amount) => Some(amount),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(e.into()),
        };
        tx.execute(
            "INSERT INTO orders (m_payment_id, amount, registered_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(m_payment_id) DO UPDATE
             SET amount = excluded.amount, registered_at = excluded.registered_at",
            rusqlite::params![m_payment_id, amount, storage::unix_now()],
        )?;
        tx.commit()?;
        Ok(previous)
    }

    fn expected_amount(&self, m_payment_id: &str) -> Result<Option<f64>, StoreError> {
        let conn = storage::lock(&self.conn);
        match conn.query_row(
            "SELECT amount FROM orders WHERE m_payment_id = ?1",
            rusqlite::params![m_payment_id],
            |row| row.get::<_, f64>(0),
        ) {
            Ok(amount) => Ok(Some(amount)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn len(&self) -> Result<usize, StoreError> {
        let conn = storage::lock(&self.conn);
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM orders", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn purge_expired(&self, max_age_secs: u64) -> usize {
        let conn = storage::lock(&self.conn);
        storage::purge_older_than(&conn, "orders", "registered_at", max_age_secs)
    }
}
