//! PayFast ITN receiver.
//!
//! Answers every notification with `200 OK` straight away, then runs it
//! through the [`payfast`] validation pipeline on a background task. Valid
//! payments are recorded once in a [`ledger`] and forwarded to the
//! merchant's own systems as signed JSON webhooks.
//!
//! # Modules
//!
//! - [`routes`]: HTTP endpoints (itn, orders, health, metrics)
//! - [`state`]: shared [`AppState`](state::AppState)
//! - [`orders`]: expected amounts per `m_payment_id`, in memory or SQLite
//! - [`ledger`]: processed-payment de-duplication, in memory or SQLite
//! - [`storage`]: SQLite plumbing shared by both stores
//! - [`forward`]: webhook delivery of accepted payments
//! - [`auth`]: HMAC request authentication
//! - [`config`]: environment-driven configuration
//! - [`metrics`]: Prometheus metrics

pub mod auth;
pub mod config;
pub mod forward;
pub mod ledger;
pub mod metrics;
pub mod orders;
pub mod routes;
pub mod state;
pub mod storage;
