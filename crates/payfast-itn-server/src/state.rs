use std::sync::Arc;

use payfast::ItnValidator;

use crate::ledger::PaymentLedger;
use crate::orders::OrderStore;

/// Shared application state, generic over the origin and confirmation
/// backends so tests can run the pipeline offline.
pub struct AppState<O, C> {
    pub validator: ItnValidator<O, C>,
    pub orders: Arc<dyn OrderStore>,
    pub ledger: Arc<dyn PaymentLedger>,
    /// HMAC secret for `POST /orders` and forwarded webhooks.
    pub shared_secret: Option<Vec<u8>>,
    pub forward_urls: Vec<String>,
    pub http_client: reqwest::Client,
    /// Bearer token for `/metrics`.
    pub metrics_token: Option<Vec<u8>>,
    pub public_metrics: bool,
}
