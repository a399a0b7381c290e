use std::time::Duration;

use payfast::Notification;
use serde::Serialize;

use crate::auth;
use crate::metrics;

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// JSON body forwarded for each accepted payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentWebhook {
    /// `payment.complete`, `payment.cancelled`, ...
    pub event: String,
    pub m_payment_id: String,
    pub pf_payment_id: Option<String>,
    pub payment_status: String,
    pub amount_gross: String,
    /// Subscription or tokenization token, when the payment carries one.
    pub token: Option<String>,
    pub timestamp: u64,
}

impl PaymentWebhook {
    pub fn from_notification(notification: &Notification) -> Self {
        let status = notification.status().unwrap_or("UNKNOWN");
        Self {
            event: format!("payment.{}", status.to_ascii_lowercase()),
            m_payment_id: notification.payment_id().unwrap_or_default().to_string(),
            pf_payment_id: notification.pf_payment_id().map(String::from),
            payment_status: status.to_string(),
            amount_gross: notification.amount_gross().unwrap_or_default().to_string(),
            token: notification.token().map(String::from),
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }
}

/// Client used for forwarding. Redirects are not followed, so a target
/// cannot bounce deliveries somewhere else.
pub fn forward_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(DELIVERY_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// Fire-and-forget POST to each URL, signed with [`auth::SIGNATURE_HEADER`]
/// when a secret is configured.
pub fn forward_payment(
    client: &reqwest::Client,
    urls: &[String],
    webhook: &PaymentWebhook,
    secret: Option<&[u8]>,
) {
    let body = match serde_json::to_vec(webhook) {
        Ok(b) => b,
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize payment webhook");
            return;
        }
    };
    let signature = secret.map(|s| auth::sign(s, &body));

    for url in urls {
        let client = client.clone();
        let url = url.clone();
        let body = body.clone();
        let signature = signature.clone();

        tokio::spawn(async move {
            let mut req = client
                .post(&url)
                .header("content-type", "application/json")
                .timeout(DELIVERY_TIMEOUT);
            if let Some(sig) = &signature {
                req = req.header(auth::SIGNATURE_HEADER, sig.as_str());
            }

            match req.body(body).send().await {
                Ok(resp) if resp.status().is_success() => {
                    metrics::FORWARD_DELIVERIES.with_label_values(&["delivered"]).inc();
                    tracing::debug!(url = %url, status = %resp.status(), "payment forwarded");
                }
                Ok(resp) => {
                    metrics::FORWARD_DELIVERIES.with_label_values(&["rejected"]).inc();
                    tracing::warn!(url = %url, status = %resp.status(), "forward target rejected payment");
                }
                Err(e) => {
                    metrics::FORWARD_DELIVERIES.with_label_values(&["failed"]).inc();
                    tracing::warn!(url = %url, error = %e, "payment forwarding failed");
                }
            }
        });
    }
}
