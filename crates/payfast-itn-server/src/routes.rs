use std::time::Instant;

use actix_web::{http::header, web, HttpRequest, HttpResponse};
use payfast::{
    intake, ConfirmationClient, Notification, OriginTrust, RequestContext, ValidationReport,
};
use serde::Deserialize;

use crate::auth;
use crate::forward::{self, PaymentWebhook};
use crate::metrics;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub m_payment_id: String,
    pub amount: f64,
}

/// What happened to one acknowledged ITN.
#[derive(Debug, Clone, PartialEq)]
pub enum ItnOutcome {
    /// Valid and seen for the first time; forwarded.
    Accepted {
        m_payment_id: String,
        status: String,
    },
    /// Failed a validation stage.
    Rejected(ValidationReport),
    /// Valid, but already processed.
    Duplicate,
    /// No order registered for this `m_payment_id`.
    UnknownOrder,
    /// Notification carries no `m_payment_id`.
    MissingPaymentId,
    /// Order or ledger storage failed; nothing was fulfilled or forwarded.
    StorageUnavailable,
}

impl ItnOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItnOutcome::Accepted { .. } => "accepted",
            ItnOutcome::Rejected(_) => "rejected",
            ItnOutcome::Duplicate => "duplicate",
            ItnOutcome::UnknownOrder => "unknown_order",
            ItnOutcome::MissingPaymentId => "missing_payment_id",
            ItnOutcome::StorageUnavailable => "storage_unavailable",
        }
    }
}

/// Ledger key: one entry per gateway payment and status.
fn ledger_key(notification: &Notification) -> Option<String> {
    let id = notification
        .pf_payment_id()
        .or_else(|| notification.payment_id())?;
    Some(format!("{id}:{}", notification.status().unwrap_or("-")))
}

/// Validate, de-duplicate and forward one notification.
pub async fn process_itn<O, C>(state: &AppState<O, C>, notification: &Notification) -> ItnOutcome
where
    O: OriginTrust,
    C: ConfirmationClient,
{
    let outcome = run_itn(state, notification).await;
    metrics::ITN_OUTCOMES
        .with_label_values(&[outcome.as_str()])
        .inc();
    outcome
}

async fn run_itn<O, C>(state: &AppState<O, C>, notification: &Notification) -> ItnOutcome
where
    O: OriginTrust,
    C: ConfirmationClient,
{
    let Some(m_payment_id) = notification.payment_id() else {
        tracing::warn!(
            pf_payment_id = notification.pf_payment_id().unwrap_or("-"),
            "ITN without m_payment_id"
        );
        return ItnOutcome::MissingPaymentId;
    };
    let expected = match state.orders.expected_amount(m_payment_id) {
        Ok(Some(amount)) => amount,
        Ok(None) => {
            tracing::warn!(m_payment_id, "ITN for unknown order");
            return ItnOutcome::UnknownOrder;
        }
        Err(e) => {
            tracing::error!(m_payment_id, error = %e, "order lookup failed");
            return ItnOutcome::StorageUnavailable;
        }
    };

    let start = Instant::now();
    let report = state.validator.report(notification, expected).await;
    let elapsed = start.elapsed().as_secs_f64();

    if !report.is_valid {
        metrics::VALIDATION_LATENCY
            .with_label_values(&["invalid"])
            .observe(elapsed);
        if let (Some(stage), Some(kind)) = (report.failed_stage, report.kind) {
            metrics::STAGE_FAILURES
                .with_label_values(&[stage.as_str(), kind.as_str()])
                .inc();
        }
        return ItnOutcome::Rejected(report);
    }
    metrics::VALIDATION_LATENCY
        .with_label_values(&["valid"])
        .observe(elapsed);

    let Some(key) = ledger_key(notification) else {
        return ItnOutcome::MissingPaymentId;
    };
    match state.ledger.claim(&key) {
        Ok(true) => {}
        Ok(false) => {
            tracing::info!(m_payment_id, key = %key, "ITN already processed");
            return ItnOutcome::Duplicate;
        }
        Err(e) => {
            tracing::error!(
                m_payment_id,
                key = %key,
                error = %e,
                "ledger unavailable, valid payment left unfulfilled"
            );
            return ItnOutcome::StorageUnavailable;
        }
    }

    let status = notification.status().unwrap_or("-").to_string();
    tracing::info!(
        m_payment_id,
        pf_payment_id = notification.pf_payment_id().unwrap_or("-"),
        status = %status,
        "payment accepted"
    );

    if !state.forward_urls.is_empty() {
        forward::forward_payment(
            &state.http_client,
            &state.forward_urls,
            &PaymentWebhook::from_notification(notification),
            state.shared_secret.as_deref(),
        );
    }

    ItnOutcome::Accepted {
        m_payment_id: m_payment_id.to_string(),
        status,
    }
}

/// `ANY /itn`. Always `200 OK`; processing continues in the background.
pub async fn itn<O, C>(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState<O, C>>,
) -> HttpResponse
where
    O: OriginTrust + 'static,
    C: ConfirmationClient + 'static,
{
    let referer = req
        .headers()
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let request = RequestContext::new(req.method().as_str(), body.to_vec(), referer);

    let notification = intake(&request, || {
        tracing::debug!(method = %req.method(), "ITN acknowledged");
    });

    match notification {
        Some(notification) => {
            metrics::ITN_RECEIVED.with_label_values(&["processed"]).inc();
            let state = state.into_inner();
            actix_web::rt::spawn(async move {
                process_itn(&state, &notification).await;
            });
        }
        None => metrics::ITN_RECEIVED.with_label_values(&["ignored"]).inc(),
    }

    HttpResponse::Ok().finish()
}

/// `POST /orders`. Registers the amount expected for an `m_payment_id`.
pub async fn register_order<O, C>(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState<O, C>>,
) -> HttpResponse
where
    O: OriginTrust + 'static,
    C: ConfirmationClient + 'static,
{
    let Some(secret) = state.shared_secret.as_deref() else {
        return HttpResponse::Forbidden().json(serde_json::json!({
            "error": "forbidden",
            "message": "Set ITN_SHARED_SECRET to register orders"
        }));
    };
    if let Err(resp) = auth::authenticate(&req, &body, secret) {
        return resp;
    }

    let order: OrderRequest = match serde_json::from_slice(&body) {
        Ok(o) => o,
        Err(_) => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "invalid request body"
            }));
        }
    };

    let m_payment_id = order.m_payment_id.trim();
    if m_payment_id.is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "mPaymentId must not be empty"
        }));
    }
    if !order.amount.is_finite() || order.amount <= 0.0 {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "amount must be a positive number"
        }));
    }

    match state.orders.register(m_payment_id, order.amount) {
        Ok(Some(previous)) => {
            tracing::info!(m_payment_id, previous, amount = order.amount, "order re-priced")
        }
        Ok(None) => tracing::info!(m_payment_id, amount = order.amount, "order registered"),
        Err(e) => {
            tracing::error!(m_payment_id, error = %e, "failed to store order");
            return HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "error": "storage unavailable"
            }));
        }
    }

    HttpResponse::Created().json(serde_json::json!({
        "mPaymentId": m_payment_id,
        "amount": order.amount,
    }))
}

/// `GET /health`. `503` with `"degraded"` when either store cannot be read.
pub async fn health<O, C>(state: web::Data<AppState<O, C>>) -> HttpResponse
where
    O: OriginTrust + 'static,
    C: ConfirmationClient + 'static,
{
    match (state.orders.len(), state.ledger.len()) {
        (Ok(orders), Ok(processed)) => HttpResponse::Ok().json(serde_json::json!({
            "status": "ok",
            "service": "payfast-itn-server",
            "version": env!("CARGO_PKG_VERSION"),
            "registeredOrders": orders,
            "processedPayments": processed,
        })),
        (orders, ledger) => {
            if let Err(e) = &orders {
                tracing::error!(error = %e, "order store unreadable");
            }
            if let Err(e) = &ledger {
                tracing::error!(error = %e, "ledger unreadable");
            }
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "status": "degraded",
                "service": "payfast-itn-server",
                "version": env!("CARGO_PKG_VERSION"),
            }))
        }
    }
}

/// `GET /metrics`, behind a bearer token unless explicitly public.
pub async fn metrics_endpoint<O, C>(
    req: HttpRequest,
    state: web::Data<AppState<O, C>>,
) -> HttpResponse
where
    O: OriginTrust + 'static,
    C: ConfirmationClient + 'static,
{
    match &state.metrics_token {
        Some(token) => {
            let authorized = req
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|t| payfast::signature::constant_time_eq(t.as_bytes(), token))
                .unwrap_or(false);

            if !authorized {
                return HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "unauthorized",
                    "message": "Valid Bearer token required for /metrics"
                }));
            }
        }
        None if !state.public_metrics => {
            return HttpResponse::Forbidden().json(serde_json::json!({
                "error": "forbidden",
                "message": "Set METRICS_TOKEN or ITN_PUBLIC_METRICS=true to access /metrics"
            }));
        }
        None => {}
    }
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics::metrics_output())
}

/// Mount every route on an app or scope.
pub fn configure<O, C>(cfg: &mut web::ServiceConfig)
where
    O: OriginTrust + 'static,
    C: ConfirmationClient + 'static,
{
    cfg.route("/health", web::get().to(health::<O, C>))
        .route("/metrics", web::get().to(metrics_endpoint::<O, C>))
        .route("/orders", web::post().to(register_order::<O, C>))
        .route("/itn", web::route().to(itn::<O, C>));
}
