use std::sync::Arc;
use std::time::Duration;

use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{web, App, HttpServer};
use payfast::{DnsResolver, HttpConfirmationClient, ItnValidator, ResolvingOriginTrust};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use payfast_itn_server::config::ServerConfig;
use payfast_itn_server::ledger::{PaymentLedger, SqliteLedger};
use payfast_itn_server::orders::{OrderStore, SqliteOrders};
use payfast_itn_server::routes;
use payfast_itn_server::state::AppState;

type Origin = ResolvingOriginTrust<DnsResolver>;
type Confirmation = HttpConfirmationClient;

const PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match ServerConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("invalid configuration: {e}");
            std::process::exit(1);
        }
    };
    tracing::debug!(?config, "configuration loaded");

    let validator = match ItnValidator::from_config(config.credentials.clone(), &config.gateway) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!("failed to build ITN validator: {e}");
            std::process::exit(1);
        }
    };

    // Both stores live in one SQLite file. In memory, a restart would forget
    // processed ITNs and registered orders.
    let ledger: Arc<dyn PaymentLedger> = match SqliteLedger::open(&config.ledger_db_path) {
        Ok(ledger) => {
            tracing::info!("Payment ledger: SQLite at {}", config.ledger_db_path);
            Arc::new(ledger)
        }
        Err(e) => {
            tracing::error!(
                "Failed to open SQLite ledger at {}: {e}. Refusing to start",
                config.ledger_db_path
            );
            std::process::exit(1);
        }
    };

    let orders: Arc<dyn OrderStore> = match SqliteOrders::open(&config.ledger_db_path) {
        Ok(orders) => Arc::new(orders),
        Err(e) => {
            tracing::error!(
                "Failed to open SQLite order store at {}: {e}. Refusing to start",
                config.ledger_db_path
            );
            std::process::exit(1);
        }
    };

    {
        let ledger = ledger.clone();
        let orders = orders.clone();
        let order_retention = config.order_retention_secs;
        let retention = config.ledger_retention_secs;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(PURGE_INTERVAL);
            loop {
                interval.tick().await;
                let purged = ledger.purge_expired(retention);
                if purged > 0 {
                    tracing::info!(purged, "purged old ledger entries");
                }
                if let Some(retention) = order_retention {
                    let purged = orders.purge_expired(retention);
                    if purged > 0 {
                        tracing::info!(purged, "purged old orders");
                    }
                }
            }
        });
    }

    if config.metrics_token.is_none() && !config.public_metrics {
        tracing::warn!("METRICS_TOKEN not set, /metrics will answer 403");
    }

    let state = web::Data::new(AppState {
        validator,
        orders,
        ledger,
        shared_secret: config.shared_secret.clone(),
        forward_urls: config.forward_urls.clone(),
        http_client: payfast_itn_server::forward::forward_client(),
        metrics_token: config.metrics_token.clone().map(String::into_bytes),
        public_metrics: config.public_metrics,
    });

    let port = config.port;
    tracing::info!("PayFast ITN receiver listening on port {port}");
    tracing::info!(
        "Environment: {:?}, confirming against {}",
        config.gateway.environment,
        config.gateway.validate_url()
    );
    tracing::info!("Rate limit: {} req/min per IP", config.rate_limit_rpm);
    tracing::info!("  POST http://localhost:{port}/itn");
    tracing::info!("  POST http://localhost:{port}/orders");

    let governor_conf = match GovernorConfigBuilder::default()
        .requests_per_minute(config.rate_limit_rpm)
        .finish()
    {
        Some(conf) => conf,
        None => {
            tracing::error!("failed to build rate limiter config");
            std::process::exit(1);
        }
    };

    HttpServer::new(move || {
        App::new()
            .wrap(Governor::new(&governor_conf))
            .app_data(state.clone())
            .app_data(web::PayloadConfig::new(65_536))
            .configure(routes::configure::<Origin, Confirmation>)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
