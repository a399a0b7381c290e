use std::time::Duration;

use payfast::{Environment, GatewayConfig, MerchantCredentials};
use url::Url;

const DEFAULT_PORT: u16 = 4030;
const DEFAULT_RATE_LIMIT_RPM: u64 = 120;
const DEFAULT_LEDGER_DB_PATH: &str = "./payfast-itn-ledger.db";
/// Processed ITNs are remembered for 30 days.
const DEFAULT_LEDGER_RETENTION_SECS: u64 = 30 * 24 * 60 * 60;

#[derive(Clone)]
pub struct ServerConfig {
    pub credentials: MerchantCredentials,
    pub gateway: GatewayConfig,
    pub port: u16,
    pub rate_limit_rpm: u64,
    /// Authenticates `POST /orders` and signs forwarded webhooks.
    pub shared_secret: Option<Vec<u8>>,
    /// Where accepted payments are forwarded.
    pub forward_urls: Vec<String>,
    pub ledger_db_path: String,
    pub ledger_retention_secs: u64,
    /// Orders older than this are purged. `None` keeps them, which
    /// subscriptions need.
    pub order_retention_secs: Option<u64>,
    /// Bearer token for `/metrics`.
    pub metrics_token: Option<String>,
    /// Serve `/metrics` without a token when none is configured.
    pub public_metrics: bool,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("credentials", &self.credentials)
            .field("gateway", &self.gateway)
            .field("port", &self.port)
            .field("rate_limit_rpm", &self.rate_limit_rpm)
            .field(
                "shared_secret",
                &self.shared_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("forward_urls", &self.forward_urls)
            .field("ledger_db_path", &self.ledger_db_path)
            .field("ledger_retention_secs", &self.ledger_retention_secs)
            .field("order_retention_secs", &self.order_retention_secs)
            .field(
                "metrics_token",
                &self.metrics_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("public_metrics", &self.public_metrics)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingRequired(&'static str),

    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid merchant credentials: {0}")]
    Credentials(String),
}

fn flag(value: Option<String>) -> Option<bool> {
    value.map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
}

fn list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn number<T: std::str::FromStr>(
    name: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value.filter(|v| !v.trim().is_empty()) {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value: v }),
        None => Ok(default),
    }
}

/// Forward targets must be absolute http(s) URLs. Plain http is allowed with
/// a warning.
pub fn validate_forward_urls(urls: &[String]) -> Result<(), ConfigError> {
    for raw in urls {
        let url = Url::parse(raw).map_err(|_| ConfigError::InvalidUrl(raw.clone()))?;
        match url.scheme() {
            "https" => {}
            "http" => tracing::warn!(
                url = %raw,
                "forward URL does not use HTTPS, payloads will be sent in cleartext"
            ),
            _ => return Err(ConfigError::InvalidUrl(raw.clone())),
        }
    }
    Ok(())
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; `from_env` passes the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        // Required: merchant identity
        let merchant_id =
            get("PAYFAST_MERCHANT_ID").ok_or(ConfigError::MissingRequired("PAYFAST_MERCHANT_ID"))?;
        let merchant_key = get("PAYFAST_MERCHANT_KEY")
            .ok_or(ConfigError::MissingRequired("PAYFAST_MERCHANT_KEY"))?;
        let credentials =
            MerchantCredentials::new(merchant_id, merchant_key, get("PAYFAST_PASSPHRASE"))
                .map_err(|e| ConfigError::Credentials(e.to_string()))?;
        if credentials.passphrase().is_none() {
            tracing::warn!("PAYFAST_PASSPHRASE not set, signatures are computed without one");
        }

        // Gateway
        let mut gateway = GatewayConfig::default();
        gateway.environment = match flag(get("PAYFAST_SANDBOX")) {
            Some(false) => Environment::Live,
            _ => Environment::Sandbox,
        };
        let trusted_hosts = list(get("PAYFAST_TRUSTED_HOSTS"));
        if !trusted_hosts.is_empty() {
            gateway.trusted_hosts = trusted_hosts;
        }
        gateway.dns_timeout = Duration::from_secs(number(
            "PAYFAST_DNS_TIMEOUT_SECS",
            get("PAYFAST_DNS_TIMEOUT_SECS"),
            gateway.dns_timeout.as_secs(),
        )?);
        gateway.confirm_timeout = Duration::from_secs(number(
            "PAYFAST_CONFIRM_TIMEOUT_SECS",
            get("PAYFAST_CONFIRM_TIMEOUT_SECS"),
            gateway.confirm_timeout.as_secs(),
        )?);
        if let Some(url) = get("PAYFAST_VALIDATE_URL") {
            Url::parse(&url).map_err(|_| ConfigError::InvalidUrl(url.clone()))?;
            gateway.validate_url = Some(url);
        }

        // Service
        let port = number("PORT", get("PORT"), DEFAULT_PORT)?;
        let rate_limit_rpm = number("RATE_LIMIT_RPM", get("RATE_LIMIT_RPM"), DEFAULT_RATE_LIMIT_RPM)?;
        if rate_limit_rpm == 0 {
            return Err(ConfigError::InvalidValue {
                name: "RATE_LIMIT_RPM",
                value: "0".to_string(),
            });
        }

        let shared_secret = get("ITN_SHARED_SECRET").map(String::into_bytes);
        match &shared_secret {
            Some(secret) if secret.len() < 32 => tracing::warn!(
                "ITN_SHARED_SECRET is only {} bytes (minimum 32 recommended), \
                 use `openssl rand -hex 32` to generate one",
                secret.len()
            ),
            Some(_) => {}
            None => tracing::warn!(
                "ITN_SHARED_SECRET not set, /orders is disabled and forwarded webhooks are unsigned"
            ),
        }

        let forward_urls = list(get("FORWARD_URLS"));
        validate_forward_urls(&forward_urls)?;

        let ledger_db_path =
            get("LEDGER_DB_PATH").unwrap_or_else(|| DEFAULT_LEDGER_DB_PATH.to_string());
        let ledger_retention_secs = number(
            "LEDGER_RETENTION_SECS",
            get("LEDGER_RETENTION_SECS"),
            DEFAULT_LEDGER_RETENTION_SECS,
        )?;

        let order_retention_secs = match get("ORDER_RETENTION_SECS") {
            Some(v) => Some(number("ORDER_RETENTION_SECS", Some(v), 0u64)?),
            None => None,
        };

        let metrics_token = get("METRICS_TOKEN");
        let public_metrics = flag(get("ITN_PUBLIC_METRICS")).unwrap_or(false);

        Ok(Self {
            credentials,
            gateway,
            port,
            rate_limit_rpm,
            shared_secret,
            forward_urls,
            ledger_db_path,
            ledger_retention_secs,
            order_retention_secs,
            metrics_token,
            public_metrics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|k| vars.get(k).cloned())
    }

    const MERCHANT: [(&str, &str); 2] = [
        ("PAYFAST_MERCHANT_ID", "10000100"),
        ("PAYFAST_MERCHANT_KEY", "46f0cd694581a"),
    ];

    #[test]
    fn minimal_config_uses_defaults() {
        let c = config(&MERCHANT).unwrap();
        assert_eq!(c.port, DEFAULT_PORT);
        assert_eq!(c.rate_limit_rpm, DEFAULT_RATE_LIMIT_RPM);
        assert_eq!(c.gateway, GatewayConfig::default());
        assert!(c.shared_secret.is_none());
        assert!(c.forward_urls.is_empty());
        assert!(!c.public_metrics);
        assert_eq!(c.ledger_db_path, DEFAULT_LEDGER_DB_PATH);
        assert_eq!(c.order_retention_secs, None);
    }

    #[test]
    fn missing_merchant_id_is_reported() {
        let err = config(&[("PAYFAST_MERCHANT_KEY", "k")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired("PAYFAST_MERCHANT_ID")));
        let err = config(&[("PAYFAST_MERCHANT_ID", " "), ("PAYFAST_MERCHANT_KEY", "k")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired("PAYFAST_MERCHANT_ID")));
    }

    #[test]
    fn live_mode_and_overrides() {
        let mut vars = MERCHANT.to_vec();
        vars.extend([
            ("PAYFAST_SANDBOX", "false"),
            ("PAYFAST_TRUSTED_HOSTS", "www.payfast.co.za, w1w.payfast.co.za"),
            ("PAYFAST_CONFIRM_TIMEOUT_SECS", "3"),
            ("PAYFAST_VALIDATE_URL", "http://127.0.0.1:9000/eng/query/validate"),
            ("FORWARD_URLS", "https://shop.example/hooks/payfast"),
            ("ITN_PUBLIC_METRICS", "1"),
            ("ORDER_RETENTION_SECS", "86400"),
        ]);
        let c = config(&vars).unwrap();
        assert_eq!(c.gateway.environment, Environment::Live);
        assert_eq!(c.gateway.trusted_hosts, vec!["www.payfast.co.za", "w1w.payfast.co.za"]);
        assert_eq!(c.gateway.confirm_timeout, Duration::from_secs(3));
        assert_eq!(
            c.gateway.validate_url(),
            "http://127.0.0.1:9000/eng/query/validate"
        );
        assert_eq!(c.forward_urls.len(), 1);
        assert!(c.public_metrics);
        assert_eq!(c.order_retention_secs, Some(86400));
    }

    #[test]
    fn bad_numbers_are_rejected() {
        let mut vars = MERCHANT.to_vec();
        vars.push(("PORT", "eighty"));
        assert!(matches!(
            config(&vars).unwrap_err(),
            ConfigError::InvalidValue { name: "PORT", .. }
        ));

        let mut vars = MERCHANT.to_vec();
        vars.push(("RATE_LIMIT_RPM", "0"));
        assert!(config(&vars).is_err());

        let mut vars = MERCHANT.to_vec();
        vars.push(("ORDER_RETENTION_SECS", "forever"));
        assert!(matches!(
            config(&vars).unwrap_err(),
            ConfigError::InvalidValue { name: "ORDER_RETENTION_SECS", .. }
        ));
    }

    #[test]
    fn forward_urls_must_be_http() {
        assert!(validate_forward_urls(&["http://localhost:8080/hook".into()]).is_ok());
        assert!(matches!(
            validate_forward_urls(&["ftp://shop.example/hook".into()]),
            Err(ConfigError::InvalidUrl(_))
        ));
        assert!(validate_forward_urls(&["not a url".into()]).is_err());
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut vars = MERCHANT.to_vec();
        vars.extend([
            ("PAYFAST_PASSPHRASE", "jt7NOE43FZPn"),
            ("ITN_SHARED_SECRET", "super-secret-shared-value"),
            ("METRICS_TOKEN", "metrics-token-value"),
        ]);
        let shown = format!("{:?}", config(&vars).unwrap());
        assert!(!shown.contains("jt7NOE43FZPn"));
        assert!(!shown.contains("super-secret-shared-value"));
        assert!(!shown.contains("metrics-token-value"));
        assert!(shown.contains("[REDACTED]"));
    }
}
