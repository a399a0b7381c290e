use std::time::Duration;

/// Live gateway host.
pub const LIVE_HOST: &str = "www.payfast.co.za";

/// Sandbox gateway host.
pub const SANDBOX_HOST: &str = "sandbox.payfast.co.za";

/// Hosts a genuine ITN may originate from.
pub const TRUSTED_HOSTS: [&str; 4] = [
    "www.payfast.co.za",
    "sandbox.payfast.co.za",
    "w1w.payfast.co.za",
    "w2w.payfast.co.za",
];

/// Path of the out-of-band confirmation endpoint.
pub const VALIDATE_PATH: &str = "/eng/query/validate";

/// Path of the hosted payment page.
pub const PROCESS_PATH: &str = "/eng/process";

/// Path of the on-site payment engine.
pub const ONSITE_PATH: &str = "/onsite/process";

/// Literal body the confirmation endpoint returns for a genuine notification.
pub const CONFIRMATION_VALID: &str = "VALID";

/// Status value reported for a completed payment.
pub const STATUS_COMPLETE: &str = "COMPLETE";

/// Absolute tolerance, in currency units, when matching `amount_gross`.
pub const AMOUNT_TOLERANCE: f64 = 0.01;

// Notification field names.
pub const FIELD_SIGNATURE: &str = "signature";
pub const FIELD_PAYMENT_STATUS: &str = "payment_status";
pub const FIELD_AMOUNT_GROSS: &str = "amount_gross";
pub const FIELD_M_PAYMENT_ID: &str = "m_payment_id";
pub const FIELD_PF_PAYMENT_ID: &str = "pf_payment_id";
pub const FIELD_TOKEN: &str = "token";
pub const FIELD_PASSPHRASE: &str = "passphrase";

/// User agent sent with confirmation requests.
pub const USER_AGENT: &str = concat!("payfast-itn/", env!("CARGO_PKG_VERSION"));

/// Which PayFast deployment requests are sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Sandbox,
    Live,
}

impl Environment {
    pub fn host(&self) -> &'static str {
        match self {
            Environment::Sandbox => SANDBOX_HOST,
            Environment::Live => LIVE_HOST,
        }
    }

    pub fn base_url(&self) -> String {
        format!("https://{}", self.host())
    }

    /// Confirmation endpoint for ITN step 4.
    pub fn validate_url(&self) -> String {
        format!("{}{VALIDATE_PATH}", self.base_url())
    }

    pub fn process_url(&self) -> String {
        format!("{}{PROCESS_PATH}", self.base_url())
    }

    pub fn onsite_url(&self) -> String {
        format!("{}{ONSITE_PATH}", self.base_url())
    }

    pub fn is_sandbox(&self) -> bool {
        matches!(self, Environment::Sandbox)
    }
}

/// Runtime gateway configuration. Decouples the validator from compile-time
/// constants so the trusted host list and timeouts can be injected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub environment: Environment,
    pub trusted_hosts: Vec<String>,
    /// Override for the confirmation endpoint (defaults to the environment's).
    pub validate_url: Option<String>,
    pub dns_timeout: Duration,
    pub confirm_timeout: Duration,
}

impl GatewayConfig {
    pub fn validate_url(&self) -> String {
        self.validate_url
            .clone()
            .unwrap_or_else(|| self.environment.validate_url())
    }
}

impl Default for GatewayConfig {
    /// Sandbox with the stock trusted host list.
    fn default() -> Self {
        Self {
            environment: Environment::Sandbox,
            trusted_hosts: TRUSTED_HOSTS.iter().map(|h| h.to_string()).collect(),
            validate_url: None,
            dns_timeout: Duration::from_secs(5),
            confirm_timeout: Duration::from_secs(10),
        }
    }
}
