//! The ITN validation pipeline.
//!
//! Four independent stages, run in order and short-circuited:
//!
//! 1. [`Stage::Signature`]: recomputed MD5 signature matches the claimed one
//! 2. [`Stage::Origin`]: declared origin resolves to a gateway address
//! 3. [`Stage::Amount`]: `amount_gross` matches what the merchant expects
//! 4. [`Stage::Confirmation`]: the gateway answers `VALID` when asked
//!
//! Stage 4 is the only one that talks to the gateway, so it runs last.

use serde::Serialize;

use crate::confirm::ConfirmationClient;
use crate::constants::{AMOUNT_TOLERANCE, CONFIRMATION_VALID, FIELD_AMOUNT_GROSS};
use crate::credentials::MerchantCredentials;
use crate::error::{ErrorKind, ItnError};
use crate::notification::Notification;
use crate::origin::OriginTrust;
use crate::signature::{FieldFilter, Signer};

/// One check of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Signature,
    Origin,
    Amount,
    Confirmation,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Signature => "signature",
            Stage::Origin => "origin",
            Stage::Amount => "amount",
            Stage::Confirmation => "confirmation",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a full pipeline run, with the reason when it failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ValidationReport {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            failed_stage: None,
            kind: None,
            reason: None,
        }
    }

    pub fn failed(stage: Stage, error: &ItnError) -> Self {
        Self {
            is_valid: false,
            failed_stage: Some(stage),
            kind: Some(error.kind()),
            reason: Some(error.to_string()),
        }
    }
}

/// Parse and compare `amount_gross` against the expected amount.
pub fn check_amount(notification: &Notification, expected: f64) -> Result<(), ItnError> {
    let raw = notification
        .amount_gross()
        .ok_or(ItnError::MissingField(FIELD_AMOUNT_GROSS))?;

    let received: f64 = raw
        .trim()
        .parse()
        .map_err(|_| ItnError::InvalidAmount(raw.to_string()))?;
    if !received.is_finite() {
        return Err(ItnError::InvalidAmount(raw.to_string()));
    }

    if (expected - received).abs() < AMOUNT_TOLERANCE {
        Ok(())
    } else {
        Err(ItnError::AmountMismatch { expected, received })
    }
}

/// Validates ITNs for one merchant.
///
/// Holds no mutable state: share one instance across requests.
pub struct ItnValidator<O, C> {
    credentials: MerchantCredentials,
    signer: Signer,
    origin: O,
    confirmation: C,
}

#[cfg(feature = "full")]
impl
    ItnValidator<
        crate::origin::ResolvingOriginTrust<crate::origin::DnsResolver>,
        crate::confirm::HttpConfirmationClient,
    >
{
    /// Validator backed by live DNS and the gateway's confirmation endpoint.
    pub fn from_config(
        credentials: MerchantCredentials,
        config: &crate::constants::GatewayConfig,
    ) -> Result<Self, ItnError> {
        if config.trusted_hosts.is_empty() {
            return Err(ItnError::ConfigError("trusted host list is empty".to_string()));
        }
        let origin = crate::origin::ResolvingOriginTrust::new(
            config.trusted_hosts.clone(),
            crate::origin::TimeoutResolver::new(crate::origin::SystemResolver, config.dns_timeout),
        );
        let confirmation =
            crate::confirm::HttpConfirmationClient::new(config.validate_url(), config.confirm_timeout)?;
        Ok(Self::new(credentials, origin, confirmation))
    }
}

impl<O, C> ItnValidator<O, C>
where
    O: OriginTrust,
    C: ConfirmationClient,
{
    pub fn new(credentials: MerchantCredentials, origin: O, confirmation: C) -> Self {
        let signer = credentials.signer();
        Self {
            credentials,
            signer,
            origin,
            confirmation,
        }
    }

    pub fn credentials(&self) -> &MerchantCredentials {
        &self.credentials
    }

    /// Stage 1.
    pub fn check_signature(&self, notification: &Notification) -> Result<(), ItnError> {
        let claimed = notification
            .claimed_signature()
            .ok_or(ItnError::MissingSignature)?;

        if self
            .signer
            .verify(notification.fields(), FieldFilter::Inbound, claimed)
        {
            Ok(())
        } else {
            Err(ItnError::SignatureMismatch)
        }
    }

    /// Stage 2.
    pub async fn check_origin(&self, notification: &Notification) -> Result<(), ItnError> {
        self.origin.verify_origin(notification.origin()).await
    }

    /// Stage 3.
    pub fn check_amount(&self, notification: &Notification, expected: f64) -> Result<(), ItnError> {
        check_amount(notification, expected)
    }

    /// Stage 4. Blocks on a round trip to the gateway.
    pub async fn confirm(&self, notification: &Notification) -> Result<(), ItnError> {
        let body = self.confirmation.confirm(&notification.param_string()).await?;
        if body == CONFIRMATION_VALID {
            Ok(())
        } else {
            let shown: String = body.chars().take(64).collect();
            Err(ItnError::ConfirmationRejected(shown))
        }
    }

    /// Run all stages in order, stopping at the first failure.
    pub async fn check(&self, notification: &Notification, expected: f64) -> Result<(), (Stage, ItnError)> {
        self.check_signature(notification)
            .map_err(|e| (Stage::Signature, e))?;
        self.check_origin(notification)
            .await
            .map_err(|e| (Stage::Origin, e))?;
        self.check_amount(notification, expected)
            .map_err(|e| (Stage::Amount, e))?;
        self.confirm(notification)
            .await
            .map_err(|e| (Stage::Confirmation, e))?;
        Ok(())
    }

    /// Run the pipeline and log the result.
    pub async fn report(&self, notification: &Notification, expected: f64) -> ValidationReport {
        let m_payment_id = notification.payment_id().unwrap_or("-");
        let pf_payment_id = notification.pf_payment_id().unwrap_or("-");

        match self.check(notification, expected).await {
            Ok(()) => {
                tracing::info!(
                    m_payment_id,
                    pf_payment_id,
                    status = notification.status().unwrap_or("-"),
                    "ITN validated"
                );
                ValidationReport::valid()
            }
            Err((stage, e)) => {
                match e.kind() {
                    ErrorKind::Authenticity => tracing::warn!(
                        m_payment_id,
                        pf_payment_id,
                        stage = %stage,
                        origin = notification.origin().unwrap_or("-"),
                        error = %e,
                        "ITN failed authenticity check, possible forgery"
                    ),
                    ErrorKind::Infrastructure => tracing::error!(
                        m_payment_id,
                        pf_payment_id,
                        stage = %stage,
                        error = %e,
                        "ITN could not be verified"
                    ),
                    _ => tracing::warn!(
                        m_payment_id,
                        pf_payment_id,
                        stage = %stage,
                        error = %e,
                        "ITN rejected"
                    ),
                }
                ValidationReport::failed(stage, &e)
            }
        }
    }

    /// Boolean form of [`ItnValidator::report`].
    pub async fn validate(&self, notification: &Notification, expected: f64) -> bool {
        self.report(notification, expected).await.is_valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirm::CannedConfirmation;
    use crate::fields::FieldSet;
    use crate::origin::{ResolvingOriginTrust, StaticResolver};
    use std::net::{IpAddr, Ipv4Addr};

    const PF: IpAddr = IpAddr::V4(Ipv4Addr::new(144, 126, 193, 139));

    fn creds(passphrase: Option<&str>) -> MerchantCredentials {
        MerchantCredentials::new("10012577", "46f0cd694581a", passphrase.map(String::from)).unwrap()
    }

    fn validator(
        passphrase: Option<&str>,
        confirmation: CannedConfirmation,
    ) -> ItnValidator<ResolvingOriginTrust<StaticResolver>, CannedConfirmation> {
        let resolver = StaticResolver::new().with_host("www.payfast.co.za", &[PF]);
        let origin = ResolvingOriginTrust::new(vec!["www.payfast.co.za".into()], resolver);
        ItnValidator::new(creds(passphrase), origin, confirmation)
    }

    fn signed_itn(passphrase: Option<&str>, amount: Option<&str>) -> Notification {
        let mut fields = FieldSet::from([
            ("m_payment_id", "SuperUnique1"),
            ("pf_payment_id", "1089250"),
            ("payment_status", "COMPLETE"),
            ("item_name", "test product"),
        ]);
        if let Some(a) = amount {
            fields.insert("amount_gross", a);
        }
        fields.insert("merchant_id", "10012577");
        let sig = Signer::new(passphrase).sign(&fields, FieldFilter::Inbound);
        fields.insert("signature", sig);
        Notification::new(fields, Some("https://www.payfast.co.za/eng/process".into()))
    }

    #[test]
    fn amount_tolerance() {
        assert!(check_amount(&signed_itn(None, Some("100.00")), 100.00).is_ok());
        assert!(check_amount(&signed_itn(None, Some("100.009")), 100.00).is_ok());
        assert!(check_amount(&signed_itn(None, Some("99.995")), 100.00).is_ok());
        assert!(matches!(
            check_amount(&signed_itn(None, Some("100.02")), 100.00),
            Err(ItnError::AmountMismatch { .. })
        ));
        assert!(matches!(
            check_amount(&signed_itn(None, None), 100.00),
            Err(ItnError::MissingField("amount_gross"))
        ));
    }

    #[test]
    fn amount_must_parse() {
        assert!(matches!(
            check_amount(&signed_itn(None, Some("two hundred")), 200.00),
            Err(ItnError::InvalidAmount(_))
        ));
        assert!(matches!(
            check_amount(&signed_itn(None, Some("NaN")), 200.00),
            Err(ItnError::InvalidAmount(_))
        ));
    }

    #[test]
    fn signature_stage_needs_same_passphrase() {
        let n = signed_itn(Some("jt7NOE43FZPn"), Some("200.00"));
        assert!(validator(Some("jt7NOE43FZPn"), CannedConfirmation::valid())
            .check_signature(&n)
            .is_ok());
        assert!(matches!(
            validator(Some("other"), CannedConfirmation::valid()).check_signature(&n),
            Err(ItnError::SignatureMismatch)
        ));
        assert!(validator(None, CannedConfirmation::valid())
            .check_signature(&n)
            .is_err());
    }

    #[test]
    fn signature_stage_detects_tampering() {
        let n = signed_itn(None, Some("200.00"));
        let mut fields = n.fields().clone();
        fields.insert("amount_gross", "2.00");
        let tampered = Notification::new(fields, n.origin().map(String::from));
        assert!(matches!(
            validator(None, CannedConfirmation::valid()).check_signature(&tampered),
            Err(ItnError::SignatureMismatch)
        ));
    }

    #[test]
    fn missing_signature_is_protocol_error() {
        let fields = FieldSet::from([("amount_gross", "200.00")]);
        let n = Notification::new(fields, None);
        let err = validator(None, CannedConfirmation::valid())
            .check_signature(&n)
            .unwrap_err();
        assert!(matches!(err, ItnError::MissingSignature));
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn all_stages_pass() {
        let v = validator(None, CannedConfirmation::valid());
        let n = signed_itn(None, Some("200.00"));
        assert!(v.validate(&n, 200.00).await);
        assert_eq!(v.report(&n, 200.00).await, ValidationReport::valid());
    }

    #[tokio::test]
    async fn minimal_four_field_itn_passes() {
        let mut fields = FieldSet::from([
            ("m_payment_id", "SuperUnique1"),
            ("payment_status", "COMPLETE"),
            ("amount_gross", "200.00"),
            ("merchant_id", "10012577"),
        ]);
        let sig = Signer::new(Some("jt7NOE43FZPn")).sign(&fields, FieldFilter::Inbound);
        fields.insert("signature", sig);
        let n = Notification::new(fields, Some("https://www.payfast.co.za/eng/process".into()));

        let v = validator(Some("jt7NOE43FZPn"), CannedConfirmation::valid());
        assert!(v.validate(&n, 200.00).await);
        assert!(n.is_complete());
        assert_eq!(n.payment_id(), Some("SuperUnique1"));
    }

    #[cfg(feature = "full")]
    #[tokio::test]
    async fn stalled_dns_is_retryable_origin_failure() {
        use crate::origin::{HostResolver, TimeoutResolver};

        struct Stalled;
        impl HostResolver for Stalled {
            async fn resolve(&self, _host: &str) -> Result<Vec<IpAddr>, ItnError> {
                std::future::pending().await
            }
        }

        let origin = ResolvingOriginTrust::new(
            vec!["www.payfast.co.za".into()],
            TimeoutResolver::new(Stalled, std::time::Duration::from_millis(10)),
        );
        let v = ItnValidator::new(creds(None), origin, CannedConfirmation::valid());
        let n = signed_itn(None, Some("200.00"));

        let report = v.report(&n, 200.00).await;
        assert!(!report.is_valid);
        assert_eq!(report.failed_stage, Some(Stage::Origin));
        assert_eq!(report.kind, Some(ErrorKind::Infrastructure));
    }

    #[tokio::test]
    async fn gateway_rejection_is_authenticity_failure() {
        let v = validator(None, CannedConfirmation::invalid());
        let report = v.report(&signed_itn(None, Some("200.00")), 200.00).await;
        assert!(!report.is_valid);
        assert_eq!(report.failed_stage, Some(Stage::Confirmation));
        assert_eq!(report.kind, Some(ErrorKind::Authenticity));
    }

    #[tokio::test]
    async fn confirmation_timeout_is_infrastructure_failure() {
        let v = validator(None, CannedConfirmation::Timeout);
        let report = v.report(&signed_itn(None, Some("200.00")), 200.00).await;
        assert_eq!(report.failed_stage, Some(Stage::Confirmation));
        assert_eq!(report.kind, Some(ErrorKind::Infrastructure));
        assert!(!v.validate(&signed_itn(None, Some("200.00")), 200.00).await);
    }

    #[tokio::test]
    async fn confirmation_body_must_match_exactly() {
        let v = validator(None, CannedConfirmation::Body("VALID\n".into()));
        let err = v.confirm(&signed_itn(None, Some("200.00"))).await.unwrap_err();
        assert!(matches!(err, ItnError::ConfirmationRejected(_)));
    }

    #[tokio::test]
    async fn short_circuits_on_first_failure() {
        let v = validator(None, CannedConfirmation::valid());
        let n = signed_itn(None, Some("150.00"));
        let (stage, err) = v.check(&n, 200.00).await.unwrap_err();
        assert_eq!(stage, Stage::Amount);
        assert_eq!(err.kind(), ErrorKind::Integrity);
    }

    #[tokio::test]
    async fn untrusted_origin_fails_origin_stage() {
        let v = validator(None, CannedConfirmation::valid());
        let n = signed_itn(None, Some("200.00"));
        let moved = Notification::new(n.fields().clone(), Some("https://198.51.100.4/".into()));
        let report = v.report(&moved, 200.00).await;
        assert_eq!(report.failed_stage, Some(Stage::Origin));
        assert_eq!(report.kind, Some(ErrorKind::Authenticity));
    }

    #[test]
    fn report_serializes_camel_case() {
        let report = ValidationReport::failed(Stage::Signature, &ItnError::SignatureMismatch);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["isValid"], false);
        assert_eq!(json["failedStage"], "signature");
        assert_eq!(json["kind"], "authenticity");
        assert_eq!(json["reason"], "signature mismatch");
    }
}
