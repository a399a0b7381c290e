//! End-to-end: raw form body -> intake -> four-stage validation.

use std::cell::Cell;
use std::net::{IpAddr, Ipv4Addr};

use payfast::{
    intake, CannedConfirmation, ErrorKind, FieldFilter, FieldSet, ItnValidator,
    MerchantCredentials, RequestContext, ResolvingOriginTrust, Signer, Stage, StaticResolver,
};

const PASSPHRASE: &str = "jt7NOE43FZPn";
const PF_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::new(197, 97, 145, 144));
const REFERER: &str = "https://sandbox.payfast.co.za/eng/process";

fn itn_fields() -> FieldSet {
    FieldSet::from([
        ("m_payment_id", "SuperUnique1"),
        ("pf_payment_id", "1089250"),
        ("payment_status", "COMPLETE"),
        ("item_name", "test+product"),
        ("item_description", ""),
        ("amount_gross", "200.00"),
        ("amount_fee", "-4.60"),
        ("amount_net", "195.40"),
        ("custom_str1", "O'Reilly"),
        ("name_first", "John"),
        ("name_last", "Doe"),
        ("email_address", "john@example.com"),
        ("merchant_id", "10012577"),
    ])
}

/// Sign with the passphrase and encode the way the gateway posts it.
fn signed_body(fields: &FieldSet) -> String {
    let mut fields = fields.clone();
    let sig = Signer::new(Some(PASSPHRASE)).sign(&fields, FieldFilter::Inbound);
    fields.insert("signature", sig);
    fields.to_query_string()
}

fn validator(
    confirmation: CannedConfirmation,
) -> ItnValidator<ResolvingOriginTrust<StaticResolver>, CannedConfirmation> {
    let creds = MerchantCredentials::new(
        "10012577",
        "46f0cd694581a",
        Some(PASSPHRASE.to_string()),
    )
    .unwrap();
    let resolver = StaticResolver::new()
        .with_host("www.payfast.co.za", &[PF_ADDR])
        .with_host("sandbox.payfast.co.za", &[PF_ADDR]);
    let origin = ResolvingOriginTrust::new(
        payfast::TRUSTED_HOSTS.iter().map(|h| h.to_string()).collect(),
        resolver,
    );
    ItnValidator::new(creds, origin, confirmation)
}

#[tokio::test]
async fn genuine_itn_is_accepted() {
    let request = RequestContext::post(signed_body(&itn_fields()), Some(REFERER));
    let acked = Cell::new(false);
    let notification = intake(&request, || acked.set(true)).expect("notification");
    assert!(acked.get());

    assert_eq!(notification.payment_id(), Some("SuperUnique1"));
    assert!(notification.is_complete());
    assert!(validator(CannedConfirmation::valid())
        .validate(&notification, 200.00)
        .await);
}

#[tokio::test]
async fn flipped_signature_character_is_rejected() {
    let mut fields = itn_fields();
    let sig = Signer::new(Some(PASSPHRASE)).sign(&fields, FieldFilter::Inbound);
    let mut flipped: Vec<char> = sig.chars().collect();
    flipped[0] = if flipped[0] == 'a' { 'b' } else { 'a' };
    fields.insert("signature", flipped.into_iter().collect::<String>());

    let request = RequestContext::post(fields.to_query_string(), Some(REFERER));
    let notification = intake(&request, || {}).unwrap();
    let v = validator(CannedConfirmation::valid());

    assert!(!v.validate(&notification, 200.00).await);
    let (stage, err) = v.check(&notification, 200.00).await.unwrap_err();
    assert_eq!(stage, Stage::Signature);
    assert_eq!(err.kind(), ErrorKind::Authenticity);
}

#[tokio::test]
async fn escaped_quotes_are_unescaped_before_verification() {
    let fields = itn_fields();
    let body = signed_body(&fields).replace("O%27Reilly", "O%5C%27Reilly");
    let notification = intake(&RequestContext::post(body, Some(REFERER)), || {}).unwrap();
    assert_eq!(notification.get("custom_str1"), Some("O'Reilly"));
    assert!(validator(CannedConfirmation::valid())
        .validate(&notification, 200.00)
        .await);
}

#[tokio::test]
async fn amount_outside_tolerance_is_rejected() {
    let request = RequestContext::post(signed_body(&itn_fields()), Some(REFERER));
    let notification = intake(&request, || {}).unwrap();
    let (stage, err) = validator(CannedConfirmation::valid())
        .check(&notification, 250.00)
        .await
        .unwrap_err();
    assert_eq!(stage, Stage::Amount);
    assert_eq!(err.kind(), ErrorKind::Integrity);
}

#[tokio::test]
async fn foreign_origin_is_rejected() {
    let request = RequestContext::post(
        signed_body(&itn_fields()),
        Some("https://198.51.100.20/notify"),
    );
    let notification = intake(&request, || {}).unwrap();
    let report = validator(CannedConfirmation::valid())
        .report(&notification, 200.00)
        .await;
    assert_eq!(report.failed_stage, Some(Stage::Origin));
}

#[test]
fn non_post_is_acknowledged_but_dropped() {
    let acked = Cell::new(false);
    let request = RequestContext::new("GET", signed_body(&itn_fields()), None);
    assert!(intake(&request, || acked.set(true)).is_none());
    assert!(acked.get());

    let empty = RequestContext::post(Vec::new(), Some(REFERER));
    assert!(intake(&empty, || {}).is_none());
}
