//! PayFast request signing and ITN (Instant Transaction Notification)
//! verification.
//!
//! PayFast tells the merchant about a payment by POSTing a form to the
//! merchant's `notify_url`. Nothing about that request can be trusted until it
//! has passed four checks, see [`ItnValidator`].
//!
//! # Receiving an ITN
//!
//! ```no_run
//! use payfast::{intake, GatewayConfig, ItnValidator, MerchantCredentials, RequestContext};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), payfast::ItnError> {
//! let creds = MerchantCredentials::new("10000100", "46f0cd694581a", Some("jt7NOE43FZPn".into()))?;
//! let validator = ItnValidator::from_config(creds, &GatewayConfig::default())?;
//!
//! let request = RequestContext::post(
//!     b"m_payment_id=SuperUnique1&payment_status=COMPLETE&amount_gross=200.00".to_vec(),
//!     Some("https://sandbox.payfast.co.za/"),
//! );
//! if let Some(notification) = intake(&request, || { /* answer 200 now */ }) {
//!     if validator.validate(&notification, 200.00).await && notification.is_complete() {
//!         // fulfil the order
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Building a checkout
//!
//! ```
//! use payfast::{Environment, MerchantCredentials, PaymentRequest, Transaction};
//!
//! let creds = MerchantCredentials::new("10000100", "46f0cd694581a", None).unwrap();
//! let url = PaymentRequest::one_time(Transaction::new(16.99, "Test"))
//!     .payment_url(&creds, Environment::Sandbox)
//!     .unwrap();
//! assert!(url.contains("amount=16.99"));
//! ```

// Wire format and signing
pub mod constants;
pub mod error;
pub mod fields;
pub mod signature;

// Inbound notifications
pub mod credentials;
pub mod intake;
pub mod notification;

// Validation stages
pub mod confirm;
pub mod origin;
pub mod pipeline;

// Outbound checkout
pub mod payment_method;
pub mod request;

// Re-exports
pub use constants::*;
pub use error::{ErrorKind, ItnError};

pub use fields::FieldSet;
pub use signature::{canonical_string, md5_hex, php_trim, urlencode, FieldFilter, Signer};

pub use credentials::MerchantCredentials;
pub use intake::{intake, strip_slashes, RequestContext};
pub use notification::Notification;

pub use confirm::{CannedConfirmation, ConfirmationClient};
pub use origin::{HostResolver, OriginTrust, ResolvingOriginTrust, StaticResolver};
pub use pipeline::{check_amount, ItnValidator, Stage, ValidationReport};

#[cfg(feature = "full")]
pub use confirm::HttpConfirmationClient;
#[cfg(feature = "full")]
pub use origin::{DnsResolver, SystemResolver, TimeoutResolver};

pub use payment_method::{PaymentMethod, SubscriptionFrequency};
pub use request::{
    update_card_url, Customer, PaymentMode, PaymentRequest, RecurringTerms, Transaction,
};
