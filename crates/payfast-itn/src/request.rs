//! Outbound payment requests: one-off, subscription and tokenization checkouts
//! share one builder, selected by [`PaymentMode`].

use chrono::NaiveDate;

use crate::constants::{Environment, FIELD_SIGNATURE, LIVE_HOST};
use crate::credentials::MerchantCredentials;
use crate::error::ItnError;
use crate::fields::FieldSet;
use crate::payment_method::{PaymentMethod, SubscriptionFrequency};
use crate::signature::{canonical_string, urlencode, FieldFilter};

/// Buyer details. All optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Customer {
    pub name_first: Option<String>,
    pub name_last: Option<String>,
    pub email_address: Option<String>,
    pub cell_number: Option<String>,
}

/// What is being paid for.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    /// Amount in ZAR.
    pub amount: f64,
    pub item_name: String,
    pub item_description: Option<String>,
    /// Merchant-side unique payment id, echoed back in the ITN.
    pub m_payment_id: Option<String>,
    pub email_confirmation: Option<bool>,
    pub confirmation_address: Option<String>,
    pub payment_method: Option<PaymentMethod>,
}

impl Transaction {
    pub fn new(amount: f64, item_name: impl Into<String>) -> Self {
        Self {
            amount,
            item_name: item_name.into(),
            item_description: None,
            m_payment_id: None,
            email_confirmation: Some(true),
            confirmation_address: None,
            payment_method: None,
        }
    }
}

/// Recurring billing terms shared by subscriptions and tokenization.
#[derive(Debug, Clone, PartialEq)]
pub struct RecurringTerms {
    pub frequency: SubscriptionFrequency,
    /// Number of charges; 0 means until cancelled.
    pub cycles: u32,
    /// First future charge date. Defaults to today on the gateway side.
    pub billing_date: Option<NaiveDate>,
    /// Future charge amount. Defaults to the transaction amount.
    pub recurring_amount: Option<f64>,
    pub notify_email: Option<bool>,
    pub notify_webhook: Option<bool>,
    pub notify_buyer: Option<bool>,
}

impl RecurringTerms {
    pub fn new(frequency: SubscriptionFrequency) -> Self {
        Self {
            frequency,
            cycles: 0,
            billing_date: None,
            recurring_amount: None,
            notify_email: None,
            notify_webhook: None,
            notify_buyer: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentMode {
    OneTime,
    /// Fixed-schedule recurring charge (`subscription_type=1`).
    Subscription(RecurringTerms),
    /// Card stored for merchant-initiated charges (`subscription_type=2`).
    Tokenization(RecurringTerms),
}

impl PaymentMode {
    fn subscription_type(&self) -> Option<u8> {
        match self {
            PaymentMode::OneTime => None,
            PaymentMode::Subscription(_) => Some(1),
            PaymentMode::Tokenization(_) => Some(2),
        }
    }

    fn terms(&self) -> Option<&RecurringTerms> {
        match self {
            PaymentMode::OneTime => None,
            PaymentMode::Subscription(t) | PaymentMode::Tokenization(t) => Some(t),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub mode: PaymentMode,
    pub return_url: Option<String>,
    pub cancel_url: Option<String>,
    pub notify_url: Option<String>,
    pub customer: Customer,
    pub transaction: Transaction,
}

fn format_amount(amount: f64) -> Result<String, ItnError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(ItnError::InvalidAmount(amount.to_string()));
    }
    Ok(format!("{amount:.2}"))
}

fn flag(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

impl PaymentRequest {
    pub fn new(mode: PaymentMode, transaction: Transaction) -> Self {
        Self {
            mode,
            return_url: None,
            cancel_url: None,
            notify_url: None,
            customer: Customer::default(),
            transaction,
        }
    }

    pub fn one_time(transaction: Transaction) -> Self {
        Self::new(PaymentMode::OneTime, transaction)
    }

    pub fn with_urls(
        mut self,
        return_url: Option<&str>,
        cancel_url: Option<&str>,
        notify_url: Option<&str>,
    ) -> Self {
        self.return_url = return_url.map(String::from);
        self.cancel_url = cancel_url.map(String::from);
        self.notify_url = notify_url.map(String::from);
        self
    }

    pub fn with_customer(mut self, customer: Customer) -> Self {
        self.customer = customer;
        self
    }

    /// Ordered fields before filtering; `None` marks an absent value.
    fn raw_fields(
        &self,
        credentials: &MerchantCredentials,
    ) -> Result<Vec<(&'static str, Option<String>)>, ItnError> {
        let tx = &self.transaction;
        let c = &self.customer;

        let mut raw = vec![
            ("merchant_id", Some(credentials.merchant_id().to_string())),
            ("merchant_key", Some(credentials.merchant_key().to_string())),
            ("return_url", self.return_url.clone()),
            ("cancel_url", self.cancel_url.clone()),
            ("notify_url", self.notify_url.clone()),
            ("name_first", c.name_first.clone()),
            ("name_last", c.name_last.clone()),
            ("email_address", c.email_address.clone()),
            ("cell_number", c.cell_number.clone()),
            ("m_payment_id", tx.m_payment_id.clone()),
            ("amount", Some(format_amount(tx.amount)?)),
            ("item_name", Some(tx.item_name.clone())),
            ("item_description", tx.item_description.clone()),
            ("email_confirmation", tx.email_confirmation.map(flag)),
            ("confirmation_address", tx.confirmation_address.clone()),
            ("payment_method", tx.payment_method.map(|m| m.code().to_string())),
        ];

        if let (Some(kind), Some(terms)) = (self.mode.subscription_type(), self.mode.terms()) {
            let recurring_amount = terms.recurring_amount.map(format_amount).transpose()?;
            raw.extend([
                ("subscription_type", Some(kind.to_string())),
                (
                    "billing_date",
                    terms.billing_date.map(|d| d.format("%Y-%m-%d").to_string()),
                ),
                ("recurring_amount", recurring_amount),
                ("frequency", Some(terms.frequency.code().to_string())),
                ("cycles", Some(terms.cycles.to_string())),
                ("subscription_notify_email", terms.notify_email.map(flag)),
                ("subscription_notify_webhook", terms.notify_webhook.map(flag)),
                ("subscription_notify_buyer", terms.notify_buyer.map(flag)),
            ]);
        }
        Ok(raw)
    }

    /// Signed field set to post (or redirect) to the gateway.
    ///
    /// Absent and empty values are dropped, then `signature` is appended.
    /// Recurring modes require a passphrase.
    pub fn fields(&self, credentials: &MerchantCredentials) -> Result<FieldSet, ItnError> {
        if self.mode.terms().is_some() && credentials.passphrase().is_none() {
            return Err(ItnError::ConfigError(
                "a passphrase is required for subscription and tokenization payments".to_string(),
            ));
        }

        let mut fields: FieldSet = self
            .raw_fields(credentials)?
            .into_iter()
            .filter_map(|(k, v)| v.filter(|v| !v.is_empty()).map(|v| (k, v)))
            .collect();

        let signature = credentials.signer().sign(&fields, FieldFilter::Outbound);
        fields.insert(FIELD_SIGNATURE, signature);
        Ok(fields)
    }

    /// Hosted payment page URL to redirect the buyer to.
    pub fn payment_url(
        &self,
        credentials: &MerchantCredentials,
        environment: Environment,
    ) -> Result<String, ItnError> {
        let fields = self.fields(credentials)?;
        Ok(format!(
            "{}?{}",
            environment.process_url(),
            fields.to_query_string()
        ))
    }

    /// Signed body for the on-site payment engine POST, which returns the
    /// payment identifier for the on-site modal.
    pub fn onsite_body(&self, credentials: &MerchantCredentials) -> Result<String, ItnError> {
        let fields = self.fields(credentials)?;
        Ok(canonical_string(&fields, FieldFilter::Outbound, None))
    }
}

/// Page where a buyer updates the card behind a subscription token.
pub fn update_card_url(token: &str, return_to: Option<&str>) -> String {
    let base = format!("https://{LIVE_HOST}/eng/recurring/update/{}", urlencode(token));
    match return_to.filter(|r| !r.is_empty()) {
        Some(r) => format!("{base}?return={}", urlencode(r)),
        None => base,
    }
}
