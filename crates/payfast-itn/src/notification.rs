use crate::constants::{
    FIELD_AMOUNT_GROSS, FIELD_M_PAYMENT_ID, FIELD_PAYMENT_STATUS, FIELD_PF_PAYMENT_ID,
    FIELD_TOKEN, STATUS_COMPLETE,
};
use crate::fields::FieldSet;
use crate::signature::{canonical_string, FieldFilter};

/// One received ITN: the posted fields as received, the signature the gateway
/// claims, and the declared origin (Referer).
///
/// Validation only reads it. Dedup across gateway retries is up to the caller,
/// keyed by [`Notification::pf_payment_id`] or [`Notification::payment_id`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    fields: FieldSet,
    signature: Option<String>,
    origin: Option<String>,
}

impl Notification {
    /// Build from an already-decoded field set. `signature` is taken from the
    /// fields; they are kept as is.
    pub fn new(fields: FieldSet, origin: Option<String>) -> Self {
        let signature = fields.get(crate::constants::FIELD_SIGNATURE).map(str::to_string);
        Self {
            fields,
            signature,
            origin,
        }
    }

    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name)
    }

    pub fn claimed_signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub fn status(&self) -> Option<&str> {
        self.get(FIELD_PAYMENT_STATUS)
    }

    pub fn is_complete(&self) -> bool {
        self.status() == Some(STATUS_COMPLETE)
    }

    pub fn payment_id(&self) -> Option<&str> {
        self.get(FIELD_M_PAYMENT_ID)
    }

    pub fn pf_payment_id(&self) -> Option<&str> {
        self.get(FIELD_PF_PAYMENT_ID)
    }

    pub fn amount_gross(&self) -> Option<&str> {
        self.get(FIELD_AMOUNT_GROSS)
    }

    /// Subscription token, present on recurring billing ITNs.
    pub fn token(&self) -> Option<&str> {
        self.get(FIELD_TOKEN).filter(|t| !t.is_empty())
    }

    /// Unkeyed canonical string over the received fields. This is what gets
    /// signed (with the passphrase appended) and what is posted back to the
    /// gateway for confirmation (without it).
    pub fn param_string(&self) -> String {
        canonical_string(&self.fields, FieldFilter::Inbound, None)
    }
}

pub fn fields(notification: &Notification) -> &FieldSet {
    notification.fields()
}

pub fn status(notification: &Notification) -> Option<&str> {
    notification.status()
}

pub fn is_complete(notification: &Notification) -> bool {
    notification.is_complete()
}
