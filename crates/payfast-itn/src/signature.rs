//! Canonical field serialization and MD5 signing.
//!
//! The same canonical string feeds two call sites that disagree on which
//! fields take part, see [`FieldFilter`]. Both behaviors mirror what the
//! gateway does on its side of the exchange and must stay distinct.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::constants::{FIELD_PASSPHRASE, FIELD_SIGNATURE};
use crate::fields::FieldSet;

/// Which fields of a [`FieldSet`] enter the canonical string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldFilter {
    /// Building a request to send: empty values are left out.
    Outbound,
    /// Checking a received notification: everything but `signature`,
    /// empty values included.
    Inbound,
}

impl FieldFilter {
    pub fn includes(&self, key: &str, value: &str) -> bool {
        match self {
            FieldFilter::Outbound => !value.is_empty(),
            FieldFilter::Inbound => key != FIELD_SIGNATURE,
        }
    }
}

/// PHP `urlencode`: alphanumerics and `-_.` pass through, space becomes `+`,
/// everything else is `%XX`.
pub fn urlencode(value: &str) -> String {
    // form_urlencoded leaves `*` alone; PHP escapes it.
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('*', "%2A")
}

/// PHP `trim`: strips space, tab, newline, carriage return, NUL and vertical
/// tab from both ends. Other Unicode whitespace is kept.
pub fn php_trim(value: &str) -> &str {
    value.trim_matches(&[' ', '\t', '\n', '\r', '\0', '\x0B'][..])
}

/// Build the canonical string: `k1=v1&k2=v2` over the included fields in
/// order, values trimmed and url-encoded, then `&passphrase=...` if present.
pub fn canonical_string(fields: &FieldSet, filter: FieldFilter, passphrase: Option<&str>) -> String {
    let mut out = fields
        .iter()
        .filter(|(k, v)| filter.includes(k, v))
        .map(|(k, v)| format!("{k}={}", urlencode(php_trim(v))))
        .collect::<Vec<_>>()
        .join("&");

    if let Some(passphrase) = passphrase {
        out.push('&');
        out.push_str(FIELD_PASSPHRASE);
        out.push('=');
        out.push_str(&urlencode(php_trim(passphrase)));
    }
    out
}

/// Lowercase hex MD5 digest.
pub fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

/// Constant-time comparison that leaks neither content nor length: both sides
/// are hashed to fixed-size digests before `ConstantTimeEq`.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let ha = Sha256::digest(a);
    let hb = Sha256::digest(b);
    ha.ct_eq(&hb).into()
}

/// Keyed signer: canonical string plus the merchant passphrase, hashed.
#[derive(Clone, Default)]
pub struct Signer {
    passphrase: Option<String>,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Signer {
    pub fn new(passphrase: Option<&str>) -> Self {
        Self {
            passphrase: passphrase.map(str::to_string),
        }
    }

    pub fn passphrase(&self) -> Option<&str> {
        self.passphrase.as_deref()
    }

    pub fn canonical(&self, fields: &FieldSet, filter: FieldFilter) -> String {
        canonical_string(fields, filter, self.passphrase())
    }

    pub fn sign(&self, fields: &FieldSet, filter: FieldFilter) -> String {
        md5_hex(&self.canonical(fields, filter))
    }

    /// Compare `claimed` against the recomputed signature in constant time.
    /// Hex case is significant, as with the gateway.
    pub fn verify(&self, fields: &FieldSet, filter: FieldFilter, claimed: &str) -> bool {
        let expected = self.sign(fields, filter);
        constant_time_eq(expected.as_bytes(), claimed.as_bytes())
    }
}
