use crate::error::ItnError;
use crate::signature::Signer;

/// Merchant identity as configured on the PayFast dashboard.
///
/// Immutable once built; share it behind an `Arc` or clone it per handler.
#[derive(Clone, PartialEq, Eq)]
pub struct MerchantCredentials {
    merchant_id: String,
    merchant_key: String,
    passphrase: Option<String>,
}

impl MerchantCredentials {
    /// Rejects blank merchant id or key. A blank passphrase counts as none.
    pub fn new(
        merchant_id: impl Into<String>,
        merchant_key: impl Into<String>,
        passphrase: Option<String>,
    ) -> Result<Self, ItnError> {
        let merchant_id = merchant_id.into().trim().to_string();
        let merchant_key = merchant_key.into().trim().to_string();

        if merchant_id.is_empty() {
            return Err(ItnError::ConfigError("merchant id is empty".to_string()));
        }
        if merchant_key.is_empty() {
            return Err(ItnError::ConfigError("merchant key is empty".to_string()));
        }

        let passphrase = passphrase.filter(|p| !p.trim().is_empty());

        Ok(Self {
            merchant_id,
            merchant_key,
            passphrase,
        })
    }

    pub fn merchant_id(&self) -> &str {
        &self.merchant_id
    }

    pub fn merchant_key(&self) -> &str {
        &self.merchant_key
    }

    pub fn passphrase(&self) -> Option<&str> {
        self.passphrase.as_deref()
    }

    pub fn signer(&self) -> Signer {
        Signer::new(self.passphrase())
    }
}

impl std::fmt::Debug for MerchantCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MerchantCredentials")
            .field("merchant_id", &self.merchant_id)
            .field("merchant_key", &"[REDACTED]")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
