//! HMAC-SHA256 authentication for merchant-facing calls and forwarded
//! webhooks.

use actix_web::{HttpRequest, HttpResponse};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::metrics;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC of a `POST /orders` body.
pub const AUTH_HEADER: &str = "X-Itn-Auth";

/// Header carrying the hex HMAC of a forwarded webhook body.
pub const SIGNATURE_HEADER: &str = "X-Itn-Signature";

fn keyed(secret: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length")
}

/// Hex-encoded HMAC-SHA256 of `body`.
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    let mut mac = keyed(secret);
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex HMAC. Malformed hex is compared as zeros.
pub fn verify(secret: &[u8], body: &[u8], signature: &str) -> bool {
    let mut mac = keyed(secret);
    mac.update(body);
    let claimed = hex::decode(signature.trim()).unwrap_or_else(|_| vec![0u8; 32]);
    mac.verify_slice(&claimed).is_ok()
}

/// Check [`AUTH_HEADER`] against the body. The `Err` is the response to send.
pub fn authenticate(req: &HttpRequest, body: &[u8], secret: &[u8]) -> Result<(), HttpResponse> {
    let header = req
        .headers()
        .get(AUTH_HEADER)
        .and_then(|v| v.to_str().ok());

    match header {
        Some(sig) if verify(secret, body, sig) => Ok(()),
        Some(_) => {
            tracing::warn!("HMAC verification failed, signature mismatch");
            metrics::HMAC_FAILURES.with_label_values(&["invalid"]).inc();
            Err(HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "authentication failed"
            })))
        }
        None => {
            tracing::warn!("HMAC header missing on authenticated endpoint");
            metrics::HMAC_FAILURES.with_label_values(&["missing"]).inc();
            Err(HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "authentication required"
            })))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // RFC 4231 test case 2
        assert_eq!(
            sign(b"Jefe", b"what do ya want for nothing?"),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn verifies_own_signature() {
        let sig = sign(b"secret", b"{\"amount\":100}");
        assert!(verify(b"secret", b"{\"amount\":100}", &sig));
        assert!(verify(b"secret", b"{\"amount\":100}", &sig.to_uppercase()));
    }

    #[test]
    fn rejects_wrong_secret_or_body() {
        let sig = sign(b"secret-1", b"body");
        assert!(!verify(b"secret-2", b"body", &sig));
        assert!(!verify(b"secret-1", b"tampered", &sig));
    }

    #[test]
    fn rejects_malformed_hex() {
        assert!(!verify(b"secret", b"body", "zz"));
        assert!(!verify(b"secret", b"body", "abc"));
        assert!(!verify(b"secret", b"body", ""));
    }
}
