//! HMAC-SHA256 payload signatures.
//!
//! The signature is computed over the exact bytes placed in the request body
//! and sent hex-encoded in `X-Webhook-Signature`. Receivers verify against the
//! literal body they received.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex signature.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("HMAC key rejected: {0}")]
    InvalidKey(String),
}

fn keyed(secret: &str) -> Result<HmacSha256, SignatureError> {
    HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| SignatureError::InvalidKey(e.to_string()))
}

/// Sign `payload` with `secret`, returning lowercase hex.
pub fn sign(secret: &str, payload: &[u8]) -> Result<String, SignatureError> {
    let mut mac = keyed(secret)?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check a hex signature against `payload` in constant time.
///
/// Malformed hex is a mismatch, not an error.
pub fn verify(secret: &str, payload: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = keyed(secret) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2
        let sig = sign("Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            sig,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_verify_rejects_garbage() {
        let body = br#"{"type":"member.joined"}"#;
        assert!(!verify("0123456789abcdef", body, "not-hex"));
        assert!(!verify("0123456789abcdef", body, ""));
    }

    proptest! {
        #[test]
        fn prop_sign_is_deterministic(secret in ".{16,64}", payload in prop::collection::vec(any::<u8>(), 0..512)) {
            let a = sign(&secret, &payload).unwrap();
            let b = sign(&secret, &payload).unwrap();
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(a.len(), 64);
            prop_assert!(verify(&secret, &payload, &a));
        }

        #[test]
        fn prop_sign_depends_on_payload(
            secret in ".{16,64}",
            payload in prop::collection::vec(any::<u8>(), 1..256),
            index in any::<prop::sample::Index>(),
        ) {
            let mut altered = payload.clone();
            let i = index.index(altered.len());
            altered[i] ^= 0x01;
            prop_assert_ne!(sign(&secret, &payload).unwrap(), sign(&secret, &altered).unwrap());
        }

        #[test]
        fn prop_sign_depends_on_secret(
            a in "[a-z0-9]{16,32}",
            b in "[a-z0-9]{16,32}",
            payload in prop::collection::vec(any::<u8>(), 0..256),
        ) {
            prop_assume!(a != b);
            let sig = sign(&a, &payload).unwrap();
            prop_assert_ne!(&sig, &sign(&b, &payload).unwrap());
            prop_assert!(!verify(&b, &payload, &sig));
        }
    }
}
