//! HMAC signing of claim payloads.
//!
//! The signature is HMAC-SHA-256 over the RFC 8785 (JCS) canonical encoding
//! of the payload: sorted keys, minimal separators, UTF-8. It is rendered as
//! 64 lowercase hex characters. Verification recomputes and compares in
//! constant time; it never short-circuits on length and never errors. A bad
//! signature is simply `false`.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::model::ClaimPayload;

type HmacSha256 = Hmac<Sha256>;

/// Hex width of a rendered signature (SHA-256 digest).
pub const SIGNATURE_HEX_LEN: usize = 64;

/// Stateless signer keyed with the process-wide secret.
pub struct ClaimSigner {
    secret: Vec<u8>,
}

impl ClaimSigner {
    /// Creates a signer over the given secret bytes.
    ///
    /// Entropy requirements are enforced by configuration validation, not
    /// here.
    #[must_use]
    pub fn new(secret: Vec<u8>) -> Self {
        Self { secret }
    }

    /// Signs a payload, returning lowercase hex of the full 32-byte digest.
    #[must_use]
    pub fn sign(&self, payload: &ClaimPayload) -> String {
        let canonical = canonical_bytes(payload);
        // HMAC accepts keys of any length.
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
        mac.update(&canonical);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Verifies a signature against a payload in constant time.
    #[must_use]
    pub fn verify(&self, payload: &ClaimPayload, signature: &str) -> bool {
        let expected = self.sign(payload);
        constant_time_hex_eq(&expected, signature)
    }
}

/// Canonical byte encoding of the payload (JCS).
fn canonical_bytes(payload: &ClaimPayload) -> Vec<u8> {
    // The payload is a flat record of integers and short strings; JCS
    // serialisation cannot fail on it.
    serde_jcs::to_vec(payload).unwrap_or_default()
}

/// Compares two hex strings without leaking a timing signal on the matching
/// prefix. Mismatched lengths still run the comparison over the shorter
/// input before returning false.
fn constant_time_hex_eq(expected: &str, provided: &str) -> bool {
    let expected = expected.as_bytes();
    let provided = provided.as_bytes();
    let len_ok = expected.len() == provided.len();
    let shorter = expected.len().min(provided.len());
    let bytes_ok: bool = expected[..shorter].ct_eq(&provided[..shorter]).into();
    len_ok && bytes_ok
}
