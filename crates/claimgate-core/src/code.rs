//! Opaque claim code identifiers and the wire forms a kiosk prints.
//!
//! A code identifier is a random value (128 bits by default) rendered with
//! URL-safe base64 so it survives QR payloads and URLs unescaped. The
//! printed string is either `<id>:<hex-signature>` or the bare `<id>`; the
//! validator accepts both because historical printed codes use either form.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;

use crate::error::EngineError;
use crate::signer::SIGNATURE_HEX_LEN;

/// Longest code identifier the parser accepts (256-bit id in base64).
const MAX_CODE_ID_LEN: usize = 43;

/// Generates a fresh opaque code identifier of `bits` width.
///
/// `bits` is validated by configuration to be a multiple of 8 in
/// `64..=256`.
#[must_use]
pub fn generate_code_id(bits: u32) -> String {
    let mut raw = vec![0u8; (bits / 8) as usize];
    rand::thread_rng().fill_bytes(&mut raw);
    URL_SAFE_NO_PAD.encode(raw)
}

/// A scanned code string split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedCode {
    /// The opaque code identifier.
    pub code_id: String,
    /// The signature carried on the wire, when the long form was printed.
    pub signature: Option<String>,
}

/// Parses a scanned string into `<id>` or `<id>:<hex-signature>` form.
///
/// # Errors
///
/// Returns [`EngineError::CodeMalformed`] when the identifier is empty,
/// overlong, carries non-URL-safe characters, or the signature part is not
/// 64 hex characters.
pub fn parse_scanned(scanned: &str) -> Result<ScannedCode, EngineError> {
    let scanned = scanned.trim();
    let (id_part, sig_part) = match scanned.split_once(':') {
        Some((id, sig)) => (id, Some(sig)),
        None => (scanned, None),
    };

    if id_part.is_empty() || id_part.len() > MAX_CODE_ID_LEN || !is_url_safe(id_part) {
        return Err(EngineError::CodeMalformed);
    }

    let signature = match sig_part {
        Some(sig) => {
            if sig.len() != SIGNATURE_HEX_LEN
                || !sig.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
            {
                return Err(EngineError::CodeMalformed);
            }
            Some(sig.to_string())
        }
        None => None,
    };

    Ok(ScannedCode {
        code_id: id_part.to_string(),
        signature,
    })
}

/// Renders the long wire form printed by the kiosk.
#[must_use]
pub fn render(code_id: &str, signature: &str) -> String {
    format!("{code_id}:{signature}")
}

fn is_url_safe(s: &str) -> bool {
    s.bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_url_safe_and_unique() {
        let a = generate_code_id(128);
        let b = generate_code_id(128);
        assert_ne!(a, b);
        assert_eq!(a.len(), 22); // 16 bytes, base64 no-pad
        assert!(is_url_safe(&a));
    }

    #[test]
    fn parses_bare_form() {
        let parsed = parse_scanned("qfXhT3nK0m2r8sYwA1bCdg").unwrap();
        assert_eq!(parsed.code_id, "qfXhT3nK0m2r8sYwA1bCdg");
        assert!(parsed.signature.is_none());
    }

    #[test]
    fn parses_long_form() {
        let sig = "ab".repeat(32);
        let parsed = parse_scanned(&format!("qfXhT3nK0m2r8sYwA1bCdg:{sig}")).unwrap();
        assert_eq!(parsed.signature.as_deref(), Some(sig.as_str()));
    }

    #[test]
    fn round_trips_render() {
        let sig = "0f".repeat(32);
        let wire = render("abc-_123", &sig);
        let parsed = parse_scanned(&wire).unwrap();
        assert_eq!(parsed.code_id, "abc-_123");
        assert_eq!(parsed.signature.as_deref(), Some(sig.as_str()));
    }

    #[test]
    fn rejects_malformed_inputs() {
        assert!(parse_scanned("").is_err());
        assert!(parse_scanned(":deadbeef").is_err());
        assert!(parse_scanned("has space").is_err());
        assert!(parse_scanned("id:short").is_err());
        // Uppercase hex is not a valid rendered signature.
        let upper = "AB".repeat(32);
        assert!(parse_scanned(&format!("abc:{upper}")).is_err());
        // Overlong identifier.
        let long = "a".repeat(MAX_CODE_ID_LEN + 1);
        assert!(parse_scanned(&long).is_err());
    }
}
