//! National identifier normalisation (RUT format).
//!
//! Inputs arrive from kiosk keypads with arbitrary punctuation
//! (`12.345.678-5`, `12345678 5`, lowercase `k` verifier). Normalisation
//! strips punctuation and whitespace, upper-cases the verifier, validates
//! the shape, and checks the modulo-11 verifier digit. The normalised form
//! is `<digits>-<verifier>` and is the unique key on the employee roster.

use thiserror::Error;

/// Why a national id failed normalisation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum NationalIdError {
    /// Nothing left after stripping separators.
    #[error("empty national id")]
    Empty,

    /// The input does not match `digits + verifier`.
    #[error("national id has invalid shape")]
    BadFormat,

    /// The verifier character does not match the modulo-11 checksum.
    #[error("national id checksum mismatch: expected verifier {expected}")]
    BadChecksum {
        /// The verifier the checksum requires.
        expected: char,
    },
}

/// Normalises a raw national id into `<digits>-<verifier>` form.
///
/// # Errors
///
/// Returns a [`NationalIdError`] when the input is empty, malformed, or
/// fails the checksum.
pub fn normalize(raw: &str) -> Result<String, NationalIdError> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '.' | '-' | ' ' | '\t'))
        .collect();
    if cleaned.is_empty() {
        return Err(NationalIdError::Empty);
    }

    let mut chars = cleaned.chars();
    let verifier = chars
        .next_back()
        .map(|c| c.to_ascii_uppercase())
        .ok_or(NationalIdError::Empty)?;
    let body: String = chars.collect();

    if body.is_empty() || body.len() > 8 || !body.bytes().all(|b| b.is_ascii_digit()) {
        return Err(NationalIdError::BadFormat);
    }
    if !(verifier.is_ascii_digit() || verifier == 'K') {
        return Err(NationalIdError::BadFormat);
    }

    let expected = checksum(&body);
    if verifier != expected {
        return Err(NationalIdError::BadChecksum { expected });
    }

    Ok(format!("{body}-{verifier}"))
}

/// Modulo-11 verifier over the digit body, weights cycling 2..=7 from the
/// rightmost digit.
fn checksum(body: &str) -> char {
    let sum: u32 = body
        .bytes()
        .rev()
        .zip([2u32, 3, 4, 5, 6, 7].into_iter().cycle())
        .map(|(b, w)| u32::from(b - b'0') * w)
        .sum();
    match 11 - (sum % 11) {
        11 => '0',
        10 => 'K',
        d => char::from_digit(d, 10).unwrap_or('0'),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn normalizes_punctuated_forms() {
        assert_eq!(normalize("12.345.678-5").unwrap(), "12345678-5");
        assert_eq!(normalize("12345678-5").unwrap(), "12345678-5");
        assert_eq!(normalize(" 123456785 ").unwrap(), "12345678-5");
    }

    #[test]
    fn uppercases_k_verifier() {
        // Body 20332717 has verifier K under modulo 11.
        assert_eq!(checksum("20332717"), 'K');
        assert_eq!(normalize("20.332.717-k").unwrap(), "20332717-K");
    }

    #[test]
    fn rejects_bad_checksum() {
        let err = normalize("12345678-4").unwrap_err();
        assert_eq!(err, NationalIdError::BadChecksum { expected: '5' });
    }

    #[test]
    fn rejects_malformed_inputs() {
        assert_eq!(normalize("").unwrap_err(), NationalIdError::Empty);
        assert_eq!(normalize("...---").unwrap_err(), NationalIdError::Empty);
        assert_eq!(normalize("abc-5").unwrap_err(), NationalIdError::BadFormat);
        assert_eq!(
            normalize("123456789012-5").unwrap_err(),
            NationalIdError::BadFormat
        );
        // Verifier must be a digit or K.
        assert_eq!(normalize("1234567X").unwrap_err(), NationalIdError::BadFormat);
    }

    proptest! {
        /// Normalisation is idempotent on its own output.
        #[test]
        fn normalize_idempotent(body in 1u32..99_999_999) {
            let body = body.to_string();
            let id = format!("{body}{}", checksum(&body));
            let normalized = normalize(&id).unwrap();
            prop_assert_eq!(normalize(&normalized).unwrap(), normalized);
        }

        /// Changing the verifier to any other digit breaks the checksum.
        #[test]
        fn wrong_verifier_rejected(body in 1u32..99_999_999, wrong in 0u32..10) {
            let body = body.to_string();
            let good = checksum(&body);
            let wrong_char = char::from_digit(wrong, 10).unwrap();
            prop_assume!(wrong_char != good);
            let id = format!("{body}-{wrong_char}");
            prop_assert!(
                matches!(normalize(&id), Err(NationalIdError::BadChecksum { .. })),
                "expected BadChecksum error"
            );
        }
    }
}
