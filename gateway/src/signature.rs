//! Twilio webhook signature computation and verification.
//!
//! Twilio signs every webhook with HMAC-SHA1 keyed by the account auth token.
//! The signed message is the full request URL followed by each parameter's
//! name and value, concatenated without delimiters, in ascending key order.
//! The digest is base64 encoded and sent in the `X-Twilio-Signature` header.

use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::error::{GatewayError, Result};

type HmacSha1 = Hmac<Sha1>;

/// Build the string Twilio signs: the URL, then `key` + `value` for every
/// parameter sorted by key.
pub fn canonical_string<'a, I>(url: &str, params: I) -> String
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let mut pairs: Vec<(&String, &String)> = params.into_iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));

    let mut canonical = String::from(url);
    for (key, value) in pairs {
        canonical.push_str(key);
        canonical.push_str(value);
    }
    canonical
}

/// Compute the base64 HMAC-SHA1 signature Twilio would send for this request.
pub fn compute_signature<'a, I>(secret: &[u8], url: &str, params: I) -> Result<String>
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let mut mac = HmacSha1::new_from_slice(secret).map_err(|_| GatewayError::InvalidSigningKey)?;
    mac.update(canonical_string(url, params).as_bytes());

    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Verify a Twilio webhook signature.
///
/// # Arguments
///
/// * `secret` - The account auth token
/// * `url` - The externally visible URL Twilio requested
/// * `params` - The GET or POST parameters, depending on the request method
/// * `provided` - The value of the signature header
///
/// # Returns
///
/// `true` if the signature matches. Malformed input yields `false`, never an
/// error.
pub fn verify<'a, I>(secret: &[u8], url: &str, params: I, provided: &str) -> bool
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let provided = provided.trim();

    if secret.is_empty() || url.is_empty() || provided.is_empty() {
        warn!(
            has_secret = !secret.is_empty(),
            has_url = !url.is_empty(),
            has_signature = !provided.is_empty(),
            "twilio_signature_missing_fields"
        );
        return false;
    }

    let expected = match compute_signature(secret, url, params) {
        Ok(signature) => signature,
        Err(e) => {
            warn!(error = %e, "twilio_signature_compute_failed");
            return false;
        }
    };

    let valid = constant_time_compare(&expected, provided);

    if !valid {
        warn!(
            url = %url,
            expected_length = expected.len(),
            actual_length = provided.len(),
            "twilio_signature_mismatch"
        );
    }

    valid
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};

    const SECRET: &[u8] = b"12345";
    const URL: &str = "https://mycompany.com/myapp.php?foo=1&bar=2";

    fn call_params() -> HashMap<String, String> {
        [
            ("CallSid", "CA1234567890ABCDE"),
            ("Caller", "+14158675309"),
            ("Digits", "1234"),
            ("From", "+14158675309"),
            ("To", "+18005551212"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_canonical_string_sorts_keys() {
        let canonical = canonical_string(URL, &call_params());
        assert_eq!(
            canonical,
            "https://mycompany.com/myapp.php?foo=1&bar=2\
             CallSidCA1234567890ABCDE\
             Caller+14158675309\
             Digits1234\
             From+14158675309\
             To+18005551212"
        );
    }

    #[test]
    fn test_canonical_string_empty_params() {
        let empty: HashMap<String, String> = HashMap::new();
        assert_eq!(canonical_string(URL, &empty), URL);
    }

    #[test]
    fn test_compute_signature_matches_hmac_sha1() {
        let params = call_params();

        let mut mac = HmacSha1::new_from_slice(SECRET).unwrap();
        mac.update(canonical_string(URL, &params).as_bytes());
        let expected = STANDARD.encode(mac.finalize().into_bytes());

        let signature = compute_signature(SECRET, URL, &params).unwrap();
        assert_eq!(signature, expected);
        // base64 of a 20 byte digest, no trailing whitespace
        assert_eq!(signature.len(), 28);
        assert_eq!(signature.trim(), signature);
    }

    #[test]
    fn test_compute_signature_is_order_independent() {
        let hashed = call_params();
        let sorted: BTreeMap<String, String> = hashed.clone().into_iter().collect();

        assert_eq!(
            compute_signature(SECRET, URL, &hashed).unwrap(),
            compute_signature(SECRET, URL, &sorted).unwrap()
        );
    }

    #[test]
    fn test_verify_roundtrip() {
        let params = call_params();
        let signature = compute_signature(SECRET, URL, &params).unwrap();

        assert!(verify(SECRET, URL, &params, &signature));
        // surrounding whitespace is stripped before comparison
        assert!(verify(SECRET, URL, &params, &format!(" {}\n", signature)));
    }

    #[test]
    fn test_verify_rejects_tampering() {
        let params = call_params();
        let signature = compute_signature(SECRET, URL, &params).unwrap();

        let mut flipped = signature.clone().into_bytes();
        flipped[0] = if flipped[0] == b'A' { b'B' } else { b'A' };
        let flipped = String::from_utf8(flipped).unwrap();
        assert!(!verify(SECRET, URL, &params, &flipped));

        assert!(!verify(SECRET, "https://mycompany.com/myapp.php?foo=1&bar=3", &params, &signature));

        let mut tampered = params.clone();
        tampered.insert("Digits".to_string(), "1235".to_string());
        assert!(!verify(SECRET, URL, &tampered, &signature));

        assert!(!verify(b"54321", URL, &params, &signature));
    }

    #[test]
    fn test_verify_missing_fields() {
        let params = call_params();
        assert!(!verify(b"", URL, &params, "sig"));
        assert!(!verify(SECRET, "", &params, "sig"));
        assert!(!verify(SECRET, URL, &params, ""));
        assert!(!verify(SECRET, URL, &params, "   "));
    }

    #[test]
    fn test_verify_garbage_signature() {
        assert!(!verify(SECRET, URL, &call_params(), "fake_signature"));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "abcd"));
    }
}
