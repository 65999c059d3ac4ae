//! Key material for the license subsystem.
//!
//! - License keys: `PREFIX-XXXXX-XXXXX-XXXXX-XXXXX`, 20 symbols from a 32-symbol
//!   alphabet drawn from the OS RNG (100 bits of entropy).
//! - Hardware fingerprints: canonicalized client-supplied hardware info, stored as
//!   SHA-256 hex so raw machine identifiers never hit the database.
//! - Shared secrets and webhook signatures: compared in constant time.

use hmac::{Hmac, Mac};
use rand::Rng;
use rand::rngs::OsRng;
use serde_json::Value;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Crockford-style alphabet: no 0/O, 1/I/L, or U, so keys survive being read aloud.
const KEY_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTVWXYZ0123456789";

const KEY_GROUPS: usize = 4;
const KEY_GROUP_LEN: usize = 5;

/// Generate a random license key with the given prefix.
pub fn generate_license_key(prefix: &str) -> String {
    let mut rng = OsRng;
    let mut key = String::with_capacity(prefix.len() + KEY_GROUPS * (KEY_GROUP_LEN + 1));
    key.push_str(prefix);
    for _ in 0..KEY_GROUPS {
        key.push('-');
        for _ in 0..KEY_GROUP_LEN {
            let idx = rng.gen_range(0..KEY_ALPHABET.len());
            key.push(KEY_ALPHABET[idx] as char);
        }
    }
    key
}

/// Reduce client hardware info to a stable SHA-256 fingerprint.
///
/// Strings are trimmed; objects are serialized with sorted keys (serde_json's
/// default map is ordered), so `{"cpu":..,"disk":..}` and `{"disk":..,"cpu":..}`
/// match. Returns None for null, empty strings, and empty objects.
pub fn hardware_fingerprint(info: &Value) -> Option<String> {
    let canonical = match info {
        Value::Null => return None,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.to_string()
        }
        Value::Object(map) if map.is_empty() => return None,
        other => other.to_string(),
    };

    let mut hasher = Sha256::new();
    hasher.update(b"toolvault-hw-v1:");
    hasher.update(canonical.as_bytes());
    Some(hex::encode(hasher.finalize()))
}

/// Compare a presented secret against the configured one without leaking timing.
/// An unconfigured secret never matches.
pub fn secret_matches(expected: Option<&str>, presented: &str) -> bool {
    let Some(expected) = expected else {
        return false;
    };
    let expected = expected.as_bytes();
    let presented = presented.as_bytes();
    // Length is not secret; only the content comparison needs to be constant-time.
    expected.len() == presented.len() && bool::from(expected.ct_eq(presented))
}

/// Hex HMAC-SHA256 of `payload` under `secret`.
pub fn sign_payload(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a hex HMAC-SHA256 signature over `payload`.
pub fn verify_payload_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let expected = sign_payload(secret, payload);
    let provided = signature.trim().to_ascii_lowercase();
    secret_matches(Some(&expected), &provided)
}
