//! Identity & hashing (component C1).
//!
//! IDs and the partition hash are pure, CPU-only functions: per spec §5
//! this component never crosses an I/O boundary.

use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use std::time::{SystemTime, UNIX_EPOCH};

static MESSAGE_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^wal_\d{13}_[a-f0-9]{16}$").expect("static regex"));
static TRANSACTION_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^txn_\d{13}_[a-f0-9]{24}$").expect("static regex"));
static REQUEST_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^req_\d{13}_[a-f0-9]{12}$").expect("static regex"));
static CORRELATION_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^cor_\d{13}_[a-f0-9]{16}$").expect("static regex"));
static API_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9\-_]{16,}$").expect("static regex"));

fn now_unix_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the unix epoch")
        .as_millis()
}

fn random_hex(n: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..n)
        .map(|_| std::char::from_digit(rng.gen_range(0..16), 16).expect("0..16 is a valid digit"))
        .collect()
}

/// `wal_<unix-ms-13>_<hex-16>`
pub fn generate_message_id() -> String {
    format!("wal_{:013}_{}", now_unix_ms(), random_hex(16))
}

/// `txn_<unix-ms-13>_<hex-24>`
pub fn generate_transaction_id() -> String {
    format!("txn_{:013}_{}", now_unix_ms(), random_hex(24))
}

/// `req_<unix-ms-13>_<hex-12>`
pub fn generate_request_id() -> String {
    format!("req_{:013}_{}", now_unix_ms(), random_hex(12))
}

/// `cor_<unix-ms-13>_<hex-16>`
pub fn generate_correlation_id() -> String {
    format!("cor_{:013}_{}", now_unix_ms(), random_hex(16))
}

pub fn is_valid_message_id(id: &str) -> bool {
    MESSAGE_ID_RE.is_match(id)
}

pub fn is_valid_transaction_id(id: &str) -> bool {
    TRANSACTION_ID_RE.is_match(id)
}

pub fn is_valid_request_id(id: &str) -> bool {
    REQUEST_ID_RE.is_match(id)
}

pub fn is_valid_correlation_id(id: &str) -> bool {
    CORRELATION_ID_RE.is_match(id)
}

pub fn is_valid_api_key_format(key: &str) -> bool {
    let trimmed = key.trim();
    !trimmed.is_empty() && API_KEY_RE.is_match(trimmed)
}

/// A 32-bit rolling hash over the key's codepoints: `h = ((h<<5) - h) + c`,
/// i.e. `h = h*31 + c`, the same recurrence used by `String.hashCode` in
/// several host languages. Deterministic and pure: equal inputs always
/// produce equal outputs (§8 "Partition determinism").
fn rolling_hash(key: &str) -> i32 {
    let mut h: i32 = 0;
    for c in key.chars() {
        h = h.wrapping_shl(5).wrapping_sub(h).wrapping_add(c as i32);
    }
    h
}

/// Hash-based partition assignment: `|h| mod n`. `n` must be non-zero;
/// namespace policy always carries a positive `partitionCount`.
pub fn partition_for(key: &str, n: u32) -> u32 {
    assert!(n > 0, "partition count must be positive");
    (rolling_hash(key).unsigned_abs()) % n
}

/// Extract a dot-notation key from a JSON payload, e.g. `"user.id"` reads
/// `payload["user"]["id"]`. Returns `None` if any segment is missing or the
/// final value isn't representable as a hash key.
pub fn extract_key(payload: &serde_json::Value, path: &str) -> Option<String> {
    let mut current = payload;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    match current {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_id_round_trips() {
        for _ in 0..50 {
            let id = generate_message_id();
            assert!(is_valid_message_id(&id), "{id} failed its own regex");
        }
    }

    #[test]
    fn transaction_id_round_trips() {
        let id = generate_transaction_id();
        assert!(is_valid_transaction_id(&id));
    }

    #[test]
    fn request_id_round_trips() {
        let id = generate_request_id();
        assert!(is_valid_request_id(&id));
    }

    #[test]
    fn correlation_id_round_trips() {
        let id = generate_correlation_id();
        assert!(is_valid_correlation_id(&id));
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(!is_valid_message_id("wal_123_abc"));
        assert!(!is_valid_message_id("msg_1234567890123_0123456789abcdef"));
        assert!(!is_valid_transaction_id("txn_1234567890123_tooshort"));
    }

    #[test]
    fn partition_for_is_deterministic() {
        let a = partition_for("wal_1700000000000_aaaabbbbccccdddd", 10);
        let b = partition_for("wal_1700000000000_aaaabbbbccccdddd", 10);
        assert_eq!(a, b);
        assert!(a < 10);
    }

    #[test]
    fn partition_for_respects_modulus() {
        for n in [1u32, 3, 10, 64] {
            let p = partition_for("some-arbitrary-key", n);
            assert!(p < n);
        }
    }

    #[test]
    fn api_key_format_boundaries() {
        assert!(!is_valid_api_key_format(&"a".repeat(15)));
        assert!(is_valid_api_key_format(&"a".repeat(16)));
        assert!(!is_valid_api_key_format(&format!("{}!", "a".repeat(15))));
    }

    #[test]
    fn extract_key_follows_dot_path() {
        let payload = serde_json::json!({"user": {"id": "u-42"}});
        assert_eq!(extract_key(&payload, "user.id"), Some("u-42".to_string()));
        assert_eq!(extract_key(&payload, "user.missing"), None);
        assert_eq!(extract_key(&payload, "absent"), None);
    }
}
