//! Deterministic event-identity fingerprints.
//!
//! A fingerprint names "the same occurring condition" and is the dedup key
//! for the active event cache. Two flavours exist: rule-originated events
//! hash the rule identity plus the full label set, third-party intake
//! events hash (source, host, title). The two flavours deliberately use
//! distinct domain prefixes so a rule event and an intake event can never
//! collide on the same key.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt::Write;

/// Number of hex characters kept from the SHA-256 digest.
const FINGERPRINT_LEN: usize = 32;

fn hex_digest(hasher: Sha256) -> String {
    let digest = hasher.finalize();
    let mut s = String::with_capacity(FINGERPRINT_LEN);
    for b in digest.iter().take(FINGERPRINT_LEN / 2) {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Fingerprint for a rule-originated event.
///
/// Label insertion order never affects the result: pairs are sorted by key
/// before hashing.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use faultline_common::fingerprint::rule_fingerprint;
///
/// let mut a = HashMap::new();
/// a.insert("host".to_string(), "db-01".to_string());
/// a.insert("service".to_string(), "mysql".to_string());
/// let mut b = HashMap::new();
/// b.insert("service".to_string(), "mysql".to_string());
/// b.insert("host".to_string(), "db-01".to_string());
/// assert_eq!(rule_fingerprint("rule-1", &a), rule_fingerprint("rule-1", &b));
/// ```
pub fn rule_fingerprint(rule_id: &str, labels: &HashMap<String, String>) -> String {
    let mut pairs: Vec<(&String, &String)> = labels.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));

    let mut hasher = Sha256::new();
    hasher.update(b"rule\x1f");
    hasher.update(rule_id.as_bytes());
    for (k, v) in pairs {
        hasher.update(b"\x1f");
        hasher.update(k.as_bytes());
        hasher.update(b"\x1e");
        hasher.update(v.as_bytes());
    }
    hex_digest(hasher)
}

/// Fingerprint for a third-party intake event, keyed by (source, host, title).
pub fn intake_fingerprint(source: &str, host: &str, title: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"intake\x1f");
    hasher.update(source.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(host.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(title.as_bytes());
    hex_digest(hasher)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_fingerprint_is_deterministic() {
        let mut labels = HashMap::new();
        labels.insert("host".to_string(), "web-01".to_string());
        let a = rule_fingerprint("rule-9", &labels);
        let b = rule_fingerprint("rule-9", &labels);
        assert_eq!(a, b);
        assert_eq!(a.len(), FINGERPRINT_LEN);
    }

    #[test]
    fn rule_fingerprint_depends_on_label_content() {
        let mut labels = HashMap::new();
        labels.insert("host".to_string(), "web-01".to_string());
        let a = rule_fingerprint("rule-9", &labels);
        labels.insert("host".to_string(), "web-02".to_string());
        let b = rule_fingerprint("rule-9", &labels);
        assert_ne!(a, b);
    }

    #[test]
    fn intake_and_rule_fingerprints_never_collide() {
        // Same raw text through both flavours must differ (domain prefix).
        let labels = HashMap::new();
        let rule = rule_fingerprint("x", &labels);
        let intake = intake_fingerprint("x", "", "");
        assert_ne!(rule, intake);
    }

    #[test]
    fn intake_fingerprint_distinguishes_hosts() {
        let a = intake_fingerprint("zabbix", "db-01", "disk full");
        let b = intake_fingerprint("zabbix", "db-02", "disk full");
        assert_ne!(a, b);
    }
}
