//! Utility functions shared by notification channels and the dispatcher.

use serde_json::Value;

/// Maximum length for request/response body snippets kept in logs and reports.
pub const MAX_BODY_LENGTH: usize = 4000;

/// Truncate a string to at most `max_len` bytes, backing off to the nearest
/// char boundary so multi-byte text never splits mid-character.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &s[..end])
}

/// Mask a delivery identifier before echoing it in an error report, so hook
/// URLs, addresses and phone numbers are never returned verbatim.
///
/// - URLs keep scheme and host, the rest becomes `***`
/// - email addresses keep the first two characters and the domain
/// - anything else keeps the last four characters
pub fn mask_recipient(recipient: &str) -> String {
    if let Some(rest) = recipient
        .strip_prefix("https://")
        .map(|r| ("https://", r))
        .or_else(|| recipient.strip_prefix("http://").map(|r| ("http://", r)))
    {
        let (scheme, remainder) = rest;
        let host = remainder.split('/').next().unwrap_or(remainder);
        let host = host.split('?').next().unwrap_or(host);
        return format!("{scheme}{host}/***");
    }
    if let Some(at) = recipient.find('@') {
        let (local, domain) = recipient.split_at(at);
        let visible: String = local.chars().take(2).collect();
        return format!("{visible}***{domain}");
    }
    let chars: Vec<char> = recipient.chars().collect();
    if chars.len() <= 4 {
        return "***".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("***{tail}")
}

/// Redact sensitive fields from JSON configuration.
///
/// Removes values for fields that commonly contain sensitive information:
/// passwords, tokens, secrets, API keys and credentials. Nested objects and
/// arrays are redacted recursively.
pub fn redact_sensitive_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = serde_json::Map::new();
            for (key, val) in map {
                let key_lower = key.to_lowercase();
                let is_sensitive = key_lower.contains("password")
                    || key_lower.contains("passwd")
                    || key_lower.contains("pwd")
                    || key_lower.contains("token")
                    || key_lower.contains("secret")
                    || key_lower.contains("sign")
                    || key_lower.contains("api_key")
                    || key_lower.contains("apikey")
                    || key_lower.contains("credentials");

                if is_sensitive {
                    redacted.insert(key.clone(), Value::String("***".to_string()));
                } else if val.is_object() || val.is_array() {
                    redacted.insert(key.clone(), redact_sensitive_json(val));
                } else {
                    redacted.insert(key.clone(), val.clone());
                }
            }
            Value::Object(redacted)
        }
        Value::Array(arr) => {
            let redacted: Vec<Value> = arr.iter().map(redact_sensitive_json).collect();
            Value::Array(redacted)
        }
        _ => value.clone(),
    }
}

/// Redact sensitive fields from a JSON string. Non-JSON input is returned
/// unchanged.
pub fn redact_json_string(json_str: &str) -> String {
    match serde_json::from_str::<Value>(json_str) {
        Ok(value) => {
            let redacted = redact_sensitive_json(&value);
            serde_json::to_string(&redacted).unwrap_or_else(|_| json_str.to_string())
        }
        Err(_) => json_str.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_string("hello", 10), "hello");
        assert_eq!(truncate_string("hello world", 5), "hello... [truncated]");
        // "告" is 3 bytes; a 4-byte cut must back off to the boundary.
        let truncated = truncate_string("告警通知", 4);
        assert!(truncated.starts_with("告"));
        assert!(truncated.ends_with("[truncated]"));
    }

    #[test]
    fn mask_recipient_hides_specifics() {
        assert_eq!(
            mask_recipient("https://oapi.dingtalk.com/robot/send?access_token=abc123"),
            "https://oapi.dingtalk.com/***"
        );
        assert_eq!(mask_recipient("alice@example.com"), "al***@example.com");
        assert_eq!(mask_recipient("13800138000"), "***8000");
        assert_eq!(mask_recipient("abc"), "***");
    }

    #[test]
    fn redact_sensitive_json_recurses() {
        let json = serde_json::json!({
            "username": "admin",
            "password": "secret123",
            "api_key": "abc123",
            "smtp_host": "smtp.example.com",
            "nested": {
                "access_token": "xyz789",
                "public_value": "visible"
            }
        });

        let redacted = redact_sensitive_json(&json);
        assert_eq!(redacted["username"], "admin");
        assert_eq!(redacted["password"], "***");
        assert_eq!(redacted["api_key"], "***");
        assert_eq!(redacted["smtp_host"], "smtp.example.com");
        assert_eq!(redacted["nested"]["access_token"], "***");
        assert_eq!(redacted["nested"]["public_value"], "visible");
    }

    #[test]
    fn redact_json_string_keeps_invalid_input() {
        let json_str = r#"{"username":"admin","password":"secret"}"#;
        let redacted = redact_json_string(json_str);
        assert!(redacted.contains("admin"));
        assert!(redacted.contains("***"));
        assert!(!redacted.contains("secret"));
        assert_eq!(redact_json_string("not json"), "not json");
    }
}
