use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[\w.-]+@[\w.-]+\.\w+$").expect("email pattern is valid")
});

/// Strip everything but ASCII digits from a phone value, preserving order.
/// Non-string values clean to the empty string.
pub fn clean_phone(value: &Value) -> String {
    match value.as_str() {
        Some(s) => s.chars().filter(|c| c.is_ascii_digit()).collect(),
        None => String::new(),
    }
}

/// Simplified email syntax check, anchored at both ends. Not RFC-complete.
/// Non-string values are invalid.
pub fn is_valid_email(value: &Value) -> bool {
    match value.as_str() {
        Some(s) => EMAIL_RE.is_match(s),
        None => false,
    }
}
