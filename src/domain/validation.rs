//! Field-level validation for user-submitted forms.
//!
//! A [`Validator`] collects at most one message per field (the first failure
//! wins) plus any number of non-field messages. It serializes directly into
//! the page envelope so templates can render the messages next to inputs.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static EMAIL_RX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("valid email pattern")
});

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Validator {
    pub field_errors: BTreeMap<String, String>,
    pub non_field_errors: Vec<String>,
}

impl Validator {
    pub fn is_valid(&self) -> bool {
        self.field_errors.is_empty() && self.non_field_errors.is_empty()
    }

    pub fn add_non_field_error(&mut self, message: impl Into<String>) {
        self.non_field_errors.push(message.into());
    }

    /// Record `message` for `key` unless the field already carries an error.
    pub fn add_field_error(&mut self, key: &str, message: impl Into<String>) {
        self.field_errors
            .entry(key.to_string())
            .or_insert_with(|| message.into());
    }

    pub fn check_field(&mut self, ok: bool, key: &str, message: &str) {
        if !ok {
            self.add_field_error(key, message);
        }
    }
}

pub fn not_blank(value: &str) -> bool {
    !value.trim().is_empty()
}

/// Character count, not byte length.
pub fn max_chars(value: &str, n: usize) -> bool {
    value.chars().count() <= n
}

pub fn min_chars(value: &str, n: usize) -> bool {
    value.chars().count() >= n
}

pub fn permitted_value<T: PartialEq>(value: &T, permitted: &[T]) -> bool {
    permitted.contains(value)
}

pub fn valid_email(value: &str) -> bool {
    EMAIL_RX.is_match(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_error_for_a_field_wins() {
        let mut v = Validator::default();
        v.check_field(false, "title", "This field cannot be blank");
        v.check_field(false, "title", "This field cannot be more than 100 characters long");

        assert!(!v.is_valid());
        assert_eq!(
            v.field_errors.get("title").map(String::as_str),
            Some("This field cannot be blank")
        );
    }

    #[test]
    fn non_field_errors_invalidate() {
        let mut v = Validator::default();
        assert!(v.is_valid());
        v.add_non_field_error("Email or password is incorrect");
        assert!(!v.is_valid());
    }

    #[test]
    fn char_limits_count_characters() {
        assert!(max_chars("héllo", 5));
        assert!(!max_chars("héllo!", 5));
        assert!(min_chars("pa$$word", 8));
        assert!(!min_chars("short", 8));
    }

    #[test]
    fn blank_means_whitespace_only() {
        assert!(!not_blank("   \t"));
        assert!(not_blank(" x "));
    }

    #[test]
    fn email_format() {
        assert!(valid_email("alice@example.com"));
        assert!(!valid_email("alice@"));
        assert!(!valid_email("not an email"));
    }

    #[test]
    fn permitted_expiry_days() {
        let permitted = crate::domain::entities::PERMITTED_EXPIRY_DAYS;
        assert!(permitted_value(&7, &permitted));
        assert!(!permitted_value(&30, &permitted));
    }
}
