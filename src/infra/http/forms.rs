//! Submitted form payloads and their validation rules.

use serde::{Deserialize, Serialize};

use crate::domain::{
    entities::PERMITTED_EXPIRY_DAYS,
    validation::{Validator, max_chars, min_chars, not_blank, permitted_value, valid_email},
};

const BLANK: &str = "This field cannot be blank";
const PASSWORD_MIN_CHARS: usize = 8;
const TITLE_MAX_CHARS: usize = 100;

/// Submitted values plus their validation messages, as the template sees them.
#[derive(Debug, Serialize)]
pub struct FormView<'a, F: Serialize> {
    #[serde(flatten)]
    pub fields: &'a F,
    #[serde(flatten)]
    pub validator: &'a Validator,
}

impl<'a, F: Serialize> FormView<'a, F> {
    pub fn new(fields: &'a F, validator: &'a Validator) -> Self {
        Self { fields, validator }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ProductCreateForm {
    pub title: String,
    pub content: String,
    pub expires: String,
}

impl ProductCreateForm {
    /// Blank form preselecting the one-year lifetime.
    pub fn blank() -> Self {
        Self {
            expires: "365".to_string(),
            ..Self::default()
        }
    }

    pub fn expires_days(&self) -> Option<i32> {
        self.expires.trim().parse().ok()
    }

    pub fn validate(&self) -> Validator {
        let mut v = Validator::default();
        v.check_field(not_blank(&self.title), "title", BLANK);
        v.check_field(
            max_chars(&self.title, TITLE_MAX_CHARS),
            "title",
            "This field cannot be more than 100 characters long",
        );
        v.check_field(not_blank(&self.content), "content", BLANK);
        v.check_field(
            self.expires_days()
                .is_some_and(|days| permitted_value(&days, &PERMITTED_EXPIRY_DAYS)),
            "expires",
            "This field must equal 1, 7 or 365",
        );
        v
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SignupForm {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl SignupForm {
    pub fn validate(&self) -> Validator {
        let mut v = Validator::default();
        v.check_field(not_blank(&self.name), "name", BLANK);
        v.check_field(not_blank(&self.email), "email", BLANK);
        v.check_field(
            valid_email(&self.email),
            "email",
            "This field must be a valid email address",
        );
        v.check_field(not_blank(&self.password), "password", BLANK);
        v.check_field(
            min_chars(&self.password, PASSWORD_MIN_CHARS),
            "password",
            "This field must be at least 8 characters long",
        );
        v
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoginForm {
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl LoginForm {
    pub fn validate(&self) -> Validator {
        let mut v = Validator::default();
        v.check_field(not_blank(&self.email), "email", BLANK);
        v.check_field(
            valid_email(&self.email),
            "email",
            "This field must be a valid email address",
        );
        v.check_field(not_blank(&self.password), "password", BLANK);
        v
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PasswordUpdateForm {
    #[serde(skip_serializing)]
    pub current_password: String,
    #[serde(skip_serializing)]
    pub new_password: String,
    #[serde(skip_serializing)]
    pub new_password_confirmation: String,
}

impl PasswordUpdateForm {
    pub fn validate(&self) -> Validator {
        let mut v = Validator::default();
        v.check_field(not_blank(&self.current_password), "current_password", BLANK);
        v.check_field(not_blank(&self.new_password), "new_password", BLANK);
        v.check_field(
            min_chars(&self.new_password, PASSWORD_MIN_CHARS),
            "new_password",
            "This field must be at least 8 characters long",
        );
        v.check_field(
            not_blank(&self.new_password_confirmation),
            "new_password_confirmation",
            BLANK,
        );
        v.check_field(
            self.new_password == self.new_password_confirmation,
            "new_password_confirmation",
            "Passwords do not match",
        );
        v
    }
}
