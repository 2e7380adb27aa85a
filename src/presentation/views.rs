use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use serde::Serialize;
use time::{OffsetDateTime, UtcOffset, macros::format_description};

use crate::{
    application::error::HttpError,
    domain::entities::{ProductId, ProductRecord, UserRecord},
    presentation::templates::TemplateCache,
};

/// Stable page names; renaming a page file breaks these lookups.
pub mod pages {
    pub const HOME: &str = "home.tmpl.html";
    pub const ABOUT: &str = "about.tmpl.html";
    pub const PRODUCT_VIEW: &str = "view.tmpl.html";
    pub const PRODUCT_CREATE: &str = "create.tmpl.html";
    pub const SIGNUP: &str = "signup.tmpl.html";
    pub const LOGIN: &str = "login.tmpl.html";
    pub const ACCOUNT: &str = "account.tmpl.html";
    pub const PASSWORD: &str = "password.tmpl.html";
}

/// `02 Jan 2006 at 15:04` in UTC; empty for the Unix epoch placeholder.
pub fn human_date(value: OffsetDateTime) -> String {
    if value == OffsetDateTime::UNIX_EPOCH {
        return String::new();
    }
    let format = format_description!("[day] [month repr:short] [year] at [hour]:[minute]");
    value
        .to_offset(UtcOffset::UTC)
        .format(format)
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductView {
    pub id: ProductId,
    pub title: String,
    pub content: String,
    pub created: String,
    pub expires: String,
}

impl From<ProductRecord> for ProductView {
    fn from(record: ProductRecord) -> Self {
        Self {
            id: record.id,
            title: record.title,
            content: record.content,
            created: human_date(record.created_at),
            expires: human_date(record.expires_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserView {
    pub name: String,
    pub email: String,
    pub joined: String,
}

impl From<UserRecord> for UserView {
    fn from(record: UserRecord) -> Self {
        Self {
            name: record.name,
            email: record.email,
            joined: human_date(record.created_at),
        }
    }
}

/// Everything a page template may read. Built fresh per request, rendered
/// once and dropped with the response.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PageData {
    pub current_year: i32,
    pub product: Option<ProductView>,
    pub products: Vec<ProductView>,
    pub form: Option<minijinja::Value>,
    pub flash: Option<String>,
    pub is_authenticated: bool,
    pub csrf_token: String,
    pub user: Option<UserView>,
}

impl PageData {
    pub fn new(flash: Option<String>, is_authenticated: bool, csrf_token: String) -> Self {
        Self {
            current_year: OffsetDateTime::now_utc().year(),
            flash,
            is_authenticated,
            csrf_token,
            ..Self::default()
        }
    }

    pub fn with_product(mut self, product: ProductRecord) -> Self {
        self.product = Some(product.into());
        self
    }

    pub fn with_products(mut self, products: Vec<ProductRecord>) -> Self {
        self.products = products.into_iter().map(ProductView::from).collect();
        self
    }

    pub fn with_form<F: Serialize>(mut self, form: &F) -> Self {
        self.form = Some(minijinja::Value::from_serialize(form));
        self
    }

    pub fn with_user(mut self, user: UserRecord) -> Self {
        self.user = Some(user.into());
        self
    }
}

/// Render `page` into a complete response, or an opaque 500 if rendering fails.
pub fn render_page(
    templates: &TemplateCache,
    page: &str,
    status: StatusCode,
    data: &PageData,
) -> Response {
    match templates.render(page, data) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}
