//! Extractors for request-scoped values placed by the dynamic pipeline.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{
    application::{
        auth::AuthContext,
        error::HttpError,
        session::{FLASH, Session},
    },
    presentation::views::PageData,
};

/// The session-bound CSRF token for this request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfToken(pub String);

impl<S: Send + Sync> FromRequestParts<S> for Session {
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Session>().cloned().ok_or_else(|| {
            HttpError::new(
                "infra::http::extract::session",
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
                "route is not behind the session stage",
            )
        })
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AuthContext {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<AuthContext>()
            .copied()
            .unwrap_or_default())
    }
}

/// Everything a page handler needs to build its envelope.
#[derive(Debug, Clone)]
pub struct PageContext {
    pub session: Session,
    pub auth: AuthContext,
    pub csrf_token: String,
}

impl PageContext {
    /// Fresh envelope for this request. Consumes the pending flash message.
    pub fn page_data(&self) -> PageData {
        let flash = self.session.pop::<String>(FLASH);
        PageData::new(flash, self.auth.is_authenticated(), self.csrf_token.clone())
    }
}

impl<S: Send + Sync> FromRequestParts<S> for PageContext {
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state).await?;
        let auth = parts
            .extensions
            .get::<AuthContext>()
            .copied()
            .unwrap_or_default();
        let csrf_token = parts
            .extensions
            .get::<CsrfToken>()
            .map(|CsrfToken(token)| token.clone())
            .unwrap_or_default();
        Ok(Self {
            session,
            auth,
            csrf_token,
        })
    }
}
