use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    application::{repos::RepoError, session::SessionError},
    infra::error::InfraError,
    presentation::templates::TemplateError,
};

/// Diagnostic detail attached to an error response for the logging middleware.
///
/// The client only ever sees the public message of the response; the report
/// travels in response extensions and is removed when the request is logged.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        let report = ErrorReport::from_message(source, status, detail);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            public_message,
            report,
        }
    }

    /// Opaque 500 response; `error` is only logged.
    pub fn server_fault(source: &'static str, error: &dyn StdError) -> Self {
        Self::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error",
            error,
        )
    }

    /// Uniform 404 response shared by the router fallback and store lookups.
    pub fn not_found(source: &'static str) -> Self {
        Self::new(
            source,
            StatusCode::NOT_FOUND,
            "Not Found",
            "resource not found",
        )
    }

    pub fn bad_request(source: &'static str, detail: impl Into<String>) -> Self {
        Self::new(source, StatusCode::BAD_REQUEST, "Bad Request", detail)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.public_message).into_response();
        self.report.attach(&mut response);
        response
    }
}

impl From<RepoError> for HttpError {
    fn from(error: RepoError) -> Self {
        match error {
            RepoError::NotFound => HttpError::not_found("application::error::repo_error"),
            other => HttpError::server_fault("application::error::repo_error", &other),
        }
    }
}

impl From<TemplateError> for HttpError {
    fn from(error: TemplateError) -> Self {
        HttpError::server_fault("presentation::templates::render", &error)
    }
}

impl From<SessionError> for HttpError {
    fn from(error: SessionError) -> Self {
        HttpError::server_fault("application::session", &error)
    }
}

/// Process-level failure reported by `main` before exiting.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
