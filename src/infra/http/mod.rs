//! HTTP surface: state, route table, pipelines and handlers.

mod extract;
mod forms;
mod handlers;
mod middleware;
pub mod pipeline;
pub mod routes;

pub use extract::{CsrfToken, PageContext};
pub use middleware::{CSRF_FIELD, CSRF_HEADER, RequestContext};

use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};

use axum::{
    Router,
    http::Method,
    routing::{MethodFilter, MethodRouter},
};
use tracing::debug;

use crate::{
    application::{accounts::AccountService, products::ProductService, session::SessionManager},
    infra::error::InfraError,
    presentation::templates::TemplateCache,
};

pub const LOGIN_PATH: &str = "/user/login";

#[derive(Debug, Clone)]
pub struct SessionCookieSettings {
    pub name: String,
    pub secure: bool,
}

#[derive(Clone)]
pub struct HttpState {
    pub products: Arc<ProductService>,
    pub accounts: Arc<AccountService>,
    pub templates: Arc<TemplateCache>,
    pub sessions: SessionManager,
    pub session_cookie: SessionCookieSettings,
}

/// Assemble the router from the route table.
///
/// Each route is wrapped in its own pipeline; routes sharing a pattern are
/// merged and answer any other method, HEAD included, with the uniform
/// not-found response.
/// The standard pipeline wraps the finished router, fallback included.
pub fn build_router(state: HttpState) -> Result<Router, InfraError> {
    let table = routes::route_table()?;
    routes::validate(table.iter().map(|entry| (&entry.method, entry.path)))?;

    let mut by_path: BTreeMap<&'static str, MethodRouter<HttpState>> = BTreeMap::new();
    let mut serves_head: HashSet<&'static str> = HashSet::new();
    for entry in table {
        if entry.method == Method::HEAD {
            serves_head.insert(entry.path);
        }
        debug!(
            target = "bestdeal::http::routes",
            method = %entry.method,
            path = entry.path,
            pipeline = ?entry.pipeline,
            "registering route"
        );
        let wrapped = pipeline::wrap_route(entry.pipeline.stages(), entry.endpoint, &state);
        let merged = match by_path.remove(entry.path) {
            Some(existing) => existing.merge(wrapped),
            None => wrapped,
        };
        by_path.insert(entry.path, merged);
    }

    let router = by_path
        .into_iter()
        .fold(Router::new(), |router, (path, endpoints)| {
            // GET routes answer HEAD implicitly; only registered methods may match.
            let endpoints = if serves_head.contains(path) {
                endpoints
            } else {
                endpoints.on(MethodFilter::HEAD, handlers::not_found)
            };
            router.route(path, endpoints.fallback(handlers::not_found))
        })
        .fallback(handlers::not_found)
        .with_state(state.clone());

    Ok(pipeline::wrap_router(pipeline::STANDARD, router, &state))
}
