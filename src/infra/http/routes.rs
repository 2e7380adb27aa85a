//! The route table: every (method, pattern) the site answers, with the
//! pipeline each one runs behind.

use std::collections::HashSet;

use axum::{
    handler::Handler,
    http::Method,
    routing::{MethodFilter, MethodRouter, on},
};

use crate::infra::{assets, error::InfraError};

use super::{HttpState, handlers, pipeline::PipelineClass};

pub struct RouteEntry {
    pub method: Method,
    pub path: &'static str,
    pub pipeline: PipelineClass,
    pub endpoint: MethodRouter<HttpState>,
}

impl RouteEntry {
    pub fn new<H, T>(
        method: Method,
        path: &'static str,
        pipeline: PipelineClass,
        handler: H,
    ) -> Result<Self, InfraError>
    where
        H: Handler<T, HttpState>,
        T: 'static,
    {
        let filter = MethodFilter::try_from(method.clone())
            .map_err(|err| InfraError::routes(format!("{method} {path}: {err}")))?;
        Ok(Self {
            method,
            path,
            pipeline,
            endpoint: on(filter, handler),
        })
    }
}

pub fn route_table() -> Result<Vec<RouteEntry>, InfraError> {
    use PipelineClass::{Dynamic, Protected, Standard};

    Ok(vec![
        RouteEntry::new(Method::GET, "/ping", Standard, handlers::ping)?,
        RouteEntry::new(Method::GET, "/static/{*path}", Standard, assets::serve_static)?,
        RouteEntry::new(Method::GET, "/", Dynamic, handlers::home)?,
        RouteEntry::new(Method::GET, "/about", Dynamic, handlers::about)?,
        RouteEntry::new(Method::GET, "/product/view/{id}", Dynamic, handlers::product_view)?,
        RouteEntry::new(Method::GET, "/user/signup", Dynamic, handlers::signup_form)?,
        RouteEntry::new(Method::POST, "/user/signup", Dynamic, handlers::signup_submit)?,
        RouteEntry::new(Method::GET, "/user/login", Dynamic, handlers::login_form)?,
        RouteEntry::new(Method::POST, "/user/login", Dynamic, handlers::login_submit)?,
        RouteEntry::new(
            Method::GET,
            "/product/create",
            Protected,
            handlers::product_create_form,
        )?,
        RouteEntry::new(
            Method::POST,
            "/product/create",
            Protected,
            handlers::product_create_submit,
        )?,
        RouteEntry::new(Method::GET, "/account/view", Protected, handlers::account_view)?,
        RouteEntry::new(
            Method::GET,
            "/account/password/update",
            Protected,
            handlers::password_update_form,
        )?,
        RouteEntry::new(
            Method::POST,
            "/account/password/update",
            Protected,
            handlers::password_update_submit,
        )?,
        RouteEntry::new(Method::POST, "/user/logout", Protected, handlers::logout)?,
    ])
}

/// Reject duplicate (method, pattern) pairs and patterns with more than one
/// parameter segment.
pub fn validate<'a, I>(routes: I) -> Result<(), InfraError>
where
    I: IntoIterator<Item = (&'a Method, &'a str)>,
{
    let mut seen = HashSet::new();
    for (method, path) in routes {
        if !path.starts_with('/') {
            return Err(InfraError::routes(format!(
                "pattern `{path}` must start with `/`"
            )));
        }
        let params = path.split('/').filter(|segment| is_param(segment)).count();
        if params > 1 {
            return Err(InfraError::routes(format!(
                "pattern `{path}` has {params} parameter segments; at most one is allowed"
            )));
        }
        if !seen.insert((method.clone(), path)) {
            return Err(InfraError::routes(format!(
                "duplicate route {method} {path}"
            )));
        }
    }
    Ok(())
}

fn is_param(segment: &str) -> bool {
    segment.starts_with('{') && segment.ends_with('}')
}
