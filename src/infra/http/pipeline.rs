//! Ordered middleware pipelines.
//!
//! A pipeline is a list of stages, outermost first. Each stage is a plain
//! `from_fn` middleware that receives `next` explicitly and decides whether
//! to call it. The standard pipeline wraps the whole router; the dynamic and
//! protected pipelines wrap individual routes.

use axum::{Router, middleware, routing::MethodRouter};

use super::{HttpState, middleware as stages};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    RecoverPanic,
    LogRequest,
    SecureHeaders,
    LoadSession,
    CsrfProtection,
    Authenticate,
    RequireAuthentication,
}

/// Which per-route pipeline a route runs behind, in addition to the standard one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineClass {
    Standard,
    Dynamic,
    Protected,
}

impl PipelineClass {
    pub fn stages(self) -> &'static [Stage] {
        match self {
            PipelineClass::Standard => &[],
            PipelineClass::Dynamic => DYNAMIC,
            PipelineClass::Protected => PROTECTED,
        }
    }
}

pub const STANDARD: &[Stage] = &[Stage::RecoverPanic, Stage::LogRequest, Stage::SecureHeaders];

pub const DYNAMIC: &[Stage] = &[
    Stage::LoadSession,
    Stage::CsrfProtection,
    Stage::Authenticate,
];

pub const PROTECTED: &[Stage] = &[
    Stage::LoadSession,
    Stage::CsrfProtection,
    Stage::Authenticate,
    Stage::RequireAuthentication,
];

impl Stage {
    fn wrap_route(
        self,
        route: MethodRouter<HttpState>,
        state: &HttpState,
    ) -> MethodRouter<HttpState> {
        let state = state.clone();
        match self {
            Stage::RecoverPanic => route.route_layer(middleware::from_fn(stages::recover_panic)),
            Stage::LogRequest => route.route_layer(middleware::from_fn(stages::log_request)),
            Stage::SecureHeaders => route.route_layer(middleware::from_fn(stages::secure_headers)),
            Stage::LoadSession => route.route_layer(middleware::from_fn_with_state(
                state,
                stages::load_and_save_session,
            )),
            Stage::CsrfProtection => {
                route.route_layer(middleware::from_fn(stages::csrf_protection))
            }
            Stage::Authenticate => route.route_layer(middleware::from_fn_with_state(
                state,
                stages::authenticate,
            )),
            Stage::RequireAuthentication => {
                route.route_layer(middleware::from_fn(stages::require_authentication))
            }
        }
    }

    fn wrap_router(self, router: Router, state: &HttpState) -> Router {
        let state = state.clone();
        match self {
            Stage::RecoverPanic => router.layer(middleware::from_fn(stages::recover_panic)),
            Stage::LogRequest => router.layer(middleware::from_fn(stages::log_request)),
            Stage::SecureHeaders => router.layer(middleware::from_fn(stages::secure_headers)),
            Stage::LoadSession => router.layer(middleware::from_fn_with_state(
                state,
                stages::load_and_save_session,
            )),
            Stage::CsrfProtection => router.layer(middleware::from_fn(stages::csrf_protection)),
            Stage::Authenticate => {
                router.layer(middleware::from_fn_with_state(state, stages::authenticate))
            }
            Stage::RequireAuthentication => {
                router.layer(middleware::from_fn(stages::require_authentication))
            }
        }
    }
}

/// Wrap one route in `stages`. Layers are added innermost first so the first
/// stage in the list ends up outermost.
pub fn wrap_route(
    stages: &[Stage],
    route: MethodRouter<HttpState>,
    state: &HttpState,
) -> MethodRouter<HttpState> {
    stages
        .iter()
        .rev()
        .fold(route, |route, stage| stage.wrap_route(route, state))
}

/// Wrap a finished router (fallback included) in `stages`.
pub fn wrap_router(stages: &[Stage], router: Router, state: &HttpState) -> Router {
    stages
        .iter()
        .rev()
        .fold(router, |router, stage| stage.wrap_router(router, state))
}
