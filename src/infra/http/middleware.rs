use std::{any::Any, net::SocketAddr, panic::AssertUnwindSafe, time::Instant};

use axum::{
    body::{self, Body},
    extract::{ConnectInfo, State},
    http::{
        HeaderMap, HeaderValue, Method, Request, StatusCode,
        header::{self, HeaderName},
    },
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use futures::FutureExt;
use subtle::ConstantTimeEq;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::{
    auth::AuthContext,
    error::{ErrorReport, HttpError},
    session::{
        self, AUTHENTICATED_USER_ID, CSRF_TOKEN, CommitOutcome, REDIRECT_AFTER_LOGIN, Session,
    },
};
use crate::domain::entities::UserId;

use super::{HttpState, LOGIN_PATH, extract::CsrfToken};

pub const CSRF_HEADER: &str = "x-csrf-token";
pub const CSRF_FIELD: &str = "csrf_token";

const CSRF_BODY_LIMIT: usize = 1024 * 1024;

const CONTENT_SECURITY_POLICY: &str =
    "default-src 'self'; style-src 'self' fonts.googleapis.com; font-src fonts.gstatic.com";

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

/// Outermost stage: a panic anywhere below becomes an opaque 500 and the
/// connection is closed.
pub async fn recover_panic(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            let detail = panic_detail(payload.as_ref());
            error!(
                target = "bestdeal::http::panic",
                method = %method,
                path = %path,
                detail = %detail,
                "handler panicked",
            );
            metrics::counter!("bestdeal_http_panics_total").increment(1);

            let mut response = HttpError::new(
                "infra::http::recover_panic",
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
                detail,
            )
            .into_response();
            let headers = response.headers_mut();
            apply_security_headers(headers);
            headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
            response
        }
    }
}

fn panic_detail(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

pub async fn log_request(mut request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let protocol = request.version();
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_default();
    let request_id = Uuid::new_v4().to_string();
    request.extensions_mut().insert(RequestContext {
        request_id: request_id.clone(),
    });

    info!(
        target = "bestdeal::http::request",
        request_id = %request_id,
        ip = %client,
        proto = ?protocol,
        method = %method,
        uri = %uri.path(),
        "received request",
    );

    let start = Instant::now();
    let mut response = next.run(request).await;
    let status = response.status();
    let elapsed = start.elapsed();

    metrics::counter!(
        "bestdeal_http_requests_total",
        "method" => method.to_string(),
        "status" => status.as_u16().to_string()
    )
    .increment(1);
    metrics::histogram!("bestdeal_http_request_ms", "method" => method.to_string())
        .record(elapsed.as_secs_f64() * 1000.0);

    if status.is_client_error() || status.is_server_error() {
        let elapsed_ms = elapsed.as_millis();
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                target = "bestdeal::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                "request failed",
            );
        } else {
            warn!(
                target = "bestdeal::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                "client request error",
            );
        }
    }

    response
}

pub async fn secure_headers(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;
    apply_security_headers(response.headers_mut());
    response
}

/// Fixed headers every response carries, including the panic fallback built
/// outside `secure_headers`.
pub fn apply_security_headers(headers: &mut HeaderMap) {
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(CONTENT_SECURITY_POLICY),
    );
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("origin-when-cross-origin"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("deny"));
    headers.insert(header::X_XSS_PROTECTION, HeaderValue::from_static("0"));
}

/// Resolve the session from the cookie, run the request, then persist the
/// session and emit the (possibly new) cookie.
pub async fn load_and_save_session(
    State(state): State<HttpState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let cookie_name = state.session_cookie.name.as_str();
    let presented = CookieJar::from_headers(request.headers())
        .get(cookie_name)
        .map(|cookie| cookie.value().to_string());

    let session = match state.sessions.load(presented.as_deref()).await {
        Ok(session) => session,
        Err(err) => return HttpError::from(err).into_response(),
    };
    request.extensions_mut().insert(session.clone());

    let mut response = next.run(request).await;

    let cookie = match state.sessions.commit(&session).await {
        Ok(CommitOutcome::Unchanged) => return response,
        Ok(CommitOutcome::Saved { token, lifetime }) => {
            let max_age = time::Duration::try_from(lifetime).unwrap_or(time::Duration::MAX);
            Cookie::build((state.session_cookie.name.clone(), token))
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax)
                .secure(state.session_cookie.secure)
                .max_age(max_age)
                .build()
        }
        Ok(CommitOutcome::Destroyed) => {
            let mut cookie = Cookie::build((state.session_cookie.name.clone(), ""))
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax)
                .secure(state.session_cookie.secure)
                .build();
            cookie.make_removal();
            cookie
        }
        Err(err) => return HttpError::from(err).into_response(),
    };

    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
            response
                .headers_mut()
                .insert(header::VARY, HeaderValue::from_static("Cookie"));
            response
        }
        Err(err) => HttpError::server_fault("infra::http::session_cookie", &err).into_response(),
    }
}

/// Double-submit check against the session-bound token. Safe methods pass
/// through; everything else must echo the token in the form body or header.
pub async fn csrf_protection(mut request: Request<Body>, next: Next) -> Response {
    let Some(session) = request.extensions().get::<Session>().cloned() else {
        return missing_session("infra::http::csrf_protection");
    };

    let expected = match session.get::<String>(CSRF_TOKEN) {
        Some(token) => token,
        None => {
            let token = session::generate_token();
            if let Err(err) = session.put(CSRF_TOKEN, &token) {
                return HttpError::from(err).into_response();
            }
            token
        }
    };
    request
        .extensions_mut()
        .insert(CsrfToken(expected.clone()));

    if is_safe_method(request.method()) {
        return next.run(request).await;
    }

    let header_token = request
        .headers()
        .get(HeaderName::from_static(CSRF_HEADER))
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let (submitted, request) = match header_token {
        Some(token) => (Some(token), request),
        None if is_form_body(&request) => {
            let (parts, body) = request.into_parts();
            let bytes = match body::to_bytes(body, CSRF_BODY_LIMIT).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    return HttpError::bad_request(
                        "infra::http::csrf_protection",
                        format!("unreadable form body: {err}"),
                    )
                    .into_response();
                }
            };
            let token = url::form_urlencoded::parse(&bytes)
                .find(|(key, _)| key == CSRF_FIELD)
                .map(|(_, value)| value.into_owned());
            (token, Request::from_parts(parts, Body::from(bytes)))
        }
        None => (None, request),
    };

    let valid = submitted
        .as_deref()
        .is_some_and(|token| bool::from(token.as_bytes().ct_eq(expected.as_bytes())));
    if !valid {
        metrics::counter!("bestdeal_csrf_rejections_total").increment(1);
        return HttpError::bad_request(
            "infra::http::csrf_protection",
            "csrf token missing or mismatched",
        )
        .into_response();
    }

    next.run(request).await
}

fn is_safe_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

fn is_form_body(request: &Request<Body>) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"))
}

/// Derive the request's [`AuthContext`] from the session. A user id that no
/// longer resolves to an account is dropped from the session.
pub async fn authenticate(
    State(state): State<HttpState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(session) = request.extensions().get::<Session>().cloned() else {
        return missing_session("infra::http::authenticate");
    };

    let context = match session.get::<UserId>(AUTHENTICATED_USER_ID) {
        None => AuthContext::anonymous(),
        Some(user_id) => match state.accounts.exists(user_id).await {
            Ok(true) => AuthContext::authenticated(user_id),
            Ok(false) => {
                warn!(
                    target = "bestdeal::http::auth",
                    user_id, "session refers to a missing account"
                );
                session.remove(AUTHENTICATED_USER_ID);
                AuthContext::anonymous()
            }
            Err(err) => return HttpError::from(err).into_response(),
        },
    };

    request.extensions_mut().insert(context);
    next.run(request).await
}

/// Redirect anonymous visitors to the login page without running the handler.
pub async fn require_authentication(request: Request<Body>, next: Next) -> Response {
    let context = request
        .extensions()
        .get::<AuthContext>()
        .copied()
        .unwrap_or_default();

    if !context.is_authenticated() {
        if request.method() == Method::GET
            && let Some(session) = request.extensions().get::<Session>()
        {
            let target = request
                .uri()
                .path_and_query()
                .map(|value| value.as_str().to_string())
                .unwrap_or_else(|| request.uri().path().to_string());
            if let Err(err) = session.put(REDIRECT_AFTER_LOGIN, target) {
                return HttpError::from(err).into_response();
            }
        }
        return Redirect::to(LOGIN_PATH).into_response();
    }

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn missing_session(source: &'static str) -> Response {
    HttpError::new(
        source,
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal Server Error",
        "session stage missing from pipeline",
    )
    .into_response()
}
