#![allow(dead_code)]

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use bestdeal::{
    application::{
        accounts::AccountService,
        products::ProductService,
        session::{DEFAULT_SESSION_LIFETIME, SessionManager},
    },
    infra::{
        http::{self, HttpState, SessionCookieSettings},
        memory::MemoryRepositories,
        sessions::MemorySessionStore,
    },
    presentation::templates::TemplateCache,
};
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use regex::Regex;
use tower::ServiceExt;

pub const COOKIE_NAME: &str = "session";

static CSRF_INPUT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"name="csrf_token" value="([^"]+)""#).expect("valid pattern"));

pub fn templates_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("ui/html")
}

pub struct TestApp {
    pub state: HttpState,
    pub router: Router,
    pub repos: Arc<MemoryRepositories>,
    pub sessions: Arc<MemorySessionStore>,
}

pub fn state() -> (HttpState, Arc<MemoryRepositories>, Arc<MemorySessionStore>) {
    let repos = Arc::new(MemoryRepositories::new());
    let sessions = Arc::new(MemorySessionStore::new());
    let templates = TemplateCache::build(&templates_dir()).expect("templates build");

    let state = HttpState {
        products: Arc::new(ProductService::new(repos.clone())),
        accounts: Arc::new(AccountService::new(repos.clone()).with_hash_cost(4)),
        templates: Arc::new(templates),
        sessions: SessionManager::new(sessions.clone(), DEFAULT_SESSION_LIFETIME),
        session_cookie: SessionCookieSettings {
            name: COOKIE_NAME.to_string(),
            secure: false,
        },
    };
    (state, repos, sessions)
}

pub fn app() -> TestApp {
    let (state, repos, sessions) = state();
    let router = http::build_router(state.clone()).expect("router builds");
    TestApp {
        state,
        router,
        repos,
        sessions,
    }
}

#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
    }

    pub fn csrf_token(&self) -> Option<String> {
        CSRF_INPUT
            .captures(&self.body)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    pub fn session_cookie(&self) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|value| {
                let pair = value.split(';').next()?;
                let (name, token) = pair.split_once('=')?;
                (name == COOKIE_NAME).then(|| token.to_string())
            })
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    TestResponse {
        status,
        headers,
        body: String::from_utf8_lossy(&bytes).into_owned(),
    }
}

pub fn encode_form(fields: &[(&str, &str)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in fields {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

/// A browser-like client that keeps the session cookie between requests.
pub struct Client {
    router: Router,
    pub cookie: Option<String>,
}

impl Client {
    pub fn new(router: Router) -> Self {
        Self {
            router,
            cookie: None,
        }
    }

    pub async fn request(&mut self, method: Method, uri: &str, form: Option<String>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = self.cookie.as_deref() {
            builder = builder.header(header::COOKIE, format!("{COOKIE_NAME}={token}"));
        }
        let body = match form {
            Some(form) => {
                builder = builder.header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
                Body::from(form)
            }
            None => Body::empty(),
        };
        let request = builder.body(body).expect("request should build");

        let response = send(&self.router, request).await;
        if let Some(token) = response.session_cookie() {
            self.cookie = (!token.is_empty()).then_some(token);
        }
        response
    }

    pub async fn get(&mut self, uri: &str) -> TestResponse {
        self.request(Method::GET, uri, None).await
    }

    pub async fn post_form(&mut self, uri: &str, fields: &[(&str, &str)]) -> TestResponse {
        self.request(Method::POST, uri, Some(encode_form(fields)))
            .await
    }

    /// GET `form_uri`, then POST `fields` to `action` with the page's CSRF token.
    pub async fn submit(
        &mut self,
        form_uri: &str,
        action: &str,
        fields: &[(&str, &str)],
    ) -> TestResponse {
        let page = self.get(form_uri).await;
        let token = page.csrf_token().expect("form page carries a csrf token");
        let mut with_token = vec![("csrf_token", token.as_str())];
        with_token.extend_from_slice(fields);
        self.post_form(action, &with_token).await
    }

    pub async fn signup(&mut self, name: &str, email: &str, password: &str) -> TestResponse {
        self.submit(
            "/user/signup",
            "/user/signup",
            &[("name", name), ("email", email), ("password", password)],
        )
        .await
    }

    pub async fn login(&mut self, email: &str, password: &str) -> TestResponse {
        self.submit(
            "/user/login",
            "/user/login",
            &[("email", email), ("password", password)],
        )
        .await
    }
}
