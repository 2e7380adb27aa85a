mod common;

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
    routing::get,
};
use bestdeal::{
    application::session::{
        AUTHENTICATED_USER_ID, SessionData, SessionRecord, SessionStore,
    },
    infra::http::pipeline::{self, PROTECTED},
};
use time::{Duration, OffsetDateTime};

use common::{COOKIE_NAME, Client, app, send, state};

const PASSWORD: &str = "correct horse";

async fn signed_up(client: &mut Client, email: &str) {
    let response = client.signup("Alice", email, PASSWORD).await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/user/login"));
}

#[tokio::test]
async fn protected_routes_redirect_anonymous_visitors() {
    let app = app();
    let mut client = Client::new(app.router.clone());

    for uri in ["/product/create", "/account/view", "/account/password/update"] {
        let response = client.get(uri).await;
        assert_eq!(response.status, StatusCode::SEE_OTHER, "{uri}");
        assert_eq!(response.location(), Some("/user/login"), "{uri}");
    }
}

#[tokio::test]
async fn anonymous_requests_never_reach_protected_handlers() {
    let (state, _, _) = state();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let handler = get(move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            "secret"
        }
    });
    let router = Router::new()
        .route("/secret", pipeline::wrap_route(PROTECTED, handler, &state))
        .with_state(state);

    let request = Request::builder()
        .method(Method::GET)
        .uri("/secret")
        .body(Body::empty())
        .expect("request should build");
    let response = send(&router, request).await;

    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/user/login"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn signup_flash_is_shown_exactly_once() {
    let app = app();
    let mut client = Client::new(app.router.clone());
    signed_up(&mut client, "alice@example.com").await;

    let first = client.get("/user/login").await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(
        first
            .body
            .matches("Your signup was successful. Please log in.")
            .count(),
        1
    );

    let second = client.get("/user/login").await;
    assert!(!second.body.contains("Your signup was successful"));
}

#[tokio::test]
async fn duplicate_email_is_reported_on_the_form() {
    let app = app();
    let mut client = Client::new(app.router.clone());
    signed_up(&mut client, "alice@example.com").await;

    let again = client.signup("Alice Again", "alice@example.com", PASSWORD).await;
    assert_eq!(again.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(again.body.contains("Email address is already in use"));
    assert!(again.body.contains("Alice Again"));
}

#[tokio::test]
async fn invalid_signup_fields_are_reported() {
    let app = app();
    let mut client = Client::new(app.router.clone());

    let response = client.signup("", "not-an-email", "short").await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response.body.contains("This field cannot be blank"));
    assert!(response.body.contains("This field must be a valid email address"));
    assert!(response.body.contains("This field must be at least 8 characters long"));
}

#[tokio::test]
async fn wrong_password_shows_generic_error() {
    let app = app();
    let mut client = Client::new(app.router.clone());
    signed_up(&mut client, "alice@example.com").await;

    let response = client.login("alice@example.com", "wrong password").await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response.body.contains("Email or password is incorrect"));

    let unknown = client.login("nobody@example.com", PASSWORD).await;
    assert_eq!(unknown.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(unknown.body.contains("Email or password is incorrect"));
}

#[tokio::test]
async fn login_renews_the_session_token() {
    let app = app();
    let mut client = Client::new(app.router.clone());
    signed_up(&mut client, "alice@example.com").await;

    let page = client.get("/user/login").await;
    let before = client.cookie.clone().expect("session cookie before login");
    let token = page.csrf_token().expect("csrf token");

    let response = client
        .post_form(
            "/user/login",
            &[
                ("csrf_token", token.as_str()),
                ("email", "alice@example.com"),
                ("password", PASSWORD),
            ],
        )
        .await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/product/create"));
    let after = client.cookie.clone().expect("session cookie after login");
    assert_ne!(before, after);

    let account = client.get("/account/view").await;
    assert_eq!(account.status, StatusCode::OK);
    assert!(account.body.contains("alice@example.com"));
    assert_eq!(account.headers[header::CACHE_CONTROL], "no-store");

    let mut replay = Client::new(app.router.clone());
    replay.cookie = Some(before);
    let stale = replay.get("/account/view").await;
    assert_eq!(stale.status, StatusCode::SEE_OTHER);
    assert_eq!(stale.location(), Some("/user/login"));
}

#[tokio::test]
async fn login_returns_to_the_page_that_bounced() {
    let app = app();
    let mut client = Client::new(app.router.clone());
    signed_up(&mut client, "alice@example.com").await;

    let bounced = client.get("/account/view").await;
    assert_eq!(bounced.location(), Some("/user/login"));

    let response = client.login("alice@example.com", PASSWORD).await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/account/view"));
}

#[tokio::test]
async fn logout_forgets_the_user() {
    let app = app();
    let mut client = Client::new(app.router.clone());
    signed_up(&mut client, "alice@example.com").await;
    client.login("alice@example.com", PASSWORD).await;

    let response = client.submit("/", "/user/logout", &[]).await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/"));

    let home = client.get("/").await;
    assert!(home.body.contains("logged out successfully"));
    assert!(home.body.contains("href=\"/user/login\""));

    let account = client.get("/account/view").await;
    assert_eq!(account.status, StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn password_update_requires_the_current_password() {
    let app = app();
    let mut client = Client::new(app.router.clone());
    signed_up(&mut client, "alice@example.com").await;
    client.login("alice@example.com", PASSWORD).await;

    let rejected = client
        .submit(
            "/account/password/update",
            "/account/password/update",
            &[
                ("current_password", "not my password"),
                ("new_password", "brand new secret"),
                ("new_password_confirmation", "brand new secret"),
            ],
        )
        .await;
    assert_eq!(rejected.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(rejected.body.contains("Current password is incorrect"));

    let mismatched = client
        .submit(
            "/account/password/update",
            "/account/password/update",
            &[
                ("current_password", PASSWORD),
                ("new_password", "brand new secret"),
                ("new_password_confirmation", "something else"),
            ],
        )
        .await;
    assert_eq!(mismatched.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(mismatched.body.contains("Passwords do not match"));

    let updated = client
        .submit(
            "/account/password/update",
            "/account/password/update",
            &[
                ("current_password", PASSWORD),
                ("new_password", "brand new secret"),
                ("new_password_confirmation", "brand new secret"),
            ],
        )
        .await;
    assert_eq!(updated.status, StatusCode::SEE_OTHER);
    assert_eq!(updated.location(), Some("/account/view"));

    let account = client.get("/account/view").await;
    assert!(account.body.contains("Your password has been updated!"));

    let mut fresh = Client::new(app.router.clone());
    let old = fresh.login("alice@example.com", PASSWORD).await;
    assert_eq!(old.status, StatusCode::UNPROCESSABLE_ENTITY);
    let new = fresh.login("alice@example.com", "brand new secret").await;
    assert_eq!(new.status, StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn session_cookie_is_http_only_and_lax() {
    let app = app();
    let mut client = Client::new(app.router.clone());
    let response = client.get("/user/login").await;

    let cookie = response
        .headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.starts_with(&format!("{COOKIE_NAME}=")))
        .expect("session cookie is set")
        .to_string();
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(cookie.contains("Path=/"));
}

#[tokio::test]
async fn session_for_a_missing_account_is_treated_as_anonymous() {
    let app = app();
    let token = "stale-session-token";
    let mut data = SessionData::new();
    data.insert(AUTHENTICATED_USER_ID.to_string(), serde_json::json!(999));
    app.sessions
        .commit(
            token,
            &SessionRecord {
                data,
                expires_at: OffsetDateTime::now_utc() + Duration::hours(1),
            },
        )
        .await
        .expect("seed session");

    let mut client = Client::new(app.router.clone());
    client.cookie = Some(token.to_string());
    let response = client.get("/account/view").await;

    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/user/login"));

    let record = app
        .sessions
        .find(token)
        .await
        .expect("store lookup")
        .expect("session kept under the same token");
    assert!(!record.data.contains_key(AUTHENTICATED_USER_ID));
}
