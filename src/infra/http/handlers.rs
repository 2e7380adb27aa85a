use axum::{
    Form,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use tracing::info;

use crate::{
    application::{
        accounts::{AccountError, RegisterCommand},
        error::HttpError,
        session::{AUTHENTICATED_USER_ID, FLASH, REDIRECT_AFTER_LOGIN, Session},
    },
    domain::{entities::ProductId, validation::Validator},
    presentation::views::{PageData, pages, render_page},
};

use super::{
    HttpState, LOGIN_PATH,
    extract::PageContext,
    forms::{FormView, LoginForm, PasswordUpdateForm, ProductCreateForm, SignupForm},
};

const DEFAULT_AFTER_LOGIN: &str = "/product/create";

pub async fn ping() -> &'static str {
    "OK"
}

pub async fn not_found() -> Response {
    HttpError::not_found("infra::http::not_found").into_response()
}

pub async fn home(State(state): State<HttpState>, page: PageContext) -> Response {
    match state.products.latest().await {
        Ok(products) => render_page(
            &state.templates,
            pages::HOME,
            StatusCode::OK,
            &page.page_data().with_products(products),
        ),
        Err(err) => HttpError::from(err).into_response(),
    }
}

pub async fn about(State(state): State<HttpState>, page: PageContext) -> Response {
    render_page(
        &state.templates,
        pages::ABOUT,
        StatusCode::OK,
        &page.page_data(),
    )
}

pub async fn product_view(
    State(state): State<HttpState>,
    Path(raw_id): Path<String>,
    page: PageContext,
) -> Response {
    let Some(id) = parse_id(&raw_id) else {
        return HttpError::not_found("infra::http::product_view").into_response();
    };

    match state.products.find(id).await {
        Ok(product) => render_page(
            &state.templates,
            pages::PRODUCT_VIEW,
            StatusCode::OK,
            &page.page_data().with_product(product),
        ),
        Err(err) => HttpError::from(err).into_response(),
    }
}

pub async fn product_create_form(State(state): State<HttpState>, page: PageContext) -> Response {
    render_form(
        &state,
        pages::PRODUCT_CREATE,
        StatusCode::OK,
        page.page_data(),
        &ProductCreateForm::blank(),
        &Validator::default(),
    )
}

pub async fn product_create_submit(
    State(state): State<HttpState>,
    page: PageContext,
    Form(form): Form<ProductCreateForm>,
) -> Response {
    let validator = form.validate();
    let expires_days = match form.expires_days() {
        Some(days) if validator.is_valid() => days,
        _ => {
            return render_form(
                &state,
                pages::PRODUCT_CREATE,
                StatusCode::UNPROCESSABLE_ENTITY,
                page.page_data(),
                &form,
                &validator,
            );
        }
    };

    let id = match state
        .products
        .create(form.title, form.content, expires_days)
        .await
    {
        Ok(id) => id,
        Err(err) => return HttpError::from(err).into_response(),
    };

    if let Err(err) = page.session.put(FLASH, "Product successfully created!") {
        return HttpError::from(err).into_response();
    }
    Redirect::to(&format!("/product/view/{id}")).into_response()
}

pub async fn signup_form(State(state): State<HttpState>, page: PageContext) -> Response {
    render_form(
        &state,
        pages::SIGNUP,
        StatusCode::OK,
        page.page_data(),
        &SignupForm::default(),
        &Validator::default(),
    )
}

pub async fn signup_submit(
    State(state): State<HttpState>,
    page: PageContext,
    Form(form): Form<SignupForm>,
) -> Response {
    let mut validator = form.validate();
    if !validator.is_valid() {
        return render_form(
            &state,
            pages::SIGNUP,
            StatusCode::UNPROCESSABLE_ENTITY,
            page.page_data(),
            &form,
            &validator,
        );
    }

    let command = RegisterCommand {
        name: form.name.clone(),
        email: form.email.clone(),
        password: form.password.clone(),
    };
    match state.accounts.register(command).await {
        Ok(user_id) => {
            info!(target = "bestdeal::http::accounts", user_id, "user signed up");
        }
        Err(AccountError::DuplicateEmail) => {
            validator.add_field_error("email", "Email address is already in use");
            return render_form(
                &state,
                pages::SIGNUP,
                StatusCode::UNPROCESSABLE_ENTITY,
                page.page_data(),
                &form,
                &validator,
            );
        }
        Err(err) => return HttpError::from(err).into_response(),
    }

    if let Err(err) = page
        .session
        .put(FLASH, "Your signup was successful. Please log in.")
    {
        return HttpError::from(err).into_response();
    }
    Redirect::to(LOGIN_PATH).into_response()
}

pub async fn login_form(State(state): State<HttpState>, page: PageContext) -> Response {
    render_form(
        &state,
        pages::LOGIN,
        StatusCode::OK,
        page.page_data(),
        &LoginForm::default(),
        &Validator::default(),
    )
}

pub async fn login_submit(
    State(state): State<HttpState>,
    page: PageContext,
    Form(form): Form<LoginForm>,
) -> Response {
    let mut validator = form.validate();
    if !validator.is_valid() {
        return render_form(
            &state,
            pages::LOGIN,
            StatusCode::UNPROCESSABLE_ENTITY,
            page.page_data(),
            &form,
            &validator,
        );
    }

    let user_id = match state.accounts.authenticate(&form.email, &form.password).await {
        Ok(user_id) => user_id,
        Err(AccountError::InvalidCredentials) => {
            validator.add_non_field_error("Email or password is incorrect");
            return render_form(
                &state,
                pages::LOGIN,
                StatusCode::UNPROCESSABLE_ENTITY,
                page.page_data(),
                &form,
                &validator,
            );
        }
        Err(err) => return HttpError::from(err).into_response(),
    };

    page.session.renew_token();
    if let Err(err) = page.session.put(AUTHENTICATED_USER_ID, user_id) {
        return HttpError::from(err).into_response();
    }
    info!(target = "bestdeal::http::accounts", user_id, "user logged in");

    let target = post_login_target(&page.session);
    Redirect::to(&target).into_response()
}

pub async fn logout(page: PageContext) -> Response {
    page.session.renew_token();
    page.session.remove(AUTHENTICATED_USER_ID);
    if let Err(err) = page.session.put(FLASH, "You've been logged out successfully!") {
        return HttpError::from(err).into_response();
    }
    Redirect::to("/").into_response()
}

pub async fn account_view(State(state): State<HttpState>, page: PageContext) -> Response {
    let Some(user_id) = page.auth.user_id() else {
        return Redirect::to(LOGIN_PATH).into_response();
    };

    match state.accounts.find(user_id).await {
        Ok(user) => render_page(
            &state.templates,
            pages::ACCOUNT,
            StatusCode::OK,
            &page.page_data().with_user(user),
        ),
        Err(AccountError::NotFound) => Redirect::to(LOGIN_PATH).into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}

pub async fn password_update_form(
    State(state): State<HttpState>,
    page: PageContext,
) -> Response {
    render_form(
        &state,
        pages::PASSWORD,
        StatusCode::OK,
        page.page_data(),
        &PasswordUpdateForm::default(),
        &Validator::default(),
    )
}

pub async fn password_update_submit(
    State(state): State<HttpState>,
    page: PageContext,
    Form(form): Form<PasswordUpdateForm>,
) -> Response {
    let Some(user_id) = page.auth.user_id() else {
        return Redirect::to(LOGIN_PATH).into_response();
    };

    let mut validator = form.validate();
    if !validator.is_valid() {
        return render_form(
            &state,
            pages::PASSWORD,
            StatusCode::UNPROCESSABLE_ENTITY,
            page.page_data(),
            &form,
            &validator,
        );
    }

    match state
        .accounts
        .change_password(user_id, &form.current_password, &form.new_password)
        .await
    {
        Ok(()) => {}
        Err(AccountError::InvalidCredentials) => {
            validator.add_field_error("current_password", "Current password is incorrect");
            return render_form(
                &state,
                pages::PASSWORD,
                StatusCode::UNPROCESSABLE_ENTITY,
                page.page_data(),
                &form,
                &validator,
            );
        }
        Err(err) => return HttpError::from(err).into_response(),
    }

    if let Err(err) = page.session.put(FLASH, "Your password has been updated!") {
        return HttpError::from(err).into_response();
    }
    Redirect::to("/account/view").into_response()
}

fn render_form<F: serde::Serialize>(
    state: &HttpState,
    page: &str,
    status: StatusCode,
    data: PageData,
    form: &F,
    validator: &Validator,
) -> Response {
    let data = data.with_form(&FormView::new(form, validator));
    render_page(&state.templates, page, status, &data)
}

/// Positive integer ids only; anything else is treated as a missing record.
fn parse_id(raw: &str) -> Option<ProductId> {
    raw.parse::<ProductId>().ok().filter(|id| *id >= 1)
}

/// Where to send a user after login: the page they were bounced from, once,
/// or the product form.
fn post_login_target(session: &Session) -> String {
    session
        .pop::<String>(REDIRECT_AFTER_LOGIN)
        .filter(|path| path.starts_with('/') && !path.starts_with("//"))
        .unwrap_or_else(|| DEFAULT_AFTER_LOGIN.to_string())
}
