use anyhow::Context;
use axum::{
    extract::{FromRef, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Form, Router,
};
use tower_cookies::Cookies;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{CredentialsForm, OAuthCallback},
        extractors::MaybeUser,
        google::ExternalIdentity,
        password::hash_password,
        services::{is_valid_email, normalize_email, verify_credentials},
        session::SessionKeys,
    },
    error::AppError,
    state::AppState,
    users::{StoreError, User},
    views,
};

/// Registration and login without sessions.
pub fn basic_routes() -> Router<AppState> {
    Router::new()
        .route("/register", get(register_form).post(register_basic))
        .route("/login", get(login_form).post(login_basic))
}

/// Session-backed registration, login, logout and Google sign-in.
pub fn extended_routes() -> Router<AppState> {
    Router::new()
        .route("/register", get(register_page).post(register))
        .route("/login", get(login_page).post(login))
        .route("/logout", get(logout))
        .route("/auth/google", get(google_start))
        .route("/auth/google/secrets", get(google_callback))
}

enum Registration {
    Created(User),
    /// The form was refused; the response re-renders it with the reason.
    Rejected(Response),
}

fn rejected_registration(state: &AppState, status: StatusCode, reason: &str) -> Registration {
    let page = views::register_page(Some(reason), state.google.is_some());
    Registration::Rejected((status, Html(page)).into_response())
}

async fn create_account(state: &AppState, form: CredentialsForm) -> Result<Registration, AppError> {
    let email = normalize_email(&form.username);

    if !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Ok(rejected_registration(state, StatusCode::BAD_REQUEST, "Please enter a valid email address."));
    }

    if form.password.is_empty() {
        warn!(%email, "empty password");
        return Ok(rejected_registration(state, StatusCode::BAD_REQUEST, "Please choose a password."));
    }

    let hash = hash_password(&form.password)?;

    match state.store.create(&email, &hash).await {
        Ok(user) => {
            info!(user_id = %user.id, %email, "user registered");
            Ok(Registration::Created(user))
        }
        Err(StoreError::DuplicateEmail) => {
            warn!(%email, "email already registered");
            Ok(rejected_registration(state, StatusCode::CONFLICT, "That email is already registered."))
        }
        Err(e) => {
            error!(error = %e, %email, "create user failed");
            Err(e.into())
        }
    }
}

async fn authenticate(state: &AppState, form: &CredentialsForm) -> Result<Option<User>, AppError> {
    let email = normalize_email(&form.username);
    let user = verify_credentials(state.store.as_ref(), &email, &form.password).await?;
    match &user {
        Some(u) => info!(user_id = %u.id, %email, "user logged in"),
        None => warn!(%email, "login rejected"),
    }
    Ok(user)
}

// --- basic ---

pub async fn register_form(State(state): State<AppState>) -> Html<String> {
    Html(views::register_page(None, state.google.is_some()))
}

pub async fn login_form(State(state): State<AppState>) -> Html<String> {
    Html(views::login_page(None, state.google.is_some()))
}

#[instrument(skip(state, form))]
pub async fn register_basic(
    State(state): State<AppState>,
    Form(form): Form<CredentialsForm>,
) -> Result<Response, AppError> {
    match create_account(&state, form).await? {
        Registration::Created(_) => Ok(Html(views::unlocked_page()).into_response()),
        Registration::Rejected(page) => Ok(page),
    }
}

#[instrument(skip(state, form))]
pub async fn login_basic(
    State(state): State<AppState>,
    Form(form): Form<CredentialsForm>,
) -> Result<Response, AppError> {
    match authenticate(&state, &form).await? {
        Some(_) => Ok(Html(views::unlocked_page()).into_response()),
        None => Ok(Redirect::to("/login").into_response()),
    }
}

// --- extended ---

pub async fn register_page(State(state): State<AppState>, MaybeUser(user): MaybeUser) -> Response {
    if user.is_some() {
        return Redirect::to("/secrets").into_response();
    }
    register_form(State(state)).await.into_response()
}

pub async fn login_page(State(state): State<AppState>, MaybeUser(user): MaybeUser) -> Response {
    if user.is_some() {
        return Redirect::to("/secrets").into_response();
    }
    login_form(State(state)).await.into_response()
}

#[instrument(skip(state, cookies, form))]
pub async fn register(
    State(state): State<AppState>,
    cookies: Cookies,
    Form(form): Form<CredentialsForm>,
) -> Result<Response, AppError> {
    let user = match create_account(&state, form).await? {
        Registration::Created(user) => user,
        Registration::Rejected(page) => return Ok(page),
    };
    SessionKeys::from_ref(&state).start_session(&cookies, &user)?;
    Ok(Redirect::to("/secrets").into_response())
}

#[instrument(skip(state, cookies, form))]
pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    Form(form): Form<CredentialsForm>,
) -> Result<Response, AppError> {
    let Some(user) = authenticate(&state, &form).await? else {
        return Ok(Redirect::to("/login").into_response());
    };
    SessionKeys::from_ref(&state).start_session(&cookies, &user)?;
    Ok(Redirect::to("/secrets").into_response())
}

/// Bumping the stored session version kills every token issued so far,
/// including copies of the cookie held elsewhere.
#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    cookies: Cookies,
    MaybeUser(user): MaybeUser,
) -> Result<Redirect, AppError> {
    if let Some(mut user) = user {
        user.session_version += 1;
        state.store.save(&user).await?;
        info!(user_id = %user.id, "session ended");
    }
    SessionKeys::from_ref(&state).end_session(&cookies);
    Ok(Redirect::to("/"))
}

#[instrument(skip(state, cookies))]
pub async fn google_start(
    State(state): State<AppState>,
    cookies: Cookies,
) -> Result<Response, AppError> {
    let Some(provider) = state.google.as_ref() else {
        warn!("google sign-in requested but not configured");
        return Ok(Redirect::to("/login").into_response());
    };

    let request = provider.authorization_request();
    SessionKeys::from_ref(&state).remember_oauth_state(
        &cookies,
        &request.csrf_state,
        &request.pkce_verifier,
    )?;
    Ok(Redirect::to(&request.url).into_response())
}

async fn resolve_google_identity(
    state: &AppState,
    keys: &SessionKeys,
    cookies: &Cookies,
    params: OAuthCallback,
) -> anyhow::Result<ExternalIdentity> {
    // Consumed up front so a failed callback cannot be replayed.
    let pending = keys.take_oauth_state(cookies)?;

    if let Some(err) = params.error {
        anyhow::bail!("provider returned error `{err}`");
    }
    let code = params.code.context("callback missing code")?;
    let returned_state = params.state.context("callback missing state")?;
    anyhow::ensure!(returned_state == pending.csrf, "oauth state mismatch");

    let provider = state.google.as_ref().context("google sign-in not configured")?;
    provider.exchange_code(&code, &pending.verifier).await
}

#[instrument(skip(state, cookies, params))]
pub async fn google_callback(
    State(state): State<AppState>,
    cookies: Cookies,
    Query(params): Query<OAuthCallback>,
) -> Result<Response, AppError> {
    let keys = SessionKeys::from_ref(&state);

    let identity = match resolve_google_identity(&state, &keys, &cookies, params).await {
        Ok(identity) => identity,
        Err(e) => {
            warn!(error = %e, "google sign-in failed");
            return Ok(Redirect::to("/login").into_response());
        }
    };

    let user = state
        .store
        .find_or_create_by_google_id(&identity.subject)
        .await?;
    keys.start_session(&cookies, &user)?;

    info!(user_id = %user.id, name = ?identity.name, "google sign-in");
    Ok(Redirect::to("/secrets").into_response())
}
