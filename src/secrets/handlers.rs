use axum::{
    extract::State,
    response::{Html, Redirect},
    routing::get,
    Form, Router,
};
use tracing::{info, instrument, warn};

use super::dto::SecretForm;
use crate::{auth::extractors::CurrentUser, error::AppError, state::AppState, views};

pub fn secrets_routes() -> Router<AppState> {
    Router::new()
        .route("/secrets", get(list_secrets))
        .route("/submit", get(submit_form).post(submit_secret))
}

/// Every shared secret, oldest first. Authors are not shown.
#[instrument(skip_all)]
pub async fn list_secrets(
    State(state): State<AppState>,
    CurrentUser(_viewer): CurrentUser,
) -> Result<Html<String>, AppError> {
    let secrets: Vec<String> = state
        .store
        .find_all_with_secret()
        .await?
        .into_iter()
        .filter_map(|u| u.secret)
        .collect();
    Ok(Html(views::secrets_page(&secrets)))
}

pub async fn submit_form(CurrentUser(_user): CurrentUser) -> Html<String> {
    Html(views::submit_page())
}

/// Replace the signed-in user's secret.
#[instrument(skip_all)]
pub async fn submit_secret(
    State(state): State<AppState>,
    CurrentUser(mut user): CurrentUser,
    Form(form): Form<SecretForm>,
) -> Result<Redirect, AppError> {
    if form.secret.trim().is_empty() {
        warn!(user_id = %user.id, "blank secret ignored");
        return Ok(Redirect::to("/submit"));
    }

    user.secret = Some(form.secret);
    state.store.save(&user).await?;
    info!(user_id = %user.id, "secret updated");
    Ok(Redirect::to("/secrets"))
}
