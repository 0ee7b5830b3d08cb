use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
};
use tower_cookies::Cookies;
use tracing::{debug, warn};

use super::session::{SessionKeys, SESSION_COOKIE};
use crate::{error::AppError, state::AppState, users::User};

/// Resolves the session cookie to a stored user, if any.
async fn session_user(parts: &mut Parts, state: &AppState) -> Result<Option<User>, Response> {
    let cookies = Cookies::from_request_parts(parts, state)
        .await
        .map_err(IntoResponse::into_response)?;

    let Some(cookie) = cookies.get(SESSION_COOKIE) else {
        return Ok(None);
    };

    let keys = SessionKeys::from_ref(state);
    let claims = match keys.verify_session(cookie.value()) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "invalid or expired session token");
            keys.end_session(&cookies);
            return Ok(None);
        }
    };

    match state.store.find_by_id(claims.sub).await {
        Ok(Some(user)) if user.session_version == claims.ver => Ok(Some(user)),
        Ok(Some(user)) => {
            warn!(user_id = %user.id, token_version = claims.ver, "session was logged out");
            keys.end_session(&cookies);
            Ok(None)
        }
        Ok(None) => {
            warn!(user_id = %claims.sub, "session refers to missing user");
            keys.end_session(&cookies);
            Ok(None)
        }
        Err(e) => Err(AppError::from(e).into_response()),
    }
}

/// The signed-in user. Anyone else is sent to `/login`.
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match session_user(parts, state).await? {
            Some(user) => Ok(CurrentUser(user)),
            None => {
                debug!(path = %parts.uri.path(), "unauthenticated request, redirecting to login");
                Err(Redirect::to("/login").into_response())
            }
        }
    }
}

/// The signed-in user when there is one.
pub struct MaybeUser(pub Option<User>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(session_user(parts, state).await?))
    }
}
