use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

use super::password::verify_password;
use crate::users::{StoreError, User, UserStore};

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

pub(crate) fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Look up `email` and check `password` against the stored hash.
///
/// `Ok(None)` covers every rejected attempt: unknown email, a user without
/// a local password, a wrong password, or an unreadable stored hash.
pub async fn verify_credentials(
    store: &dyn UserStore,
    email: &str,
    password: &str,
) -> Result<Option<User>, StoreError> {
    let Some(user) = store.find_by_email(email).await? else {
        debug!(%email, "no user for email");
        return Ok(None);
    };

    let Some(hash) = user.password_hash.as_deref() else {
        debug!(user_id = %user.id, "user has no local password");
        return Ok(None);
    };

    match verify_password(password, hash) {
        Ok(true) => Ok(Some(user)),
        Ok(false) => Ok(None),
        Err(e) => {
            warn!(error = %e, user_id = %user.id, "stored password hash is unreadable");
            Ok(None)
        }
    }
}
