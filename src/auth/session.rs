use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tower_cookies::{cookie::SameSite, Cookie, Cookies};
use tracing::debug;
use uuid::Uuid;

use crate::{config::SessionConfig, state::AppState, users::User};

pub const SESSION_COOKIE: &str = "session";
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";

const OAUTH_STATE_TTL: Duration = Duration::from_secs(10 * 60);

/// Session token payload. Only the user id and its session version are
/// carried; the user is re-read from the store on every request and the token
/// is dead once the stored version moves past `ver`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,   // user ID
    pub ver: i32,    // user's session_version at sign-in
    pub iat: usize,  // issued at (unix timestamp)
    pub exp: usize,  // expires at (unix timestamp)
    pub iss: String, // issuer
    pub aud: String, // audience
}

/// CSRF state and PKCE verifier of an OAuth round trip in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthStateClaims {
    pub csrf: String,
    pub verifier: String,
    pub iat: usize,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
}

/// Signing keys and cookie settings derived from [`SessionConfig`].
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
    secure: bool,
}

impl FromRef<AppState> for SessionKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::new(&state.config.session)
    }
}

impl SessionKeys {
    pub fn new(cfg: &SessionConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::from_secs((cfg.ttl_minutes.max(1) as u64) * 60),
            secure: cfg.secure_cookies,
        }
    }

    // OAuth state tokens are signed with the same secret, so they get their
    // own audience to keep them from passing as a session.
    fn oauth_audience(&self) -> String {
        format!("{}:oauth-state", self.audience)
    }

    fn window(ttl: Duration) -> (usize, usize) {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        (now.unix_timestamp() as usize, exp.unix_timestamp() as usize)
    }

    fn decode_for<T: DeserializeOwned>(&self, token: &str, audience: &str) -> anyhow::Result<T> {
        let mut validation = Validation::default();
        validation.set_audience(&[audience]);
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<T>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }

    pub fn sign_session(&self, user_id: Uuid, version: i32) -> anyhow::Result<String> {
        let (iat, exp) = Self::window(self.ttl);
        let claims = SessionClaims {
            sub: user_id,
            ver: version,
            iat,
            exp,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, "session token signed");
        Ok(token)
    }

    pub fn verify_session(&self, token: &str) -> anyhow::Result<SessionClaims> {
        let claims: SessionClaims = self.decode_for(token, &self.audience)?;
        debug!(user_id = %claims.sub, "session token verified");
        Ok(claims)
    }

    pub fn sign_oauth_state(&self, csrf: &str, verifier: &str) -> anyhow::Result<String> {
        let (iat, exp) = Self::window(OAUTH_STATE_TTL);
        let claims = OAuthStateClaims {
            csrf: csrf.to_string(),
            verifier: verifier.to_string(),
            iat,
            exp,
            iss: self.issuer.clone(),
            aud: self.oauth_audience(),
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify_oauth_state(&self, token: &str) -> anyhow::Result<OAuthStateClaims> {
        self.decode_for(token, &self.oauth_audience())
    }

    fn cookie(&self, name: &'static str, value: String, max_age: Duration) -> Cookie<'static> {
        Cookie::build((name, value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .max_age(TimeDuration::seconds(max_age.as_secs() as i64))
            .build()
    }

    /// Mark the response's client as signed in as `user`.
    pub fn start_session(&self, cookies: &Cookies, user: &User) -> anyhow::Result<()> {
        let token = self.sign_session(user.id, user.session_version)?;
        cookies.add(self.cookie(SESSION_COOKIE, token, self.ttl));
        Ok(())
    }

    pub fn end_session(&self, cookies: &Cookies) {
        cookies.remove(Cookie::build(SESSION_COOKIE).path("/").build());
    }

    pub fn remember_oauth_state(
        &self,
        cookies: &Cookies,
        csrf: &str,
        verifier: &str,
    ) -> anyhow::Result<()> {
        let token = self.sign_oauth_state(csrf, verifier)?;
        cookies.add(self.cookie(OAUTH_STATE_COOKIE, token, OAUTH_STATE_TTL));
        Ok(())
    }

    /// Remove the pending OAuth state cookie and return its verified claims.
    pub fn take_oauth_state(&self, cookies: &Cookies) -> anyhow::Result<OAuthStateClaims> {
        let cookie = cookies
            .get(OAUTH_STATE_COOKIE)
            .ok_or_else(|| anyhow::anyhow!("missing oauth state cookie"))?;
        cookies.remove(Cookie::build(OAUTH_STATE_COOKIE).path("/").build());
        self.verify_oauth_state(cookie.value())
    }
}
