//! Google sign-in over the OAuth 2.0 authorization-code flow with PKCE.
//!
//! [`GoogleOAuth::authorization_request`] builds the consent URL asking for
//! the `profile` scope only. The caller keeps the returned CSRF state and
//! PKCE verifier until the callback, then hands the code and verifier to
//! [`GoogleOAuth::exchange_code`], which trades them for an access token and
//! reads the account subject from the userinfo endpoint.

use anyhow::Context;
use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use serde::Deserialize;
use tracing::debug;

use crate::config::GoogleConfig;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";

/// Where to send the browser, plus what must be kept for the callback.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub csrf_state: String,
    pub pkce_verifier: String,
}

/// Identity asserted by the provider after a successful exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub subject: String,
    pub name: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn authorization_request(&self) -> AuthorizationRequest;

    async fn exchange_code(&self, code: &str, pkce_verifier: &str)
        -> anyhow::Result<ExternalIdentity>;
}

/// Google userinfo (OpenID) response; only the subject is required.
#[derive(Debug, Deserialize)]
struct GoogleUser {
    sub: String,
    name: Option<String>,
}

/// OAuth client type with auth URL and token URL set.
type ConfiguredClient = oauth2::Client<
    oauth2::basic::BasicErrorResponse,
    oauth2::basic::BasicTokenResponse,
    oauth2::basic::BasicTokenIntrospectionResponse,
    oauth2::StandardRevocableToken,
    oauth2::basic::BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

pub struct GoogleOAuth {
    client: ConfiguredClient,
    http: reqwest::Client,
}

impl GoogleOAuth {
    pub fn new(cfg: &GoogleConfig) -> anyhow::Result<Self> {
        let client = BasicClient::new(ClientId::new(cfg.client_id.clone()))
            .set_client_secret(ClientSecret::new(cfg.client_secret.clone()))
            .set_auth_uri(AuthUrl::new(GOOGLE_AUTH_URL.to_string())?)
            .set_token_uri(TokenUrl::new(GOOGLE_TOKEN_URL.to_string())?)
            .set_redirect_uri(
                RedirectUrl::new(cfg.redirect_url.clone()).context("GOOGLE_REDIRECT_URL")?,
            );

        // The token endpoint must not be allowed to redirect us elsewhere.
        let http = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("build oauth http client")?;

        Ok(Self { client, http })
    }
}

#[async_trait]
impl IdentityProvider for GoogleOAuth {
    fn authorization_request(&self) -> AuthorizationRequest {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (auth_url, csrf_state) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new("profile".to_string()))
            .set_pkce_challenge(pkce_challenge)
            .url();

        AuthorizationRequest {
            url: auth_url.to_string(),
            csrf_state: csrf_state.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
        }
    }

    async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: &str,
    ) -> anyhow::Result<ExternalIdentity> {
        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| anyhow::anyhow!("token exchange failed: {e}"))?;

        let user: GoogleUser = self
            .http
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(token.access_token().secret())
            .send()
            .await
            .context("userinfo request")?
            .error_for_status()
            .context("userinfo status")?
            .json()
            .await
            .context("userinfo body")?;

        debug!(subject = %user.sub, "google identity resolved");
        Ok(ExternalIdentity {
            subject: user.sub,
            name: user.name,
        })
    }
}
