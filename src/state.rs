use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use crate::{
    auth::google::{GoogleOAuth, IdentityProvider},
    config::AppConfig,
    users::{MemoryUserStore, PgUserStore, UserStore},
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UserStore>,
    pub config: Arc<AppConfig>,
    pub google: Option<Arc<dyn IdentityProvider>>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store = match &config.database_url {
            Some(url) => {
                let db = PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await
                    .context("connect to database")?;
                sqlx::migrate!("./migrations")
                    .run(&db)
                    .await
                    .context("run migrations")?;
                info!("using postgres user store");
                Arc::new(PgUserStore::new(db)) as Arc<dyn UserStore>
            }
            None => {
                warn!("DATABASE_URL not set; users are kept in memory and lost on restart");
                Arc::new(MemoryUserStore::new()) as Arc<dyn UserStore>
            }
        };

        let google = match &config.google {
            Some(cfg) => Some(Arc::new(GoogleOAuth::new(cfg)?) as Arc<dyn IdentityProvider>),
            None => {
                info!("google sign-in disabled");
                None
            }
        };

        Ok(Self::from_parts(store, config, google))
    }

    pub fn from_parts(
        store: Arc<dyn UserStore>,
        config: Arc<AppConfig>,
        google: Option<Arc<dyn IdentityProvider>>,
    ) -> Self {
        Self {
            store,
            config,
            google,
        }
    }

    /// State over an in-memory store and a scripted identity provider.
    ///
    /// The fake provider accepts codes of the form `ok:<subject>` and fails
    /// any other code.
    #[cfg(test)]
    pub fn fake(variant: crate::config::Variant) -> Self {
        use crate::auth::google::{AuthorizationRequest, ExternalIdentity};
        use crate::config::SessionConfig;
        use async_trait::async_trait;

        struct FakeGoogle;

        #[async_trait]
        impl IdentityProvider for FakeGoogle {
            fn authorization_request(&self) -> AuthorizationRequest {
                AuthorizationRequest {
                    url: "https://accounts.example/authorize?state=fake-state".into(),
                    csrf_state: "fake-state".into(),
                    pkce_verifier: "fake-verifier".into(),
                }
            }

            async fn exchange_code(
                &self,
                code: &str,
                pkce_verifier: &str,
            ) -> anyhow::Result<ExternalIdentity> {
                anyhow::ensure!(pkce_verifier == "fake-verifier", "wrong pkce verifier");
                let subject = code
                    .strip_prefix("ok:")
                    .ok_or_else(|| anyhow::anyhow!("provider rejected code"))?;
                Ok(ExternalIdentity {
                    subject: subject.to_string(),
                    name: None,
                })
            }
        }

        let config = Arc::new(AppConfig {
            variant,
            database_url: None,
            session: SessionConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
                secure_cookies: false,
            },
            google: None,
        });

        Self::from_parts(
            Arc::new(MemoryUserStore::new()),
            config,
            Some(Arc::new(FakeGoogle)),
        )
    }

    /// [`AppState::fake`] over a store whose every call fails as an
    /// unreachable database would.
    #[cfg(test)]
    pub fn fake_with_broken_store(variant: crate::config::Variant) -> Self {
        use crate::users::{StoreError, User};
        use async_trait::async_trait;
        use uuid::Uuid;

        struct BrokenStore;

        fn down() -> StoreError {
            StoreError::Database(sqlx::Error::PoolTimedOut)
        }

        #[async_trait]
        impl UserStore for BrokenStore {
            async fn create(&self, _: &str, _: &str) -> Result<User, StoreError> {
                Err(down())
            }
            async fn find_by_email(&self, _: &str) -> Result<Option<User>, StoreError> {
                Err(down())
            }
            async fn find_by_id(&self, _: Uuid) -> Result<Option<User>, StoreError> {
                Err(down())
            }
            async fn find_or_create_by_google_id(&self, _: &str) -> Result<User, StoreError> {
                Err(down())
            }
            async fn save(&self, _: &User) -> Result<(), StoreError> {
                Err(down())
            }
            async fn find_all_with_secret(&self) -> Result<Vec<User>, StoreError> {
                Err(down())
            }
        }

        Self {
            store: Arc::new(BrokenStore),
            ..Self::fake(variant)
        }
    }
}
