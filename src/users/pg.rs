use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    repo::{StoreError, UserStore},
    repo_types::User,
};

const USER_COLUMNS: &str =
    "id, email, password_hash, google_id, secret, session_version, created_at";

// Name Postgres gives the inline `email TEXT UNIQUE` constraint.
const EMAIL_CONSTRAINT: &str = "users_email_key";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn is_email_clash(constraint: Option<&str>) -> bool {
    constraint == Some(EMAIL_CONSTRAINT)
}

/// Only a clash on the email column is a duplicate registration; any other
/// unique violation (a `google_id` taken by another row) stays a database error.
fn map_unique_violation(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() && is_email_clash(db.constraint()) {
            return StoreError::DuplicateEmail;
        }
    }
    StoreError::Database(e)
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(map_unique_violation)?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_or_create_by_google_id(&self, google_id: &str) -> Result<User, StoreError> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, google_id)
            VALUES ($1, $2)
            ON CONFLICT (google_id) DO UPDATE SET google_id = EXCLUDED.google_id
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(google_id)
        .fetch_one(&self.db)
        .await?;
        Ok(user)
    }

    async fn save(&self, user: &User) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET email = $2, password_hash = $3, google_id = $4, secret = $5,
                session_version = $6
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.google_id)
        .bind(&user.secret)
        .bind(user.session_version)
        .execute(&self.db)
        .await
        .map_err(map_unique_violation)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(user.id));
        }
        Ok(())
    }

    async fn find_all_with_secret(&self) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE secret IS NOT NULL
            ORDER BY created_at ASC
            "#
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(users)
    }
}
