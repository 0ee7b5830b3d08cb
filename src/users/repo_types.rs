use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: Option<String>,         // set for locally registered users
    pub password_hash: Option<String>, // Argon2 hash, absent for Google users
    pub google_id: Option<String>,     // Google account subject
    pub secret: Option<String>,        // latest submitted secret
    pub session_version: i32,          // sessions signed for an older value are dead
    pub created_at: OffsetDateTime,
}
