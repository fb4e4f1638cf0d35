use std::future::Future;

use chrono::Utc;
use trackeame_types::{User, timestamp_text};

use super::SqliteStore;

pub trait UserStore: Send + Sync + 'static {
    /// Create the user or refresh its email.
    fn upsert_user(
        &self,
        id: &str,
        email: &str,
    ) -> impl Future<Output = Result<User, sqlx::Error>> + Send;
    fn get_user(&self, id: &str) -> impl Future<Output = Result<Option<User>, sqlx::Error>> + Send;
}

impl UserStore for SqliteStore {
    async fn upsert_user(&self, id: &str, email: &str) -> Result<User, sqlx::Error> {
        let now = timestamp_text(&Utc::now());
        sqlx::query(
            "INSERT INTO users (id, email, created_at, updated_at) VALUES (?1, ?2, ?3, ?3) \
             ON CONFLICT (id) DO UPDATE SET email = excluded.email, updated_at = excluded.updated_at \
             WHERE email IS NOT excluded.email",
        )
        .bind(id)
        .bind(email)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(User {
            id: id.to_owned(),
            email: email.to_owned(),
        })
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<(String, String)> = sqlx::query_as("SELECT id, email FROM users WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(id, email)| User { id, email }))
    }
}
