use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    // Never written into the session.
    #[serde(skip)]
    pub password_hash: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Lowercased and trimmed, the form emails are stored and looked up in.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl User {
    /// A fresh user. `password_hash` must already be hashed.
    pub fn new(name: String, email: &str, password_hash: String) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            email: normalize_email(email),
            password_hash,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub async fn insert(&self, conn: &mut sqlx::SqliteConnection) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO users (id, name, email, password_hash, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&self.id)
        .bind(&self.name)
        .bind(&self.email)
        .bind(&self.password_hash)
        .bind(&self.created_at)
        .bind(&self.updated_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn find_by_email(
        conn: &mut sqlx::SqliteConnection,
        email: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM users WHERE email = ?")
            .bind(normalize_email(email))
            .fetch_optional(conn)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_user_normalizes_email() {
        let user = User::new(" Ada ".to_string(), " Ada@Example.COM ", "hash".to_string());
        assert_eq!(user.name, "Ada");
        assert_eq!(user.email, "ada@example.com");
    }

    #[test]
    fn ids_are_unique() {
        let a = User::new("a".to_string(), "a@example.com", String::new());
        let b = User::new("b".to_string(), "b@example.com", String::new());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn password_hash_stays_out_of_serialized_user() {
        let user = User::new("Ada".to_string(), "ada@example.com", "$argon2id$secret".to_string());
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret"));

        let back: User = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, user.id);
        assert!(back.password_hash.is_empty());
    }
}
