use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Storage format of `Entry::date`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Entry {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub date: String,
    pub time_spent: i64,
    pub learned: String,
    pub resources: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Entry {
    pub fn new(
        user_id: String,
        title: String,
        date: NaiveDate,
        time_spent: i64,
        learned: String,
        resources: String,
    ) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            title: title.trim().to_string(),
            date: date.format(DATE_FORMAT).to_string(),
            time_spent,
            learned: learned.trim().to_string(),
            resources: resources.trim().to_string(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub async fn insert(&self, conn: &mut sqlx::SqliteConnection) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO entries (id, user_id, title, date, time_spent, learned, resources, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&self.id)
        .bind(&self.user_id)
        .bind(&self.title)
        .bind(&self.date)
        .bind(self.time_spent)
        .bind(&self.learned)
        .bind(&self.resources)
        .bind(&self.created_at)
        .bind(&self.updated_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Human readable date, e.g. "March 1, 2025". Falls back to the raw value.
    pub fn display_date(&self) -> String {
        NaiveDate::parse_from_str(&self.date, DATE_FORMAT)
            .map(|d| d.format("%B %-d, %Y").to_string())
            .unwrap_or_else(|_| self.date.clone())
    }

    pub fn hours_label(&self) -> String {
        match self.time_spent {
            1 => "1 hour".to_string(),
            n => format!("{n} hours"),
        }
    }
}
