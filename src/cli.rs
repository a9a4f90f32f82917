use sqlx::SqlitePool;

use crate::models::{Entry, User};
use crate::password::{self, MIN_PASSWORD_LEN};
use crate::tagging;

pub type CliError = Box<dyn std::error::Error + Send + Sync>;

/// Admin path for adding an account without the registration page.
pub async fn create_user(
    pool: &SqlitePool,
    name: &str,
    email: &str,
    password: &str,
) -> Result<User, CliError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!("password must be at least {MIN_PASSWORD_LEN} characters").into());
    }

    let password_hash = password::hash_password(password.to_string()).await?;
    let user = User::new(name.to_string(), email, password_hash);

    let mut conn = pool.acquire().await?;
    user.insert(&mut conn).await?;

    tracing::info!(user_id = %user.id, "created user");
    Ok(user)
}

/// Totals from [`retag_all`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetagSummary {
    pub entries: u64,
    pub removed: u64,
    pub added: u64,
}

/// Recompute the associations of every entry in a single transaction.
pub async fn retag_all(pool: &SqlitePool) -> Result<RetagSummary, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let entries: Vec<Entry> = sqlx::query_as("SELECT * FROM entries")
        .fetch_all(&mut *tx)
        .await?;

    let mut summary = RetagSummary::default();
    for entry in &entries {
        let retagged = tagging::retag_entry(&mut tx, entry).await?;
        summary.entries += 1;
        summary.removed += retagged.removed;
        summary.added += retagged.added;
    }

    tx.commit().await?;
    Ok(summary)
}
