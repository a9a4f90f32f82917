use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::collections::HashMap;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::Entry;
use crate::AppState;

#[derive(Serialize)]
struct ExportEntry {
    id: String,
    title: String,
    date: String,
    time_spent: i64,
    learned: String,
    resources: String,
    created_at: String,
    updated_at: String,
    tags: Vec<String>,
}

#[derive(Serialize)]
struct ExportData {
    exported_at: String,
    entries: Vec<ExportEntry>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/export", get(export_data))
}

async fn export_data(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = state.db.acquire().await?;

    let entries: Vec<Entry> =
        sqlx::query_as("SELECT * FROM entries WHERE user_id = ? ORDER BY date, created_at")
            .bind(&user.id)
            .fetch_all(&mut *conn)
            .await?;

    let rows: Vec<(String, String)> = sqlx::query_as(
        r#"
        SELECT et.entry_id, t.name
        FROM entry_tags et
        JOIN tags t ON t.id = et.tag_id
        JOIN entries e ON e.id = et.entry_id
        WHERE e.user_id = ?
        ORDER BY t.name
        "#,
    )
    .bind(&user.id)
    .fetch_all(&mut *conn)
    .await?;

    let mut tags: HashMap<String, Vec<String>> = HashMap::new();
    for (entry_id, name) in rows {
        tags.entry(entry_id).or_default().push(name);
    }

    let export_entries = entries
        .into_iter()
        .map(|entry| ExportEntry {
            tags: tags.remove(&entry.id).unwrap_or_default(),
            id: entry.id,
            title: entry.title,
            date: entry.date,
            time_spent: entry.time_spent,
            learned: entry.learned,
            resources: entry.resources,
            created_at: entry.created_at,
            updated_at: entry.updated_at,
        })
        .collect();

    let export = ExportData {
        exported_at: chrono::Utc::now().to_rfc3339(),
        entries: export_entries,
    };

    let filename = format!("journal-export-{}.json", chrono::Local::now().format("%Y-%m-%d"));
    let content_disposition = format!("attachment; filename=\"{}\"", filename);

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(value) = HeaderValue::from_str(&content_disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    Ok((headers, Json(export)))
}
