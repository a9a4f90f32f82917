use askama::Template;
use axum::{
    extract::{Path, State},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{delete, get, post},
    Form, Router,
};
use serde::Deserialize;
use std::collections::HashMap;

use crate::auth::AuthUser;
use crate::error::{is_unique_violation, AppError};
use crate::models::{Entry, Tag, User};
use crate::tagging;
use crate::AppState;

const MAX_TAG_LEN: usize = 50;
const TAG_TAKEN: &str = "That tag already exists.";

struct TagWithCount {
    name: String,
    count: i64,
}

struct TagCloudItem {
    name: String,
    count: i64,
    font_size: String,
    color: String,
}

#[derive(Template)]
#[template(path = "tags/list.html")]
struct TagListTemplate {
    tags: Vec<TagCloudItem>,
    static_hash: &'static str,
    user: Option<User>,
}

#[derive(Template)]
#[template(path = "tags/form.html")]
struct TagFormTemplate {
    name: String,
    errors: HashMap<String, String>,
    static_hash: &'static str,
    user: Option<User>,
}

#[derive(Template)]
#[template(path = "tags/show.html")]
struct TagShowTemplate {
    name: String,
    entries: Vec<Entry>,
    static_hash: &'static str,
    user: Option<User>,
}

#[derive(Deserialize)]
pub struct TagForm {
    #[serde(default)]
    name: String,
}

fn validate_tag_form(form: &TagForm) -> HashMap<String, String> {
    let mut errors = HashMap::new();
    let name = form.name.trim();

    if name.is_empty() {
        errors.insert("name".to_string(), "Your tag must have a name.".to_string());
    } else if name.chars().count() > MAX_TAG_LEN {
        errors.insert(
            "name".to_string(),
            format!("Tag must be at most {MAX_TAG_LEN} characters."),
        );
    } else if !tagging::is_single_word(name) {
        // Only single tokens can ever match entry text.
        errors.insert(
            "name".to_string(),
            "A tag must be a single word (letters, digits or _).".to_string(),
        );
    }

    errors
}

fn build_tag_cloud(tags: Vec<TagWithCount>) -> Vec<TagCloudItem> {
    if tags.is_empty() {
        return vec![];
    }

    // Counts may be zero for tags nothing matches yet, so scale on ln(count + 1).
    let weight = |count: i64| ((count + 1) as f64).ln();
    let max_weight = tags.iter().map(|t| weight(t.count)).fold(f64::MIN, f64::max);
    let min_weight = tags.iter().map(|t| weight(t.count)).fold(f64::MAX, f64::min);

    // Size range: 0.75rem to 2.5rem
    let min_size: f64 = 0.75;
    let max_size: f64 = 2.5;

    // HSL: hue 180 (teal) -> 260 (indigo), lightness 70% -> 35%
    let min_hue: f64 = 180.0;
    let max_hue: f64 = 260.0;
    let min_sat: f64 = 40.0;
    let max_sat: f64 = 60.0;
    let max_light: f64 = 70.0;
    let min_light: f64 = 35.0;

    tags.into_iter()
        .map(|tag| {
            let ratio = if max_weight == min_weight {
                0.5
            } else {
                (weight(tag.count) - min_weight) / (max_weight - min_weight)
            };

            let font_size = min_size + ratio * (max_size - min_size);
            let hue = min_hue + ratio * (max_hue - min_hue);
            let sat = min_sat + ratio * (max_sat - min_sat);
            let light = max_light - ratio * (max_light - min_light);

            TagCloudItem {
                name: tag.name,
                count: tag.count,
                font_size: format!("{:.2}rem", font_size),
                color: format!("hsl({:.0}, {:.0}%, {:.0}%)", hue, sat, light),
            }
        })
        .collect()
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tags", get(list_tags))
        .route("/tags", post(create_tag))
        .route("/tags/new", get(new_tag_form))
        .route("/tags/{name}", get(show_tag))
        .route("/tags/{name}", delete(delete_tag))
}

fn render_form(
    user: User,
    name: String,
    errors: HashMap<String, String>,
) -> Result<Response, AppError> {
    let template = TagFormTemplate {
        name,
        errors,
        static_hash: crate::STATIC_HASH,
        user: Some(user),
    };
    Ok(Html(template.render()?).into_response())
}

async fn list_tags(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let tags: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT t.name, COUNT(et.entry_id) as count
        FROM tags t
        LEFT JOIN entry_tags et ON et.tag_id = t.id
        GROUP BY t.id
        ORDER BY t.name ASC
        "#,
    )
    .fetch_all(&state.db)
    .await?;

    let tag_counts: Vec<TagWithCount> = tags
        .into_iter()
        .map(|(name, count)| TagWithCount { name, count })
        .collect();

    let template = TagListTemplate {
        tags: build_tag_cloud(tag_counts),
        static_hash: crate::STATIC_HASH,
        user: Some(user),
    };
    Ok(Html(template.render()?))
}

async fn new_tag_form(AuthUser(user): AuthUser) -> Result<Response, AppError> {
    render_form(user, String::new(), HashMap::new())
}

async fn create_tag(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Form(form): Form<TagForm>,
) -> Result<Response, AppError> {
    let errors = validate_tag_form(&form);
    if !errors.is_empty() {
        return render_form(user, form.name, errors);
    }

    let tag = Tag::new(form.name);
    let taken = || HashMap::from([("name".to_string(), TAG_TAKEN.to_string())]);

    let (existing,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tags WHERE name = ? COLLATE NOCASE")
        .bind(&tag.name)
        .fetch_one(&state.db)
        .await?;
    if existing > 0 {
        return render_form(user, tag.name, taken());
    }

    // The insert opens the transaction, ahead of the back-fill reads.
    let mut tx = state.db.begin().await?;
    match tag.insert(&mut tx).await {
        Err(e) if is_unique_violation(&e) => return render_form(user, tag.name, taken()),
        result => result?,
    }

    let added = tagging::tag_current_entries(&mut tx, &tag).await?;
    tx.commit().await?;

    tracing::info!(tag = %tag.name, entries = added, "tag created");
    Ok(Redirect::to("/tags").into_response())
}

async fn show_tag(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let entries: Vec<Entry> = sqlx::query_as(
        r#"
        SELECT e.* FROM entries e
        JOIN entry_tags et ON et.entry_id = e.id
        JOIN tags t ON t.id = et.tag_id
        WHERE t.name = ?
        ORDER BY e.date DESC, e.created_at DESC
        "#,
    )
    .bind(&name)
    .fetch_all(&state.db)
    .await?;

    let template = TagShowTemplate {
        name,
        entries,
        static_hash: crate::STATIC_HASH,
        user: Some(user),
    };
    Ok(Html(template.render()?))
}

async fn delete_tag(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM tags WHERE name = ?")
        .bind(&name)
        .execute(&state.db)
        .await?;

    if result.rows_affected() > 0 {
        tracing::info!(tag = %name, "tag deleted");
    }

    Ok(([("HX-Redirect", "/tags")], ""))
}
