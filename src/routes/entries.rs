use askama::Template;
use axum::{
    extract::{Path, State},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{delete, get, post},
    Form, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::SqliteConnection;
use std::collections::HashMap;

use crate::auth::AuthUser;
use crate::error::{is_unique_violation, AppError};
use crate::models::entry::DATE_FORMAT;
use crate::models::{Entry, Tag, User};
use crate::tagging;
use crate::AppState;

const MAX_TITLE_LEN: usize = 200;
const TITLE_TAKEN: &str = "That title has already been used, select a unique title.";

#[derive(Template)]
#[template(path = "entries/list.html")]
struct EntryListTemplate {
    entries: Vec<EntryView>,
    static_hash: &'static str,
    user: Option<User>,
}

#[derive(Template)]
#[template(path = "entries/show.html")]
struct EntryShowTemplate {
    entry: Entry,
    tags: Vec<Tag>,
    is_owner: bool,
    static_hash: &'static str,
    user: Option<User>,
}

#[derive(Template)]
#[template(path = "entries/form.html")]
struct EntryFormTemplate {
    heading: &'static str,
    action: String,
    form: EntryForm,
    errors: HashMap<String, String>,
    static_hash: &'static str,
    user: Option<User>,
}

pub struct EntryView {
    pub id: String,
    pub title: String,
    pub date: String,
    pub hours: String,
    pub tags: Vec<String>,
    pub is_owner: bool,
}

/// Raw form fields. Everything is text so a bad value re-renders the form
/// with a message instead of failing extraction.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EntryForm {
    title: String,
    date: String,
    time_spent: String,
    learned: String,
    resources: String,
}

impl From<&Entry> for EntryForm {
    fn from(entry: &Entry) -> Self {
        Self {
            title: entry.title.clone(),
            date: entry.date.clone(),
            time_spent: entry.time_spent.to_string(),
            learned: entry.learned.clone(),
            resources: entry.resources.clone(),
        }
    }
}

/// A form that passed validation.
#[derive(Debug)]
struct EntryInput {
    title: String,
    date: NaiveDate,
    time_spent: i64,
    learned: String,
    resources: String,
}

fn validate_entry_form(form: &EntryForm) -> Result<EntryInput, HashMap<String, String>> {
    let mut errors = HashMap::new();

    let title = form.title.trim();
    if title.is_empty() {
        errors.insert("title".to_string(), "You must include a title for your entry.".to_string());
    } else if title.chars().count() > MAX_TITLE_LEN {
        errors.insert(
            "title".to_string(),
            format!("Title must be at most {MAX_TITLE_LEN} characters."),
        );
    }

    let date = match form.date.trim() {
        "" => {
            errors.insert("date".to_string(), "Please enter a date.".to_string());
            None
        }
        raw => NaiveDate::parse_from_str(raw, DATE_FORMAT)
            .map_err(|_| {
                errors.insert("date".to_string(), "Date must look like 2025-03-01.".to_string());
            })
            .ok(),
    };

    let time_spent = match form.time_spent.trim() {
        "" => {
            errors.insert(
                "time_spent".to_string(),
                "How long did this task take you to complete?".to_string(),
            );
            None
        }
        raw => match raw.parse::<i64>() {
            Ok(n) if n >= 0 => Some(n),
            _ => {
                errors.insert(
                    "time_spent".to_string(),
                    "Time spent must be a whole number of hours, 0 or more.".to_string(),
                );
                None
            }
        },
    };

    let learned = form.learned.trim();
    if learned.is_empty() {
        errors.insert("learned".to_string(), "What did you learn?".to_string());
    }

    match (date, time_spent) {
        (Some(date), Some(time_spent)) if errors.is_empty() => Ok(EntryInput {
            title: title.to_string(),
            date,
            time_spent,
            learned: learned.to_string(),
            resources: form.resources.trim().to_string(),
        }),
        _ => Err(errors),
    }
}

fn title_taken_errors() -> HashMap<String, String> {
    HashMap::from([("title".to_string(), TITLE_TAKEN.to_string())])
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_entries))
        .route("/entries", get(list_entries))
        .route("/entries/new", get(new_entry_form))
        .route("/entries", post(create_entry))
        .route("/entries/{id}", get(show_entry))
        .route("/entries/{id}/edit", get(edit_entry_form))
        .route("/entries/{id}", post(update_entry))
        .route("/entries/{id}", delete(delete_entry))
}

/// Case-insensitive title check, optionally ignoring the entry being edited.
async fn title_taken(
    conn: &mut SqliteConnection,
    title: &str,
    except_id: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM entries WHERE title = ? COLLATE NOCASE AND id IS NOT ?",
    )
    .bind(title)
    .bind(except_id)
    .fetch_one(conn)
    .await?;
    Ok(count > 0)
}

async fn fetch_owned_entry(
    conn: &mut SqliteConnection,
    id: &str,
    user_id: &str,
) -> Result<Option<Entry>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM entries WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(user_id)
        .fetch_optional(conn)
        .await
}

/// Tag names per entry id, each list sorted by name.
async fn tag_names_by_entry(
    conn: &mut SqliteConnection,
) -> Result<HashMap<String, Vec<String>>, sqlx::Error> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        r#"
        SELECT et.entry_id, t.name
        FROM entry_tags et
        JOIN tags t ON t.id = et.tag_id
        ORDER BY t.name
        "#,
    )
    .fetch_all(conn)
    .await?;

    let mut by_entry: HashMap<String, Vec<String>> = HashMap::new();
    for (entry_id, name) in rows {
        by_entry.entry(entry_id).or_default().push(name);
    }
    Ok(by_entry)
}

fn render_form(
    user: User,
    entry_id: Option<&str>,
    form: EntryForm,
    errors: HashMap<String, String>,
) -> Result<Response, AppError> {
    let (heading, action) = match entry_id {
        Some(id) => ("Edit Entry", format!("/entries/{id}")),
        None => ("New Entry", "/entries".to_string()),
    };
    let template = EntryFormTemplate {
        heading,
        action,
        form,
        errors,
        static_hash: crate::STATIC_HASH,
        user: Some(user),
    };
    Ok(Html(template.render()?).into_response())
}

async fn list_entries(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = state.db.acquire().await?;

    let entries: Vec<Entry> =
        sqlx::query_as("SELECT * FROM entries ORDER BY date DESC, created_at DESC")
            .fetch_all(&mut *conn)
            .await?;
    let mut tags = tag_names_by_entry(&mut conn).await?;

    let entries = entries
        .into_iter()
        .map(|entry| EntryView {
            tags: tags.remove(&entry.id).unwrap_or_default(),
            is_owner: entry.user_id == user.id,
            date: entry.display_date(),
            hours: entry.hours_label(),
            id: entry.id,
            title: entry.title,
        })
        .collect();

    let template = EntryListTemplate {
        entries,
        static_hash: crate::STATIC_HASH,
        user: Some(user),
    };
    Ok(Html(template.render()?))
}

async fn show_entry(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = state.db.acquire().await?;

    let entry: Option<Entry> = sqlx::query_as("SELECT * FROM entries WHERE id = ?")
        .bind(&id)
        .fetch_optional(&mut *conn)
        .await?;
    let Some(entry) = entry else {
        return Err(AppError::NotFound);
    };

    let tags = tagging::tags_for_entry(&mut conn, &entry.id).await?;

    let template = EntryShowTemplate {
        is_owner: entry.user_id == user.id,
        entry,
        tags,
        static_hash: crate::STATIC_HASH,
        user: Some(user),
    };
    Ok(Html(template.render()?))
}

async fn new_entry_form(AuthUser(user): AuthUser) -> Result<Response, AppError> {
    render_form(user, None, EntryForm::default(), HashMap::new())
}

async fn create_entry(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Form(form): Form<EntryForm>,
) -> Result<Response, AppError> {
    let input = match validate_entry_form(&form) {
        Ok(input) => input,
        Err(errors) => return render_form(user, None, form, errors),
    };

    let taken = {
        let mut conn = state.db.acquire().await?;
        title_taken(&mut conn, &input.title, None).await?
    };
    if taken {
        return render_form(user, None, form, title_taken_errors());
    }

    let entry = Entry::new(
        user.id.clone(),
        input.title,
        input.date,
        input.time_spent,
        input.learned,
        input.resources,
    );

    // The insert is the transaction's first statement. A title that raced in
    // since the check is reported as a unique violation.
    let mut tx = state.db.begin().await?;
    match entry.insert(&mut tx).await {
        Err(e) if is_unique_violation(&e) => {
            return render_form(user, None, form, title_taken_errors());
        }
        result => result?,
    }

    let added = tagging::tag_new_entry(&mut tx, &entry).await?;
    tx.commit().await?;

    tracing::info!(entry_id = %entry.id, tags = added, "entry created");
    Ok(Redirect::to("/").into_response())
}

async fn edit_entry_form(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let mut conn = state.db.acquire().await?;

    let Some(entry) = fetch_owned_entry(&mut conn, &id, &user.id).await? else {
        return Ok(Redirect::to("/").into_response());
    };

    render_form(user, Some(entry.id.as_str()), EntryForm::from(&entry), HashMap::new())
}

async fn update_entry(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Form(form): Form<EntryForm>,
) -> Result<Response, AppError> {
    let (mut entry, input) = {
        let mut conn = state.db.acquire().await?;

        let Some(entry) = fetch_owned_entry(&mut conn, &id, &user.id).await? else {
            return Ok(Redirect::to("/").into_response());
        };

        let input = match validate_entry_form(&form) {
            Ok(input) => input,
            Err(errors) => return render_form(user, Some(id.as_str()), form, errors),
        };

        if title_taken(&mut conn, &input.title, Some(id.as_str())).await? {
            return render_form(user, Some(id.as_str()), form, title_taken_errors());
        }

        (entry, input)
    };

    entry.title = input.title;
    entry.date = input.date.format(DATE_FORMAT).to_string();
    entry.time_spent = input.time_spent;
    entry.learned = input.learned;
    entry.resources = input.resources;
    entry.updated_at = chrono::Utc::now().to_rfc3339();

    // As in create_entry, the write opens the transaction.
    let mut tx = state.db.begin().await?;
    let result = sqlx::query(
        r#"
        UPDATE entries
        SET title = ?, date = ?, time_spent = ?, learned = ?, resources = ?, updated_at = ?
        WHERE id = ? AND user_id = ?
        "#,
    )
    .bind(&entry.title)
    .bind(&entry.date)
    .bind(entry.time_spent)
    .bind(&entry.learned)
    .bind(&entry.resources)
    .bind(&entry.updated_at)
    .bind(&entry.id)
    .bind(&user.id)
    .execute(&mut *tx)
    .await;

    let updated = match result {
        Err(e) if is_unique_violation(&e) => {
            return render_form(user, Some(id.as_str()), form, title_taken_errors());
        }
        result => result?,
    };
    if updated.rows_affected() == 0 {
        // Deleted since it was read.
        return Ok(Redirect::to("/").into_response());
    }

    let retagged = tagging::retag_entry(&mut tx, &entry).await?;
    tx.commit().await?;

    tracing::info!(
        entry_id = %entry.id,
        removed = retagged.removed,
        added = retagged.added,
        "entry updated"
    );
    Ok(Redirect::to(&format!("/entries/{id}")).into_response())
}

async fn delete_entry(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    // Associations go with the entry through ON DELETE CASCADE.
    let result = sqlx::query("DELETE FROM entries WHERE id = ? AND user_id = ?")
        .bind(&id)
        .bind(&user.id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() > 0 {
        tracing::info!(entry_id = %id, "entry deleted");
    }

    // htmx follows the header instead of swapping content
    Ok(([("HX-Redirect", "/")], ""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(title: &str, date: &str, time_spent: &str, learned: &str) -> EntryForm {
        EntryForm {
            title: title.to_string(),
            date: date.to_string(),
            time_spent: time_spent.to_string(),
            learned: learned.to_string(),
            resources: String::new(),
        }
    }

    #[test]
    fn valid_form_is_trimmed() {
        let input = validate_entry_form(&form(" Title ", "2025-03-01", " 2 ", " Go ")).unwrap();
        assert_eq!(input.title, "Title");
        assert_eq!(input.date, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert_eq!(input.time_spent, 2);
        assert_eq!(input.learned, "Go");
    }

    #[test]
    fn zero_hours_is_allowed() {
        assert!(validate_entry_form(&form("T", "2025-03-01", "0", "x")).is_ok());
    }

    #[test]
    fn missing_fields_are_reported() {
        let errors = validate_entry_form(&EntryForm::default()).unwrap_err();
        for field in ["title", "date", "time_spent", "learned"] {
            assert!(errors.contains_key(field), "missing error for {field}");
        }
        assert!(!errors.contains_key("resources"));
    }

    #[test]
    fn bad_values_are_reported() {
        let errors = validate_entry_form(&form("T", "01/03/2025", "-1", "x")).unwrap_err();
        assert!(errors["date"].contains("2025-03-01"));
        assert!(errors["time_spent"].contains("0 or more"));

        let errors = validate_entry_form(&form("T", "2025-03-01", "two", "x")).unwrap_err();
        assert!(errors.contains_key("time_spent"));
    }

    #[test]
    fn title_length_limit_is_inclusive() {
        let title = "a".repeat(MAX_TITLE_LEN);
        assert!(validate_entry_form(&form(&title, "2025-03-01", "1", "x")).is_ok());

        let title = "a".repeat(MAX_TITLE_LEN + 1);
        let errors = validate_entry_form(&form(&title, "2025-03-01", "1", "x")).unwrap_err();
        assert_eq!(errors["title"], "Title must be at most 200 characters.");
    }
}
