#![allow(dead_code)]

use axum::body::Body;
use http_body_util::BodyExt;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chrono::NaiveDate;
use journal::models::{Entry, EntryTag, Tag, User};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

/// In-memory database with the schema applied. One connection, so every
/// query sees the same memory database.
pub async fn test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("Failed to create in-memory SQLite pool");

    journal::db::migrate(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

pub const TEST_PASSWORD: &str = "correct horse battery";

/// Address the test helpers register `name` under.
pub fn email_for(name: &str) -> String {
    format!("{}@example.com", name.to_lowercase().replace(' ', "."))
}

/// Insert a user directly and return its id. The password hash is a
/// placeholder, so this user cannot log in.
pub async fn insert_user(db: &SqlitePool, name: &str) -> String {
    let user = User::new(name.to_string(), &email_for(name), "unusable".to_string());
    let mut conn = db.acquire().await.unwrap();
    user.insert(&mut conn).await.expect("Failed to insert user");
    user.id
}

/// Insert an entry directly, without running the tagger.
pub async fn insert_entry(db: &SqlitePool, user_id: &str, title: &str, learned: &str) -> Entry {
    let entry = Entry::new(
        user_id.to_string(),
        title.to_string(),
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        2,
        learned.to_string(),
        String::new(),
    );
    let mut conn = db.acquire().await.unwrap();
    entry.insert(&mut conn).await.expect("Failed to insert entry");
    entry
}

/// Insert a tag directly, without back-filling.
pub async fn insert_tag(db: &SqlitePool, name: &str) -> Tag {
    let tag = Tag::new(name.to_string());
    let mut conn = db.acquire().await.unwrap();
    tag.insert(&mut conn).await.expect("Failed to insert tag");
    tag
}

/// Names of the tags associated with an entry, sorted.
pub async fn tag_names(db: &SqlitePool, entry_id: &str) -> Vec<String> {
    let mut conn = db.acquire().await.unwrap();
    journal::tagging::tags_for_entry(&mut conn, entry_id)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect()
}

/// Every `entry_tags` row, in a stable order.
pub async fn associations(db: &SqlitePool) -> Vec<EntryTag> {
    sqlx::query_as("SELECT entry_id, tag_id FROM entry_tags ORDER BY entry_id, tag_id")
        .fetch_all(db)
        .await
        .unwrap()
}

pub async fn association_count(db: &SqlitePool) -> i64 {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entry_tags")
        .fetch_one(db)
        .await
        .unwrap();
    count
}

pub struct TestApp {
    pub router: Router,
    pub db: SqlitePool,
}

impl TestApp {
    pub async fn new() -> Self {
        let pool = test_pool().await;

        let router = journal::build_app(pool.clone(), false)
            .await
            .expect("Failed to build app");

        Self { router, db: pool }
    }

    /// Send a request through the app and return the response.
    pub async fn request(&self, req: Request<Body>) -> Response {
        tower::ServiceExt::oneshot(self.router.clone(), req)
            .await
            .unwrap()
    }

    /// Create a user with [`TEST_PASSWORD`] and return (user_id, email).
    pub async fn create_user(&self, name: &str) -> (String, String) {
        let user = journal::cli::create_user(&self.db, name, &email_for(name), TEST_PASSWORD)
            .await
            .expect("Failed to create test user");

        (user.id, user.email)
    }

    /// Log in as the given user and return the session cookie string.
    pub async fn login(&self, email: &str) -> String {
        let resp = self
            .post_form("/login", &login_body(email, TEST_PASSWORD), None)
            .await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        session_cookie(&resp)
    }

    /// Create a user, log in, and return (user_id, cookie).
    pub async fn logged_in(&self, name: &str) -> (String, String) {
        let (user_id, email) = self.create_user(name).await;
        let cookie = self.login(&email).await;
        (user_id, cookie)
    }

    /// Send a GET request with an optional session cookie.
    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header("cookie", cookie);
        }
        let req = builder.body(Body::empty()).unwrap();
        self.request(req).await
    }

    /// Send a POST form request with an optional session cookie.
    pub async fn post_form(&self, uri: &str, body: &str, cookie: Option<&str>) -> Response {
        let mut builder = Request::builder()
            .uri(uri)
            .method("POST")
            .header("content-type", "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header("cookie", cookie);
        }
        let req = builder.body(Body::from(body.to_string())).unwrap();
        self.request(req).await
    }

    /// Send a DELETE request with an optional session cookie.
    pub async fn delete(&self, uri: &str, cookie: Option<&str>) -> Response {
        let mut builder = Request::builder().uri(uri).method("DELETE");
        if let Some(cookie) = cookie {
            builder = builder.header("cookie", cookie);
        }
        let req = builder.body(Body::empty()).unwrap();
        self.request(req).await
    }

    /// The id of the entry with the given title.
    pub async fn entry_id(&self, title: &str) -> String {
        let (id,): (String,) = sqlx::query_as("SELECT id FROM entries WHERE title = ?")
            .bind(title)
            .fetch_one(&self.db)
            .await
            .expect("Entry should exist");
        id
    }
}

/// The `name=value` part of the response's session cookie.
pub fn session_cookie(resp: &Response) -> String {
    resp.headers()
        .get("set-cookie")
        .expect("Response should set a session cookie")
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string()
}

/// Url-encoded body for the login form.
pub fn login_body(email: &str, password: &str) -> String {
    format!("email={}&password={}", encode(email), encode(password))
}

/// Url-encoded body for the registration form.
pub fn register_body(email: &str, username: &str, password: &str, password2: &str) -> String {
    format!(
        "email={}&username={}&password={}&password2={}",
        encode(email),
        encode(username),
        encode(password),
        encode(password2)
    )
}

/// Url-encoded body for the entry form.
pub fn entry_body(title: &str, learned: &str) -> String {
    format!(
        "title={}&date=2025-03-01&time_spent=2&learned={}&resources=",
        encode(title),
        encode(learned)
    )
}

/// Minimal form encoding for test strings.
pub fn encode(value: &str) -> String {
    let mut out = String::new();
    for b in value.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

/// Read the full response body as a String.
pub async fn body_string(resp: Response) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Assert that a response is a redirect to the given location.
pub fn assert_redirect(resp: &Response, expected_location: &str) {
    assert!(
        resp.status().is_redirection(),
        "Expected redirect, got {}",
        resp.status()
    );
    let location = resp
        .headers()
        .get("location")
        .expect("Redirect should have location header")
        .to_str()
        .unwrap();
    assert_eq!(location, expected_location);
}

/// Assert that an HX-Redirect header points to the expected location.
pub fn assert_hx_redirect(resp: &Response, expected_location: &str) {
    let hx = resp
        .headers()
        .get("hx-redirect")
        .expect("Expected HX-Redirect header")
        .to_str()
        .unwrap();
    assert_eq!(hx, expected_location);
}
