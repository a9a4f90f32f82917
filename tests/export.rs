mod common;

use axum::http::StatusCode;
use common::{body_string, entry_body, insert_entry, TestApp};

#[tokio::test]
async fn export_returns_json_with_entries() {
    let app = TestApp::new().await;
    let (_user_id, cookie) = app.logged_in("Test User").await;

    app.post_form("/tags", "name=Rust", Some(&cookie)).await;
    app.post_form("/entries", &entry_body("Export Test", "Rust lifetimes"), Some(&cookie))
        .await;

    let resp = app.get("/export", Some(&cookie)).await;
    assert_eq!(resp.status(), StatusCode::OK);

    // Check Content-Disposition header
    let content_disposition = resp
        .headers()
        .get("content-disposition")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(content_disposition.starts_with("attachment; filename="));
    assert!(content_disposition.contains("journal-export-"));

    // Check JSON content
    let body = body_string(resp).await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();

    assert!(json["exported_at"].is_string());
    assert_eq!(json["entries"].as_array().unwrap().len(), 1);
    assert_eq!(json["entries"][0]["title"], "Export Test");
    assert_eq!(json["entries"][0]["date"], "2025-03-01");
    assert_eq!(json["entries"][0]["time_spent"], 2);
    assert_eq!(json["entries"][0]["tags"][0], "Rust");
}

#[tokio::test]
async fn export_only_includes_own_entries() {
    let app = TestApp::new().await;
    let (_user_id, cookie) = app.logged_in("Me").await;
    let (other_id, _) = app.create_user("Someone Else").await;
    insert_entry(&app.db, &other_id, "Not Mine", "secret").await;

    let resp = app.get("/export", Some(&cookie)).await;
    let json: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
    assert!(json["entries"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn export_unauthenticated_redirects() {
    let app = TestApp::new().await;
    let resp = app.get("/export", None).await;
    common::assert_redirect(&resp, "/login");
}
