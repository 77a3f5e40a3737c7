mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::{request, seed_user, setup};

#[tokio::test]
async fn login_rejects_bad_credentials() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    seed_user(&pool, "Ada Lovelace", "ada@example.com").await?;

    let (status, _) = request(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "email": "ada@example.com", "password": "wrong-password" })),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = request(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "email": "nobody@example.com", "password": common::TEST_PASSWORD })),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn protected_routes_require_a_bearer_token() -> Result<()> {
    let (app, _pool, _dir) = setup().await?;

    let (status, _) = request(&app, "GET", "/auth/me", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = request(&app, "GET", "/withdrawals", Some("not-a-jwt"), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn malformed_bodies_name_the_offending_field() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    seed_user(&pool, "Ada Lovelace", "ada@example.com").await?;

    // Wrong type for a known field.
    let (status, body) = request(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "email": "ada@example.com", "password": 42 })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("password"), "message was: {message}");

    // Missing field.
    let (status, _) = request(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "email": "ada@example.com" })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    Ok(())
}
