mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::{request, seed_fixture, setup};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_racing_consumers_produce_one_success_and_one_conflict() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let fx = seed_fixture(&app, &pool).await?;

    let (_, created) = request(
        &app,
        "POST",
        "/pickup-codes",
        Some(&fx.guardian_token),
        Some(json!({ "student_id": fx.student, "reason_id": fx.reason })),
    )
    .await?;
    let code = created["code"].as_str().unwrap().to_string();

    let consume = |app: axum::Router, token: String, code: String| async move {
        request(
            &app,
            "POST",
            &format!("/pickup-codes/{code}/consume"),
            Some(&token),
            Some(json!({ "decision": "approved", "retriever": { "kind": "guardian" } })),
        )
        .await
    };

    let first = tokio::spawn(consume(
        app.clone(),
        fx.operator_token.clone(),
        code.clone(),
    ));
    let second = tokio::spawn(consume(
        app.clone(),
        fx.operator_token.clone(),
        code.clone(),
    ));

    let (first, second) = (first.await??, second.await??);
    let statuses = [first.0, second.0];

    assert_eq!(
        statuses.iter().filter(|s| **s == StatusCode::OK).count(),
        1,
        "expected exactly one winner: {statuses:?}"
    );
    assert_eq!(
        statuses.iter().filter(|s| **s == StatusCode::CONFLICT).count(),
        1,
        "expected exactly one conflict: {statuses:?}"
    );

    // Exactly one ledger entry exists for the code.
    let outcomes: i64 = sqlx::query_scalar(
        "SELECT COUNT(1) FROM withdrawals w INNER JOIN pickup_codes c ON c.id = w.code_id WHERE c.code = ?",
    )
    .bind(&code)
    .fetch_one(&pool)
    .await?;
    assert_eq!(outcomes, 1);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_racing_creates_for_one_student_yield_one_code() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let fx = seed_fixture(&app, &pool).await?;

    let create = |app: axum::Router, token: String, student: uuid::Uuid, reason: uuid::Uuid| async move {
        request(
            &app,
            "POST",
            "/pickup-codes",
            Some(&token),
            Some(json!({ "student_id": student, "reason_id": reason })),
        )
        .await
    };

    let first = tokio::spawn(create(
        app.clone(),
        fx.guardian_token.clone(),
        fx.student,
        fx.reason,
    ));
    let second = tokio::spawn(create(
        app.clone(),
        fx.guardian_token.clone(),
        fx.student,
        fx.reason,
    ));

    let (first, second) = (first.await??, second.await??);
    let statuses = [first.0, second.0];

    assert_eq!(
        statuses.iter().filter(|s| **s == StatusCode::CREATED).count(),
        1,
        "expected exactly one creation: {statuses:?}"
    );
    assert_eq!(
        statuses.iter().filter(|s| **s == StatusCode::CONFLICT).count(),
        1,
        "expected exactly one conflict: {statuses:?}"
    );

    let active: i64 = sqlx::query_scalar(
        "SELECT COUNT(1) FROM pickup_codes WHERE student_id = ? AND consumed = 0",
    )
    .bind(fx.student.to_string())
    .fetch_one(&pool)
    .await?;
    assert_eq!(active, 1);

    Ok(())
}
