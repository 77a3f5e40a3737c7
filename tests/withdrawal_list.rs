mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::{add_membership, login, request, seed_fixture, seed_org, seed_student, seed_user, setup};

async fn seed_three_withdrawals(
    app: &axum::Router,
    fx: &common::Fixture,
    sibling: uuid::Uuid,
) -> Result<()> {
    // One code-based approval for the main student...
    let (_, created) = request(
        app,
        "POST",
        "/pickup-codes",
        Some(&fx.guardian_token),
        Some(json!({ "student_id": fx.student, "reason_id": fx.reason })),
    )
    .await?;
    let code = created["code"].as_str().unwrap().to_string();
    let (status, _) = request(
        app,
        "POST",
        &format!("/pickup-codes/{code}/consume"),
        Some(&fx.operator_token),
        Some(json!({ "decision": "approved", "retriever": { "kind": "guardian" } })),
    )
    .await?;
    anyhow::ensure!(status == StatusCode::OK);

    // ...one manual approval for the same student...
    let (status, _) = request(
        app,
        "POST",
        "/withdrawals/manual",
        Some(&fx.operator_token),
        Some(json!({
            "student_id": fx.student,
            "reason_id": fx.reason,
            "decision": "approved",
            "retriever": { "kind": "guardian" },
        })),
    )
    .await?;
    anyhow::ensure!(status == StatusCode::CREATED);

    // ...and one manual denial for the sibling.
    let (status, _) = request(
        app,
        "POST",
        "/withdrawals/manual",
        Some(&fx.operator_token),
        Some(json!({
            "student_id": sibling,
            "reason_id": fx.reason,
            "decision": "denied",
        })),
    )
    .await?;
    anyhow::ensure!(status == StatusCode::CREATED);

    Ok(())
}

#[tokio::test]
async fn filters_narrow_the_ledger() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let fx = seed_fixture(&app, &pool).await?;
    let sibling = seed_student(&pool, fx.org, Some(fx.guardian), "S-1002", "Juno Park").await?;

    seed_three_withdrawals(&app, &fx, sibling).await?;

    let (status, all) = request(&app, "GET", "/withdrawals", Some(&fx.operator_token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all["total"], 3);
    assert_eq!(all["items"].as_array().unwrap().len(), 3);

    let (_, by_student) = request(
        &app,
        "GET",
        &format!("/withdrawals?student_id={}", fx.student),
        Some(&fx.operator_token),
        None,
    )
    .await?;
    assert_eq!(by_student["total"], 2);

    let (_, denied) = request(
        &app,
        "GET",
        "/withdrawals?decision=denied",
        Some(&fx.operator_token),
        None,
    )
    .await?;
    assert_eq!(denied["total"], 1);
    assert_eq!(denied["items"][0]["student_id"], json!(sibling.to_string()));

    let (_, by_code) = request(
        &app,
        "GET",
        "/withdrawals?method=code",
        Some(&fx.operator_token),
        None,
    )
    .await?;
    assert_eq!(by_code["total"], 1);
    assert_eq!(by_code["items"][0]["method"], "code");

    let (_, by_approver) = request(
        &app,
        "GET",
        &format!("/withdrawals?approved_by={}", fx.operator),
        Some(&fx.operator_token),
        None,
    )
    .await?;
    assert_eq!(by_approver["total"], 3);

    Ok(())
}

#[tokio::test]
async fn date_range_and_pagination() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let fx = seed_fixture(&app, &pool).await?;
    let sibling = seed_student(&pool, fx.org, Some(fx.guardian), "S-1002", "Juno Park").await?;

    seed_three_withdrawals(&app, &fx, sibling).await?;

    // Everything so far is in the past hour.
    let hour_ago = (gatepass::utils::utc_now() - chrono::Duration::hours(1)).to_rfc3339();
    let (_, recent) = request(
        &app,
        "GET",
        &format!("/withdrawals?from={}", urlencode(&hour_ago)),
        Some(&fx.operator_token),
        None,
    )
    .await?;
    assert_eq!(recent["total"], 3);

    // A window that ended an hour ago is empty.
    let (_, stale) = request(
        &app,
        "GET",
        &format!("/withdrawals?to={}", urlencode(&hour_ago)),
        Some(&fx.operator_token),
        None,
    )
    .await?;
    assert_eq!(stale["total"], 0);
    assert!(stale["items"].as_array().unwrap().is_empty());

    let (_, page_one) = request(
        &app,
        "GET",
        "/withdrawals?per_page=2&page=1",
        Some(&fx.operator_token),
        None,
    )
    .await?;
    assert_eq!(page_one["total"], 3);
    assert_eq!(page_one["items"].as_array().unwrap().len(), 2);
    assert_eq!(page_one["per_page"], 2);

    let (_, page_two) = request(
        &app,
        "GET",
        "/withdrawals?per_page=2&page=2",
        Some(&fx.operator_token),
        None,
    )
    .await?;
    assert_eq!(page_two["items"].as_array().unwrap().len(), 1);

    Ok(())
}

#[tokio::test]
async fn ledger_is_scoped_to_the_active_organization() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let fx = seed_fixture(&app, &pool).await?;
    let sibling = seed_student(&pool, fx.org, Some(fx.guardian), "S-1002", "Juno Park").await?;

    seed_three_withdrawals(&app, &fx, sibling).await?;

    let other_org = seed_org(&pool, "South Campus").await?;
    let outsider = seed_user(&pool, "Olive Outside", "olive@example.com").await?;
    add_membership(&pool, outsider, other_org, "operator").await?;
    let outsider_token = login(&app, "olive@example.com").await?;

    let (status, body) = request(&app, "GET", "/withdrawals", Some(&outsider_token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);

    Ok(())
}

fn urlencode(value: &str) -> String {
    value.replace('+', "%2B").replace(':', "%3A")
}
