#![allow(dead_code)]

use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`
use uuid::Uuid;

use gatepass::utils::{fmt_ts, hash_password, utc_now};

pub const TEST_PASSWORD: &str = "password123";

/// Temp-file SQLite + migrations + router, the way the service boots.
pub async fn setup() -> Result<(Router, SqlitePool, TempDir)> {
    let dir = tempfile::tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test.db");

    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_secs(5));
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"),
    )
    .await?;
    migrator.run(&pool).await?;

    std::env::set_var("JWT_SECRET", "test-secret");
    let app = gatepass::create_app(pool.clone()).await?;

    Ok((app, pool, dir))
}

pub async fn seed_org(pool: &SqlitePool, name: &str) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO organizations (id, name, created_at) VALUES (?, ?, ?)")
        .bind(id.to_string())
        .bind(name)
        .bind(fmt_ts(utc_now()))
        .execute(pool)
        .await?;
    Ok(id)
}

pub async fn seed_user(pool: &SqlitePool, name: &str, email: &str) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = fmt_ts(utc_now());
    let password_hash = hash_password(TEST_PASSWORD).map_err(|err| anyhow::anyhow!("{err}"))?;
    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(name)
    .bind(email)
    .bind(password_hash)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;
    Ok(id)
}

pub async fn add_membership(pool: &SqlitePool, user: Uuid, org: Uuid, role: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO organization_members (user_id, organization_id, role, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(user.to_string())
    .bind(org.to_string())
    .bind(role)
    .bind(fmt_ts(utc_now()))
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn seed_student(
    pool: &SqlitePool,
    org: Uuid,
    guardian: Option<Uuid>,
    external_id: &str,
    name: &str,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = fmt_ts(utc_now());
    sqlx::query(
        "INSERT INTO students (id, external_id, name, organization_id, group_name, guardian_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(external_id)
    .bind(name)
    .bind(org.to_string())
    .bind("Grade 3-B")
    .bind(guardian.map(|g| g.to_string()))
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;
    Ok(id)
}

pub async fn seed_reason(pool: &SqlitePool, label: &str) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO reasons (id, label, created_at) VALUES (?, ?, ?)")
        .bind(id.to_string())
        .bind(label)
        .bind(fmt_ts(utc_now()))
        .execute(pool)
        .await?;
    Ok(id)
}

pub async fn request(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body_json: Option<Value>,
) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }

    let request = match body_json {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(value.to_string()))?,
        None => builder.body(Body::empty())?,
    };

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), 10_485_760).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).context("response body is not JSON")?
    };

    Ok((status, value))
}

pub async fn login(app: &Router, email: &str) -> Result<String> {
    let (status, body) = request(
        app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "email": email, "password": TEST_PASSWORD })),
    )
    .await?;
    anyhow::ensure!(status == StatusCode::OK, "login failed: {} - {}", status, body);
    body.get("token")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .context("missing token")
}

/// One organization with an operator, a guardian, their student and a
/// reason - the cast most scenarios need.
pub struct Fixture {
    pub org: Uuid,
    pub operator: Uuid,
    pub guardian: Uuid,
    pub student: Uuid,
    pub reason: Uuid,
    pub operator_token: String,
    pub guardian_token: String,
}

pub async fn seed_fixture(app: &Router, pool: &SqlitePool) -> Result<Fixture> {
    let org = seed_org(pool, "North Campus").await?;

    let operator = seed_user(pool, "Omar Operator", "operator@example.com").await?;
    add_membership(pool, operator, org, "operator").await?;

    let guardian = seed_user(pool, "Grace Guardian", "guardian@example.com").await?;
    add_membership(pool, guardian, org, "guardian").await?;

    let student = seed_student(pool, org, Some(guardian), "S-1001", "Mina Park").await?;
    let reason = seed_reason(pool, "Medical appointment").await?;

    let operator_token = login(app, "operator@example.com").await?;
    let guardian_token = login(app, "guardian@example.com").await?;

    Ok(Fixture {
        org,
        operator,
        guardian,
        student,
        reason,
        operator_token,
        guardian_token,
    })
}

/// Rewinds a code's expiry so time-based paths can run without waiting.
pub async fn force_expire(pool: &SqlitePool, code: &str) -> Result<()> {
    let past = fmt_ts(utc_now() - chrono::Duration::hours(1));
    sqlx::query("UPDATE pickup_codes SET expires_at = ? WHERE code = ?")
        .bind(past)
        .bind(code)
        .execute(pool)
        .await?;
    Ok(())
}
