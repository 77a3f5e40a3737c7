use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{self, resolver};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, RequestContext};
use crate::extract::Json as BodyJson;
use crate::jwt::AuthUser;
use crate::models::user::{AuthResponse, LoginRequest, MeResponse, User};
use crate::roster;

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    BodyJson(payload): BodyJson<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let db_user = roster::find_user_by_email(&state.pool, &payload.email)
        .await?
        .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    let password_ok = crate::utils::verify_password(&payload.password, &db_user.password_hash)?;
    if !password_ok {
        return Err(AppError::unauthorized("invalid credentials"));
    }

    // Single display label over every role held anywhere; per-request
    // authorization always re-resolves the org-scoped role set.
    let memberships = resolver::memberships(&state.pool, db_user.id).await?;
    let primary_role = authz::primary_role(memberships.iter().map(|m| m.role.as_str()));

    let token = state.jwt.encode(db_user.id, primary_role)?;
    let user: User = db_user.try_into()?;

    log_activity(
        &state.event_bus,
        "login",
        Some(user.id),
        &user,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(AuthResponse {
        token,
        user,
        primary_role: primary_role.map(str::to_string),
    }))
}

#[derive(Debug, Deserialize)]
pub struct MeQuery {
    pub organization_id: Option<Uuid>,
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    params(
        ("organization_id" = Option<Uuid>, Query, description = "Preferred active organization"),
    ),
    responses((status = 200, description = "Current user with memberships and active context", body = MeResponse)),
    security(("bearerAuth" = []))
)]
pub async fn me(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<MeQuery>,
) -> AppResult<Json<MeResponse>> {
    let db_user = roster::find_user(&state.pool, auth.user_id).await?;
    let user: User = db_user.try_into()?;

    let memberships = resolver::memberships(&state.pool, auth.user_id).await?;
    let active = if memberships.is_empty() {
        None
    } else {
        Some(resolver::resolve_active_context(&state.pool, auth.user_id, query.organization_id).await?)
    };

    Ok(Json(MeResponse {
        user,
        memberships,
        active,
    }))
}
