use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;

use crate::app::AppState;
use crate::authz::{actions, resolver, PolicyEvaluator, Principal};
use crate::db::row_parsers;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, RequestContext};
use crate::extract::Json as BodyJson;
use crate::jwt::AuthUser;
use crate::models::code::CodeOrigin;
use crate::models::withdrawal::{
    ManualOverrideRequest, ManualOverrideResponse, WithdrawalListQuery, WithdrawalListResponse,
    WithdrawalRecord,
};
use crate::pickup::engine::{self, ManualOverrideArgs};
use crate::roster;
use crate::utils::fmt_ts;

const DEFAULT_PER_PAGE: u32 = 20;
const MAX_PER_PAGE: u32 = 100;

#[utoipa::path(
    post,
    path = "/withdrawals/manual",
    tag = "Withdrawals",
    request_body = ManualOverrideRequest,
    responses(
        (status = 201, description = "Withdrawal recorded via manual override", body = ManualOverrideResponse),
        (status = 403, description = "Operator role required"),
        (status = 404, description = "Student or reason not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn manual_override(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    BodyJson(payload): BodyJson<ManualOverrideRequest>,
) -> AppResult<(StatusCode, Json<ManualOverrideResponse>)> {
    let student = roster::find_student(&state.pool, payload.student_id).await?;

    let context = resolver::require_context_in_org(
        &state.pool,
        auth.user_id,
        payload.organization_id,
        student.organization_id,
    )
    .await?;
    let principal = Principal::from_context(auth.user_id, &context);

    if !state.policy.can(&principal, actions::WITHDRAWAL_MANUAL).await {
        return Err(AppError::forbidden("operator role required"));
    }

    roster::find_reason(&state.pool, payload.reason_id).await?;

    let (record, code, had_active_code) = engine::authorize_without_code(
        &state.pool,
        &state.pickup,
        ManualOverrideArgs {
            student_id: student.id,
            operator_id: auth.user_id,
            reason_id: payload.reason_id,
            custom_reason: payload.custom_reason,
            decision: payload.decision,
            retriever: payload.retriever,
            notes: payload.notes,
        },
    )
    .await?;

    let request_context = RequestContext::from_headers(&headers);
    let code_action = if code.origin == CodeOrigin::Synthesized {
        "synthesized"
    } else {
        "consumed"
    };
    log_activity(
        &state.event_bus,
        code_action,
        Some(auth.user_id),
        &code,
        Some(request_context.clone()),
    );
    log_activity(
        &state.event_bus,
        "recorded",
        Some(auth.user_id),
        &record,
        Some(request_context),
    );

    Ok((
        StatusCode::CREATED,
        Json(ManualOverrideResponse {
            record,
            had_active_code,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/withdrawals",
    tag = "Withdrawals",
    params(
        ("student_id" = Option<uuid::Uuid>, Query, description = "Filter by student"),
        ("decision" = Option<String>, Query, description = "approved | denied"),
        ("method" = Option<String>, Query, description = "code | manual"),
        ("approved_by" = Option<uuid::Uuid>, Query, description = "Filter by approving operator"),
        ("from" = Option<String>, Query, description = "Inclusive lower bound (RFC3339)"),
        ("to" = Option<String>, Query, description = "Exclusive upper bound (RFC3339)"),
        ("page" = Option<u32>, Query, description = "1-based page number"),
        ("per_page" = Option<u32>, Query, description = "Page size, capped at 100"),
        ("organization_id" = Option<uuid::Uuid>, Query, description = "Preferred active organization"),
    ),
    responses(
        (status = 200, description = "Withdrawal records for the active organization", body = WithdrawalListResponse),
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_withdrawals(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<WithdrawalListQuery>,
) -> AppResult<Json<WithdrawalListResponse>> {
    let context =
        resolver::resolve_active_context(&state.pool, auth.user_id, query.organization_id).await?;
    let principal = Principal::from_context(auth.user_id, &context);

    if !state.policy.can(&principal, actions::WITHDRAWAL_LIST).await {
        return Err(AppError::forbidden("operator role required"));
    }

    // Records are scoped to students of the active organization; filters
    // narrow within that scope.
    let mut conditions = vec!["s.organization_id = ?".to_string()];
    let mut binds: Vec<String> = vec![context.organization_id.to_string()];

    if let Some(student_id) = query.student_id {
        conditions.push("w.student_id = ?".to_string());
        binds.push(student_id.to_string());
    }
    if let Some(decision) = query.decision {
        conditions.push("w.decision = ?".to_string());
        binds.push(decision.as_str().to_string());
    }
    if let Some(method) = query.method {
        conditions.push("w.method = ?".to_string());
        binds.push(method.as_str().to_string());
    }
    if let Some(approved_by) = query.approved_by {
        conditions.push("w.approved_by = ?".to_string());
        binds.push(approved_by.to_string());
    }
    if let Some(from) = query.from {
        conditions.push("w.created_at >= ?".to_string());
        binds.push(fmt_ts(from));
    }
    if let Some(to) = query.to {
        conditions.push("w.created_at < ?".to_string());
        binds.push(fmt_ts(to));
    }

    let where_clause = conditions.join(" AND ");

    let count_sql = format!(
        "SELECT COUNT(1) FROM withdrawals w INNER JOIN students s ON s.id = w.student_id WHERE {where_clause}"
    );
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for bind in &binds {
        count_query = count_query.bind(bind.as_str());
    }
    let total = count_query.fetch_one(&state.pool).await?;

    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
    let offset = (page - 1) as i64 * per_page as i64;

    let list_sql = format!(
        r#"
        SELECT w.id, w.student_id, w.approved_by, w.reason_id, w.custom_reason, w.method, w.decision,
               w.code_id, w.retriever_kind, w.retriever_name, w.retriever_relationship, w.notes, w.created_at
        FROM withdrawals w
        INNER JOIN students s ON s.id = w.student_id
        WHERE {where_clause}
        ORDER BY w.created_at DESC
        LIMIT ? OFFSET ?
        "#
    );
    let mut list_query = sqlx::query(&list_sql);
    for bind in &binds {
        list_query = list_query.bind(bind.as_str());
    }
    let rows = list_query
        .bind(per_page as i64)
        .bind(offset)
        .fetch_all(&state.pool)
        .await?;

    let mut items: Vec<WithdrawalRecord> = Vec::with_capacity(rows.len());
    for row in rows {
        items.push(row_parsers::withdrawal_from_row(&row)?);
    }

    Ok(Json(WithdrawalListResponse {
        items,
        page,
        per_page,
        total,
    }))
}
