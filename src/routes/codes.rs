use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{actions, resolver, PolicyEvaluator, Principal};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, RequestContext};
use crate::extract::Json as BodyJson;
use crate::jwt::AuthUser;
use crate::models::code::{CodeDetails, CreateCodeRequest, PickupCode};
use crate::models::withdrawal::{ConsumeCodeRequest, WithdrawalRecord};
use crate::pickup::engine::{self, ConsumeArgs, NewCode};
use crate::roster;
use crate::utils::utc_now;

#[utoipa::path(
    post,
    path = "/pickup-codes",
    tag = "Pickup codes",
    request_body = CreateCodeRequest,
    responses(
        (status = 201, description = "Pickup code issued", body = PickupCode),
        (status = 403, description = "Caller is not the student's guardian"),
        (status = 409, description = "An active pickup code already exists for this student"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_code(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    BodyJson(payload): BodyJson<CreateCodeRequest>,
) -> AppResult<(StatusCode, Json<PickupCode>)> {
    let student = roster::find_student(&state.pool, payload.student_id).await?;

    let context = resolver::require_context_in_org(
        &state.pool,
        auth.user_id,
        payload.organization_id,
        student.organization_id,
    )
    .await?;
    let principal = Principal::from_context(auth.user_id, &context);

    if !state.policy.can(&principal, actions::CODE_CREATE).await {
        return Err(AppError::forbidden("guardian role required"));
    }

    // Role tier is not enough: the issuer must be this student's
    // designated guardian.
    if !roster::is_guardian_of(&state.pool, auth.user_id, student.id).await? {
        return Err(AppError::forbidden("caller is not this student's guardian"));
    }

    roster::find_reason(&state.pool, payload.reason_id).await?;

    let code = engine::create_code(
        &state.pool,
        &state.pickup,
        NewCode {
            student_id: student.id,
            issued_by: auth.user_id,
            reason_id: payload.reason_id,
            custom_reason: payload.custom_reason,
            delegate_name: payload.delegate_name,
        },
    )
    .await?;

    log_activity(
        &state.event_bus,
        "created",
        Some(auth.user_id),
        &code,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(code)))
}

#[derive(Debug, Deserialize)]
pub struct InspectQuery {
    pub organization_id: Option<Uuid>,
}

#[utoipa::path(
    get,
    path = "/pickup-codes/{code}",
    tag = "Pickup codes",
    params(
        ("code" = String, Path, description = "Pickup code value"),
        ("organization_id" = Option<Uuid>, Query, description = "Preferred active organization"),
    ),
    responses(
        (status = 200, description = "Code details", body = CodeDetails),
        (status = 404, description = "Unknown code"),
        (status = 409, description = "Code already used"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn inspect_code(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(code_value): Path<String>,
    Query(query): Query<InspectQuery>,
) -> AppResult<Json<CodeDetails>> {
    crate::pickup::generator::validate_code_shape(&code_value, state.pickup.code_length)?;

    let code = engine::find_by_code(&state.pool, &code_value)
        .await?
        .ok_or_else(|| AppError::not_found("pickup code not found"))?;
    let student = roster::find_student(&state.pool, code.student_id).await?;

    let context = resolver::require_context_in_org(
        &state.pool,
        auth.user_id,
        query.organization_id,
        student.organization_id,
    )
    .await?;
    let principal = Principal::from_context(auth.user_id, &context);

    if !state.policy.can(&principal, actions::CODE_INSPECT).await {
        return Err(AppError::forbidden("operator role required"));
    }

    let details = engine::describe(&state.pool, &code, &student, utc_now()).await?;
    Ok(Json(details))
}

#[utoipa::path(
    post,
    path = "/pickup-codes/{code}/consume",
    tag = "Pickup codes",
    params(("code" = String, Path, description = "Pickup code value")),
    request_body = ConsumeCodeRequest,
    responses(
        (status = 200, description = "Code consumed, outcome recorded", body = WithdrawalRecord),
        (status = 404, description = "Unknown code"),
        (status = 409, description = "Code already used"),
        (status = 410, description = "Code has expired"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn consume_code(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(code_value): Path<String>,
    BodyJson(payload): BodyJson<ConsumeCodeRequest>,
) -> AppResult<Json<WithdrawalRecord>> {
    crate::pickup::generator::validate_code_shape(&code_value, state.pickup.code_length)?;

    // The pre-read is for authorization only; consumption itself
    // re-checks everything atomically.
    let code = engine::find_by_code(&state.pool, &code_value)
        .await?
        .ok_or_else(|| AppError::not_found("pickup code not found"))?;
    let student = roster::find_student(&state.pool, code.student_id).await?;

    let context = resolver::require_context_in_org(
        &state.pool,
        auth.user_id,
        payload.organization_id,
        student.organization_id,
    )
    .await?;
    let principal = Principal::from_context(auth.user_id, &context);

    if !state.policy.can(&principal, actions::CODE_CONSUME).await {
        return Err(AppError::forbidden("operator role required"));
    }

    let (record, consumed_code) = engine::consume_code(
        &state.pool,
        &state.pickup,
        &code_value,
        ConsumeArgs {
            operator_id: auth.user_id,
            decision: payload.decision,
            retriever: payload.retriever,
            notes: payload.notes,
        },
    )
    .await?;

    let request_context = RequestContext::from_headers(&headers);
    log_activity(
        &state.event_bus,
        "consumed",
        Some(auth.user_id),
        &consumed_code,
        Some(request_context.clone()),
    );
    log_activity(
        &state.event_bus,
        "recorded",
        Some(auth.user_id),
        &record,
        Some(request_context),
    );

    Ok(Json(record))
}
