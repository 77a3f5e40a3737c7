//! Manual row decoding for tables whose ids and timestamps are stored as
//! TEXT. Keeps parse failures typed instead of panicking inside `FromRow`.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::code::{CodeOrigin, PickupCode};
use crate::models::reason::Reason;
use crate::models::student::DbStudent;
use crate::models::user::DbUser;
use crate::models::withdrawal::{Decision, Method, RetrieverKind, WithdrawalRecord};
use crate::utils::parse_ts;

fn get_string(row: &SqliteRow, col: &str) -> Result<String, AppError> {
    row.try_get(col)
        .map_err(|err| AppError::internal(format!("missing {col}: {err}")))
}

fn get_opt_string(row: &SqliteRow, col: &str) -> Result<Option<String>, AppError> {
    row.try_get(col)
        .map_err(|err| AppError::internal(format!("missing {col}: {err}")))
}

fn get_uuid(row: &SqliteRow, col: &str) -> Result<Uuid, AppError> {
    let raw = get_string(row, col)?;
    Uuid::parse_str(&raw).map_err(|err| AppError::internal(format!("invalid uuid in {col}: {err}")))
}

fn get_opt_uuid(row: &SqliteRow, col: &str) -> Result<Option<Uuid>, AppError> {
    match get_opt_string(row, col)? {
        Some(raw) => Uuid::parse_str(&raw)
            .map(Some)
            .map_err(|err| AppError::internal(format!("invalid uuid in {col}: {err}"))),
        None => Ok(None),
    }
}

fn get_ts(row: &SqliteRow, col: &str) -> Result<chrono::DateTime<chrono::Utc>, AppError> {
    parse_ts(&get_string(row, col)?)
}

fn get_opt_ts(row: &SqliteRow, col: &str) -> Result<Option<chrono::DateTime<chrono::Utc>>, AppError> {
    match get_opt_string(row, col)? {
        Some(raw) => parse_ts(&raw).map(Some),
        None => Ok(None),
    }
}

fn get_bool(row: &SqliteRow, col: &str) -> Result<bool, AppError> {
    let raw: i64 = row
        .try_get(col)
        .map_err(|err| AppError::internal(format!("missing {col}: {err}")))?;
    Ok(raw != 0)
}

pub fn user_from_row(row: &SqliteRow) -> Result<DbUser, AppError> {
    Ok(DbUser {
        id: get_uuid(row, "id")?,
        name: get_string(row, "name")?,
        email: get_string(row, "email")?,
        password_hash: get_string(row, "password_hash")?,
        created_at: get_ts(row, "created_at")?,
        updated_at: get_ts(row, "updated_at")?,
        deleted_at: get_opt_ts(row, "deleted_at")?,
    })
}

pub fn student_from_row(row: &SqliteRow) -> Result<DbStudent, AppError> {
    Ok(DbStudent {
        id: get_uuid(row, "id")?,
        external_id: get_string(row, "external_id")?,
        name: get_string(row, "name")?,
        organization_id: get_uuid(row, "organization_id")?,
        group_name: get_string(row, "group_name")?,
        guardian_id: get_opt_uuid(row, "guardian_id")?,
        created_at: get_ts(row, "created_at")?,
        updated_at: get_ts(row, "updated_at")?,
        deleted_at: get_opt_ts(row, "deleted_at")?,
    })
}

pub fn reason_from_row(row: &SqliteRow) -> Result<Reason, AppError> {
    Ok(Reason {
        id: get_uuid(row, "id")?,
        label: get_string(row, "label")?,
        created_at: get_ts(row, "created_at")?,
    })
}

pub fn pickup_code_from_row(row: &SqliteRow) -> Result<PickupCode, AppError> {
    Ok(PickupCode {
        id: get_uuid(row, "id")?,
        code: get_string(row, "code")?,
        student_id: get_uuid(row, "student_id")?,
        issued_by: get_uuid(row, "issued_by")?,
        reason_id: get_uuid(row, "reason_id")?,
        custom_reason: get_opt_string(row, "custom_reason")?,
        delegate_name: get_opt_string(row, "delegate_name")?,
        origin: CodeOrigin::parse(&get_string(row, "origin")?)?,
        consumed: get_bool(row, "consumed")?,
        expires_at: get_ts(row, "expires_at")?,
        created_at: get_ts(row, "created_at")?,
    })
}

pub fn withdrawal_from_row(row: &SqliteRow) -> Result<WithdrawalRecord, AppError> {
    let retriever_kind = match get_opt_string(row, "retriever_kind")? {
        Some(raw) => Some(RetrieverKind::parse(&raw)?),
        None => None,
    };

    Ok(WithdrawalRecord {
        id: get_uuid(row, "id")?,
        student_id: get_uuid(row, "student_id")?,
        approved_by: get_uuid(row, "approved_by")?,
        reason_id: get_uuid(row, "reason_id")?,
        custom_reason: get_opt_string(row, "custom_reason")?,
        method: Method::parse(&get_string(row, "method")?)?,
        decision: Decision::parse(&get_string(row, "decision")?)?,
        code_id: get_opt_uuid(row, "code_id")?,
        retriever_kind,
        retriever_name: get_opt_string(row, "retriever_name")?,
        retriever_relationship: get_opt_string(row, "retriever_relationship")?,
        notes: get_opt_string(row, "notes")?,
        created_at: get_ts(row, "created_at")?,
    })
}
