//! Append-only writer for the withdrawal ledger. Runs inside the same
//! transaction that consumes (or synthesizes) the pickup code, so an
//! outcome and its credential transition commit or abort together.

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, Transaction};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::code::PickupCode;
use crate::models::withdrawal::{Decision, Method, RetrieverInput, RetrieverKind, WithdrawalRecord};
use crate::utils::fmt_ts;

pub struct NewOutcome<'a> {
    pub student_id: Uuid,
    pub approved_by: Uuid,
    pub reason_id: Uuid,
    pub custom_reason: Option<String>,
    pub method: Method,
    pub decision: Decision,
    pub code: Option<&'a PickupCode>,
    pub retriever: Option<RetrieverInput>,
    pub notes: Option<String>,
}

pub async fn record(
    tx: &mut Transaction<'_, Sqlite>,
    outcome: NewOutcome<'_>,
    now: DateTime<Utc>,
) -> AppResult<WithdrawalRecord> {
    if outcome.method == Method::Code && outcome.code.is_none() {
        return Err(AppError::internal(
            "a code-method outcome must reference a pickup code",
        ));
    }

    if let Some(code) = outcome.code {
        if !code.consumed {
            return Err(AppError::internal(
                "an outcome must reference a consumed pickup code",
            ));
        }
        if code.student_id != outcome.student_id {
            return Err(AppError::internal(
                "referenced pickup code belongs to a different student",
            ));
        }
    }

    let (retriever_kind, retriever_name, retriever_relationship) =
        resolve_retriever(outcome.decision, outcome.retriever.as_ref(), outcome.code)?;

    let record = WithdrawalRecord {
        id: Uuid::new_v4(),
        student_id: outcome.student_id,
        approved_by: outcome.approved_by,
        reason_id: outcome.reason_id,
        custom_reason: outcome.custom_reason,
        method: outcome.method,
        decision: outcome.decision,
        code_id: outcome.code.map(|code| code.id),
        retriever_kind,
        retriever_name,
        retriever_relationship,
        notes: outcome.notes,
        created_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO withdrawals (id, student_id, approved_by, reason_id, custom_reason, method, decision, code_id, retriever_kind, retriever_name, retriever_relationship, notes, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.id.to_string())
    .bind(record.student_id.to_string())
    .bind(record.approved_by.to_string())
    .bind(record.reason_id.to_string())
    .bind(&record.custom_reason)
    .bind(record.method.as_str())
    .bind(record.decision.as_str())
    .bind(record.code_id.map(|id| id.to_string()))
    .bind(record.retriever_kind.map(|kind| kind.as_str()))
    .bind(&record.retriever_name)
    .bind(&record.retriever_relationship)
    .bind(&record.notes)
    .bind(fmt_ts(record.created_at))
    .execute(&mut **tx)
    .await?;

    Ok(record)
}

/// Validates and normalizes retriever identity.
///
/// A denied decision records no retriever. An approved one must name who
/// is taking the student: the guardian themselves, a named delegate
/// (falling back to the delegate named on the code), or an external
/// party with a stated relationship.
fn resolve_retriever(
    decision: Decision,
    input: Option<&RetrieverInput>,
    code: Option<&PickupCode>,
) -> AppResult<(Option<RetrieverKind>, Option<String>, Option<String>)> {
    match decision {
        Decision::Denied => {
            if input.is_some() {
                return Err(AppError::bad_request(
                    "a denied withdrawal cannot record a retriever",
                ));
            }
            Ok((None, None, None))
        }
        Decision::Approved => {
            let input = input.ok_or_else(|| {
                AppError::bad_request("retriever is required for an approved withdrawal")
            })?;

            match input.kind {
                RetrieverKind::Guardian => Ok((
                    Some(RetrieverKind::Guardian),
                    input.name.clone(),
                    input.relationship.clone(),
                )),
                RetrieverKind::Delegate => {
                    let name = input
                        .name
                        .clone()
                        .or_else(|| code.and_then(|c| c.delegate_name.clone()))
                        .ok_or_else(|| {
                            AppError::bad_request("a named delegate is required")
                        })?;
                    Ok((
                        Some(RetrieverKind::Delegate),
                        Some(name),
                        input.relationship.clone(),
                    ))
                }
                RetrieverKind::Other => {
                    let name = input.name.clone().ok_or_else(|| {
                        AppError::bad_request("retriever name is required for an external party")
                    })?;
                    let relationship = input.relationship.clone().ok_or_else(|| {
                        AppError::bad_request(
                            "retriever relationship is required for an external party",
                        )
                    })?;
                    Ok((Some(RetrieverKind::Other), Some(name), Some(relationship)))
                }
            }
        }
    }
}
