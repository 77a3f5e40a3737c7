//! The credential state machine.
//!
//! A code is ACTIVE (unconsumed, unexpired), CONSUMED (terminal) or
//! EXPIRED (derived on read; never stored). Every transition is a
//! single conditional statement at the store, so concurrent service
//! instances serialize there rather than on in-process state:
//!
//! - creation embeds the "no other active code for this student" check
//!   in the INSERT itself, with the UNIQUE constraint on `code`
//!   backstopping the generator;
//! - consumption is one conditional UPDATE: of two racing consumers,
//!   exactly one sees a row flip and the other gets a typed
//!   already-used error.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::db::row_parsers;
use crate::errors::{AppError, AppResult};
use crate::models::code::{CodeDetails, CodeOrigin, PickupCode};
use crate::models::student::Student;
use crate::models::withdrawal::{Decision, Method, RetrieverInput, WithdrawalRecord};
use crate::roster;
use crate::utils::{fmt_ts, utc_now};

use super::recorder::{self, NewOutcome};
use super::{generator, PickupConfig};

const CODE_COLUMNS: &str = "id, code, student_id, issued_by, reason_id, custom_reason, delegate_name, origin, consumed, expires_at, created_at";

pub struct NewCode {
    pub student_id: Uuid,
    pub issued_by: Uuid,
    pub reason_id: Uuid,
    pub custom_reason: Option<String>,
    pub delegate_name: Option<String>,
}

pub struct ConsumeArgs {
    pub operator_id: Uuid,
    pub decision: Decision,
    pub retriever: Option<RetrieverInput>,
    pub notes: Option<String>,
}

pub struct ManualOverrideArgs {
    pub student_id: Uuid,
    pub operator_id: Uuid,
    pub reason_id: Uuid,
    pub custom_reason: Option<String>,
    pub decision: Decision,
    pub retriever: Option<RetrieverInput>,
    pub notes: Option<String>,
}

/// Issues a new guardian-requested pickup code.
///
/// The duplicate-active check and the insert are one statement, so two
/// racing creations for the same student cannot both pass the check. A
/// UNIQUE violation on `code` means the generator lost a collision race
/// between its probe and this insert; the draw is simply repeated.
pub async fn create_code(
    pool: &SqlitePool,
    config: &PickupConfig,
    new: NewCode,
) -> AppResult<PickupCode> {
    for _ in 0..config.max_generation_attempts {
        let now = utc_now();
        let (code, expires_at) = {
            let mut conn = pool.acquire().await?;
            generator::generate(&mut *conn, config, now).await?
        };
        let id = Uuid::new_v4();

        let result = sqlx::query(
            r#"
            INSERT INTO pickup_codes (id, code, student_id, issued_by, reason_id, custom_reason, delegate_name, origin, consumed, expires_at, created_at)
            SELECT ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?
            WHERE NOT EXISTS (
                SELECT 1 FROM pickup_codes
                WHERE student_id = ? AND consumed = 0 AND expires_at > ?
            )
            "#,
        )
        .bind(id.to_string())
        .bind(&code)
        .bind(new.student_id.to_string())
        .bind(new.issued_by.to_string())
        .bind(new.reason_id.to_string())
        .bind(&new.custom_reason)
        .bind(&new.delegate_name)
        .bind(CodeOrigin::Issued.as_str())
        .bind(fmt_ts(expires_at))
        .bind(fmt_ts(now))
        .bind(new.student_id.to_string())
        .bind(fmt_ts(now))
        .execute(pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => {
                return Err(AppError::conflict(
                    "an active pickup code already exists for this student",
                ));
            }
            Ok(_) => return find_by_id(pool, id).await,
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => continue,
            Err(err) => return Err(err.into()),
        }
    }

    tracing::error!(
        code_length = config.code_length,
        "pickup code space exhausted during insert retries"
    );
    Err(AppError::exhausted("could not allocate a unique pickup code"))
}

pub async fn find_by_code(pool: &SqlitePool, code: &str) -> AppResult<Option<PickupCode>> {
    let sql = format!("SELECT {CODE_COLUMNS} FROM pickup_codes WHERE code = ?");
    let row = sqlx::query(&sql).bind(code).fetch_optional(pool).await?;

    match row {
        Some(row) => Ok(Some(row_parsers::pickup_code_from_row(&row)?)),
        None => Ok(None),
    }
}

async fn find_by_id<'c, E>(executor: E, id: Uuid) -> AppResult<PickupCode>
where
    E: sqlx::Executor<'c, Database = sqlx::Sqlite>,
{
    let sql = format!("SELECT {CODE_COLUMNS} FROM pickup_codes WHERE id = ?");
    let row = sqlx::query(&sql)
        .bind(id.to_string())
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::internal("pickup code row vanished"))?;

    row_parsers::pickup_code_from_row(&row)
}

/// Denormalized detail view for the consuming operator. Pure read,
/// safe to repeat.
pub async fn describe(
    pool: &SqlitePool,
    code: &PickupCode,
    student: &Student,
    now: DateTime<Utc>,
) -> AppResult<CodeDetails> {
    if code.consumed {
        return Err(AppError::conflict("pickup code already used"));
    }

    let issuer = roster::find_user(pool, code.issued_by).await?;
    let reason = roster::find_reason(pool, code.reason_id).await?;

    Ok(CodeDetails {
        code: code.code.clone(),
        origin: code.origin,
        student: student.into(),
        issued_by: crate::models::user::UserSummary {
            id: issuer.id,
            name: issuer.name,
        },
        reason: reason.label,
        custom_reason: code.custom_reason.clone(),
        delegate_name: code.delegate_name.clone(),
        created_at: code.created_at,
        expires_at: code.expires_at,
        is_expired: code.is_expired(now),
    })
}

/// Atomically consumes a code and records the outcome in one
/// transaction.
///
/// The conditional UPDATE is the first statement of the transaction, so
/// it both takes the write lock and re-checks "exists, unconsumed,
/// unexpired" in a single step. Transport-level retries of an already
/// committed consume land in the already-used branch.
pub async fn consume_code(
    pool: &SqlitePool,
    config: &PickupConfig,
    code_value: &str,
    args: ConsumeArgs,
) -> AppResult<(WithdrawalRecord, PickupCode)> {
    generator::validate_code_shape(code_value, config.code_length)?;

    let now = utc_now();
    let mut tx = pool.begin().await?;

    let claimed = sqlx::query(
        "UPDATE pickup_codes SET consumed = 1 WHERE code = ? AND consumed = 0 AND expires_at > ? RETURNING id",
    )
    .bind(code_value)
    .bind(fmt_ts(now))
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = claimed else {
        drop(tx);
        return Err(diagnose_unconsumable(pool, code_value).await?);
    };

    let raw_id: String = row
        .try_get("id")
        .map_err(|err| AppError::internal(format!("missing id: {err}")))?;
    let code_id = Uuid::parse_str(&raw_id)
        .map_err(|err| AppError::internal(format!("invalid pickup code id: {err}")))?;
    let code = find_by_id(&mut *tx, code_id).await?;

    let record = recorder::record(
        &mut tx,
        NewOutcome {
            student_id: code.student_id,
            approved_by: args.operator_id,
            reason_id: code.reason_id,
            custom_reason: code.custom_reason.clone(),
            method: Method::Code,
            decision: args.decision,
            code: Some(&code),
            retriever: args.retriever,
            notes: args.notes,
        },
        now,
    )
    .await?;

    tx.commit().await?;

    Ok((record, code))
}

/// Works out why the conditional consume matched nothing. `consumed` is
/// terminal and expiry is monotonic, so the answer cannot flip back to
/// consumable between the failed UPDATE and this read.
async fn diagnose_unconsumable(pool: &SqlitePool, code_value: &str) -> AppResult<AppError> {
    Ok(match find_by_code(pool, code_value).await? {
        None => AppError::not_found("pickup code not found"),
        Some(code) if code.consumed => AppError::conflict("pickup code already used"),
        Some(_) => AppError::expired("pickup code has expired"),
    })
}

/// Operator bypass for when the credential channel is unavailable.
///
/// An existing active code is closed out instead of being left dangling;
/// otherwise a synthesized code is written already consumed with
/// `expires_at == created_at`, keeping the ledger shape uniform without
/// ever counting as active.
pub async fn authorize_without_code(
    pool: &SqlitePool,
    config: &PickupConfig,
    args: ManualOverrideArgs,
) -> AppResult<(WithdrawalRecord, PickupCode, bool)> {
    let now = utc_now();
    let mut tx = pool.begin().await?;

    let claimed = sqlx::query(
        "UPDATE pickup_codes SET consumed = 1 WHERE student_id = ? AND consumed = 0 AND expires_at > ? RETURNING id",
    )
    .bind(args.student_id.to_string())
    .bind(fmt_ts(now))
    .fetch_optional(&mut *tx)
    .await?;

    let (code, had_active_code) = match claimed {
        Some(row) => {
            let raw_id: String = row
                .try_get("id")
                .map_err(|err| AppError::internal(format!("missing id: {err}")))?;
            let code_id = Uuid::parse_str(&raw_id)
                .map_err(|err| AppError::internal(format!("invalid pickup code id: {err}")))?;
            (find_by_id(&mut *tx, code_id).await?, true)
        }
        None => {
            let (value, _) = generator::generate(&mut *tx, config, now).await?;
            let id = Uuid::new_v4();

            sqlx::query(
                r#"
                INSERT INTO pickup_codes (id, code, student_id, issued_by, reason_id, custom_reason, delegate_name, origin, consumed, expires_at, created_at)
                VALUES (?, ?, ?, ?, ?, ?, NULL, ?, 1, ?, ?)
                "#,
            )
            .bind(id.to_string())
            .bind(&value)
            .bind(args.student_id.to_string())
            .bind(args.operator_id.to_string())
            .bind(args.reason_id.to_string())
            .bind(&args.custom_reason)
            .bind(CodeOrigin::Synthesized.as_str())
            .bind(fmt_ts(now))
            .bind(fmt_ts(now))
            .execute(&mut *tx)
            .await?;

            (find_by_id(&mut *tx, id).await?, false)
        }
    };

    let record = recorder::record(
        &mut tx,
        NewOutcome {
            student_id: args.student_id,
            approved_by: args.operator_id,
            reason_id: args.reason_id,
            custom_reason: args.custom_reason.clone(),
            method: Method::Manual,
            decision: args.decision,
            code: Some(&code),
            retriever: args.retriever,
            notes: args.notes,
        },
        now,
    )
    .await?;

    tx.commit().await?;

    Ok((record, code, had_active_code))
}

/// Housekeeping: drops codes that are both expired and unconsumed. Not
/// part of the request path; uniqueness checks scan all codes, so this
/// can run at any cadence or not at all.
pub async fn sweep_expired(pool: &SqlitePool, now: DateTime<Utc>) -> AppResult<u64> {
    let done = sqlx::query("DELETE FROM pickup_codes WHERE consumed = 0 AND expires_at <= ?")
        .bind(fmt_ts(now))
        .execute(pool)
        .await?;

    Ok(done.rows_affected())
}
