//! Read-only boundary over the roster tables (users, students, reasons).
//! Roster maintenance itself happens in external tooling; the engine only
//! ever looks records up.

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::row_parsers;
use crate::errors::{AppError, AppResult};
use crate::models::reason::Reason;
use crate::models::student::{DbStudent, Student};
use crate::models::user::DbUser;

pub async fn find_student(pool: &SqlitePool, id: Uuid) -> AppResult<Student> {
    let row = sqlx::query(
        "SELECT id, external_id, name, organization_id, group_name, guardian_id, created_at, updated_at, deleted_at
         FROM students WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("student not found"))?;

    let db_student: DbStudent = row_parsers::student_from_row(&row)?;
    db_student.try_into()
}

pub async fn find_student_by_external_id(pool: &SqlitePool, external_id: &str) -> AppResult<Student> {
    let row = sqlx::query(
        "SELECT id, external_id, name, organization_id, group_name, guardian_id, created_at, updated_at, deleted_at
         FROM students WHERE external_id = ? AND deleted_at IS NULL",
    )
    .bind(external_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("student not found"))?;

    let db_student: DbStudent = row_parsers::student_from_row(&row)?;
    db_student.try_into()
}

pub async fn is_guardian_of(pool: &SqlitePool, user_id: Uuid, student_id: Uuid) -> AppResult<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(1) FROM students WHERE id = ? AND guardian_id = ? AND deleted_at IS NULL",
    )
    .bind(student_id.to_string())
    .bind(user_id.to_string())
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}

pub async fn find_reason(pool: &SqlitePool, id: Uuid) -> AppResult<Reason> {
    let row = sqlx::query("SELECT id, label, created_at FROM reasons WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("reason not found"))?;

    row_parsers::reason_from_row(&row)
}

pub async fn find_user(pool: &SqlitePool, id: Uuid) -> AppResult<DbUser> {
    let row = sqlx::query(
        "SELECT id, name, email, password_hash, created_at, updated_at, deleted_at
         FROM users WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("user not found"))?;

    row_parsers::user_from_row(&row)
}

pub async fn find_user_by_email(pool: &SqlitePool, email: &str) -> AppResult<Option<DbUser>> {
    let row = sqlx::query(
        "SELECT id, name, email, password_hash, created_at, updated_at, deleted_at
         FROM users WHERE email = ? AND deleted_at IS NULL",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(row_parsers::user_from_row(&row)?)),
        None => Ok(None),
    }
}
