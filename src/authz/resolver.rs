use serde::Serialize;
use sqlx::{Row, SqlitePool};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::user::Membership;

/// The organization selected for a request plus every role the user
/// holds in it.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ActiveContext {
    pub organization_id: Uuid,
    pub organization_name: String,
    pub roles: Vec<String>,
}

/// All (organization, role) rows for a user, ordered by organization
/// name so the no-preference fallback is deterministic.
pub async fn memberships(pool: &SqlitePool, user_id: Uuid) -> AppResult<Vec<Membership>> {
    let rows = sqlx::query(
        r#"
        SELECT om.organization_id, o.name AS organization_name, om.role
        FROM organization_members om
        INNER JOIN organizations o ON o.id = om.organization_id
        WHERE om.user_id = ?
        ORDER BY o.name ASC, om.role ASC
        "#,
    )
    .bind(user_id.to_string())
    .fetch_all(pool)
    .await?;

    let mut result = Vec::with_capacity(rows.len());
    for row in rows {
        let raw_id: String = row
            .try_get("organization_id")
            .map_err(|err| AppError::internal(format!("missing organization_id: {err}")))?;
        let organization_id = Uuid::parse_str(&raw_id)
            .map_err(|err| AppError::internal(format!("invalid organization id: {err}")))?;
        result.push(Membership {
            organization_id,
            organization_name: row
                .try_get("organization_name")
                .map_err(|err| AppError::internal(format!("missing organization_name: {err}")))?,
            role: row
                .try_get("role")
                .map_err(|err| AppError::internal(format!("missing role: {err}")))?,
        });
    }

    Ok(result)
}

/// Resolves the active organization and the effective role set a user
/// holds in it.
///
/// The preferred organization is honored only when the user belongs to
/// it; otherwise the first membership by organization name is selected.
/// A user with no memberships cannot act anywhere and is rejected.
///
/// Evaluated fresh on every privileged request.
pub async fn resolve_active_context(
    pool: &SqlitePool,
    user_id: Uuid,
    preferred_org: Option<Uuid>,
) -> AppResult<ActiveContext> {
    let all = memberships(pool, user_id).await?;

    if all.is_empty() {
        return Err(AppError::forbidden("user does not belong to any organization"));
    }

    let selected = preferred_org
        .and_then(|preferred| all.iter().find(|m| m.organization_id == preferred))
        .unwrap_or(&all[0]);

    let organization_id = selected.organization_id;
    let organization_name = selected.organization_name.clone();
    let roles = all
        .iter()
        .filter(|m| m.organization_id == organization_id)
        .map(|m| m.role.clone())
        .collect();

    Ok(ActiveContext {
        organization_id,
        organization_name,
        roles,
    })
}

/// Resolves the caller's context for a request that targets a student in
/// `required_org`: the caller's explicit preference wins, otherwise the
/// student's organization is the natural target. Membership of the
/// resolved organization must match the student's.
pub async fn require_context_in_org(
    pool: &SqlitePool,
    user_id: Uuid,
    preferred_org: Option<Uuid>,
    required_org: Uuid,
) -> AppResult<ActiveContext> {
    let context =
        resolve_active_context(pool, user_id, preferred_org.or(Some(required_org))).await?;

    if context.organization_id != required_org {
        return Err(AppError::forbidden(
            "no membership in the student's organization",
        ));
    }

    Ok(context)
}
