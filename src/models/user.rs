use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DbUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl crate::events::Loggable for User {
    fn entity_type() -> &'static str {
        "user"
    }

    fn subject_id(&self) -> Uuid {
        self.id
    }
}

impl TryFrom<DbUser> for User {
    type Error = AppError;

    fn try_from(value: DbUser) -> Result<Self, Self::Error> {
        Ok(User {
            id: value.id,
            name: value.name,
            email: value.email,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

/// Compact identity used when denormalizing issuers/approvers for display.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "ada@example.com")]
    pub email: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
    /// Single label chosen from all held roles for display at the
    /// authentication boundary; per-request authorization always works
    /// from the full effective role set instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_role: Option<String>,
}

/// One (organization, role) membership row.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Membership {
    pub organization_id: Uuid,
    pub organization_name: String,
    pub role: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub user: User,
    pub memberships: Vec<Membership>,
    /// Resolved active organization and effective roles, when the user
    /// belongs to at least one organization.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<crate::authz::resolver::ActiveContext>,
}
