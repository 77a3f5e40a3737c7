use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

/// A minor enrolled with an organization. Maintained by external roster
/// tooling; read-only here.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Student {
    pub id: Uuid,
    /// Durable external identifier (national-ID equivalent).
    pub external_id: String,
    pub name: String,
    pub organization_id: Uuid,
    pub group_name: String,
    pub guardian_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DbStudent {
    pub id: Uuid,
    pub external_id: String,
    pub name: String,
    pub organization_id: Uuid,
    pub group_name: String,
    pub guardian_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbStudent> for Student {
    type Error = AppError;

    fn try_from(value: DbStudent) -> Result<Self, Self::Error> {
        Ok(Student {
            id: value.id,
            external_id: value.external_id,
            name: value.name,
            organization_id: value.organization_id,
            group_name: value.group_name,
            guardian_id: value.guardian_id,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

/// What a gate operator sees when inspecting a pickup code.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StudentSummary {
    pub id: Uuid,
    pub external_id: String,
    pub name: String,
    pub group_name: String,
}

impl From<&Student> for StudentSummary {
    fn from(student: &Student) -> Self {
        StudentSummary {
            id: student.id,
            external_id: student.external_id.clone(),
            name: student.name.clone(),
            group_name: student.group_name.clone(),
        }
    }
}
