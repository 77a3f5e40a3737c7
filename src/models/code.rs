use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::{Loggable, Severity};
use crate::models::student::StudentSummary;
use crate::models::user::UserSummary;

/// How a pickup code came to exist.
///
/// `Synthesized` rows are written by the manual-override path: they are
/// born consumed with `expires_at == created_at` and never count as
/// active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CodeOrigin {
    Issued,
    Synthesized,
}

impl CodeOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeOrigin::Issued => "issued",
            CodeOrigin::Synthesized => "synthesized",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "issued" => Ok(CodeOrigin::Issued),
            "synthesized" => Ok(CodeOrigin::Synthesized),
            other => Err(AppError::internal(format!("unknown code origin {other:?}"))),
        }
    }
}

/// The single-use pickup credential.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PickupCode {
    pub id: Uuid,
    /// Fixed-width, zero-padded numeric value; unique across every code
    /// ever created.
    pub code: String,
    pub student_id: Uuid,
    pub issued_by: Uuid,
    pub reason_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegate_name: Option<String>,
    pub origin: CodeOrigin,
    pub consumed: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl PickupCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.consumed && !self.is_expired(now)
    }
}

impl Loggable for PickupCode {
    fn entity_type() -> &'static str {
        "pickup_code"
    }

    fn subject_id(&self) -> Uuid {
        self.student_id
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCodeRequest {
    pub student_id: Uuid,
    pub reason_id: Uuid,
    #[schema(example = "Dentist appointment")]
    pub custom_reason: Option<String>,
    /// Named third party authorized to retrieve in the guardian's place.
    pub delegate_name: Option<String>,
    /// Preferred active organization for this request.
    pub organization_id: Option<Uuid>,
}

/// Denormalized view a gate operator sees when inspecting a code.
#[derive(Debug, Serialize, ToSchema)]
pub struct CodeDetails {
    pub code: String,
    pub origin: CodeOrigin,
    pub student: StudentSummary,
    pub issued_by: UserSummary,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegate_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_expired: bool,
}
