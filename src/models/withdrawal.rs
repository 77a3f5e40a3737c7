use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::{Loggable, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Denied,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approved => "approved",
            Decision::Denied => "denied",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "approved" => Ok(Decision::Approved),
            "denied" => Ok(Decision::Denied),
            other => Err(AppError::internal(format!("unknown decision {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Consumption of a guardian-issued pickup code.
    Code,
    /// Operator-initiated manual override.
    Manual,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Code => "code",
            Method::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "code" => Ok(Method::Code),
            "manual" => Ok(Method::Manual),
            other => Err(AppError::internal(format!("unknown method {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RetrieverKind {
    Guardian,
    Delegate,
    Other,
}

impl RetrieverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrieverKind::Guardian => "guardian",
            RetrieverKind::Delegate => "delegate",
            RetrieverKind::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "guardian" => Ok(RetrieverKind::Guardian),
            "delegate" => Ok(RetrieverKind::Delegate),
            "other" => Ok(RetrieverKind::Other),
            other => Err(AppError::internal(format!("unknown retriever kind {other:?}"))),
        }
    }
}

/// Who is physically taking the student.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RetrieverInput {
    pub kind: RetrieverKind,
    pub name: Option<String>,
    /// Stated relationship to the student; required when kind is `other`.
    pub relationship: Option<String>,
}

/// Immutable ledger entry for one completed authorization flow.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WithdrawalRecord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub approved_by: Uuid,
    pub reason_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_reason: Option<String>,
    pub method: Method,
    pub decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retriever_kind: Option<RetrieverKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retriever_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retriever_relationship: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Loggable for WithdrawalRecord {
    fn entity_type() -> &'static str {
        "withdrawal"
    }

    fn subject_id(&self) -> Uuid {
        self.student_id
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConsumeCodeRequest {
    pub decision: Decision,
    pub notes: Option<String>,
    /// Required for approvals; must be absent for denials.
    pub retriever: Option<RetrieverInput>,
    pub organization_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ManualOverrideRequest {
    pub student_id: Uuid,
    pub reason_id: Uuid,
    pub custom_reason: Option<String>,
    pub decision: Decision,
    pub notes: Option<String>,
    pub retriever: Option<RetrieverInput>,
    pub organization_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ManualOverrideResponse {
    #[serde(flatten)]
    pub record: WithdrawalRecord,
    /// True when an active guardian-issued code existed and was closed
    /// out by this override.
    pub had_active_code: bool,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawalListQuery {
    pub student_id: Option<Uuid>,
    pub decision: Option<Decision>,
    pub method: Option<Method>,
    pub approved_by: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub organization_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WithdrawalListResponse {
    pub items: Vec<WithdrawalRecord>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}
