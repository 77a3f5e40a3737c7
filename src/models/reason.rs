use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Catalogue entry for why a student is being withdrawn.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Reason {
    pub id: Uuid,
    pub label: String,
    pub created_at: DateTime<Utc>,
}
