use serde_json::json;
use utoipa::OpenApi;

use crate::authz::resolver::ActiveContext;
use crate::models;
use crate::routes::health::HealthResponse;

#[derive(OpenApi)]
#[openapi(
    components(
        schemas(
            models::user::User,
            models::user::UserSummary,
            models::user::LoginRequest,
            models::user::AuthResponse,
            models::user::Membership,
            models::user::MeResponse,
            models::student::StudentSummary,
            models::reason::Reason,
            models::code::CodeOrigin,
            models::code::PickupCode,
            models::code::CreateCodeRequest,
            models::code::CodeDetails,
            models::withdrawal::Decision,
            models::withdrawal::Method,
            models::withdrawal::RetrieverKind,
            models::withdrawal::RetrieverInput,
            models::withdrawal::WithdrawalRecord,
            models::withdrawal::ConsumeCodeRequest,
            models::withdrawal::ManualOverrideRequest,
            models::withdrawal::ManualOverrideResponse,
            models::withdrawal::WithdrawalListResponse,
            ActiveContext,
            HealthResponse
        )
    ),
    tags(
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Pickup codes", description = "Issue, inspect and consume pickup codes"),
        (name = "Withdrawals", description = "Withdrawal ledger and manual override"),
        (name = "Health", description = "Service health")
    )
)]
pub struct ApiDoc;

/// Generates the OpenAPI document with the bearer scheme and a local
/// server entry injected, ready for Swagger UI.
pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
    let mut doc = serde_json::to_value(ApiDoc::openapi())?;

    ensure_security_scheme(&mut doc);
    ensure_global_security(&mut doc);
    ensure_servers(&mut doc, port);

    Ok(serde_json::from_value(doc)?)
}

fn ensure_security_scheme(doc: &mut serde_json::Value) {
    if doc.get("components").is_none() {
        doc["components"] = json!({});
    }

    if let Some(components) = doc.get_mut("components").and_then(|c| c.as_object_mut()) {
        let schemes = components
            .entry("securitySchemes")
            .or_insert_with(|| json!({}));
        if let Some(schemes) = schemes.as_object_mut() {
            schemes.insert(
                "bearerAuth".to_string(),
                json!({
                    "type": "http",
                    "scheme": "bearer",
                    "bearerFormat": "JWT"
                }),
            );
        }
    }
}

fn ensure_global_security(doc: &mut serde_json::Value) {
    // login and health stay open via their operation-level (absent)
    // security; everything else requires the bearer scheme.
    if doc.get("security").is_none() {
        doc["security"] = json!([{ "bearerAuth": [] }]);
    }
}

fn ensure_servers(doc: &mut serde_json::Value, port: u16) {
    if doc.get("servers").is_none() {
        doc["servers"] = json!([
            { "url": format!("http://localhost:{}", port) }
        ]);
    }
}
