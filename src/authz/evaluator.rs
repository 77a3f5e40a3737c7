use async_trait::async_trait;

use super::principal::Principal;
use super::{actions, roles};

/// Policy evaluator trait for pluggable authorization logic
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    /// Check if the principal may perform an action in their active
    /// organization.
    async fn can(&self, principal: &Principal, action: &str) -> bool;
}

/// Default policy with the standard tier rules
///
/// Evaluation order:
/// 1. admin role -> allow
/// 2. gate actions (inspect/consume/manual/list) -> operator role
/// 3. code creation -> guardian role
/// 4. deny
///
/// Ownership checks (guardian-of-student) are not role questions and stay
/// with the callers.
#[derive(Debug, Clone, Default)]
pub struct DefaultPolicyEvaluator;

impl DefaultPolicyEvaluator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PolicyEvaluator for DefaultPolicyEvaluator {
    async fn can(&self, principal: &Principal, action: &str) -> bool {
        if principal.has_role(roles::ADMIN) {
            tracing::debug!(
                user_id = %principal.user_id,
                action = %action,
                "admin bypass"
            );
            return true;
        }

        let allowed = match action {
            actions::CODE_CREATE => principal.has_role(roles::GUARDIAN),
            actions::CODE_INSPECT
            | actions::CODE_CONSUME
            | actions::WITHDRAWAL_MANUAL
            | actions::WITHDRAWAL_LIST => principal.has_role(roles::OPERATOR),
            _ => false,
        };

        if !allowed {
            tracing::debug!(
                user_id = %principal.user_id,
                organization_id = %principal.organization_id,
                action = %action,
                "action denied"
            );
        }

        allowed
    }
}
