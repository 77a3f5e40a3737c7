//! Authorization - role resolution and policy evaluation
//!
//! Roles are organization-scoped: a user holds zero or more
//! (organization, role) pairs, and every privileged request is evaluated
//! against the roles held in one resolved active organization. Nothing
//! here is cached across requests; membership changes take effect on the
//! next call.

mod evaluator;
mod principal;
pub mod resolver;

pub use evaluator::{DefaultPolicyEvaluator, PolicyEvaluator};
pub use principal::Principal;

/// Well-known role names
pub mod roles {
    pub const ADMIN: &str = "admin";
    pub const OPERATOR: &str = "operator";
    pub const GUARDIAN: &str = "guardian";
}

/// Actions gated by the policy evaluator
pub mod actions {
    pub const CODE_CREATE: &str = "code.create";
    pub const CODE_INSPECT: &str = "code.inspect";
    pub const CODE_CONSUME: &str = "code.consume";
    pub const WITHDRAWAL_MANUAL: &str = "withdrawal.manual";
    pub const WITHDRAWAL_LIST: &str = "withdrawal.list";
}

/// Tier order used when a single role label must be chosen at the
/// authentication boundary. Lowest index wins.
pub const ROLE_PRIORITY: &[&str] = &[roles::ADMIN, roles::OPERATOR, roles::GUARDIAN];

/// Picks the highest-priority label out of a set of held roles.
pub fn primary_role<'a, I>(held: I) -> Option<&'static str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<usize> = None;
    for role in held {
        if let Some(index) = ROLE_PRIORITY.iter().position(|known| *known == role) {
            if best.map_or(true, |current| index < current) {
                best = Some(index);
            }
        }
    }
    best.map(|index| ROLE_PRIORITY[index])
}
