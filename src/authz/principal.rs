use std::collections::HashSet;

use uuid::Uuid;

use super::resolver::ActiveContext;

/// The authenticated caller together with the roles they hold in the
/// resolved active organization.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub roles: HashSet<String>,
}

impl Principal {
    pub fn from_context(user_id: Uuid, context: &ActiveContext) -> Self {
        Self {
            user_id,
            organization_id: context.organization_id,
            roles: context.roles.iter().cloned().collect(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}
