use crate::domain::session::Identity;
use crate::domain::user::Role;
use crate::error::{Result, VendingError};

/// Side-effect free authorization checks composed in front of mutations.
pub struct AccessPolicy;

impl AccessPolicy {
    pub fn require_role(identity: &Identity, role: Role) -> Result<()> {
        if identity.role != role {
            return Err(VendingError::Forbidden(format!(
                "operation requires the {role} role"
            )));
        }
        Ok(())
    }

    pub fn require_ownership(identity: &Identity, owner: &str) -> Result<()> {
        if identity.username != owner {
            return Err(VendingError::Forbidden(
                "not the owner of this resource".to_string(),
            ));
        }
        Ok(())
    }
}
