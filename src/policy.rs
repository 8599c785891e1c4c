use crate::{auth::AuthError, error::ApiError, models::Principal};

/// Access level a route (or a mediator operation) demands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Authenticated,
    AdminOnly,
}

/// What the action is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<'a> {
    /// A collection, or a resource that does not exist yet.
    Collection,
    /// A mutation of a stored resource and the owner id read from it.
    Existing { owner_id: Option<&'a str> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Unauthenticated,
    AdminRequired,
    NotOwner,
}

impl DenyReason {
    pub fn message(&self) -> &'static str {
        match self {
            DenyReason::Unauthenticated => "unauthenticated",
            DenyReason::AdminRequired => "forbidden: admin required",
            DenyReason::NotOwner => "forbidden: not the owner of this resource",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn into_result(self) -> Result<(), ApiError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(reason.into()),
        }
    }
}

impl From<DenyReason> for ApiError {
    fn from(reason: DenyReason) -> Self {
        match reason {
            DenyReason::Unauthenticated => ApiError::Auth(AuthError::Missing),
            other => ApiError::forbidden(other.message()),
        }
    }
}

/// authorize
///
/// Rules, first match wins:
/// 1. a protected route without a principal is denied as unauthenticated;
/// 2. an admin-only route needs an admin role;
/// 3. a mutation of an existing resource needs the owner or an admin.
///    A resource without an owner can only be mutated by admins.
pub fn authorize(principal: Option<&Principal>, access: Access, target: Target<'_>) -> Decision {
    let Some(principal) = principal else {
        return match (access, target) {
            (Access::Public, Target::Collection) => Decision::Allow,
            _ => Decision::Deny(DenyReason::Unauthenticated),
        };
    };

    if access == Access::AdminOnly && !principal.is_admin() {
        return Decision::Deny(DenyReason::AdminRequired);
    }

    if let Target::Existing { owner_id } = target {
        let is_owner = owner_id.is_some_and(|owner| owner == principal.id.to_string());
        if !is_owner && !principal.is_admin() {
            return Decision::Deny(DenyReason::NotOwner);
        }
    }

    Decision::Allow
}
