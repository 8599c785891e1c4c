use std::fmt::Display;

use serde::Serialize;
use serde_json::{Value, json};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthError,
    error::{ApiError, ApiResult},
    identity::{IdentityError, IdentityState, IdentityUser},
    mediator::ResourceMediator,
    models::{AdminProfile, Principal, Record, Resource, Role, Session},
    policy::{Access, Target, authorize},
    repository::RepositoryState,
    resources::ResourceKind,
    validation::{
        validate_admin_signup, validate_change_password, validate_login, validate_refresh,
        validate_signup,
    },
};

/// Result of a user signup. The session is absent when the automatic
/// sign-in after account creation failed; the account itself exists.
#[derive(Debug, Clone)]
pub struct SignupOutcome {
    pub user: Resource,
    pub session: Option<Session>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AdminAccount {
    pub admin_id: Uuid,
    pub email: String,
    pub permissions: Vec<String>,
}

/// AccountService
///
/// Identity flows. Multi-step writes (identity, then profile row) are
/// compensated: when the profile insert fails the identity is deleted again.
#[derive(Clone)]
pub struct AccountService {
    identity: IdentityState,
    repo: RepositoryState,
    mediator: ResourceMediator,
}

fn user_table() -> &'static str {
    ResourceKind::UserProfile.spec().table
}

/// Admin rows are written and read only by the account flows.
const ADMIN_TABLE: &str = "admin_auth";

/// Maps provider failures on account creation: a rejection (duplicate email,
/// weak password) is the client's fault, anything else is upstream.
fn creation_failure(e: IdentityError) -> ApiError {
    match e {
        IdentityError::Rejected(reason) => ApiError::validation(reason),
        unavailable => ApiError::provider("Identity provider unavailable", unavailable),
    }
}

impl AccountService {
    pub fn new(identity: IdentityState, repo: RepositoryState, mediator: ResourceMediator) -> Self {
        Self {
            identity,
            repo,
            mediator,
        }
    }

    /// signup_user
    ///
    /// 1. create the identity (role `user`);
    /// 2. insert the `user_auth` profile, compensating on failure;
    /// 3. sign in to hand back a session.
    pub async fn signup_user(&self, body: Value) -> ApiResult<SignupOutcome> {
        let request = validate_signup(body)?;

        let metadata = json!({
            "role": Role::User.as_str(),
            "full_name": request.full_name,
            "phone": request.phone,
        });
        let created = self
            .identity
            .create_user(&request.email, &request.password, metadata)
            .await
            .map_err(creation_failure)?;

        let mut profile = Record::new();
        profile.insert("id".to_string(), json!(created.id));
        profile.insert("email".to_string(), json!(request.email));
        profile.insert("full_name".to_string(), json!(request.full_name));
        profile.insert("phone".to_string(), json!(request.phone));
        profile.insert("role".to_string(), json!(Role::User.as_str()));
        profile.insert("is_active".to_string(), json!(true));

        let user = match self.repo.insert(user_table(), vec![profile]).await {
            Ok(rows) => match rows.into_iter().next() {
                Some(row) => row,
                None => {
                    return Err(self
                        .compensate(created.id, "Failed to create user profile", "no row returned")
                        .await);
                }
            },
            Err(e) => {
                return Err(self
                    .compensate(created.id, "Failed to create user profile", e)
                    .await);
            }
        };

        let session = match self.identity.sign_in(&request.email, &request.password).await {
            Ok((_, session)) => Some(session),
            Err(e) => {
                tracing::warn!(user_id = %created.id, error = %e, "sign-in after signup failed");
                None
            }
        };

        tracing::info!(user_id = %created.id, "user signed up");
        Ok(SignupOutcome { user, session })
    }

    /// signup_admin
    ///
    /// Admin accounts are created by existing admins only.
    pub async fn signup_admin(&self, caller: &Principal, body: Value) -> ApiResult<AdminAccount> {
        authorize(Some(caller), Access::AdminOnly, Target::Collection).into_result()?;
        let request = validate_admin_signup(body)?;

        let metadata = json!({
            "role": Role::Admin.as_str(),
            "permissions": request.permissions,
        });
        let created = self
            .identity
            .create_user(&request.email, &request.password, metadata)
            .await
            .map_err(creation_failure)?;

        let mut profile = Record::new();
        profile.insert("id".to_string(), json!(created.id));
        profile.insert("email".to_string(), json!(request.email));
        profile.insert("role".to_string(), json!(Role::Admin.as_str()));
        profile.insert("permissions".to_string(), json!(request.permissions));

        if let Err(e) = self.repo.insert(ADMIN_TABLE, vec![profile]).await {
            return Err(self
                .compensate(created.id, "Error saving admin data", e)
                .await);
        }

        tracing::info!(admin_id = %created.id, created_by = %caller.id, "admin account created");
        Ok(AdminAccount {
            admin_id: created.id,
            email: request.email,
            permissions: request.permissions,
        })
    }

    /// Deletes an identity whose profile could not be stored. When the
    /// delete fails too, the returned error says so.
    async fn compensate(&self, identity_id: Uuid, message: &str, cause: impl Display) -> ApiError {
        tracing::warn!(%identity_id, error = %cause, "profile insert failed, rolling back identity");

        match self.identity.delete_user(identity_id).await {
            Ok(()) => {
                tracing::info!(%identity_id, "identity rolled back");
                ApiError::provider(message, cause)
            }
            Err(rollback) => {
                tracing::error!(
                    %identity_id,
                    error = %rollback,
                    "rollback failed; identity exists without a profile"
                );
                ApiError::internal(
                    format!("{message}; rollback of identity {identity_id} also failed"),
                    format!("{cause}; rollback: {rollback}"),
                )
            }
        }
    }

    /// login_user
    ///
    /// A missing or deactivated profile blocks the login with 403.
    pub async fn login_user(&self, body: Value) -> ApiResult<(Resource, Session)> {
        let request = validate_login(body)?;
        let (user, session) = self.sign_in(&request.email, &request.password).await?;

        let profile = self
            .repo
            .find(user_table(), &user.id.to_string())
            .await
            .map_err(|e| ApiError::provider("Failed to load user profile", e))?;

        match profile {
            Some(profile) if profile.get("is_active") != Some(&Value::Bool(false)) => {
                Ok((profile, session))
            }
            _ => {
                tracing::warn!(user_id = %user.id, "login refused for disabled account");
                Err(ApiError::forbidden("Account disabled"))
            }
        }
    }

    /// login_admin
    ///
    /// Valid credentials are not enough: the `admin_auth` row must grant an
    /// admin role.
    pub async fn login_admin(&self, body: Value) -> ApiResult<(AdminProfile, Session)> {
        let request = validate_login(body)?;
        let (user, session) = self.sign_in(&request.email, &request.password).await?;

        let admin = self
            .repo
            .find(ADMIN_TABLE, &user.id.to_string())
            .await
            .map_err(|e| ApiError::provider("Failed to load admin profile", e))?
            .map(|row| AdminProfile::from_resource(&row))
            .filter(|admin| Role::from_metadata(Some(admin.role.as_str())).is_admin());

        match admin {
            Some(admin) => Ok((admin, session)),
            None => {
                tracing::warn!(user_id = %user.id, "admin login refused");
                Err(ApiError::forbidden("Access denied"))
            }
        }
    }

    async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> ApiResult<(IdentityUser, Session)> {
        self.identity
            .sign_in(email, password)
            .await
            .map_err(|e| match e {
                IdentityError::Rejected(_) => ApiError::Auth(AuthError::BadCredentials),
                unavailable => ApiError::provider("Login failed", unavailable),
            })
    }

    /// Revokes every session of the caller at the provider.
    pub async fn logout(&self, token: &str) -> ApiResult<()> {
        self.identity.sign_out(token).await.map_err(|e| match e {
            IdentityError::Rejected(_) => ApiError::Auth(AuthError::Invalid),
            unavailable => ApiError::provider("Logout failed", unavailable),
        })
    }

    pub async fn me_user(&self, principal: &Principal) -> ApiResult<Resource> {
        self.mediator
            .get(ResourceKind::UserProfile, &principal.id.to_string())
            .await
    }

    pub async fn me_admin(&self, principal: &Principal) -> ApiResult<AdminProfile> {
        let row = self
            .repo
            .find(ADMIN_TABLE, &principal.id.to_string())
            .await
            .map_err(|e| ApiError::provider("Failed to load admin profile", e))?
            .ok_or_else(|| ApiError::forbidden("Not an admin account"))?;
        Ok(AdminProfile::from_resource(&row))
    }

    pub async fn refresh(&self, body: Value) -> ApiResult<Session> {
        let request = validate_refresh(body)?;
        self.identity
            .refresh_session(&request.refresh_token)
            .await
            .map(|(_, session)| session)
            .map_err(|e| match e {
                IdentityError::Rejected(_) => ApiError::Auth(AuthError::BadRefreshToken),
                unavailable => ApiError::provider("Token refresh failed", unavailable),
            })
    }

    /// Only `full_name` and `phone` are accepted; the row is the caller's own.
    pub async fn update_profile(&self, principal: &Principal, body: Value) -> ApiResult<Resource> {
        self.mediator
            .update(
                ResourceKind::UserProfile,
                Some(principal),
                &principal.id.to_string(),
                body,
            )
            .await
    }

    pub async fn change_password(&self, principal: &Principal, body: Value) -> ApiResult<()> {
        let request = validate_change_password(body)?;
        self.identity
            .update_password(principal.id, &request.new_password)
            .await
            .map_err(|e| match e {
                IdentityError::Rejected(reason) => ApiError::validation(reason),
                unavailable => ApiError::provider("Password update failed", unavailable),
            })?;
        tracing::info!(user_id = %principal.id, "password changed");
        Ok(())
    }
}
