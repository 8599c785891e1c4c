use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{DecodingKey, Validation, decode, errors::ErrorKind};
use parking_lot::Mutex;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    models::{Principal, Role, Session},
};

/// IdentityError
///
/// `Rejected` is the provider saying no (bad credentials, expired token,
/// duplicate email). `Unavailable` means the provider could not answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("identity provider rejected the request: {0}")]
    Rejected(String),
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// IdentityUser
///
/// A user as the identity provider describes it. `role` and `permissions`
/// come from the user metadata written at signup.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityUser {
    pub id: Uuid,
    pub email: Option<String>,
    pub role: Role,
    pub permissions: Vec<String>,
}

impl IdentityUser {
    fn from_metadata(id: Uuid, email: Option<String>, metadata: &Value) -> Self {
        let permissions = metadata
            .get("permissions")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|p| p.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            id,
            email,
            role: Role::from_metadata(metadata.get("role").and_then(Value::as_str)),
            permissions,
        }
    }

    pub fn into_principal(self) -> Principal {
        let mut principal = Principal::new(self.id, self.email, self.role);
        principal.permissions = self.permissions.into_iter().collect();
        principal
    }
}

/// IdentityProvider
///
/// The external identity platform. Password hashing, token issuance and
/// session revocation all happen behind this trait.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Creates a confirmed user carrying `metadata` (role, full name, permissions).
    async fn create_user(
        &self,
        email: &str,
        password: &str,
        metadata: Value,
    ) -> Result<IdentityUser, IdentityError>;

    async fn delete_user(&self, id: Uuid) -> Result<(), IdentityError>;

    async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(IdentityUser, Session), IdentityError>;

    async fn get_user_from_token(&self, access_token: &str) -> Result<IdentityUser, IdentityError>;

    async fn refresh_session(
        &self,
        refresh_token: &str,
    ) -> Result<(IdentityUser, Session), IdentityError>;

    async fn update_password(&self, id: Uuid, new_password: &str) -> Result<(), IdentityError>;

    /// Revokes every session of the token's owner.
    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError>;
}

pub type IdentityState = Arc<dyn IdentityProvider>;

// --- Supabase GoTrue ---

#[derive(Debug, Deserialize)]
struct GoTrueUser {
    id: Uuid,
    email: Option<String>,
    #[serde(default)]
    user_metadata: Value,
}

impl From<GoTrueUser> for IdentityUser {
    fn from(user: GoTrueUser) -> Self {
        IdentityUser::from_metadata(user.id, user.email, &user.user_metadata)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: i64,
    #[serde(default)]
    expires_at: Option<i64>,
    user: GoTrueUser,
}

impl TokenResponse {
    fn into_parts(self) -> (IdentityUser, Session) {
        let expires_at = self
            .expires_at
            .unwrap_or_else(|| Utc::now().timestamp() + self.expires_in);
        let session = Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_in: self.expires_in,
            expires_at,
        };
        (self.user.into(), session)
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[allow(dead_code)]
    sub: String,
}

/// SupabaseIdentity
///
/// GoTrue REST client. Admin endpoints authenticate with the service role
/// key; end-user endpoints with the anon key.
#[derive(Clone)]
pub struct SupabaseIdentity {
    http: Client,
    auth_url: String,
    anon_key: String,
    service_key: String,
    jwt_secret: Option<String>,
}

impl SupabaseIdentity {
    pub fn new(config: &AppConfig) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            http,
            auth_url: format!("{}/auth/v1", config.supabase_url),
            anon_key: config.supabase_anon_key.clone(),
            service_key: config.supabase_service_key.clone(),
            jwt_secret: config.jwt_secret.clone(),
        })
    }

    fn admin(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    fn public(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("apikey", &self.anon_key)
    }

    /// Local signature and expiry check. Skipped when no secret is configured.
    fn precheck(&self, token: &str) -> Result<(), IdentityError> {
        let Some(secret) = &self.jwt_secret else {
            return Ok(());
        };

        let mut validation = Validation::default();
        validation.validate_exp = true;
        validation.set_audience(&["authenticated"]);

        decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
            .map(|_| ())
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => IdentityError::Rejected("token expired".to_string()),
                _ => IdentityError::Rejected(format!("invalid token: {e}")),
            })
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, IdentityError> {
        let response = Self::dispatch(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| IdentityError::Unavailable(format!("malformed provider response: {e}")))
    }

    async fn send_empty(&self, request: RequestBuilder) -> Result<(), IdentityError> {
        Self::dispatch(request).await.map(|_| ())
    }

    async fn dispatch(request: RequestBuilder) -> Result<reqwest::Response, IdentityError> {
        let response = request
            .send()
            .await
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        let reason = ["msg", "error_description", "message", "error"]
            .iter()
            .find_map(|key| body.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| status.to_string());

        if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
            Err(IdentityError::Rejected(reason))
        } else {
            Err(IdentityError::Unavailable(reason))
        }
    }
}

#[async_trait]
impl IdentityProvider for SupabaseIdentity {
    async fn create_user(
        &self,
        email: &str,
        password: &str,
        metadata: Value,
    ) -> Result<IdentityUser, IdentityError> {
        let request = self
            .admin(self.http.post(format!("{}/admin/users", self.auth_url)))
            .json(&json!({
                "email": email,
                "password": password,
                "email_confirm": true,
                "user_metadata": metadata,
            }));
        let user: GoTrueUser = self.send_json(request).await?;
        tracing::info!(user_id = %user.id, "identity created");
        Ok(user.into())
    }

    async fn delete_user(&self, id: Uuid) -> Result<(), IdentityError> {
        let request = self.admin(self.http.delete(format!("{}/admin/users/{}", self.auth_url, id)));
        self.send_empty(request).await
    }

    async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(IdentityUser, Session), IdentityError> {
        let request = self
            .public(self.http.post(format!("{}/token?grant_type=password", self.auth_url)))
            .json(&json!({ "email": email, "password": password }));
        let tokens: TokenResponse = self.send_json(request).await?;
        Ok(tokens.into_parts())
    }

    async fn get_user_from_token(&self, access_token: &str) -> Result<IdentityUser, IdentityError> {
        self.precheck(access_token)?;
        let request = self
            .public(self.http.get(format!("{}/user", self.auth_url)))
            .bearer_auth(access_token);
        let user: GoTrueUser = self.send_json(request).await?;
        Ok(user.into())
    }

    async fn refresh_session(
        &self,
        refresh_token: &str,
    ) -> Result<(IdentityUser, Session), IdentityError> {
        let request = self
            .public(self.http.post(format!("{}/token?grant_type=refresh_token", self.auth_url)))
            .json(&json!({ "refresh_token": refresh_token }));
        let tokens: TokenResponse = self.send_json(request).await?;
        Ok(tokens.into_parts())
    }

    async fn update_password(&self, id: Uuid, new_password: &str) -> Result<(), IdentityError> {
        let request = self
            .admin(self.http.put(format!("{}/admin/users/{}", self.auth_url, id)))
            .json(&json!({ "password": new_password }));
        let _: Value = self.send_json(request).await?;
        Ok(())
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError> {
        let request = self
            .public(self.http.post(format!("{}/logout?scope=global", self.auth_url)))
            .bearer_auth(access_token);
        self.send_empty(request).await
    }
}

// --- In-memory double ---

#[derive(Debug, Clone)]
struct MockAccount {
    email: String,
    password: String,
    metadata: Value,
}

#[derive(Debug, Default)]
struct MockIdentityInner {
    users: HashMap<Uuid, MockAccount>,
    access_tokens: HashMap<String, Uuid>,
    refresh_tokens: HashMap<String, Uuid>,
    delete_calls: Vec<Uuid>,
}

/// MockIdentityProvider
///
/// In-memory identity provider used by the test suite. Tokens are opaque
/// random strings; every call is recorded so tests can assert on provider
/// side effects.
#[derive(Debug, Default)]
pub struct MockIdentityProvider {
    inner: Mutex<MockIdentityInner>,
    fail_deletes: bool,
    unavailable: bool,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `delete_user` call fails, so compensation cannot succeed.
    pub fn with_failing_deletes(mut self) -> Self {
        self.fail_deletes = true;
        self
    }

    /// Every call fails as if the provider were unreachable.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    /// Registers a user and returns its id plus a live access token.
    pub fn with_user(&self, email: &str, password: &str, role: Role) -> (Uuid, String) {
        let id = Uuid::new_v4();
        let mut inner = self.inner.lock();
        inner.users.insert(
            id,
            MockAccount {
                email: email.to_string(),
                password: password.to_string(),
                metadata: json!({ "role": role.as_str() }),
            },
        );
        let (access, _) = Self::issue(&mut inner, id);
        (id, access)
    }

    pub fn user_exists(&self, id: Uuid) -> bool {
        self.inner.lock().users.contains_key(&id)
    }

    pub fn find_by_email(&self, email: &str) -> Option<Uuid> {
        self.inner
            .lock()
            .users
            .iter()
            .find(|(_, account)| account.email == email)
            .map(|(id, _)| *id)
    }

    pub fn password_of(&self, id: Uuid) -> Option<String> {
        self.inner.lock().users.get(&id).map(|a| a.password.clone())
    }

    pub fn delete_calls(&self) -> Vec<Uuid> {
        self.inner.lock().delete_calls.clone()
    }

    pub fn is_token_live(&self, token: &str) -> bool {
        self.inner.lock().access_tokens.contains_key(token)
    }

    fn issue(inner: &mut MockIdentityInner, id: Uuid) -> (String, Session) {
        let access = format!("mock-access-{}", Uuid::new_v4());
        let refresh = format!("mock-refresh-{}", Uuid::new_v4());
        inner.access_tokens.insert(access.clone(), id);
        inner.refresh_tokens.insert(refresh.clone(), id);
        let session = Session {
            access_token: access.clone(),
            refresh_token: refresh,
            expires_in: 3600,
            expires_at: Utc::now().timestamp() + 3600,
        };
        (access, session)
    }

    fn check_available(&self) -> Result<(), IdentityError> {
        if self.unavailable {
            return Err(IdentityError::Unavailable("mock provider offline".to_string()));
        }
        Ok(())
    }

    fn user_of(inner: &MockIdentityInner, id: Uuid) -> Result<IdentityUser, IdentityError> {
        inner
            .users
            .get(&id)
            .map(|a| IdentityUser::from_metadata(id, Some(a.email.clone()), &a.metadata))
            .ok_or_else(|| IdentityError::Rejected("User not found".to_string()))
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn create_user(
        &self,
        email: &str,
        password: &str,
        metadata: Value,
    ) -> Result<IdentityUser, IdentityError> {
        self.check_available()?;
        let mut inner = self.inner.lock();
        if inner.users.values().any(|a| a.email == email) {
            return Err(IdentityError::Rejected("User already registered".to_string()));
        }
        let id = Uuid::new_v4();
        inner.users.insert(
            id,
            MockAccount {
                email: email.to_string(),
                password: password.to_string(),
                metadata,
            },
        );
        Self::user_of(&inner, id)
    }

    async fn delete_user(&self, id: Uuid) -> Result<(), IdentityError> {
        let mut inner = self.inner.lock();
        inner.delete_calls.push(id);
        if self.unavailable || self.fail_deletes {
            return Err(IdentityError::Unavailable("mock delete failure".to_string()));
        }
        if inner.users.remove(&id).is_none() {
            return Err(IdentityError::Rejected("User not found".to_string()));
        }
        inner.access_tokens.retain(|_, owner| *owner != id);
        inner.refresh_tokens.retain(|_, owner| *owner != id);
        Ok(())
    }

    async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(IdentityUser, Session), IdentityError> {
        self.check_available()?;
        let mut inner = self.inner.lock();
        let id = inner
            .users
            .iter()
            .find(|(_, a)| a.email == email && a.password == password)
            .map(|(id, _)| *id)
            .ok_or_else(|| IdentityError::Rejected("Invalid login credentials".to_string()))?;
        let (_, session) = Self::issue(&mut inner, id);
        Ok((Self::user_of(&inner, id)?, session))
    }

    async fn get_user_from_token(&self, access_token: &str) -> Result<IdentityUser, IdentityError> {
        self.check_available()?;
        let inner = self.inner.lock();
        let id = inner
            .access_tokens
            .get(access_token)
            .copied()
            .ok_or_else(|| IdentityError::Rejected("invalid JWT".to_string()))?;
        Self::user_of(&inner, id)
    }

    async fn refresh_session(
        &self,
        refresh_token: &str,
    ) -> Result<(IdentityUser, Session), IdentityError> {
        self.check_available()?;
        let mut inner = self.inner.lock();
        let id = inner
            .refresh_tokens
            .remove(refresh_token)
            .ok_or_else(|| IdentityError::Rejected("Invalid Refresh Token".to_string()))?;
        let (_, session) = Self::issue(&mut inner, id);
        Ok((Self::user_of(&inner, id)?, session))
    }

    async fn update_password(&self, id: Uuid, new_password: &str) -> Result<(), IdentityError> {
        self.check_available()?;
        let mut inner = self.inner.lock();
        let account = inner
            .users
            .get_mut(&id)
            .ok_or_else(|| IdentityError::Rejected("User not found".to_string()))?;
        account.password = new_password.to_string();
        Ok(())
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError> {
        self.check_available()?;
        let mut inner = self.inner.lock();
        let id = inner
            .access_tokens
            .get(access_token)
            .copied()
            .ok_or_else(|| IdentityError::Rejected("invalid JWT".to_string()))?;
        inner.access_tokens.retain(|_, owner| *owner != id);
        inner.refresh_tokens.retain(|_, owner| *owner != id);
        Ok(())
    }
}
