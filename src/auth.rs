use std::convert::Infallible;

use axum::{
    extract::{FromRef, FromRequestParts, OptionalFromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use thiserror::Error;

use crate::{
    error::ApiError,
    identity::{IdentityError, IdentityState},
    models::Principal,
};

/// AuthError
///
/// Credential failures. Every variant maps to 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Authorization token missing")]
    Missing,
    #[error("Invalid or expired token")]
    Invalid,
    #[error("Invalid email or password")]
    BadCredentials,
    #[error("Invalid refresh token")]
    BadRefreshToken,
}

/// bearer_token
///
/// Extracts the credential from `Authorization: Bearer <token>`. A missing
/// header, another scheme or an empty token are all `Missing`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::Missing)
}

/// CredentialVerifier
///
/// Resolves a bearer token into a `Principal` by asking the identity
/// provider. Read-only: verification never changes provider state.
#[derive(Clone)]
pub struct CredentialVerifier {
    identity: IdentityState,
}

impl CredentialVerifier {
    pub fn new(identity: IdentityState) -> Self {
        Self { identity }
    }

    pub async fn verify(&self, token: &str) -> Result<Principal, ApiError> {
        match self.identity.get_user_from_token(token).await {
            Ok(user) => Ok(user.into_principal()),
            Err(IdentityError::Rejected(reason)) => {
                tracing::debug!(reason = %reason, "token rejected by identity provider");
                Err(AuthError::Invalid.into())
            }
            Err(e @ IdentityError::Unavailable(_)) => {
                Err(ApiError::provider("Authentication failed", e))
            }
        }
    }
}

/// AuthUser
///
/// The resolved identity of an authenticated request, plus the raw token
/// (needed to revoke the session on logout).
///
/// Rejection: `ApiError` (401 for missing/invalid credentials, 502 when the
/// identity provider cannot be reached). The result is cached in the request
/// extensions so a route guarded by the auth middleware verifies only once.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub principal: Principal,
    pub token: String,
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    IdentityState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let token = bearer_token(&parts.headers)?.to_string();
        let verifier = CredentialVerifier::new(IdentityState::from_ref(state));
        let principal = verifier.verify(&token).await?;

        let user = AuthUser { principal, token };
        parts.extensions.insert(user.clone());
        Ok(user)
    }
}

/// `Option<AuthUser>`
///
/// For public writes: no `Authorization` header means an anonymous caller,
/// but a header that is present must verify, otherwise the request fails
/// with the same rejection as `AuthUser`.
impl<S> OptionalFromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    IdentityState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Option<Self>, Self::Rejection> {
        if !parts.headers.contains_key(header::AUTHORIZATION) {
            return Ok(None);
        }
        <AuthUser as FromRequestParts<S>>::from_request_parts(parts, state)
            .await
            .map(Some)
    }
}

/// MaybeAuthUser
///
/// Optional variant for public-but-personalizable endpoints: any
/// verification failure yields `None` instead of failing the request.
#[derive(Debug, Clone, Default)]
pub struct MaybeAuthUser(pub Option<Principal>);

impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
    IdentityState: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if bearer_token(&parts.headers).is_err() {
            return Ok(MaybeAuthUser(None));
        }
        match <AuthUser as FromRequestParts<S>>::from_request_parts(parts, state).await {
            Ok(user) => Ok(MaybeAuthUser(Some(user.principal))),
            Err(e) => {
                tracing::debug!(error = %e, "optional authentication ignored");
                Ok(MaybeAuthUser(None))
            }
        }
    }
}
