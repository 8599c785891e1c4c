use axum::extract::State;

use crate::{
    accounts::{AccountService, AdminAccount},
    auth::AuthUser,
    error::ApiResult,
    handlers::JsonBody,
    models::{
        AdminProfile, AdminSignupRequest, ChangePasswordRequest, LoginRequest, RefreshRequest,
        Session, SignupRequest, UpdateProfileRequest,
    },
    response::ApiSuccess,
};

// --- User accounts ---

/// signup
///
/// [Public Route] Creates the identity and the `user_auth` profile, then
/// signs in. `session` is omitted when the automatic sign-in failed.
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created", body = serde_json::Value),
        (status = 400, description = "Invalid input or email already registered"),
        (status = 502, description = "Identity provider or database failure")
    ),
    tag = "auth"
)]
pub async fn signup(
    State(accounts): State<AccountService>,
    JsonBody(body): JsonBody,
) -> ApiResult<ApiSuccess> {
    let outcome = accounts.signup_user(body).await?;
    let mut response = ApiSuccess::created()
        .message("Signup successful")
        .with("user", outcome.user);
    if let Some(session) = outcome.session {
        response = response.with("session", session);
    }
    Ok(response)
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = Session),
        (status = 401, description = "Invalid email or password"),
        (status = 403, description = "Account disabled")
    ),
    tag = "auth"
)]
pub async fn login(
    State(accounts): State<AccountService>,
    JsonBody(body): JsonBody,
) -> ApiResult<ApiSuccess> {
    let (user, session) = accounts.login_user(body).await?;
    Ok(ApiSuccess::ok()
        .message("Login successful")
        .with("user", user)
        .with("session", session))
}

/// logout
///
/// [Authenticated Route] Revokes the caller's sessions at the provider.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Signed out"),
        (status = 401, description = "Unauthenticated")
    ),
    tag = "auth"
)]
pub async fn logout(
    auth_user: AuthUser,
    State(accounts): State<AccountService>,
) -> ApiResult<ApiSuccess> {
    accounts.logout(&auth_user.token).await?;
    tracing::info!(user_id = %auth_user.principal.id, "signed out");
    Ok(ApiSuccess::ok().message("Logout successful"))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Caller's profile", body = serde_json::Value),
        (status = 401, description = "Unauthenticated"),
        (status = 404, description = "Profile not found")
    ),
    tag = "auth"
)]
pub async fn me(
    AuthUser { principal, .. }: AuthUser,
    State(accounts): State<AccountService>,
) -> ApiResult<ApiSuccess> {
    let user = accounts.me_user(&principal).await?;
    Ok(ApiSuccess::ok().with("user", user))
}

/// refresh
///
/// [Public Route] Exchanges a refresh token for a new session.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New session", body = Session),
        (status = 400, description = "Refresh token required"),
        (status = 401, description = "Invalid refresh token")
    ),
    tag = "auth"
)]
pub async fn refresh(
    State(accounts): State<AccountService>,
    JsonBody(body): JsonBody,
) -> ApiResult<ApiSuccess> {
    let session = accounts.refresh(body).await?;
    Ok(ApiSuccess::ok()
        .message("Token refreshed successfully")
        .with("session", session))
}

#[utoipa::path(
    put,
    path = "/auth/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = serde_json::Value),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Unauthenticated")
    ),
    tag = "auth"
)]
pub async fn update_profile(
    AuthUser { principal, .. }: AuthUser,
    State(accounts): State<AccountService>,
    JsonBody(body): JsonBody,
) -> ApiResult<ApiSuccess> {
    let user = accounts.update_profile(&principal, body).await?;
    Ok(ApiSuccess::ok().message("Profile updated").with("user", user))
}

#[utoipa::path(
    put,
    path = "/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password updated"),
        (status = 400, description = "Password too short"),
        (status = 401, description = "Unauthenticated")
    ),
    tag = "auth"
)]
pub async fn change_password(
    AuthUser { principal, .. }: AuthUser,
    State(accounts): State<AccountService>,
    JsonBody(body): JsonBody,
) -> ApiResult<ApiSuccess> {
    accounts.change_password(&principal, body).await?;
    Ok(ApiSuccess::ok().message("Password updated"))
}

// --- Admin accounts ---

/// admin_signup
///
/// [Admin Route] An existing admin creates another admin account.
#[utoipa::path(
    post,
    path = "/admin/auth/signup",
    request_body = AdminSignupRequest,
    responses(
        (status = 201, description = "Admin created", body = AdminAccount),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Admin required")
    ),
    tag = "admin"
)]
pub async fn admin_signup(
    AuthUser { principal, .. }: AuthUser,
    State(accounts): State<AccountService>,
    JsonBody(body): JsonBody,
) -> ApiResult<ApiSuccess> {
    let account = accounts.signup_admin(&principal, body).await?;
    Ok(ApiSuccess::created()
        .message("Admin created successfully")
        .merge(account))
}

/// admin_login
///
/// [Public Route] Valid credentials of a non-admin account get 403.
#[utoipa::path(
    post,
    path = "/admin/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = AdminProfile),
        (status = 401, description = "Invalid email or password"),
        (status = 403, description = "Access denied")
    ),
    tag = "admin"
)]
pub async fn admin_login(
    State(accounts): State<AccountService>,
    JsonBody(body): JsonBody,
) -> ApiResult<ApiSuccess> {
    let (admin, session) = accounts.login_admin(body).await?;
    Ok(ApiSuccess::ok()
        .message("Login successful")
        .with("admin", admin)
        .with("session", session))
}

#[utoipa::path(
    get,
    path = "/admin/auth/me",
    responses(
        (status = 200, description = "Caller's admin profile", body = AdminProfile),
        (status = 403, description = "Not an admin account")
    ),
    tag = "admin"
)]
pub async fn admin_me(
    AuthUser { principal, .. }: AuthUser,
    State(accounts): State<AccountService>,
) -> ApiResult<ApiSuccess> {
    let admin = accounts.me_admin(&principal).await?;
    Ok(ApiSuccess::ok().with("admin", admin))
}

#[utoipa::path(
    post,
    path = "/admin/auth/logout",
    responses((status = 200, description = "Signed out")),
    tag = "admin"
)]
pub async fn admin_logout(
    auth_user: AuthUser,
    State(accounts): State<AccountService>,
) -> ApiResult<ApiSuccess> {
    accounts.logout(&auth_user.token).await?;
    tracing::info!(admin_id = %auth_user.principal.id, "admin signed out");
    Ok(ApiSuccess::ok().message("Logout successful"))
}

#[utoipa::path(
    post,
    path = "/admin/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New session", body = Session),
        (status = 401, description = "Invalid refresh token")
    ),
    tag = "admin"
)]
pub async fn admin_refresh(
    State(accounts): State<AccountService>,
    JsonBody(body): JsonBody,
) -> ApiResult<ApiSuccess> {
    let session = accounts.refresh(body).await?;
    Ok(ApiSuccess::ok()
        .message("Token refreshed successfully")
        .with("session", session))
}
