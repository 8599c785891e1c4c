use crate::{
    AppState,
    handlers::{auth, resources},
};
use axum::{
    Router,
    routing::{get, post},
};

/// Admin Router Module
///
/// Routes restricted to principals with an admin role. The whole router is
/// wrapped in the auth and admin middleware by `create_router`; the services
/// re-check the role before writing.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // POST /admin/auth/signup
        // Admins are created by existing admins only.
        .route("/admin/auth/signup", post(auth::admin_signup))
        .route("/admin/auth/me", get(auth::admin_me))
        .route("/admin/auth/logout", post(auth::admin_logout))
        // POST /events
        // News events are published by admins.
        .route("/events", post(resources::create_event))
}
