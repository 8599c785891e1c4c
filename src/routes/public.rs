use crate::{
    AppState,
    handlers::{auth, resources},
};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Unauthenticated endpoints: every read, the credential exchanges and
/// donor registration.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // --- Credentials ---
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/admin/auth/login", post(auth::admin_login))
        .route("/admin/auth/refresh", post(auth::admin_refresh))
        // --- Donors ---
        // POST is public; the owner is recorded when a token is present.
        .route(
            "/donors",
            get(resources::list_donors).post(resources::create_donor),
        )
        .route("/donors/{id}", get(resources::get_donor))
        // --- Advertisements ---
        // Listing only returns active advertisements.
        .route("/advertisements", get(resources::list_advertisements))
        .route("/advertisements/{id}", get(resources::get_advertisement))
        // --- Events ---
        .route("/events", get(resources::list_events))
        .route("/events/{id}", get(resources::get_event))
}
