use crate::{
    AppState,
    files::MAX_FILES_PER_REQUEST,
    handlers::{auth, resources, uploads},
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
};

/// Multipart framing allowance on top of the file bytes.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Authenticated Router Module
///
/// Every handler here runs after `auth_middleware` has verified the bearer
/// token; ownership checks happen in the services.
///
/// `max_upload_bytes` is the per-file limit; the body limit of the upload
/// routes is sized from it.
pub fn authenticated_routes(max_upload_bytes: usize) -> Router<AppState> {
    let single_limit = max_upload_bytes.saturating_add(FORM_OVERHEAD_BYTES);
    let multiple_limit = max_upload_bytes
        .saturating_mul(MAX_FILES_PER_REQUEST)
        .saturating_add(FORM_OVERHEAD_BYTES);

    Router::<AppState>::new()
        // --- Account ---
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        .route("/auth/profile", put(auth::update_profile))
        .route("/auth/change-password", put(auth::change_password))
        // --- Resource mutations (owner or admin) ---
        .route("/advertisements", post(resources::create_advertisement))
        .route(
            "/donors/{id}",
            put(resources::update_donor).delete(resources::delete_donor),
        )
        .route(
            "/advertisements/{id}",
            put(resources::update_advertisement).delete(resources::delete_advertisement),
        )
        .route(
            "/events/{id}",
            put(resources::update_event).delete(resources::delete_event),
        )
        .route("/events/mine", get(resources::list_my_events))
        // --- Files, namespaced by the caller's id ---
        .route(
            "/upload/single",
            post(uploads::upload_single).layer(DefaultBodyLimit::max(single_limit)),
        )
        .route(
            "/upload/multiple",
            post(uploads::upload_multiple).layer(DefaultBodyLimit::max(multiple_limit)),
        )
        .route("/upload/list", get(uploads::list_files))
        .route("/upload/download/{filename}", get(uploads::download_file))
        .route("/upload/{filename}", delete(uploads::delete_file))
}
