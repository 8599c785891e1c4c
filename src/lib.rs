use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Ambient layers: configuration, errors, the success envelope.
pub mod config;
pub mod error;
pub mod response;

// Domain rules, independent of HTTP.
pub mod models;
pub mod policy;
pub mod query;
pub mod resources;
pub mod validation;

// Provider adapters behind trait objects.
pub mod identity;
pub mod repository;
pub mod storage;

// Services composing the rules with the providers.
pub mod accounts;
pub mod auth;
pub mod files;
pub mod mediator;

// HTTP adapters and access-segregated routing.
pub mod handlers;
pub mod routes;

use accounts::AccountService;
use auth::AuthUser;
use error::ApiError;
use files::FileService;
use mediator::ResourceMediator;
use policy::{Access, Target, authorize};
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use identity::{IdentityState, MockIdentityProvider, SupabaseIdentity};
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};
pub use storage::{MockStorageService, S3StorageClient, StorageState};

/// Prefix every API route is mounted under.
pub const API_PREFIX: &str = "/api/v1";

/// ApiDoc
///
/// OpenAPI document for every handler, served at `/api-docs/openapi.json`
/// and browsable at `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    servers((url = "/api/v1")),
    paths(
        handlers::auth::signup, handlers::auth::login, handlers::auth::logout,
        handlers::auth::me, handlers::auth::refresh, handlers::auth::update_profile,
        handlers::auth::change_password, handlers::auth::admin_signup,
        handlers::auth::admin_login, handlers::auth::admin_me, handlers::auth::admin_logout,
        handlers::auth::admin_refresh,
        handlers::resources::create_donor, handlers::resources::list_donors,
        handlers::resources::get_donor, handlers::resources::update_donor,
        handlers::resources::delete_donor,
        handlers::resources::create_advertisement, handlers::resources::list_advertisements,
        handlers::resources::get_advertisement, handlers::resources::update_advertisement,
        handlers::resources::delete_advertisement,
        handlers::resources::create_event, handlers::resources::list_events,
        handlers::resources::list_my_events, handlers::resources::get_event,
        handlers::resources::update_event, handlers::resources::delete_event,
        handlers::uploads::upload_single, handlers::uploads::upload_multiple,
        handlers::uploads::list_files, handlers::uploads::download_file,
        handlers::uploads::delete_file,
    ),
    components(
        schemas(
            models::Role, models::Session, models::StoredFile, models::StoredObject,
            models::SignupRequest, models::AdminSignupRequest, models::LoginRequest,
            models::RefreshRequest, models::ChangePasswordRequest,
            models::UpdateProfileRequest, models::AdminProfile,
            accounts::AdminAccount, files::UploadFailure,
        )
    ),
    tags(
        (name = "auth", description = "User accounts and sessions"),
        (name = "admin", description = "Admin accounts"),
        (name = "donors", description = "Donor registry"),
        (name = "advertisements", description = "Advertisement slots"),
        (name = "events", description = "News events"),
        (name = "uploads", description = "Per-user file storage"),
    )
)]
struct ApiDoc;

/// AppState
///
/// The single container of shared providers and configuration. Handlers pull
/// the piece they need through `FromRef`; services are assembled on demand
/// from the providers, which are all cheap `Arc` clones.
#[derive(Clone)]
pub struct AppState {
    /// Row store (the provider's Postgres).
    pub repo: RepositoryState,
    /// Object store (S3 compatible).
    pub storage: StorageState,
    /// Identity provider: accounts, sessions, token verification.
    pub identity: IdentityState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for IdentityState {
    fn from_ref(app_state: &AppState) -> IdentityState {
        app_state.identity.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

impl FromRef<AppState> for ResourceMediator {
    fn from_ref(app_state: &AppState) -> ResourceMediator {
        ResourceMediator::new(app_state.repo.clone(), app_state.storage.clone())
    }
}

impl FromRef<AppState> for AccountService {
    fn from_ref(app_state: &AppState) -> AccountService {
        AccountService::new(
            app_state.identity.clone(),
            app_state.repo.clone(),
            ResourceMediator::from_ref(app_state),
        )
    }
}

impl FromRef<AppState> for FileService {
    fn from_ref(app_state: &AppState) -> FileService {
        FileService::new(app_state.storage.clone(), &app_state.config)
    }
}

/// auth_middleware
///
/// Guards the authenticated and admin routers. `AuthUser` rejects the request
/// with 401 when the bearer token is missing or invalid; on success the
/// resolved user is cached in the request extensions for the handler.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// admin_middleware
///
/// Runs inside `auth_middleware` and rejects non-admin principals with 403.
async fn admin_middleware(
    AuthUser { principal, .. }: AuthUser,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Err(e) = authorize(Some(&principal), Access::AdminOnly, Target::Collection).into_result() {
        tracing::warn!(user_id = %principal.id, uri = %request.uri(), "admin route refused");
        return Err(e);
    }
    Ok(next.run(request).await)
}

/// create_router
///
/// Assembles the routing tree under `/api/v1`, applies the guards per
/// access level and the observability layers around everything.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let api = Router::new()
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes(state.config.max_upload_bytes).route_layer(
                middleware::from_fn_with_state(state.clone(), auth_middleware),
            ),
        )
        // Layers run outside-in: authenticate first, then check the role.
        .merge(
            admin::admin_routes()
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    admin_middleware,
                ))
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        );

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        .nest(API_PREFIX, api)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            response::expose_error_detail,
        ))
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for one request, correlated by the `x-request-id` header set by
/// `SetRequestIdLayer`.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
