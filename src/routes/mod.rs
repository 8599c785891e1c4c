/// Router Module Index
///
/// Routes are split by the access level the layer above them enforces.
/// Paths shared between modules (e.g. `GET` in public, `PUT`/`DELETE` in
/// authenticated) are merged per method, so each method keeps its own guard.

/// Anonymous access. Handlers may still personalise when a token is sent.
pub mod public;

/// Wrapped in `auth_middleware`: a verified bearer token is required.
pub mod authenticated;

/// Wrapped in `auth_middleware` and `admin_middleware`.
pub mod admin;
