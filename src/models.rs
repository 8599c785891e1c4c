use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

/// A row as it travels between the mediator and the relational store.
pub type Record = Map<String, Value>;

// --- Identity ---

/// Role
///
/// The RBAC field carried in the identity provider's user metadata.
/// Anything unrecognised resolves to `User`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Role {
    #[default]
    User,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn from_metadata(raw: Option<&str>) -> Self {
        match raw {
            Some("admin") => Role::Admin,
            Some("super_admin") => Role::SuperAdmin,
            _ => Role::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    /// `super_admin` holds every admin capability.
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }
}

/// Principal
///
/// The authenticated actor of a request, as resolved by the credential verifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Principal {
    pub id: Uuid,
    pub email: Option<String>,
    pub role: Role,
    pub permissions: BTreeSet<String>,
}

impl Principal {
    pub fn new(id: Uuid, email: Option<String>, role: Role) -> Self {
        Self {
            id,
            email,
            role,
            permissions: BTreeSet::new(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

/// Session
///
/// The provider's token pair. Never persisted here; it only passes through
/// the response of login, signup and refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: i64,
    /// Unix timestamp (seconds).
    #[serde(default)]
    pub expires_at: i64,
}

// --- Resources ---

/// Resource
///
/// A generic persisted entity (donor, advertisement, event, profile). Fields
/// are kept as provider JSON; the per-kind descriptor in `resources` knows
/// which of them carry the owner id and file URLs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Resource(pub Record);

impl Resource {
    pub fn id(&self) -> Option<String> {
        self.text("id")
    }

    /// Textual view of a scalar field. Numbers and booleans are rendered,
    /// nulls and structures are not.
    pub fn text(&self, field: &str) -> Option<String> {
        match self.0.get(field)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn into_record(self) -> Record {
        self.0
    }
}

impl From<Record> for Resource {
    fn from(record: Record) -> Self {
        Resource(record)
    }
}

// --- Files ---

/// IncomingFile
///
/// A validated part of a multipart request, handed from the HTTP adapter to
/// the file service.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub original_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// StoredFile
///
/// An object written under the uploader's namespace: `path = "{owner_id}/{generated_name}"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct StoredFile {
    /// The client-supplied filename, echoed back for display only.
    pub name: String,
    pub path: String,
    pub mime_type: String,
    pub size: u64,
    pub url: String,
}

/// StoredObject
///
/// A listing entry returned by the object store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StoredObject {
    pub name: String,
    pub size: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub url: String,
}

// --- Auth payloads (normalised output of the validator) ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AdminSignupRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    pub new_password: String,
}

/// UpdateProfileRequest
///
/// Documentation shape for `PUT /auth/profile`. Only supplied keys are applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, Default)]
pub struct UpdateProfileRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// AdminProfile
///
/// The `admin_auth` row as returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AdminProfile {
    pub id: String,
    pub email: Option<String>,
    pub role: String,
    pub permissions: Vec<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl AdminProfile {
    pub fn from_resource(resource: &Resource) -> Self {
        let permissions = match resource.get("permissions") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|p| p.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };
        Self {
            id: resource.id().unwrap_or_default(),
            email: resource.text("email"),
            role: resource.text("role").unwrap_or_else(|| "user".to_string()),
            permissions,
            created_at: resource.text("created_at"),
            updated_at: resource.text("updated_at"),
        }
    }
}
