use serde_json::{Map, Number, Value};

use crate::{
    error::{ApiError, FieldError},
    models::{
        AdminSignupRequest, ChangePasswordRequest, LoginRequest, Record, RefreshRequest,
        SignupRequest,
    },
    resources::{FieldSpec, FieldType, ResourceKind},
};

pub const MIN_PASSWORD_LEN: usize = 6;

/// validate_create
///
/// Checks a create payload against the kind's field set. Required fields
/// must be present and non-empty; numeric-looking fields are parsed; absent
/// optional fields take their fallback (numbers become `null`). Keys the kind
/// does not accept on create are dropped.
pub fn validate_create(kind: ResourceKind, body: Value) -> Result<Record, ApiError> {
    let mut input = into_object(body)?;
    let spec = kind.spec();

    let mut record = Record::new();
    let mut missing = Vec::new();
    let mut errors = Vec::new();

    for field in spec.fields.iter().filter(|f| f.create) {
        let normalized = match input.remove(field.name) {
            Some(raw) => match normalize(field, raw) {
                Ok(value) => value,
                Err(reason) => {
                    errors.push(FieldError::new(field.name, reason));
                    continue;
                }
            },
            None => Value::Null,
        };

        if is_blank(&normalized) {
            if field.required {
                missing.push(field.name);
                errors.push(FieldError::new(field.name, "is required"));
            } else if let Some(fallback) = field.fallback.value() {
                record.insert(field.name.to_string(), fallback);
            }
            continue;
        }

        record.insert(field.name.to_string(), normalized);
    }

    if !input.is_empty() {
        tracing::debug!(kind = spec.table, ignored = ?input.keys().collect::<Vec<_>>(), "ignoring unknown fields");
    }

    if errors.is_empty() {
        Ok(record)
    } else if !missing.is_empty() {
        Err(ApiError::invalid_fields(
            format!("Required fields missing: {}", missing.join(", ")),
            errors,
        ))
    } else {
        Err(ApiError::invalid_fields("Invalid field values", errors))
    }
}

/// validate_patch
///
/// Normalizes a partial update. Only keys present in the body (and accepted
/// on update) make it into the patch, so omitted fields keep their stored
/// value. Required fields cannot be cleared.
pub fn validate_patch(kind: ResourceKind, body: Value) -> Result<Record, ApiError> {
    let input = into_object(body)?;
    let spec = kind.spec();

    let mut patch = Record::new();
    let mut errors = Vec::new();

    for (key, raw) in input {
        let Some(field) = spec.field(&key).filter(|f| f.update) else {
            continue;
        };
        match normalize(field, raw) {
            Ok(value) if field.required && is_blank(&value) => {
                errors.push(FieldError::new(field.name, "cannot be cleared"));
            }
            Ok(value) => {
                patch.insert(field.name.to_string(), value);
            }
            Err(reason) => errors.push(FieldError::new(field.name, reason)),
        }
    }

    if !errors.is_empty() {
        return Err(ApiError::invalid_fields("Invalid field values", errors));
    }
    if patch.is_empty() {
        return Err(ApiError::validation("No updatable fields supplied"));
    }
    Ok(patch)
}

fn into_object(body: Value) -> Result<Map<String, Value>, ApiError> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(ApiError::validation("Request body must be a JSON object")),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn normalize(field: &FieldSpec, raw: Value) -> Result<Value, String> {
    match field.ty {
        FieldType::Text => match raw {
            Value::Null => Ok(Value::Null),
            Value::String(s) => Ok(Value::String(s)),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            _ => Err("must be a string".to_string()),
        },
        FieldType::Number => match raw {
            Value::Null => Ok(Value::Null),
            Value::Number(n) => Ok(Value::Number(n)),
            Value::String(s) if s.trim().is_empty() => Ok(Value::Null),
            Value::String(s) => parse_number(s.trim()).ok_or_else(|| "must be a number".to_string()),
            _ => Err("must be a number".to_string()),
        },
        FieldType::Boolean => match raw {
            Value::Null => Ok(Value::Null),
            Value::Bool(b) => Ok(Value::Bool(b)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err("must be a boolean".to_string()),
            },
            _ => Err("must be a boolean".to_string()),
        },
        FieldType::TextList => match raw {
            Value::Null => Ok(Value::Null),
            Value::Array(items) => {
                if items.iter().all(Value::is_string) {
                    Ok(Value::Array(items))
                } else {
                    Err("must contain only strings".to_string())
                }
            }
            _ => Err("must be an array".to_string()),
        },
    }
}

/// Integers stay integers; anything else must be a finite float.
fn parse_number(raw: &str) -> Option<Value> {
    if let Ok(i) = raw.parse::<i64>() {
        return Some(Value::Number(i.into()));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

// --- Auth payloads ---

pub fn validate_signup(body: Value) -> Result<SignupRequest, ApiError> {
    let mut input = into_object(body)?;
    let (email, password) = credentials(&mut input, true)?;
    Ok(SignupRequest {
        email,
        password,
        full_name: optional_text(&mut input, "full_name")?,
        phone: optional_text(&mut input, "phone")?,
    })
}

pub fn validate_admin_signup(body: Value) -> Result<AdminSignupRequest, ApiError> {
    let mut input = into_object(body)?;
    let (email, password) = credentials(&mut input, true)?;

    let permissions = match input.remove("permissions") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => {
            let mut permissions = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(p) => permissions.push(p),
                    _ => {
                        return Err(ApiError::invalid_fields(
                            "Invalid field values",
                            vec![FieldError::new("permissions", "must contain only strings")],
                        ));
                    }
                }
            }
            permissions
        }
        Some(_) => {
            return Err(ApiError::invalid_fields(
                "Invalid field values",
                vec![FieldError::new("permissions", "must be an array")],
            ));
        }
    };

    Ok(AdminSignupRequest {
        email,
        password,
        permissions,
    })
}

pub fn validate_login(body: Value) -> Result<LoginRequest, ApiError> {
    let mut input = into_object(body)?;
    let (email, password) = credentials(&mut input, false)?;
    Ok(LoginRequest { email, password })
}

pub fn validate_refresh(body: Value) -> Result<RefreshRequest, ApiError> {
    let mut input = into_object(body)?;
    match optional_text(&mut input, "refresh_token")? {
        Some(refresh_token) => Ok(RefreshRequest { refresh_token }),
        None => Err(ApiError::invalid_fields(
            "Refresh token required",
            vec![FieldError::new("refresh_token", "is required")],
        )),
    }
}

pub fn validate_change_password(body: Value) -> Result<ChangePasswordRequest, ApiError> {
    let mut input = into_object(body)?;
    let new_password = optional_text(&mut input, "new_password")?.ok_or_else(|| {
        ApiError::invalid_fields(
            "New password required",
            vec![FieldError::new("new_password", "is required")],
        )
    })?;
    check_password_length("new_password", &new_password)?;
    Ok(ChangePasswordRequest { new_password })
}

fn credentials(
    input: &mut Map<String, Value>,
    enforce_length: bool,
) -> Result<(String, String), ApiError> {
    let email = optional_text(input, "email")?;
    let password = optional_text(input, "password")?;

    let (Some(email), Some(password)) = (email, password) else {
        return Err(ApiError::validation("Email and password are required"));
    };

    if !email.contains('@') {
        return Err(ApiError::invalid_fields(
            "Invalid email address",
            vec![FieldError::new("email", "must be an email address")],
        ));
    }
    if enforce_length {
        check_password_length("password", &password)?;
    }
    Ok((email.trim().to_string(), password))
}

fn check_password_length(field: &str, password: &str) -> Result<(), ApiError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::invalid_fields(
            format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
            vec![FieldError::new(field, "is too short")],
        ));
    }
    Ok(())
}

fn optional_text(input: &mut Map<String, Value>, key: &str) -> Result<Option<String>, ApiError> {
    match input.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(ApiError::invalid_fields(
            "Invalid field values",
            vec![FieldError::new(key, "must be a string")],
        )),
    }
}
