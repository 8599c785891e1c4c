use std::{collections::HashMap, sync::Arc};

use axum::http::StatusCode;
use portal_gateway::{
    accounts::AccountService,
    config::AppConfig,
    error::ApiError,
    files::FileService,
    identity::MockIdentityProvider,
    mediator::ResourceMediator,
    models::{IncomingFile, Principal, Record, Role},
    repository::InMemoryRepository,
    resources::ResourceKind,
    storage::{MockStorageService, StorageService},
};
use serde_json::{Value, json};
use uuid::Uuid;

// --- Fixtures ---

struct Services {
    repo: Arc<InMemoryRepository>,
    storage: Arc<MockStorageService>,
    identity: Arc<MockIdentityProvider>,
    mediator: ResourceMediator,
    accounts: AccountService,
}

fn services_with(identity: MockIdentityProvider, storage: MockStorageService) -> Services {
    let repo = Arc::new(InMemoryRepository::new());
    let storage = Arc::new(storage);
    let identity = Arc::new(identity);
    let mediator = ResourceMediator::new(repo.clone(), storage.clone());
    let accounts = AccountService::new(identity.clone(), repo.clone(), mediator.clone());
    Services {
        repo,
        storage,
        identity,
        mediator,
        accounts,
    }
}

fn services() -> Services {
    services_with(MockIdentityProvider::new(), MockStorageService::new())
}

fn user() -> Principal {
    Principal::new(Uuid::new_v4(), Some("user@test.com".to_string()), Role::User)
}

fn admin() -> Principal {
    Principal::new(Uuid::new_v4(), Some("admin@test.com".to_string()), Role::Admin)
}

fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("fixture must be an object, got {other}"),
    }
}

fn donor_body() -> Value {
    json!({
        "full_name": "A",
        "cause": "B",
        "donation_amount": 100,
        "mobile": "123",
        "email": "a@b.com"
    })
}

fn event_row(owner: &Principal, title: &str) -> Record {
    record(json!({
        "short_title": title,
        "priority": "high",
        "title": title,
        "description": "d",
        "type": "news",
        "created_by": owner.id.to_string(),
        "photo_url": format!("http://localhost:9000/mock-bucket/{}/p.png", owner.id)
    }))
}

// --- Resource mediator ---

#[tokio::test]
async fn test_create_with_missing_field_never_reaches_the_store() {
    let s = services();

    let err = s
        .mediator
        .create(ResourceKind::Donor, None, json!({ "full_name": "A" }))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(s.repo.insert_calls(), 0);
}

#[tokio::test]
async fn test_create_stamps_the_owner_when_known() {
    let s = services();
    let caller = user();

    let rows = s
        .mediator
        .create(ResourceKind::Donor, Some(&caller), donor_body())
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].text("created_by"), Some(caller.id.to_string()));
    assert!(rows[0].id().is_some());
}

#[tokio::test]
async fn test_admin_only_create_is_refused_before_validation() {
    let s = services();

    // Even an invalid body gets 403, not 400.
    let err = s
        .mediator
        .create(ResourceKind::Event, Some(&user()), json!({}))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(s.repo.insert_calls(), 0);
}

#[tokio::test]
async fn test_non_owner_update_is_forbidden_without_mutation() {
    let s = services();
    let owner = user();
    let stored = s.repo.seed("events", vec![event_row(&owner, "Original")]);
    let id = stored[0].id().unwrap();

    let err = s
        .mediator
        .update(ResourceKind::Event, Some(&user()), &id, json!({ "title": "Hijacked" }))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(s.repo.mutation_calls(), 0);
    assert_eq!(s.repo.rows("events")[0].text("title").as_deref(), Some("Original"));
}

#[tokio::test]
async fn test_partial_update_leaves_other_fields_untouched() {
    let s = services();
    let owner = user();
    let stored = s.repo.seed("events", vec![event_row(&owner, "Original")]);
    let id = stored[0].id().unwrap();
    let before = stored[0].clone();

    let updated = s
        .mediator
        .update(ResourceKind::Event, Some(&owner), &id, json!({ "title": "Renamed" }))
        .await
        .unwrap();

    assert_eq!(updated.text("title").as_deref(), Some("Renamed"));
    for field in ["short_title", "priority", "description", "type", "created_by", "created_at"] {
        assert_eq!(updated.get(field), before.get(field), "{field} changed");
    }
    assert_ne!(updated.get("updated_at"), before.get("updated_at"));
}

#[tokio::test]
async fn test_admin_may_update_someone_elses_resource() {
    let s = services();
    let stored = s.repo.seed("events", vec![event_row(&user(), "Original")]);
    let id = stored[0].id().unwrap();

    let updated = s
        .mediator
        .update(ResourceKind::Event, Some(&admin()), &id, json!({ "police_status": "filed" }))
        .await
        .unwrap();

    assert_eq!(updated.text("police_status").as_deref(), Some("filed"));
}

#[tokio::test]
async fn test_update_of_missing_resource_is_not_found() {
    let s = services();

    let err = s
        .mediator
        .update(ResourceKind::Donor, Some(&admin()), "missing", json!({ "cause": "x" }))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(err.to_string(), "Donor not found");
}

#[tokio::test]
async fn test_delete_removes_the_owners_stored_file() {
    let s = services();
    let owner = user();
    let photo = format!("{}/p.png", owner.id);
    s.storage.put(&photo, b"png", "image/png");
    let stored = s.repo.seed("events", vec![event_row(&owner, "Doomed")]);
    let id = stored[0].id().unwrap();

    s.mediator
        .delete(ResourceKind::Event, Some(&owner), &id)
        .await
        .unwrap();

    assert!(!s.storage.contains(&photo));
    assert!(s.repo.rows("events").is_empty());
}

#[tokio::test]
async fn test_delete_never_touches_files_outside_the_owners_namespace() {
    let s = services();
    let victim = user();
    let attacker = user();
    let victim_path = format!("{}/secret.png", victim.id);
    s.storage.put(&victim_path, b"png", "image/png");

    let created = s
        .mediator
        .create(
            ResourceKind::Advertisement,
            Some(&attacker),
            json!({
                "title": "Borrowed",
                "description": "d",
                "position": "top",
                "image_urls": [s.storage.public_url(&victim_path)]
            }),
        )
        .await
        .unwrap();
    let id = created[0].id().unwrap();

    s.mediator
        .delete(ResourceKind::Advertisement, Some(&attacker), &id)
        .await
        .unwrap();

    assert!(s.storage.contains(&victim_path));
    assert!(s.repo.rows("advertisements").is_empty());
}

#[tokio::test]
async fn test_delete_of_an_ownerless_row_keeps_its_files() {
    let s = services();
    let uploader = user();
    let path = format!("{}/logo.png", uploader.id);
    s.storage.put(&path, b"png", "image/png");
    let mut row = record(donor_body());
    row.insert("image_url".to_string(), json!(s.storage.public_url(&path)));
    let stored = s.repo.seed("donors", vec![row]);
    let id = stored[0].id().unwrap();

    s.mediator
        .delete(ResourceKind::Donor, Some(&admin()), &id)
        .await
        .unwrap();

    assert!(s.storage.contains(&path));
    assert!(s.repo.rows("donors").is_empty());
}

#[tokio::test]
async fn test_file_cleanup_failure_does_not_block_the_delete() {
    let s = services_with(MockIdentityProvider::new(), MockStorageService::new_failing());
    let owner = user();
    let stored = s.repo.seed("events", vec![event_row(&owner, "Doomed")]);
    let id = stored[0].id().unwrap();

    let deleted = s
        .mediator
        .delete(ResourceKind::Event, Some(&owner), &id)
        .await
        .unwrap();

    assert_eq!(deleted.id(), Some(id));
    assert!(s.repo.rows("events").is_empty());
}

#[tokio::test]
async fn test_store_failure_surfaces_as_provider_error() {
    let s = services();
    s.repo.fail_writes_to("donors");

    let err = s
        .mediator
        .create(ResourceKind::Donor, None, donor_body())
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    assert_eq!(err.to_string(), "Failed to create donor");
}

#[tokio::test]
async fn test_listing_marks_owned_items() {
    let s = services();
    let me = user();
    s.repo.seed(
        "events",
        vec![event_row(&me, "Mine"), event_row(&user(), "Theirs")],
    );

    let listing = s
        .mediator
        .list(ResourceKind::Event, &HashMap::new(), Some(&me))
        .await
        .unwrap();

    assert_eq!(listing.pagination.total, 2);
    for item in &listing.items {
        let mine = item.text("title").as_deref() == Some("Mine");
        assert_eq!(item.get("is_owner"), Some(&Value::Bool(mine)));
    }

    let anonymous = s
        .mediator
        .list(ResourceKind::Event, &HashMap::new(), None)
        .await
        .unwrap();
    assert!(anonymous.items.iter().all(|item| item.get("is_owner").is_none()));
}

#[tokio::test]
async fn test_owned_listing_includes_inactive_rows() {
    let s = services();
    let me = user();
    let mut inactive = record(json!({
        "title": "Hidden", "description": "d", "position": "top",
        "image_url": "x.png", "priority": 1, "is_active": false
    }));
    inactive.insert("created_by".to_string(), json!(me.id.to_string()));
    s.repo.seed("advertisements", vec![inactive]);

    let public = s
        .mediator
        .list(ResourceKind::Advertisement, &HashMap::new(), None)
        .await
        .unwrap();
    let mine = s
        .mediator
        .list_owned(ResourceKind::Advertisement, &HashMap::new(), &me)
        .await
        .unwrap();

    assert!(public.items.is_empty());
    assert_eq!(mine.items.len(), 1);
}

// --- Account flows ---

#[tokio::test]
async fn test_signup_creates_identity_profile_and_session() {
    let s = services();

    let outcome = s
        .accounts
        .signup_user(json!({ "email": "new@test.com", "password": "secret1", "full_name": "New" }))
        .await
        .unwrap();

    let id = s.identity.find_by_email("new@test.com").expect("identity exists");
    assert_eq!(outcome.user.id(), Some(id.to_string()));
    assert_eq!(outcome.user.get("is_active"), Some(&json!(true)));
    assert_eq!(outcome.user.text("role").as_deref(), Some("user"));
    assert!(outcome.session.is_some());
}

#[tokio::test]
async fn test_failed_profile_insert_rolls_back_the_identity() {
    let s = services();
    s.repo.fail_writes_to("user_auth");

    let err = s
        .accounts
        .signup_user(json!({ "email": "x@test.com", "password": "secret1" }))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    assert_eq!(s.identity.find_by_email("x@test.com"), None);
    assert_eq!(s.identity.delete_calls().len(), 1);
}

#[tokio::test]
async fn test_failed_rollback_is_reported() {
    let s = services_with(
        MockIdentityProvider::new().with_failing_deletes(),
        MockStorageService::new(),
    );
    s.repo.fail_writes_to("user_auth");

    let err = s
        .accounts
        .signup_user(json!({ "email": "x@test.com", "password": "secret1" }))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(err.to_string().contains("rollback"), "{err}");
    // The orphaned identity is still there.
    assert!(s.identity.find_by_email("x@test.com").is_some());
}

#[tokio::test]
async fn test_duplicate_signup_is_a_client_error() {
    let s = services();
    s.identity.with_user("dup@test.com", "secret1", Role::User);

    let err = s
        .accounts
        .signup_user(json!({ "email": "dup@test.com", "password": "secret1" }))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(s.repo.insert_calls(), 0);
}

#[tokio::test]
async fn test_admin_signup_requires_an_admin_and_compensates() {
    let s = services();

    let err = s
        .accounts
        .signup_admin(&user(), json!({ "email": "a2@test.com", "password": "secret1" }))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(s.identity.find_by_email("a2@test.com"), None);

    s.repo.fail_writes_to("admin_auth");
    let err = s
        .accounts
        .signup_admin(&admin(), json!({ "email": "a2@test.com", "password": "secret1" }))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Error saving admin data");
    assert_eq!(s.identity.find_by_email("a2@test.com"), None);
}

#[tokio::test]
async fn test_disabled_account_cannot_log_in() {
    let s = services();
    let (id, _) = s.identity.with_user("off@test.com", "secret1", Role::User);
    s.repo.seed(
        "user_auth",
        vec![record(json!({ "id": id.to_string(), "email": "off@test.com", "is_active": false }))],
    );

    let err = s
        .accounts
        .login_user(json!({ "email": "off@test.com", "password": "secret1" }))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(err.to_string(), "Account disabled");
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized() {
    let s = services();
    s.identity.with_user("u@test.com", "secret1", Role::User);

    let err = s
        .accounts
        .login_user(json!({ "email": "u@test.com", "password": "wrong!!" }))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(err.to_string(), "Invalid email or password");
}

#[tokio::test]
async fn test_unreachable_provider_is_a_gateway_error() {
    let s = services_with(MockIdentityProvider::unavailable(), MockStorageService::new());

    let err = s
        .accounts
        .login_user(json!({ "email": "u@test.com", "password": "secret1" }))
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Provider { .. }));
}

#[tokio::test]
async fn test_change_password_updates_the_identity() {
    let s = services();
    let (id, _) = s.identity.with_user("u@test.com", "secret1", Role::User);
    let caller = Principal::new(id, Some("u@test.com".to_string()), Role::User);

    s.accounts
        .change_password(&caller, json!({ "new_password": "secret2" }))
        .await
        .unwrap();

    assert_eq!(s.identity.password_of(id).as_deref(), Some("secret2"));
}

// --- Files ---

fn png(name: &str, size: usize) -> IncomingFile {
    IncomingFile {
        original_name: name.to_string(),
        mime_type: "image/png".to_string(),
        bytes: vec![7; size],
    }
}

fn file_service(storage: Arc<MockStorageService>) -> FileService {
    let config = AppConfig {
        max_upload_bytes: 1024,
        ..AppConfig::default()
    };
    FileService::new(storage, &config)
}

#[tokio::test]
async fn test_same_filename_twice_gets_distinct_paths() {
    let storage = Arc::new(MockStorageService::new());
    let files = file_service(storage.clone());
    let owner = user();

    let first = files.upload_one(&owner, png("photo.png", 10)).await.unwrap();
    let second = files.upload_one(&owner, png("photo.png", 10)).await.unwrap();

    assert_ne!(first.path, second.path);
    assert!(first.path.starts_with(&format!("{}/", owner.id)));
    assert!(first.path.ends_with(".png"));
    assert_eq!(first.name, "photo.png");
    assert_eq!(first.url, storage.public_url(&first.path));
    assert_eq!(storage.paths().len(), 2);
}

#[tokio::test]
async fn test_upload_checks_type_and_size() {
    let storage = Arc::new(MockStorageService::new());
    let files = file_service(storage.clone());
    let owner = user();

    let mut script = png("run.sh", 10);
    script.mime_type = "application/x-sh".to_string();
    let err = files.upload_one(&owner, script).await.unwrap_err();
    assert_eq!(err.to_string(), "Invalid file type: application/x-sh");

    let err = files.upload_one(&owner, png("big.png", 2048)).await.unwrap_err();
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    assert!(storage.paths().is_empty());
}

#[tokio::test]
async fn test_multiple_upload_reports_partial_failures() {
    let storage = Arc::new(MockStorageService::new());
    let files = file_service(storage.clone());

    let report = files
        .upload_many(&user(), vec![png("ok.png", 10), png("huge.png", 4096), png("empty.png", 0)])
        .await
        .unwrap();

    assert_eq!(report.uploaded.len(), 1);
    let failed: Vec<&str> = report.failed.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(failed, vec!["huge.png", "empty.png"]);
}

#[tokio::test]
async fn test_multiple_upload_limits() {
    let files = file_service(Arc::new(MockStorageService::new()));
    let owner = user();

    let err = files.upload_many(&owner, vec![]).await.unwrap_err();
    assert_eq!(err.to_string(), "No files uploaded");

    let six = (0..6).map(|i| png(&format!("{i}.png"), 10)).collect();
    let err = files.upload_many(&owner, six).await.unwrap_err();
    assert_eq!(err.to_string(), "At most 5 files per request");

    let err = files
        .upload_many(&owner, vec![png("huge.png", 4096)])
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "No files were uploaded");
}

#[tokio::test]
async fn test_download_and_remove_stay_in_the_callers_namespace() {
    let storage = Arc::new(MockStorageService::new());
    let files = file_service(storage.clone());
    let owner = user();
    let other = user();
    storage.put(&format!("{}/secret.pdf", other.id), b"pdf", "application/pdf");

    for name in ["../secret.pdf", "a/b.pdf", "..", "x\\y.pdf"] {
        let err = files.download(&owner, name).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid filename", "{name}");
    }

    let err = files.download(&owner, "secret.pdf").await.unwrap_err();
    assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

    let (bytes, content_type) = files.download(&other, "secret.pdf").await.unwrap();
    assert_eq!(bytes, b"pdf");
    assert_eq!(content_type, "application/pdf");

    files.remove(&other, "secret.pdf").await.unwrap();
    assert!(storage.paths().is_empty());
}
