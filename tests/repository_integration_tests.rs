use chrono::{Duration, Utc};
use portal_gateway::{
    models::Record,
    query::{ProviderQuery, SearchClause, TimeRange},
    repository::{InMemoryRepository, PostgresRepository, Repository},
};
use serde_json::{Value, json};
use sqlx::PgPool;
use uuid::Uuid;

// --- Test Data Helpers ---

fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

fn donors_query() -> ProviderQuery {
    ProviderQuery {
        table: "donors",
        equals: Vec::new(),
        contains: Vec::new(),
        search: None,
        range: None,
        order_by: "created_at",
        ascending: true,
        offset: 0,
        limit: 100,
    }
}

fn names(rows: &[portal_gateway::models::Resource], field: &str) -> Vec<String> {
    rows.iter().filter_map(|r| r.text(field)).collect()
}

fn seeded() -> InMemoryRepository {
    let repo = InMemoryRepository::new();
    repo.seed(
        "donors",
        vec![
            record(json!({"full_name": "Ada Obi", "cause": "Flood relief", "amount": 50, "status": "pending"})),
            record(json!({"full_name": "Ben Eze", "cause": "School fees", "amount": 200, "status": "confirmed"})),
            record(json!({"full_name": "Chi Nwosu", "cause": "flood shelters", "amount": null, "status": "confirmed"})),
            record(json!({"full_name": "Dayo Ade", "cause": "Clinic", "amount": 75, "status": "pending"})),
        ],
    );
    repo
}

// --- In-memory store semantics ---

#[tokio::test]
async fn test_insert_assigns_id_and_timestamps() {
    let repo = InMemoryRepository::new();

    let stored = repo
        .insert("donors", vec![record(json!({"full_name": "Ada"}))])
        .await
        .unwrap();

    assert_eq!(stored.len(), 1);
    let id = stored[0].id().unwrap();
    assert!(Uuid::parse_str(&id).is_ok());
    assert!(stored[0].get("created_at").is_some());
    assert_eq!(repo.insert_calls(), 1);

    let found = repo.find("donors", &id).await.unwrap().unwrap();
    assert_eq!(found.text("full_name").as_deref(), Some("Ada"));
}

#[tokio::test]
async fn test_equals_filter_matches_text_form() {
    let repo = seeded();
    let mut query = donors_query();
    query.equals.push(("status", "confirmed".to_string()));
    query.equals.push(("amount", "200".to_string()));

    let page = repo.select(&query).await.unwrap();

    assert_eq!(page.total, 1);
    assert_eq!(names(&page.rows, "full_name"), vec!["Ben Eze"]);
}

#[tokio::test]
async fn test_search_is_case_insensitive_across_fields() {
    let repo = seeded();
    let mut query = donors_query();
    query.search = Some(SearchClause {
        fields: &["full_name", "cause"],
        term: "FLOOD".to_string(),
    });

    let page = repo.select(&query).await.unwrap();

    assert_eq!(page.total, 2);
    assert_eq!(names(&page.rows, "full_name"), vec!["Ada Obi", "Chi Nwosu"]);
}

#[tokio::test]
async fn test_contains_filter() {
    let repo = seeded();
    let mut query = donors_query();
    query.contains.push(("full_name", "ad".to_string()));

    let page = repo.select(&query).await.unwrap();

    assert_eq!(names(&page.rows, "full_name"), vec!["Ada Obi", "Dayo Ade"]);
}

#[tokio::test]
async fn test_nulls_sort_last_in_both_directions() {
    let repo = seeded();
    let mut query = donors_query();
    query.order_by = "amount";

    query.ascending = true;
    let ascending = repo.select(&query).await.unwrap();
    assert_eq!(
        names(&ascending.rows, "full_name"),
        vec!["Ada Obi", "Dayo Ade", "Ben Eze", "Chi Nwosu"]
    );

    query.ascending = false;
    let descending = repo.select(&query).await.unwrap();
    assert_eq!(
        names(&descending.rows, "full_name"),
        vec!["Ben Eze", "Dayo Ade", "Ada Obi", "Chi Nwosu"]
    );
}

#[tokio::test]
async fn test_offset_and_limit_keep_the_full_total() {
    let repo = seeded();
    let mut query = donors_query();
    query.offset = 1;
    query.limit = 2;

    let page = repo.select(&query).await.unwrap();

    assert_eq!(page.total, 4);
    assert_eq!(names(&page.rows, "full_name"), vec!["Ben Eze", "Chi Nwosu"]);

    query.offset = 10;
    let empty = repo.select(&query).await.unwrap();
    assert!(empty.rows.is_empty());
    assert_eq!(empty.total, 4);
}

#[tokio::test]
async fn test_time_range_is_inclusive_and_excludes_missing_timestamps() {
    let repo = InMemoryRepository::new();
    let old = (Utc::now() - Duration::days(30)).to_rfc3339();
    let recent = (Utc::now() - Duration::days(1)).to_rfc3339();
    repo.seed(
        "events",
        vec![
            record(json!({"title": "Old", "created_at": old})),
            record(json!({"title": "Recent", "created_at": recent})),
            record(json!({"title": "Undated", "created_at": null})),
        ],
    );

    let mut query = donors_query();
    query.table = "events";
    query.range = Some(TimeRange {
        field: "created_at",
        from: Some(Utc::now() - Duration::days(7)),
        to: None,
    });

    let page = repo.select(&query).await.unwrap();

    assert_eq!(names(&page.rows, "title"), vec!["Recent"]);
}

#[tokio::test]
async fn test_update_merges_patch_and_delete_reports_match() {
    let repo = seeded();
    let id = repo.rows("donors")[0].id().unwrap();

    let updated = repo
        .update("donors", &id, record(json!({"status": "confirmed"})))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.text("status").as_deref(), Some("confirmed"));
    assert_eq!(updated.text("full_name").as_deref(), Some("Ada Obi"));

    let missing = repo
        .update("donors", "no-such-id", record(json!({"status": "x"})))
        .await
        .unwrap();
    assert!(missing.is_none());

    assert!(repo.delete("donors", &id).await.unwrap());
    assert!(!repo.delete("donors", &id).await.unwrap());
    assert_eq!(repo.rows("donors").len(), 3);
    assert_eq!(repo.mutation_calls(), 4);
}

#[tokio::test]
async fn test_failing_table_rejects_writes_only() {
    let repo = seeded();
    repo.fail_writes_to("donors");

    let err = repo
        .insert("donors", vec![record(json!({"full_name": "Eve"}))])
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "store unavailable: writes to donors are failing");

    let page = repo.select(&donors_query()).await.unwrap();
    assert_eq!(page.total, 4);
}

// --- Postgres ---
//
// These run against the database in DATABASE_URL:
// `cargo test --test repository_integration_tests -- --ignored`

async fn pg_repository() -> PostgresRepository {
    dotenv::dotenv().ok();
    let db_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set to run integration tests");
    let pool = PgPool::connect(&db_url)
        .await
        .expect("Failed to connect to database for integration tests.");

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS donors (
            id uuid PRIMARY KEY DEFAULT gen_random_uuid(),
            full_name text NOT NULL,
            email text,
            phone text,
            amount numeric,
            cause text,
            status text DEFAULT 'pending',
            created_by uuid,
            created_at timestamptz NOT NULL DEFAULT now(),
            updated_at timestamptz NOT NULL DEFAULT now()
        )"#,
    )
    .execute(&pool)
    .await
    .expect("Failed to prepare donors table");

    PostgresRepository::new(pool)
}

#[tokio::test]
#[ignore]
async fn test_postgres_insert_find_update_delete() {
    let repo = pg_repository().await;
    let marker = Uuid::new_v4().to_string();

    let stored = repo
        .insert(
            "donors",
            vec![record(json!({"full_name": marker, "amount": 10, "cause": "Integration"}))],
        )
        .await
        .unwrap();
    let id = stored[0].id().unwrap();
    assert_eq!(stored[0].text("status").as_deref(), Some("pending"));

    let updated = repo
        .update("donors", &id, record(json!({"status": "confirmed"})))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.text("status").as_deref(), Some("confirmed"));
    assert_eq!(updated.text("full_name").as_deref(), Some(marker.as_str()));

    assert!(repo.delete("donors", &id).await.unwrap());
    assert!(repo.find("donors", &id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn test_postgres_select_filters_and_counts() {
    let repo = pg_repository().await;
    let marker = Uuid::new_v4().to_string();
    let rows = (0..3)
        .map(|i| record(json!({"full_name": format!("{marker}-{i}"), "cause": marker})))
        .collect();
    let stored = repo.insert("donors", rows).await.unwrap();

    let mut query = donors_query();
    query.equals.push(("cause", marker.clone()));
    query.limit = 2;

    let page = repo.select(&query).await.unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.rows.len(), 2);

    for row in stored {
        repo.delete("donors", &row.id().unwrap()).await.unwrap();
    }
}
