use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use serde_json::Value;

use crate::{
    error::{ApiError, ApiResult},
    models::{Principal, Resource},
    policy::{Target, authorize},
    query::{Pagination, ProviderQuery, QuerySpec},
    repository::{RepositoryState, StoreError},
    resources::ResourceKind,
    storage::StorageState,
    validation::{validate_create, validate_patch},
};

/// Listing
///
/// One page of a collection, ready for the response envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub items: Vec<Resource>,
    pub pagination: Pagination,
    pub filters_applied: BTreeMap<String, Option<String>>,
}

/// ResourceMediator
///
/// Runs every resource operation in a fixed order: authorize, validate,
/// persist. A rejected request never reaches the store.
#[derive(Clone)]
pub struct ResourceMediator {
    repo: RepositoryState,
    storage: StorageState,
}

fn store_failure(action: &str, kind: ResourceKind, e: StoreError) -> ApiError {
    ApiError::provider(
        format!("Failed to {} {}", action, kind.spec().label.to_lowercase()),
        e,
    )
}

impl ResourceMediator {
    pub fn new(repo: RepositoryState, storage: StorageState) -> Self {
        Self { repo, storage }
    }

    /// create
    ///
    /// Returns every stored row: advertisements fan out to one row per image.
    /// The caller's id is stamped into the owner column when a caller is known.
    pub async fn create(
        &self,
        kind: ResourceKind,
        principal: Option<&Principal>,
        body: Value,
    ) -> ApiResult<Vec<Resource>> {
        let spec = kind.spec();
        authorize(principal, spec.create_access, Target::Collection).into_result()?;

        let payload = validate_create(kind, body)?;
        let mut rows = kind.expand(payload);
        if let (Some(owner_field), Some(principal)) = (spec.owner_field, principal) {
            for row in &mut rows {
                row.insert(owner_field.to_string(), Value::String(principal.id.to_string()));
            }
        }

        let created = self
            .repo
            .insert(spec.table, rows)
            .await
            .map_err(|e| store_failure("create", kind, e))?;

        tracing::info!(
            kind = spec.table,
            count = created.len(),
            owner = ?principal.map(|p| p.id),
            "resource created"
        );
        Ok(created)
    }

    /// Reads are public.
    pub async fn get(&self, kind: ResourceKind, id: &str) -> ApiResult<Resource> {
        let spec = kind.spec();
        self.repo
            .find(spec.table, id)
            .await
            .map_err(|e| store_failure("fetch", kind, e))?
            .ok_or_else(|| ApiError::not_found(format!("{} not found", spec.label)))
    }

    /// list
    ///
    /// Public listing. With a caller, every item carries `is_owner`.
    pub async fn list(
        &self,
        kind: ResourceKind,
        params: &HashMap<String, String>,
        principal: Option<&Principal>,
    ) -> ApiResult<Listing> {
        let spec = QuerySpec::from_params(kind, params)?;
        let query = ProviderQuery::build(kind, &spec);
        self.run(kind, &spec, &query, principal).await
    }

    /// The caller's own rows, fixed predicates lifted.
    pub async fn list_owned(
        &self,
        kind: ResourceKind,
        params: &HashMap<String, String>,
        principal: &Principal,
    ) -> ApiResult<Listing> {
        let Some(owner_field) = kind.spec().owner_field else {
            return Err(ApiError::internal(
                "Listing by owner is not supported",
                format!("{} has no owner column", kind.spec().table),
            ));
        };
        let spec = QuerySpec::from_params(kind, params)?;
        let query = ProviderQuery::build(kind, &spec)
            .without_fixed(kind)
            .owned_by(owner_field, principal.id.to_string());
        self.run(kind, &spec, &query, Some(principal)).await
    }

    async fn run(
        &self,
        kind: ResourceKind,
        spec: &QuerySpec,
        query: &ProviderQuery,
        principal: Option<&Principal>,
    ) -> ApiResult<Listing> {
        let page = self
            .repo
            .select(query)
            .await
            .map_err(|e| store_failure("list", kind, e))?;

        let owner_field = kind.spec().owner_field;
        let items = page
            .rows
            .into_iter()
            .map(|mut resource| {
                if let (Some(principal), Some(field)) = (principal, owner_field) {
                    let is_owner = resource.text(field) == Some(principal.id.to_string());
                    resource.0.insert("is_owner".to_string(), Value::Bool(is_owner));
                }
                resource
            })
            .collect();

        Ok(Listing {
            items,
            pagination: Pagination::compute(spec.page, spec.page_size, page.total),
            filters_applied: spec.applied_filters(),
        })
    }

    /// update
    ///
    /// Partial update: only the supplied keys change, `updated_at` is stamped.
    /// Ownership is checked against the stored row before the patch is
    /// validated or written.
    pub async fn update(
        &self,
        kind: ResourceKind,
        principal: Option<&Principal>,
        id: &str,
        body: Value,
    ) -> ApiResult<Resource> {
        let spec = kind.spec();
        authorize(principal, spec.mutate_access, Target::Collection).into_result()?;

        let existing = self.get(kind, id).await?;
        self.authorize_existing(kind, principal, &existing)?;

        let mut patch = validate_patch(kind, body)?;
        patch.insert(
            "updated_at".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );

        let updated = self
            .repo
            .update(spec.table, id, patch)
            .await
            .map_err(|e| store_failure("update", kind, e))?
            .ok_or_else(|| ApiError::not_found(format!("{} not found", spec.label)))?;

        tracing::info!(kind = spec.table, id, "resource updated");
        Ok(updated)
    }

    /// delete
    ///
    /// Stored files the row's owner uploaded are removed first, best effort: a
    /// storage failure is logged and the row is deleted anyway.
    pub async fn delete(
        &self,
        kind: ResourceKind,
        principal: Option<&Principal>,
        id: &str,
    ) -> ApiResult<Resource> {
        let spec = kind.spec();
        authorize(principal, spec.mutate_access, Target::Collection).into_result()?;

        let existing = self.get(kind, id).await?;
        self.authorize_existing(kind, principal, &existing)?;

        self.remove_files(kind, &existing).await;

        let deleted = self
            .repo
            .delete(spec.table, id)
            .await
            .map_err(|e| store_failure("delete", kind, e))?;
        if !deleted {
            return Err(ApiError::not_found(format!("{} not found", spec.label)));
        }

        tracing::info!(kind = spec.table, id, "resource deleted");
        Ok(existing)
    }

    fn authorize_existing(
        &self,
        kind: ResourceKind,
        principal: Option<&Principal>,
        existing: &Resource,
    ) -> ApiResult<()> {
        let spec = kind.spec();
        let owner_id = spec.owner_field.and_then(|field| existing.text(field));
        let decision = authorize(
            principal,
            spec.mutate_access,
            Target::Existing {
                owner_id: owner_id.as_deref(),
            },
        );
        if !decision.is_allowed() {
            tracing::warn!(
                kind = spec.table,
                id = ?existing.id(),
                caller = ?principal.map(|p| p.id),
                "mutation denied"
            );
        }
        decision.into_result()
    }

    /// Only objects under the row owner's `{owner_id}/` namespace are
    /// removed. URL fields are client-supplied, so a URL pointing into
    /// another namespace is left alone, and rows without an owner never
    /// trigger a cleanup.
    async fn remove_files(&self, kind: ResourceKind, resource: &Resource) {
        let spec = kind.spec();
        let Some(owner_id) = spec.owner_field.and_then(|field| resource.text(field)) else {
            return;
        };
        let namespace = format!("{owner_id}/");

        let (paths, foreign): (Vec<String>, Vec<String>) = spec
            .file_fields
            .iter()
            .filter_map(|field| resource.text(field))
            .filter_map(|url| self.storage.path_from_public_url(&url))
            .partition(|path| path.starts_with(&namespace) && path.len() > namespace.len());
        if !foreign.is_empty() {
            tracing::warn!(
                kind = spec.table,
                id = ?resource.id(),
                paths = ?foreign,
                "file cleanup skipped for paths outside the owner's namespace"
            );
        }
        if paths.is_empty() {
            return;
        }

        if let Err(e) = self.storage.remove(&paths).await {
            tracing::warn!(
                kind = kind.spec().table,
                paths = ?paths,
                error = %e,
                "file cleanup failed; deleting the record anyway"
            );
        }
    }
}

