use std::collections::HashMap;

use axum::extract::{Path, Query, State};

use crate::{
    auth::{AuthUser, MaybeAuthUser},
    error::ApiResult,
    handlers::{JsonBody, ListParams},
    mediator::{Listing, ResourceMediator},
    models::Resource,
    resources::ResourceKind,
    response::ApiSuccess,
};

// --- Envelope shaping shared by every kind ---

fn created(kind: ResourceKind, mut rows: Vec<Resource>) -> ApiSuccess {
    let spec = kind.spec();
    let response = ApiSuccess::created().message(format!("{} created successfully", spec.label));
    if kind == ResourceKind::Advertisement || rows.len() != 1 {
        let count = rows.len();
        return response.with(spec.plural, rows).with("count", count);
    }
    response.with(spec.singular, rows.remove(0))
}

fn listing(kind: ResourceKind, listing: Listing) -> ApiSuccess {
    let spec = kind.spec();
    let count = listing.items.len();
    ApiSuccess::ok()
        .with(spec.plural, listing.items)
        .with("count", count)
        .merge(listing.pagination)
        .with("filters_applied", listing.filters_applied)
}

fn single(kind: ResourceKind, resource: Resource) -> ApiSuccess {
    ApiSuccess::ok().with(kind.spec().singular, resource)
}

fn updated(kind: ResourceKind, resource: Resource) -> ApiSuccess {
    let spec = kind.spec();
    ApiSuccess::ok()
        .message(format!("{} updated successfully", spec.label))
        .with(spec.singular, resource)
}

fn deleted(kind: ResourceKind) -> ApiSuccess {
    ApiSuccess::ok().message(format!("{} deleted successfully", kind.spec().label))
}

// --- Donors ---

/// create_donor
///
/// [Public Route] Anyone may register a donor. When a bearer token is sent
/// it must be valid, and the donor is recorded as the caller's.
#[utoipa::path(
    post,
    path = "/donors",
    request_body = serde_json::Value,
    responses(
        (status = 201, description = "Donor created", body = serde_json::Value),
        (status = 400, description = "Required fields missing or invalid"),
        (status = 401, description = "A token was sent but is invalid")
    ),
    tag = "donors"
)]
pub async fn create_donor(
    caller: Option<AuthUser>,
    State(mediator): State<ResourceMediator>,
    JsonBody(body): JsonBody,
) -> ApiResult<ApiSuccess> {
    let principal = caller.map(|user| user.principal);
    let rows = mediator
        .create(ResourceKind::Donor, principal.as_ref(), body)
        .await?;
    Ok(created(ResourceKind::Donor, rows))
}

/// list_donors
///
/// [Public Route] Filters: `cause`, `gender`. Search covers name, cause and email.
#[utoipa::path(
    get,
    path = "/donors",
    params(ListParams),
    responses((status = 200, description = "Paginated donors", body = serde_json::Value)),
    tag = "donors"
)]
pub async fn list_donors(
    MaybeAuthUser(principal): MaybeAuthUser,
    State(mediator): State<ResourceMediator>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<ApiSuccess> {
    let page = mediator
        .list(ResourceKind::Donor, &params, principal.as_ref())
        .await?;
    Ok(listing(ResourceKind::Donor, page))
}

#[utoipa::path(
    get,
    path = "/donors/{id}",
    params(("id" = String, Path, description = "Donor id")),
    responses(
        (status = 200, description = "Donor", body = serde_json::Value),
        (status = 404, description = "Not found")
    ),
    tag = "donors"
)]
pub async fn get_donor(
    State(mediator): State<ResourceMediator>,
    Path(id): Path<String>,
) -> ApiResult<ApiSuccess> {
    let donor = mediator.get(ResourceKind::Donor, &id).await?;
    Ok(single(ResourceKind::Donor, donor))
}

/// update_donor
///
/// [Authenticated Route] Owner or admin. Only supplied fields change.
#[utoipa::path(
    put,
    path = "/donors/{id}",
    params(("id" = String, Path, description = "Donor id")),
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Donor updated", body = serde_json::Value),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Not found")
    ),
    tag = "donors"
)]
pub async fn update_donor(
    AuthUser { principal, .. }: AuthUser,
    State(mediator): State<ResourceMediator>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody,
) -> ApiResult<ApiSuccess> {
    let donor = mediator
        .update(ResourceKind::Donor, Some(&principal), &id, body)
        .await?;
    Ok(updated(ResourceKind::Donor, donor))
}

#[utoipa::path(
    delete,
    path = "/donors/{id}",
    params(("id" = String, Path, description = "Donor id")),
    responses(
        (status = 200, description = "Donor deleted"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Not found")
    ),
    tag = "donors"
)]
pub async fn delete_donor(
    AuthUser { principal, .. }: AuthUser,
    State(mediator): State<ResourceMediator>,
    Path(id): Path<String>,
) -> ApiResult<ApiSuccess> {
    mediator
        .delete(ResourceKind::Donor, Some(&principal), &id)
        .await?;
    Ok(deleted(ResourceKind::Donor))
}

// --- Advertisements ---

/// create_advertisement
///
/// [Authenticated Route] One advertisement row is created per entry of
/// `image_urls`; all of them are returned.
#[utoipa::path(
    post,
    path = "/advertisements",
    request_body = serde_json::Value,
    responses(
        (status = 201, description = "Advertisements created", body = serde_json::Value),
        (status = 400, description = "Required fields missing or invalid"),
        (status = 401, description = "Unauthenticated")
    ),
    tag = "advertisements"
)]
pub async fn create_advertisement(
    AuthUser { principal, .. }: AuthUser,
    State(mediator): State<ResourceMediator>,
    JsonBody(body): JsonBody,
) -> ApiResult<ApiSuccess> {
    let rows = mediator
        .create(ResourceKind::Advertisement, Some(&principal), body)
        .await?;
    Ok(created(ResourceKind::Advertisement, rows))
}

/// list_advertisements
///
/// [Public Route] Active advertisements only, highest priority first.
/// Filter: `position`.
#[utoipa::path(
    get,
    path = "/advertisements",
    params(ListParams),
    responses((status = 200, description = "Paginated advertisements", body = serde_json::Value)),
    tag = "advertisements"
)]
pub async fn list_advertisements(
    MaybeAuthUser(principal): MaybeAuthUser,
    State(mediator): State<ResourceMediator>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<ApiSuccess> {
    let page = mediator
        .list(ResourceKind::Advertisement, &params, principal.as_ref())
        .await?;
    Ok(listing(ResourceKind::Advertisement, page))
}

#[utoipa::path(
    get,
    path = "/advertisements/{id}",
    params(("id" = String, Path, description = "Advertisement id")),
    responses(
        (status = 200, description = "Advertisement", body = serde_json::Value),
        (status = 404, description = "Not found")
    ),
    tag = "advertisements"
)]
pub async fn get_advertisement(
    State(mediator): State<ResourceMediator>,
    Path(id): Path<String>,
) -> ApiResult<ApiSuccess> {
    let ad = mediator.get(ResourceKind::Advertisement, &id).await?;
    Ok(single(ResourceKind::Advertisement, ad))
}

#[utoipa::path(
    put,
    path = "/advertisements/{id}",
    params(("id" = String, Path, description = "Advertisement id")),
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Advertisement updated", body = serde_json::Value),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Not found")
    ),
    tag = "advertisements"
)]
pub async fn update_advertisement(
    AuthUser { principal, .. }: AuthUser,
    State(mediator): State<ResourceMediator>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody,
) -> ApiResult<ApiSuccess> {
    let ad = mediator
        .update(ResourceKind::Advertisement, Some(&principal), &id, body)
        .await?;
    Ok(updated(ResourceKind::Advertisement, ad))
}

#[utoipa::path(
    delete,
    path = "/advertisements/{id}",
    params(("id" = String, Path, description = "Advertisement id")),
    responses(
        (status = 200, description = "Advertisement deleted"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Not found")
    ),
    tag = "advertisements"
)]
pub async fn delete_advertisement(
    AuthUser { principal, .. }: AuthUser,
    State(mediator): State<ResourceMediator>,
    Path(id): Path<String>,
) -> ApiResult<ApiSuccess> {
    mediator
        .delete(ResourceKind::Advertisement, Some(&principal), &id)
        .await?;
    Ok(deleted(ResourceKind::Advertisement))
}

// --- Events ---

/// create_event
///
/// [Admin Route] Publishes a news event.
#[utoipa::path(
    post,
    path = "/events",
    request_body = serde_json::Value,
    responses(
        (status = 201, description = "Event created", body = serde_json::Value),
        (status = 400, description = "Required fields missing or invalid"),
        (status = 403, description = "Admin required")
    ),
    tag = "events"
)]
pub async fn create_event(
    AuthUser { principal, .. }: AuthUser,
    State(mediator): State<ResourceMediator>,
    JsonBody(body): JsonBody,
) -> ApiResult<ApiSuccess> {
    let rows = mediator
        .create(ResourceKind::Event, Some(&principal), body)
        .await?;
    Ok(created(ResourceKind::Event, rows))
}

/// list_events
///
/// [Public Route] Filters: `type`, `priority`, `police_status`, `fir_status`;
/// substring filters `location` and `writer`; `date_from` / `date_to` on
/// `created_at`.
#[utoipa::path(
    get,
    path = "/events",
    params(ListParams),
    responses((status = 200, description = "Paginated events", body = serde_json::Value)),
    tag = "events"
)]
pub async fn list_events(
    MaybeAuthUser(principal): MaybeAuthUser,
    State(mediator): State<ResourceMediator>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<ApiSuccess> {
    let page = mediator
        .list(ResourceKind::Event, &params, principal.as_ref())
        .await?;
    Ok(listing(ResourceKind::Event, page))
}

/// list_my_events
///
/// [Authenticated Route] Events created by the caller, same parameters as
/// the public listing.
#[utoipa::path(
    get,
    path = "/events/mine",
    params(ListParams),
    responses((status = 200, description = "Caller's events", body = serde_json::Value)),
    tag = "events"
)]
pub async fn list_my_events(
    AuthUser { principal, .. }: AuthUser,
    State(mediator): State<ResourceMediator>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<ApiSuccess> {
    let page = mediator
        .list_owned(ResourceKind::Event, &params, &principal)
        .await?;
    Ok(listing(ResourceKind::Event, page))
}

#[utoipa::path(
    get,
    path = "/events/{id}",
    params(("id" = String, Path, description = "Event id")),
    responses(
        (status = 200, description = "Event", body = serde_json::Value),
        (status = 404, description = "Not found")
    ),
    tag = "events"
)]
pub async fn get_event(
    State(mediator): State<ResourceMediator>,
    Path(id): Path<String>,
) -> ApiResult<ApiSuccess> {
    let event = mediator.get(ResourceKind::Event, &id).await?;
    Ok(single(ResourceKind::Event, event))
}

#[utoipa::path(
    put,
    path = "/events/{id}",
    params(("id" = String, Path, description = "Event id")),
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Event updated", body = serde_json::Value),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Not found")
    ),
    tag = "events"
)]
pub async fn update_event(
    AuthUser { principal, .. }: AuthUser,
    State(mediator): State<ResourceMediator>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody,
) -> ApiResult<ApiSuccess> {
    let event = mediator
        .update(ResourceKind::Event, Some(&principal), &id, body)
        .await?;
    Ok(updated(ResourceKind::Event, event))
}

/// delete_event
///
/// [Authenticated Route] Owner or admin. The event photo is removed from
/// storage on a best-effort basis.
#[utoipa::path(
    delete,
    path = "/events/{id}",
    params(("id" = String, Path, description = "Event id")),
    responses(
        (status = 200, description = "Event deleted"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Not found")
    ),
    tag = "events"
)]
pub async fn delete_event(
    AuthUser { principal, .. }: AuthUser,
    State(mediator): State<ResourceMediator>,
    Path(id): Path<String>,
) -> ApiResult<ApiSuccess> {
    mediator
        .delete(ResourceKind::Event, Some(&principal), &id)
        .await?;
    Ok(deleted(ResourceKind::Event))
}
