use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::engine::{StatusEngine, Transition};
use crate::error::TrackerError;
use crate::models::*;

type ApiResult<T> = Result<T, (StatusCode, String)>;

// ============================================================
// Error Handling
// ============================================================

/// Map store errors to HTTP statuses. Database failures are logged in full
/// and returned to the client as a generic message.
fn api_error(e: TrackerError) -> (StatusCode, String) {
    let status = match e {
        TrackerError::ItemNotFound(_) => StatusCode::NOT_FOUND,
        TrackerError::InvalidKey(_)
        | TrackerError::InvalidEnumValue { .. }
        | TrackerError::FieldNotSupported { .. } => StatusCode::BAD_REQUEST,
        TrackerError::DuplicateKey(_) | TrackerError::HasDependents { .. } => StatusCode::CONFLICT,
        TrackerError::ParentNotFound { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        TrackerError::Database(ref err) => {
            tracing::error!("Internal error: {}", err);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            );
        }
    };
    tracing::warn!("Request rejected: {}", e);
    (status, e.to_string())
}

fn parse_key(raw: &str) -> ApiResult<ItemKey> {
    ItemKey::parse(raw).map_err(api_error)
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Items
// ============================================================

#[derive(Debug, Deserialize)]
pub struct ListItemsQuery {
    pub kind: Option<ItemKind>,
    pub parent: Option<ItemKey>,
    pub status: Option<Status>,
}

pub async fn list_items(
    State(db): State<Database>,
    Query(query): Query<ListItemsQuery>,
) -> ApiResult<Json<Vec<WorkItem>>> {
    let filter = ItemFilter {
        parent: query.parent,
        status: query.status,
    };
    let items = match query.kind {
        Some(kind) => db.list_items(kind, &filter),
        None => db.all_items().map(|items| {
            items
                .into_iter()
                .filter(|i| filter.parent.is_none() || i.parent == filter.parent)
                .filter(|i| filter.status.map_or(true, |s| s == i.status))
                .collect()
        }),
    };
    items.map(Json).map_err(api_error)
}

pub async fn create_item(
    State(db): State<Database>,
    Json(input): Json<CreateItemInput>,
) -> ApiResult<(StatusCode, Json<WorkItem>)> {
    db.create(input)
        .map(|item| (StatusCode::CREATED, Json(item)))
        .map_err(api_error)
}

pub async fn get_item(
    State(db): State<Database>,
    Path(key): Path<String>,
) -> ApiResult<Json<ItemDetail>> {
    let key = parse_key(&key)?;
    db.get_detail(&key).map(Json).map_err(api_error)
}

/// Field patch. A status change goes through the status engine so the
/// timestamp rules apply; timestamps themselves are not patchable.
pub async fn update_item(
    State(db): State<Database>,
    Path(key): Path<String>,
    Json(patch): Json<ItemPatch>,
) -> ApiResult<Json<WorkItem>> {
    let key = parse_key(&key)?;
    StatusEngine::new(&db)
        .apply(&key, patch)
        .map(|(item, _)| Json(item))
        .map_err(api_error)
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub cascade: bool,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub key: ItemKey,
    pub removed: usize,
}

pub async fn delete_item(
    State(db): State<Database>,
    Path(key): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> ApiResult<Json<DeleteResponse>> {
    let key = parse_key(&key)?;
    let removed = db.delete(&key, query.cascade).map_err(api_error)?;
    Ok(Json(DeleteResponse { key, removed }))
}

#[derive(Debug, Deserialize)]
pub struct SetStatusInput {
    pub status: Status,
}

pub async fn set_status(
    State(db): State<Database>,
    Path(key): Path<String>,
    Json(input): Json<SetStatusInput>,
) -> ApiResult<Json<Transition>> {
    let key = parse_key(&key)?;
    StatusEngine::new(&db)
        .transition(&key, input.status)
        .map(Json)
        .map_err(api_error)
}

// ============================================================
// Progress
// ============================================================

pub async fn overall_progress(State(db): State<Database>) -> ApiResult<Json<OverallProgress>> {
    db.overall_progress().map(Json).map_err(api_error)
}

pub async fn epic_progress(State(db): State<Database>) -> ApiResult<Json<Vec<EpicProgress>>> {
    db.epic_progress().map(Json).map_err(api_error)
}

pub async fn current_work(State(db): State<Database>) -> ApiResult<Json<Vec<CurrentWork>>> {
    db.current_work().map(Json).map_err(api_error)
}
