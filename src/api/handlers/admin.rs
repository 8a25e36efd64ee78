use crate::AppState;
use crate::api::error::AppError;
use crate::api::idempotency_key;
use crate::forms::{FieldSpec, schema_for};
use crate::models::TableKind;
use crate::utils::auth::Claims;
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use serde_json::{Map, Value};
use tracing::info;

fn table(name: &str) -> Result<TableKind, AppError> {
    name.parse::<TableKind>()
        .map_err(|_| AppError::NotFound(format!("Unknown table '{}'", name)))
}

#[utoipa::path(
    get,
    path = "/admin/api/{table}/schema",
    params(("table" = String, Path, description = "Admin table name")),
    responses(
        (status = 200, description = "Field descriptors for the table form", body = Vec<FieldSpec>),
        (status = 404, description = "Unknown table")
    ),
    security(("jwt" = [])),
    tag = "admin"
)]
pub async fn table_schema(Path(name): Path<String>) -> Result<Json<Vec<FieldSpec>>, AppError> {
    Ok(Json(schema_for(table(&name)?)))
}

#[utoipa::path(
    get,
    path = "/admin/api/{table}",
    params(("table" = String, Path, description = "Admin table name")),
    responses(
        (status = 200, description = "Rows in server order, annotated with `_image_refs`"),
        (status = 401, description = "Unauthorized")
    ),
    security(("jwt" = [])),
    tag = "admin"
)]
pub async fn list_rows(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<Value>>, AppError> {
    let gateway = state.tables.get(table(&name)?)?;
    Ok(Json(gateway.list_json().await?))
}

#[utoipa::path(
    post,
    path = "/admin/api/{table}",
    params(
        ("table" = String, Path, description = "Admin table name"),
        ("idempotency-key" = Option<String>, Header, description = "Replays with the same key return the first result")
    ),
    request_body(content = Object, description = "Row fields"),
    responses(
        (status = 201, description = "Created row"),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Referenced row missing")
    ),
    security(("jwt" = [])),
    tag = "admin"
)]
pub async fn create_row(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<Map<String, Value>>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let gateway = state.tables.get(table(&name)?)?;
    let row = gateway
        .create_json_keyed(payload, idempotency_key(&headers))
        .await?;
    info!("✏️ {} created a {} row", claims.sub, name);
    Ok((StatusCode::CREATED, Json(row)))
}

#[utoipa::path(
    patch,
    path = "/admin/api/{table}/{id}",
    params(
        ("table" = String, Path, description = "Admin table name"),
        ("id" = String, Path, description = "Row id")
    ),
    request_body(content = Object, description = "Fields to change"),
    responses(
        (status = 200, description = "Updated row"),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Row not found")
    ),
    security(("jwt" = [])),
    tag = "admin"
)]
pub async fn update_row(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((name, id)): Path<(String, String)>,
    Json(patch): Json<Map<String, Value>>,
) -> Result<Json<Value>, AppError> {
    let gateway = state.tables.get(table(&name)?)?;
    let row = gateway.update_json(&id, patch).await?;
    info!("✏️ {} updated {} row {}", claims.sub, name, id);
    Ok(Json(row))
}

#[utoipa::path(
    delete,
    path = "/admin/api/{table}/{id}",
    params(
        ("table" = String, Path, description = "Admin table name"),
        ("id" = String, Path, description = "Row id")
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Row not found"),
        (status = 409, description = "Row is still referenced")
    ),
    security(("jwt" = [])),
    tag = "admin"
)]
pub async fn delete_row(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((name, id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    let gateway = state.tables.get(table(&name)?)?;
    gateway.delete(&id).await?;
    info!("🗑️ {} deleted {} row {}", claims.sub, name, id);
    Ok(StatusCode::NO_CONTENT)
}
