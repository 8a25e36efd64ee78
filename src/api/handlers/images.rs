use crate::AppState;
use crate::api::error::AppError;
use crate::api::idempotency_key;
use crate::error::DataError;
use crate::services::image_upload::{DEFAULT_FOLDER, ImageUpload, UploadedImage};
use axum::{
    Json,
    extract::{Multipart, Query, State, multipart::MultipartError},
    http::{HeaderMap, StatusCode},
};
use serde::Deserialize;

#[derive(Deserialize)]
pub struct UploadQuery {
    folder: Option<String>,
}

/// Body-limit rejections surface as 413, anything else as a malformed request.
fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::Data(DataError::PayloadTooLarge(e.body_text()))
    } else {
        AppError::BadRequest(e.body_text())
    }
}

#[utoipa::path(
    post,
    path = "/admin/api/images",
    params(
        ("folder" = Option<String>, Query, description = "Storage folder, usually the table name"),
        ("idempotency-key" = Option<String>, Header, description = "Retries with the same key overwrite the same object")
    ),
    request_body(content = Object, description = "Image in a `file` field", content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Stored image", body = UploadedImage),
        (status = 413, description = "File too large"),
        (status = 415, description = "Unsupported format"),
        (status = 422, description = "HEIC conversion failed")
    ),
    security(("jwt" = [])),
    tag = "admin"
)]
pub async fn upload_image(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadedImage>, AppError> {
    let folder = query.folder.unwrap_or_else(|| DEFAULT_FOLDER.to_string());

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(multipart_error)?
            .to_vec();
        upload = Some(ImageUpload {
            file_name,
            content_type,
            data,
            upload_id: idempotency_key(&headers).map(str::to_string),
        });
        break;
    }

    let upload =
        upload.ok_or_else(|| AppError::BadRequest("No file found in request".to_string()))?;
    Ok(Json(state.uploader.upload(&folder, upload).await?))
}
