use crate::error::DataError;
use crate::services::data_client::DataClient;
use crate::services::image_converter::{ImageConverter, verify_decodable};
use async_trait::async_trait;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

pub const DEFAULT_FOLDER: &str = "uploads";

/// A user-selected file, as received from a form.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    /// Content type declared by the browser, if any.
    pub content_type: Option<String>,
    pub data: Vec<u8>,
    /// Client-chosen id; retries carrying the same id overwrite one object.
    pub upload_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UploadedImage {
    pub url: String,
    pub key: String,
    pub content_type: String,
    pub size: usize,
}

/// Anything that turns a selected file into a public URL.
#[async_trait]
pub trait ImageUploader: Send + Sync {
    async fn upload(&self, folder: &str, file: ImageUpload) -> Result<UploadedImage, DataError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceFormat {
    Heic,
    Web(ImageFormat),
}

fn mime_from_extension(file_name: &str) -> Option<&'static str> {
    let ext = file_name.rsplit_once('.')?.1.to_ascii_lowercase();
    match ext.as_str() {
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

/// Magic bytes win over whatever the browser declared.
fn detect_format(file: &ImageUpload) -> Result<SourceFormat, DataError> {
    let sniffed = infer::get(&file.data).map(|t| t.mime_type().to_string());
    let mime = sniffed
        .or_else(|| file.content_type.clone())
        .or_else(|| mime_from_extension(&file.file_name).map(str::to_string))
        .unwrap_or_else(|| "application/octet-stream".to_string());

    match mime.as_str() {
        "image/heic" | "image/heif" | "image/heic-sequence" | "image/heif-sequence" => {
            Ok(SourceFormat::Heic)
        }
        "image/jpeg" => Ok(SourceFormat::Web(ImageFormat::Jpeg)),
        "image/png" => Ok(SourceFormat::Web(ImageFormat::Png)),
        "image/webp" => Ok(SourceFormat::Web(ImageFormat::WebP)),
        "image/gif" => Ok(SourceFormat::Web(ImageFormat::Gif)),
        other => Err(DataError::UnsupportedFormat(format!(
            "'{}' ({}) is not a supported image; use JPEG, PNG, WebP, GIF or HEIC",
            file.file_name, other
        ))),
    }
}

fn web_format_meta(format: ImageFormat) -> (&'static str, &'static str) {
    match format {
        ImageFormat::Png => ("image/png", "png"),
        ImageFormat::WebP => ("image/webp", "webp"),
        ImageFormat::Gif => ("image/gif", "gif"),
        _ => ("image/jpeg", "jpg"),
    }
}

/// Storage folders are plain path segments.
pub fn validate_folder(folder: &str) -> Result<(), DataError> {
    let ok = !folder.is_empty()
        && folder.len() <= 64
        && folder
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(DataError::validation(
            "folder",
            "Only lowercase letters, digits, '-' and '_'",
        ))
    }
}

/// Storage key for an upload. Stable for a given upload id.
fn object_key(folder: &str, upload_id: Option<&str>, ext: &str) -> String {
    let name = match upload_id {
        Some(id) => Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("{}:{}", folder, id).as_bytes()),
        None => Uuid::new_v4(),
    };
    format!("{}/{}.{}", folder, name, ext)
}

/// Validates, converts and stores admin images.
pub struct ImageUploadService {
    client: DataClient,
    converter: Arc<dyn ImageConverter>,
    max_size: usize,
}

impl ImageUploadService {
    pub fn new(client: DataClient, converter: Arc<dyn ImageConverter>, max_size: usize) -> Self {
        Self {
            client,
            converter,
            max_size,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    async fn discard(&self, key: &str) {
        if let Err(e) = self.client.delete_object(key).await {
            warn!("⚠️ Could not remove unverified upload {}: {}", key, e);
        }
    }
}

#[async_trait]
impl ImageUploader for ImageUploadService {
    async fn upload(&self, folder: &str, file: ImageUpload) -> Result<UploadedImage, DataError> {
        validate_folder(folder)?;

        if file.data.is_empty() {
            return Err(DataError::validation("file", "The selected file is empty"));
        }
        if file.data.len() > self.max_size {
            return Err(DataError::PayloadTooLarge(format!(
                "'{}' is {} bytes; the limit is {} bytes",
                file.file_name,
                file.data.len(),
                self.max_size
            )));
        }

        let (bytes, content_type, ext) = match detect_format(&file)? {
            SourceFormat::Heic => {
                info!("🔄 Converting HEIC upload '{}' to JPEG", file.file_name);
                let jpeg = self.converter.heic_to_jpeg(&file.data).await?;
                (jpeg, "image/jpeg", "jpg")
            }
            SourceFormat::Web(format) => {
                verify_decodable(&file.data, format)?;
                let (mime, ext) = web_format_meta(format);
                (file.data, mime, ext)
            }
        };

        let key = object_key(folder, file.upload_id.as_deref(), ext);
        let size = bytes.len();

        if let Err(e) = self.client.put_object(&key, bytes, content_type).await {
            // A timed-out put may still have landed.
            self.discard(&key).await;
            return Err(e);
        }

        match self.client.object_exists(&key).await {
            Ok(true) => {}
            Ok(false) => {
                self.discard(&key).await;
                return Err(DataError::Storage(format!(
                    "Upload of {} could not be verified",
                    key
                )));
            }
            Err(e) => {
                self.discard(&key).await;
                return Err(e);
            }
        }

        info!("🖼️ Stored image {} ({} bytes)", key, size);
        Ok(UploadedImage {
            url: self.client.public_url(&key),
            key,
            content_type: content_type.to_string(),
            size,
        })
    }
}
