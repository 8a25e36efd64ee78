use super::CrudBackend;
use crate::api::IDEMPOTENCY_KEY;
use crate::error::{DataError, FieldError};
use crate::forms::FieldSpec;
use crate::models::{Patch, Record, TableKind};
use crate::services::image_upload::{ImageUpload, ImageUploader, UploadedImage};
use crate::utils::retry::{RetryPolicy, retry_with_timeout};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode, multipart};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

/// Error body returned by the admin API.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    fields: Option<Vec<FieldError>>,
    #[serde(default)]
    retry_after_secs: Option<u64>,
}

fn error_from_response(status: StatusCode, body: ErrorBody) -> DataError {
    let msg = if body.error.is_empty() {
        status.to_string()
    } else {
        body.error
    };
    let retry_after = Duration::from_secs(body.retry_after_secs.unwrap_or(60));

    match body.code.as_deref() {
        Some("VALIDATION") => DataError::Validation(
            body.fields
                .unwrap_or_else(|| vec![FieldError::new("payload", msg)]),
        ),
        Some("NOT_FOUND") => DataError::NotFound(msg),
        Some("REFERENTIAL") => DataError::Referential(msg),
        Some("CONVERSION_FAILED") => DataError::Conversion(msg),
        Some("UNSUPPORTED_FORMAT") => DataError::UnsupportedFormat(msg),
        Some("FILE_TOO_LARGE") => DataError::PayloadTooLarge(msg),
        Some("RATE_LIMITED") => DataError::RateLimited { retry_after },
        Some("UNAUTHORIZED") => DataError::Unauthorized(msg),
        Some("MAIL") => DataError::Mail(msg),
        _ => match status {
            s if s.is_server_error() => DataError::Transient(format!("{}: {}", s, msg)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DataError::Unauthorized(msg),
            StatusCode::NOT_FOUND => DataError::NotFound(msg),
            StatusCode::CONFLICT => DataError::Referential(msg),
            StatusCode::PAYLOAD_TOO_LARGE => DataError::PayloadTooLarge(msg),
            StatusCode::TOO_MANY_REQUESTS => DataError::RateLimited { retry_after },
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                DataError::validation("payload", msg)
            }
            _ => DataError::Database(msg),
        },
    }
}

/// HTTP client for the admin API, sharing the data client's timeout and
/// retry policy.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    token: Option<String>,
    policy: RetryPolicy,
}

impl ApiClient {
    pub fn new(base_url: &str, policy: RetryPolicy) -> Result<Self, DataError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| DataError::validation("base_url", e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(DataError::validation("base_url", "not a base URL"));
        }
        let http = reqwest::Client::builder()
            .connect_timeout(policy.timeout)
            .build()
            .map_err(|e| DataError::Transient(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            token: None,
            policy,
        })
    }

    /// Session token sent as a bearer credential.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn map_transport(&self, e: reqwest::Error) -> DataError {
        if e.is_timeout() {
            DataError::Timeout(self.policy.timeout)
        } else if e.is_decode() {
            DataError::Database(format!("Malformed response: {}", e))
        } else {
            DataError::Transient(e.to_string())
        }
    }

    async fn check(&self, response: Response) -> Result<Response, DataError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.json::<ErrorBody>().await.unwrap_or_default();
        Err(error_from_response(status, body))
    }

    /// Sends the request built by `build` under the retry policy. The
    /// builder runs once per attempt.
    async fn send<F>(&self, op_name: &str, build: F) -> Result<Response, DataError>
    where
        F: Fn() -> Result<RequestBuilder, DataError>,
    {
        retry_with_timeout(&self.policy, op_name, || {
            let request = build();
            async move {
                let response = request?.send().await.map_err(|e| self.map_transport(e))?;
                self.check(response).await
            }
        })
        .await
    }

    async fn json<T: DeserializeOwned>(&self, response: Response) -> Result<T, DataError> {
        response.json::<T>().await.map_err(|e| self.map_transport(e))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, DataError> {
        let url = self.endpoint(segments);
        let response = self
            .send(&format!("GET {}", url.path()), || {
                Ok(self.request(Method::GET, url.clone()))
            })
            .await?;
        self.json(response).await
    }

    pub async fn send_json<T, B>(
        &self,
        method: Method,
        segments: &[&str],
        body: &B,
    ) -> Result<T, DataError>
    where
        T: DeserializeOwned,
        B: serde::Serialize + ?Sized + Sync,
    {
        let url = self.endpoint(segments);
        let response = self
            .send(&format!("{} {}", method, url.path()), || {
                Ok(self.request(method.clone(), url.clone()).json(body))
            })
            .await?;
        self.json(response).await
    }

    /// POST with one idempotency key for every attempt, so a retry after a
    /// timeout replays the original request instead of repeating it.
    pub async fn post_json_idempotent<T, B>(
        &self,
        segments: &[&str],
        body: &B,
        key: &str,
    ) -> Result<T, DataError>
    where
        T: DeserializeOwned,
        B: serde::Serialize + ?Sized + Sync,
    {
        let url = self.endpoint(segments);
        let response = self
            .send(&format!("POST {}", url.path()), || {
                Ok(self
                    .request(Method::POST, url.clone())
                    .header(IDEMPOTENCY_KEY, key)
                    .json(body))
            })
            .await?;
        self.json(response).await
    }

    pub async fn delete(&self, segments: &[&str]) -> Result<(), DataError> {
        let url = self.endpoint(segments);
        self.send(&format!("DELETE {}", url.path()), || {
            Ok(self.request(Method::DELETE, url.clone()))
        })
        .await?;
        Ok(())
    }

    /// Field descriptors the server validates `table` with.
    pub async fn schema(&self, table: TableKind) -> Result<Vec<FieldSpec>, DataError> {
        self.get_json(&["admin", "api", table.name(), "schema"]).await
    }

    pub fn table<R: Record>(&self, table: TableKind) -> RemoteTable<R> {
        RemoteTable {
            client: self.clone(),
            table,
            _record: PhantomData,
        }
    }
}

#[async_trait]
impl ImageUploader for ApiClient {
    async fn upload(&self, folder: &str, file: ImageUpload) -> Result<UploadedImage, DataError> {
        let mut url = self.endpoint(&["admin", "api", "images"]);
        url.query_pairs_mut().append_pair("folder", folder);
        let key = file
            .upload_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let response = self
            .send("POST images", || {
                let mut part = multipart::Part::bytes(file.data.clone())
                    .file_name(file.file_name.clone());
                if let Some(content_type) = &file.content_type {
                    part = part
                        .mime_str(content_type)
                        .map_err(|e| DataError::UnsupportedFormat(e.to_string()))?;
                }
                let form = multipart::Form::new().part("file", part);
                Ok(self
                    .request(Method::POST, url.clone())
                    .header(IDEMPOTENCY_KEY, key.as_str())
                    .multipart(form))
            })
            .await?;
        self.json(response).await
    }
}

/// A [`CrudBackend`] over the admin HTTP API.
pub struct RemoteTable<R> {
    client: ApiClient,
    table: TableKind,
    _record: PhantomData<fn() -> R>,
}

#[async_trait]
impl<R: Record> CrudBackend<R> for RemoteTable<R> {
    async fn list(&self) -> Result<Vec<R>, DataError> {
        self.client
            .get_json(&["admin", "api", self.table.name()])
            .await
    }

    async fn create(&self, record: R) -> Result<R, DataError> {
        let key = Uuid::new_v4().to_string();
        self.client
            .post_json_idempotent(&["admin", "api", self.table.name()], &record, &key)
            .await
    }

    async fn update(&self, id: &str, patch: &Patch) -> Result<R, DataError> {
        self.client
            .send_json(
                Method::PATCH,
                &["admin", "api", self.table.name(), id],
                patch,
            )
            .await
    }

    async fn delete(&self, id: &str) -> Result<(), DataError> {
        self.client
            .delete(&["admin", "api", self.table.name(), id])
            .await
    }
}
