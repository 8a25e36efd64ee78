use crate::services::storage::S3StorageService;
use aws_sdk_s3::config::Region;
use std::env;
use std::sync::Arc;
use tracing::info;

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("{} must be set", key))
}

/// S3-compatible object storage (MinIO locally, the hosted bucket in
/// production).
pub async fn setup_storage(public_base_url: &str) -> anyhow::Result<Arc<S3StorageService>> {
    let endpoint_url = required("MINIO_ENDPOINT")?;
    let access_key = required("MINIO_ACCESS_KEY")?;
    let secret_key = required("MINIO_SECRET_KEY")?;
    let bucket = required("MINIO_BUCKET")?;
    let region = env::var("MINIO_REGION").unwrap_or_else(|_| "us-east-1".to_string());

    info!("☁️  S3 Storage: {} (Bucket: {})", endpoint_url, bucket);

    let aws_config = aws_config::from_env()
        .endpoint_url(&endpoint_url)
        .region(Region::new(region))
        .credentials_provider(aws_sdk_s3::config::Credentials::new(
            access_key, secret_key, None, None, "static",
        ))
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(true)
        .build();

    let s3_client = aws_sdk_s3::Client::from_conf(s3_config);
    Ok(Arc::new(S3StorageService::new(
        s3_client,
        bucket,
        public_base_url.to_string(),
    )))
}
