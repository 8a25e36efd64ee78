#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use portfolio_cms::config::AppConfig;
use portfolio_cms::error::DataError;
use portfolio_cms::infrastructure::{database, seed};
use portfolio_cms::services::data_client::DataClient;
use portfolio_cms::services::image_converter::{ImageConverter, encode_jpeg};
use portfolio_cms::services::mailer::{ContactMessage, Mailer};
use portfolio_cms::services::storage::StorageService;
use portfolio_cms::utils::auth::create_jwt;
use portfolio_cms::utils::retry::RetryPolicy;
use portfolio_cms::{AppState, create_app};
use dashmap::DashMap;
use sea_orm::{Database, DatabaseConnection};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TEST_SECRET: &str = "test-secret";

pub async fn setup_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    database::run_migrations(&db).await.unwrap();
    seed::seed_initial_data(&db).await.unwrap();
    db
}

pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        multiplier: 2.0,
        jitter: 0.0,
        timeout: Duration::from_secs(2),
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        request_timeout: Duration::from_secs(2),
        retry_base_delay: Duration::from_millis(1),
        retry_max_delay: Duration::from_millis(5),
        max_image_size: 64 * 1024,
        public_storage_url: "https://media.test".to_string(),
        contact_limit_per_hour: 2,
        contact_recipient: "studio@example.com".to_string(),
        jwt_secret: TEST_SECRET.to_string(),
        ..AppConfig::default()
    }
}

/// In-memory object store with switches for the failure modes uploads and
/// migrations have to survive.
#[derive(Default)]
pub struct MockStorageService {
    pub objects: DashMap<String, (Vec<u8>, String)>,
    pub puts: AtomicUsize,
    /// Every put fails.
    pub fail_puts: AtomicBool,
    /// Puts report success but the object never becomes visible.
    pub lose_puts: AtomicBool,
    /// Puts whose key contains this fragment fail.
    pub fail_keys_containing: Mutex<Option<String>>,
}

impl MockStorageService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn upload_file(&self, key: &str, data: Vec<u8>, content_type: &str) -> anyhow::Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts.load(Ordering::SeqCst) {
            anyhow::bail!("storage unavailable");
        }
        if let Some(fragment) = self.fail_keys_containing.lock().unwrap().as_deref() {
            if key.contains(fragment) {
                anyhow::bail!("write rejected for {}", key);
            }
        }
        if !self.lose_puts.load(Ordering::SeqCst) {
            self.objects
                .insert(key.to_string(), (data, content_type.to_string()));
        }
        Ok(())
    }

    async fn delete_file(&self, key: &str) -> anyhow::Result<()> {
        self.objects.remove(key);
        Ok(())
    }

    async fn file_exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.objects.contains_key(key))
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://media.test/{}", key)
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<(String, ContactMessage)>>,
    pub fail: AtomicBool,
}

impl RecordingMailer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, message: &ContactMessage) -> Result<(), DataError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DataError::Mail("relay refused connection".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), message.clone()));
        Ok(())
    }
}

/// Stands in for ffmpeg: "converts" by re-encoding a generated PNG.
#[derive(Default)]
pub struct FakeConverter {
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

impl FakeConverter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl ImageConverter for FakeConverter {
    async fn heic_to_jpeg(&self, _data: &[u8]) -> Result<Vec<u8>, DataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(DataError::Conversion(
                "Could not convert HEIC image; try exporting it as JPEG".to_string(),
            ));
        }
        encode_jpeg(&png_bytes(), 80)
    }
}

pub fn png_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(3, 3, image::Rgb([30, 120, 200]));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

pub fn admin_token() -> String {
    create_jwt("admin-1", "authenticated", TEST_SECRET, 1).unwrap()
}

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub db: DatabaseConnection,
    pub storage: Arc<MockStorageService>,
    pub mailer: Arc<RecordingMailer>,
    pub converter: Arc<FakeConverter>,
}

pub async fn test_app() -> TestApp {
    let db = setup_test_db().await;
    let storage = MockStorageService::new();
    let mailer = RecordingMailer::new();
    let converter = FakeConverter::new();

    let state = AppState::new(
        db.clone(),
        storage.clone(),
        mailer.clone(),
        converter.clone(),
        test_config(),
    );

    TestApp {
        app: create_app(state.clone()),
        state,
        db,
        storage,
        mailer,
        converter,
    }
}

pub async fn data_client() -> (DataClient, Arc<MockStorageService>) {
    let db = setup_test_db().await;
    let storage = MockStorageService::new();
    (DataClient::new(db, storage.clone(), fast_policy()), storage)
}
