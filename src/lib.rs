pub mod admin;
pub mod api;
pub mod config;
pub mod entities;
pub mod error;
pub mod forms;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::AppConfig;
use crate::services::contact::ContactService;
use crate::services::data_client::DataClient;
use crate::services::image_converter::ImageConverter;
use crate::services::image_upload::{ImageUploadService, ImageUploader};
use crate::services::mailer::Mailer;
use crate::services::site_service::SiteService;
use crate::services::storage::StorageService;
use crate::services::table_gateway::TableRegistry;
use crate::utils::rate_limit::RateLimiter;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::health::health_check,
        api::handlers::site::get_site,
        api::handlers::site::get_portfolio,
        api::handlers::contact::submit_contact,
        api::handlers::admin::table_schema,
        api::handlers::admin::list_rows,
        api::handlers::admin::create_row,
        api::handlers::admin::update_row,
        api::handlers::admin::delete_row,
        api::handlers::images::upload_image,
    ),
    components(
        schemas(
            api::handlers::health::HealthResponse,
            api::handlers::contact::ContactResponse,
            services::contact::ContactRequest,
            services::image_upload::UploadedImage,
            forms::FieldSpec,
            forms::FieldKind,
            forms::FieldRule,
            forms::SelectOption,
            error::FieldError,
        )
    ),
    tags(
        (name = "site", description = "Public site content and contact form"),
        (name = "admin", description = "Authenticated content management"),
        (name = "system", description = "Health and diagnostics")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub data: DataClient,
    pub tables: TableRegistry,
    pub site: SiteService,
    pub uploader: Arc<dyn ImageUploader>,
    pub contact: Arc<ContactService>,
    pub config: AppConfig,
}

impl AppState {
    /// Wires every service onto one shared data client.
    pub fn new(
        db: DatabaseConnection,
        storage: Arc<dyn StorageService>,
        mailer: Arc<dyn Mailer>,
        converter: Arc<dyn ImageConverter>,
        config: AppConfig,
    ) -> Self {
        let data = DataClient::new(db, storage, config.retry_policy());
        let uploader = Arc::new(ImageUploadService::new(
            data.clone(),
            converter,
            config.max_image_size,
        ));
        let contact = Arc::new(ContactService::new(
            mailer,
            RateLimiter::per_hour(config.contact_limit_per_hour),
            config.contact_recipient.clone(),
        ));

        Self {
            tables: TableRegistry::new(&data),
            site: SiteService::new(data.clone()),
            uploader,
            contact,
            data,
            config,
        }
    }
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
        ])
        .max_age(Duration::from_secs(3600));

    if config.allowed_origins.is_empty() {
        return cors.allow_origin(Any).allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(origin) => Some(origin),
            Err(_) => {
                tracing::warn!("⚠️ Ignoring invalid CORS origin '{}'", o);
                None
            }
        })
        .collect();

    cors.allow_origin(origins)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

pub fn create_app(state: AppState) -> Router {
    let admin = Router::new()
        .route(
            "/admin/api/images",
            post(api::handlers::images::upload_image).layer(DefaultBodyLimit::max(
                state.config.max_image_size + 1024 * 1024, // multipart overhead
            )),
        )
        .route(
            "/admin/api/:table",
            get(api::handlers::admin::list_rows).post(api::handlers::admin::create_row),
        )
        .route(
            "/admin/api/:table/schema",
            get(api::handlers::admin::table_schema),
        )
        .route(
            "/admin/api/:table/:id",
            axum::routing::patch(api::handlers::admin::update_row)
                .delete(api::handlers::admin::delete_row),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            api::middleware::auth::auth_middleware,
        ));

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route("/api/site", get(api::handlers::site::get_site))
        .route(
            "/api/portfolio/:category",
            get(api::handlers::site::get_portfolio),
        )
        .route("/api/contact", post(api::handlers::contact::submit_contact))
        .merge(admin)
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(cors_layer(&state.config))
        .with_state(state)
}
