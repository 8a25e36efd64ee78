use clap::Parser;
use dotenvy::dotenv;
use portfolio_cms::config::AppConfig;
use portfolio_cms::infrastructure::{database, storage};
use portfolio_cms::services::image_converter::FfmpegConverter;
use portfolio_cms::services::mailer::{EmailConfig, LogMailer, Mailer, SmtpMailer};
use portfolio_cms::{AppState, create_app};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port for the API server
    #[arg(short, long, default_value_t = 3000)]
    port: u16,

    /// Database URL (overrides DATABASE_URL)
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portfolio_cms=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting Portfolio CMS...");

    let config = AppConfig::production();
    if config.uses_dev_secret() {
        warn!("⚠️ JWT_SECRET is not set; using the development secret");
    }
    info!(
        "🛡️  Config: timeout={:?}, attempts={}, max image={}MB, contact limit={}/h",
        config.request_timeout,
        config.retry_max_attempts,
        config.max_image_size / 1024 / 1024,
        config.contact_limit_per_hour
    );

    let db_url = match args.database_url {
        Some(url) => url,
        None => std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
    };
    let db = database::setup_database(&db_url).await?;
    let storage_service = storage::setup_storage(&config.public_storage_url).await?;

    let mailer: Arc<dyn Mailer> = match EmailConfig::from_env() {
        Some(email) => {
            info!("📧 SMTP relay: {}:{}", email.smtp_host, email.smtp_port);
            Arc::new(SmtpMailer::new(&email)?)
        }
        None => {
            warn!("📭 SMTP_HOST not set; contact messages will only be logged");
            Arc::new(LogMailer)
        }
    };
    let converter = Arc::new(FfmpegConverter::new(config.ffmpeg_path.clone()));

    let state = AppState::new(db, storage_service, mailer, converter, config);

    // Periodically forget expired contact rate-limit windows
    let shutdown = CancellationToken::new();
    let contact = state.contact.clone();
    let cleanup_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(600));
        loop {
            tokio::select! {
                _ = cleanup_shutdown.cancelled() => break,
                _ = interval.tick() => contact.cleanup(),
            }
        }
    });

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        })
        .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
            info!("📥 {} {}", request.method(), request.uri());
        })
        .on_response(
            |response: &axum::http::Response<_>,
             latency: std::time::Duration,
             _span: &tracing::Span| {
                info!(
                    "📤 Finished in {:?} with status {}",
                    latency,
                    response.status()
                );
            },
        );

    let app = create_app(state).layer(trace_layer);
    let addr = SocketAddr::new(args.host, args.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("✅ Server ready at http://{}", addr);
    info!("📖 Swagger UI: http://{}/swagger-ui", addr);

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    {
        error!("❌ Server runtime error: {}", e);
    }

    shutdown.cancel();
    info!("🛑 Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("❌ Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("❌ Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, starting graceful shutdown...");
        },
    }
}
