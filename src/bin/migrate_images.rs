use clap::Parser;
use dotenvy::dotenv;
use portfolio_cms::config::AppConfig;
use portfolio_cms::infrastructure::{database, storage};
use portfolio_cms::models::TableKind;
use portfolio_cms::services::data_client::DataClient;
use portfolio_cms::services::image_migration::{ImageMigrator, MigrationMode};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Moves inline base64 images out of content rows into object storage and
/// rewrites the rows to reference the stored URL. Safe to re-run.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Report what would change without uploading or writing
    #[arg(long)]
    dry_run: bool,

    /// Restrict to these tables (repeatable); all image tables by default
    #[arg(long = "table")]
    tables: Vec<String>,

    /// Verify each upload by requesting its public URL
    #[arg(long)]
    verify_http: bool,

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
                .unwrap_or_else(|_| "migrate_images=info,portfolio_cms=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let tables = args
        .tables
        .iter()
        .map(|t| t.parse::<TableKind>())
        .collect::<Result<Vec<_>, _>>()?;

    let mode = if args.dry_run {
        MigrationMode::DryRun
    } else {
        MigrationMode::Apply
    };
    info!("🖼️  Starting image migration ({:?})...", mode);

    let config = AppConfig::from_env();
    let db_url = match args.database_url {
        Some(url) => url,
        None => std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
    };
    let db = database::setup_database(&db_url).await?;
    let storage_service = storage::setup_storage(&config.public_storage_url).await?;

    let client = DataClient::new(db, storage_service, config.retry_policy());
    let mut migrator = ImageMigrator::new(client, mode);
    if args.verify_http {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        migrator = migrator.verify_over_http(http);
    }

    let report = migrator.run(&tables).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.has_failures() {
        error!("❌ {} row(s) failed to migrate", report.failures.len());
        std::process::exit(1);
    }

    info!("✅ Image migration complete.");
    Ok(())
}
