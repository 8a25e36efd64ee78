use crate::entities::{about, client_images, clients, navbar_links, portfolio_categories, settings};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, EntityTrait,
    Schema,
};
use std::time::Duration;
use tracing::info;

pub async fn setup_database(db_url: &str) -> anyhow::Result<DatabaseConnection> {
    info!("📂 Database: {}", redact(db_url));

    let mut opt = ConnectOptions::new(db_url);
    opt.max_connections(20)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let db = Database::connect(opt).await?;

    info!("✅ Database connected successfully");

    run_migrations(&db).await?;
    crate::infrastructure::seed::seed_initial_data(&db).await?;

    Ok(db)
}

/// Hides the password part of a connection URL.
fn redact(db_url: &str) -> String {
    match url::Url::parse(db_url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("***"));
            parsed.to_string()
        }
        _ => db_url.to_string(),
    }
}

fn create_table<E: EntityTrait>(
    db: &DatabaseConnection,
    schema: &Schema,
    entity: E,
) -> sea_orm::Statement {
    let mut stmt = schema.create_table_from_entity(entity);
    stmt.if_not_exists();
    db.get_database_backend().build(&stmt)
}

pub async fn run_migrations(db: &DatabaseConnection) -> anyhow::Result<()> {
    let builder = db.get_database_backend();

    if builder == DatabaseBackend::Postgres {
        info!("🔄 Running SQLx migrations for PostgreSQL...");
        sqlx::migrate!("./migrations")
            .run(db.get_postgres_connection_pool())
            .await?;
        return Ok(());
    }

    info!("🔄 Running SeaORM auto-migrations for SQLite/Other...");
    let schema = Schema::new(builder);

    // Parents before children: categories -> clients -> client_images
    let stmts = vec![
        ("settings", create_table(db, &schema, settings::Entity)),
        ("about", create_table(db, &schema, about::Entity)),
        (
            "portfolio_categories",
            create_table(db, &schema, portfolio_categories::Entity),
        ),
        ("clients", create_table(db, &schema, clients::Entity)),
        ("client_images", create_table(db, &schema, client_images::Entity)),
        ("navbar_links", create_table(db, &schema, navbar_links::Entity)),
    ];

    for (name, stmt) in stmts {
        db.execute(stmt).await?;
        info!("   - Table '{}' checked/created", name);
    }

    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_clients_category_id ON clients(category_id)",
        "CREATE INDEX IF NOT EXISTS idx_client_images_client_id ON client_images(client_id)",
    ];
    for sql in indexes {
        db.execute(sea_orm::Statement::from_string(builder, sql.to_string()))
            .await?;
    }

    Ok(())
}
