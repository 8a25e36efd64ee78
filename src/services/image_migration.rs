//! Moves inline base64 images out of table rows and into object storage.

use crate::error::DataError;
use crate::models::TableKind;
use crate::services::data_client::DataClient;
use crate::utils::image_ref::{ImageRef, extension_for_mime};
use chrono::Utc;
use sea_orm::sea_query::{Alias, Expr, Order, Query};
use sea_orm::{ConnectionTrait, DatabaseConnection};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

/// Every image column that may still hold inline payloads.
pub const TARGETS: [(TableKind, &str); 5] = [
    (TableKind::Settings, "hero_image"),
    (TableKind::About, "image"),
    (TableKind::PortfolioCategories, "cover_image"),
    (TableKind::Clients, "cover_image"),
    (TableKind::ClientImages, "image"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationMode {
    /// Report what would change; no uploads, no writes.
    DryRun,
    Apply,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigratedRow {
    pub table: String,
    pub id: String,
    pub column: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RowFailure {
    pub table: String,
    pub id: String,
    pub column: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    pub scanned: usize,
    /// Rows already holding a URL or no image.
    pub skipped: usize,
    pub migrated: Vec<MigratedRow>,
    /// Dry run only: rows that would be rewritten.
    pub planned: Vec<MigratedRow>,
    pub failures: Vec<RowFailure>,
}

impl MigrationReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Storage key derived from the image bytes, so reruns land on the same
/// object and the same URL.
pub fn content_key(table: TableKind, bytes: &[u8], mime: &str) -> (String, String) {
    let digest = hex::encode(Sha256::digest(bytes));
    let mime = infer::get(bytes)
        .map(|t| t.mime_type().to_string())
        .unwrap_or_else(|| mime.to_string());
    let key = format!(
        "migrated/{}/{}.{}",
        table.name(),
        &digest[..32],
        extension_for_mime(&mime)
    );
    (key, mime)
}

pub struct ImageMigrator {
    client: DataClient,
    mode: MigrationMode,
    /// When set, uploads are verified by fetching their public URL.
    http: Option<reqwest::Client>,
}

impl ImageMigrator {
    pub fn new(client: DataClient, mode: MigrationMode) -> Self {
        Self {
            client,
            mode,
            http: None,
        }
    }

    pub fn verify_over_http(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Migrates the given tables (all targets when `only` is empty).
    pub async fn run(&self, only: &[TableKind]) -> Result<MigrationReport, DataError> {
        let mut report = MigrationReport::default();

        for (table, column) in TARGETS {
            if !only.is_empty() && !only.contains(&table) {
                continue;
            }
            self.migrate_column(table, column, &mut report).await?;
        }

        info!(
            "📦 Image migration finished: {} scanned, {} migrated, {} planned, {} skipped, {} failed",
            report.scanned,
            report.migrated.len(),
            report.planned.len(),
            report.skipped,
            report.failures.len()
        );
        Ok(report)
    }

    async fn migrate_column(
        &self,
        table: TableKind,
        column: &'static str,
        report: &mut MigrationReport,
    ) -> Result<(), DataError> {
        let select = Query::select()
            .column(Alias::new("id"))
            .column(Alias::new(column))
            .from(Alias::new(table.name()))
            .order_by(Alias::new("id"), Order::Asc)
            .to_owned();

        let op_name = format!("{}.scan", table);
        let rows = self
            .client
            .query(&op_name, |db: DatabaseConnection| {
                let stmt = db.get_database_backend().build(&select);
                async move { db.query_all(stmt).await }
            })
            .await?;

        info!("🔍 {}.{}: {} rows", table, column, rows.len());

        for row in rows {
            report.scanned += 1;
            let id: String = match row.try_get("", "id") {
                Ok(id) => id,
                Err(e) => {
                    warn!("⚠️ {}: unreadable row: {}", table, e);
                    report.failures.push(RowFailure {
                        table: table.name().to_string(),
                        id: String::new(),
                        column: column.to_string(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            let value: Option<String> = match row.try_get("", column) {
                Ok(value) => value,
                Err(e) => {
                    warn!("⚠️ {}.{} row {}: unreadable value: {}", table, column, id, e);
                    report.failures.push(RowFailure {
                        table: table.name().to_string(),
                        id,
                        column: column.to_string(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            let image = ImageRef::parse(value.as_deref());
            if !image.is_inline() {
                report.skipped += 1;
                continue;
            }
            // Checked above
            let original = value.unwrap_or_default();

            match self.migrate_row(table, column, &id, &image, &original).await {
                Ok(url) => {
                    let row = MigratedRow {
                        table: table.name().to_string(),
                        id,
                        column: column.to_string(),
                        url,
                    };
                    match self.mode {
                        MigrationMode::DryRun => report.planned.push(row),
                        MigrationMode::Apply => report.migrated.push(row),
                    }
                }
                Err(e) => {
                    warn!("⚠️ {}.{} row {} not migrated: {}", table, column, id, e);
                    report.failures.push(RowFailure {
                        table: table.name().to_string(),
                        id,
                        column: column.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    async fn migrate_row(
        &self,
        table: TableKind,
        column: &'static str,
        id: &str,
        image: &ImageRef,
        original: &str,
    ) -> Result<String, DataError> {
        let ImageRef::Inline { mime, .. } = image else {
            return Err(DataError::validation(column, "not an inline image"));
        };
        let bytes = image
            .decode_inline()
            .unwrap_or_else(|| Ok(Vec::new()))
            .map_err(|e| DataError::Conversion(format!("Invalid base64 payload: {}", e)))?;
        if bytes.is_empty() {
            return Err(DataError::Conversion("Empty image payload".to_string()));
        }

        let (key, content_type) = content_key(table, &bytes, mime);
        let url = self.client.public_url(&key);

        if self.mode == MigrationMode::DryRun {
            return Ok(url);
        }

        if !self.client.object_exists(&key).await? {
            self.client.put_object(&key, bytes, &content_type).await?;
        }
        self.verify(&key, &url).await?;

        // Only rewrite rows still holding the payload we uploaded.
        let mut update = Query::update();
        update
            .table(Alias::new(table.name()))
            .value(Alias::new(column), url.clone())
            .and_where(Expr::col(Alias::new("id")).eq(id))
            .and_where(Expr::col(Alias::new(column)).eq(original));
        if let Some(updated) = table.updated_column() {
            update.value(Alias::new(updated), Utc::now());
        }

        let op_name = format!("{}.rewrite", table);
        let result = self
            .client
            .query(&op_name, |db: DatabaseConnection| {
                let stmt = db.get_database_backend().build(&update);
                async move { db.execute(stmt).await }
            })
            .await?;

        if result.rows_affected() == 0 {
            return Err(DataError::NotFound(format!(
                "{} row {} changed during migration",
                table, id
            )));
        }

        info!("✅ {}.{} row {} -> {}", table, column, id, url);
        Ok(url)
    }

    async fn verify(&self, key: &str, url: &str) -> Result<(), DataError> {
        let reachable = match &self.http {
            Some(http) => {
                self.client
                    .execute("storage.verify_url", || async move {
                        let response = http
                            .head(url)
                            .send()
                            .await
                            .map_err(|e| DataError::Transient(e.to_string()))?;
                        if response.status().is_server_error() {
                            return Err(DataError::Transient(format!(
                                "HEAD {} returned {}",
                                url,
                                response.status()
                            )));
                        }
                        Ok(response.status().is_success())
                    })
                    .await?
            }
            None => self.client.object_exists(key).await?,
        };

        if reachable {
            Ok(())
        } else {
            Err(DataError::Storage(format!("{} is not reachable", url)))
        }
    }
}
