use crate::entities::{about, client_images, clients, navbar_links, portfolio_categories, settings};
use crate::error::DataError;
use crate::models::CategorySlug;
use crate::services::data_client::{DataClient, settle_all};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use tracing::warn;

/// One independently-fetched part of a page.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Section<T> {
    Ok {
        data: T,
    },
    Error {
        code: &'static str,
        message: String,
        retryable: bool,
    },
}

impl<T> Section<T> {
    fn settle(name: &str, result: Result<T, DataError>) -> Self {
        match result {
            Ok(data) => Section::Ok { data },
            Err(e) => {
                warn!("⚠️ Section {} failed: {}", name, e);
                Section::Error {
                    code: e.code(),
                    message: e.to_string(),
                    retryable: e.is_retryable(),
                }
            }
        }
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Section::Ok { data } => Some(data),
            Section::Error { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SiteContent {
    pub settings: Section<settings::Model>,
    pub about: Section<about::Model>,
    pub categories: Section<Vec<portfolio_categories::Model>>,
    pub navbar: Section<Vec<navbar_links::Model>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientGallery {
    #[serde(flatten)]
    pub client: clients::Model,
    pub images: Section<Vec<client_images::Model>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioPage {
    pub category: portfolio_categories::Model,
    pub clients: Vec<ClientGallery>,
}

/// Read side of the public site. Independent queries are issued together
/// and reported one by one.
#[derive(Clone)]
pub struct SiteService {
    client: DataClient,
}

impl SiteService {
    pub fn new(client: DataClient) -> Self {
        Self { client }
    }

    pub async fn site(&self) -> SiteContent {
        let settings = self.client.query("settings.get", |db| async move {
            settings::Entity::find_by_id(settings::SINGLETON_ID)
                .one(&db)
                .await
        });
        let about = self.client.query("about.get", |db| async move {
            about::Entity::find_by_id(about::SINGLETON_ID).one(&db).await
        });
        let categories = self.client.query("portfolio_categories.list", |db| async move {
            portfolio_categories::Entity::find()
                .order_by_asc(portfolio_categories::Column::SortOrder)
                .order_by_asc(portfolio_categories::Column::Id)
                .all(&db)
                .await
        });
        let navbar = self.client.query("navbar_links.list", |db| async move {
            navbar_links::Entity::find()
                .order_by_asc(navbar_links::Column::SortOrder)
                .order_by_asc(navbar_links::Column::Id)
                .all(&db)
                .await
        });

        let (settings, about, categories, navbar) =
            tokio::join!(settings, about, categories, navbar);

        let missing = |name: &str| DataError::NotFound(format!("{} has not been seeded", name));
        SiteContent {
            settings: Section::settle(
                "settings",
                settings.and_then(|s| s.ok_or_else(|| missing("settings"))),
            ),
            about: Section::settle(
                "about",
                about.and_then(|a| a.ok_or_else(|| missing("about"))),
            ),
            categories: Section::settle("categories", categories),
            navbar: Section::settle("navbar", navbar),
        }
    }

    async fn gallery(&self, client_id: String) -> Result<Vec<client_images::Model>, DataError> {
        self.client
            .query("client_images.by_client", |db| {
                let client_id = client_id.clone();
                async move {
                    client_images::Entity::find()
                        .filter(client_images::Column::ClientId.eq(client_id))
                        .order_by_asc(client_images::Column::SortOrder)
                        .order_by_asc(client_images::Column::CreatedAt)
                        .all(&db)
                        .await
                }
            })
            .await
    }

    pub async fn portfolio(&self, category: &str) -> Result<PortfolioPage, DataError> {
        let slug: CategorySlug = category
            .parse()
            .map_err(|_| DataError::NotFound(format!("No portfolio category '{}'", category)))?;
        let slug = slug.as_str();

        let category = self.client.query("portfolio_categories.get", |db| async move {
            portfolio_categories::Entity::find_by_id(slug).one(&db).await
        });
        let client_rows = self.client.query("clients.by_category", |db| async move {
            clients::Entity::find()
                .filter(clients::Column::CategoryId.eq(slug))
                .order_by_asc(clients::Column::SortOrder)
                .order_by_asc(clients::Column::CreatedAt)
                .all(&db)
                .await
        });

        let (category, client_rows) = tokio::join!(category, client_rows);
        let category = category?
            .ok_or_else(|| DataError::NotFound(format!("No portfolio category '{}'", slug)))?;
        let client_rows = client_rows?;

        let fetches: Vec<_> = client_rows
            .iter()
            .map(|c| self.gallery(c.id.clone()))
            .collect();
        let galleries = settle_all(fetches).await;

        let clients = client_rows
            .into_iter()
            .zip(galleries)
            .map(|(client, images)| ClientGallery {
                images: Section::settle(&format!("images of {}", client.id), images),
                client,
            })
            .collect();

        Ok(PortfolioPage { category, clients })
    }
}
