use crate::entities::{about, portfolio_categories, settings};
use crate::models::CategorySlug;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use tracing::info;

/// Creates the singleton rows and the fixed portfolio categories when they
/// are missing. Existing rows are left untouched.
pub async fn seed_initial_data(db: &DatabaseConnection) -> anyhow::Result<()> {
    if settings::Entity::find_by_id(settings::SINGLETON_ID)
        .one(db)
        .await?
        .is_none()
    {
        info!("🌱 Seeding site settings...");
        settings::ActiveModel {
            id: Set(settings::SINGLETON_ID.to_string()),
            site_title: Set("Portfolio".to_string()),
            hero_image: Set(None),
            contact_email: Set(None),
            contact_phone: Set(None),
            instagram_url: Set(None),
            updated_at: Set(Utc::now()),
        }
        .insert(db)
        .await?;
    }

    if about::Entity::find_by_id(about::SINGLETON_ID)
        .one(db)
        .await?
        .is_none()
    {
        info!("🌱 Seeding about section...");
        about::ActiveModel {
            id: Set(about::SINGLETON_ID.to_string()),
            heading: Set("About".to_string()),
            body: Set(String::new()),
            image: Set(None),
            updated_at: Set(Utc::now()),
        }
        .insert(db)
        .await?;
    }

    for (position, slug) in CategorySlug::ALL.into_iter().enumerate() {
        if portfolio_categories::Entity::find_by_id(slug.as_str())
            .one(db)
            .await?
            .is_some()
        {
            continue;
        }
        info!("🌱 Seeding portfolio category '{}'", slug.as_str());
        portfolio_categories::ActiveModel {
            id: Set(slug.as_str().to_string()),
            title: Set(slug.title().to_string()),
            description: Set(None),
            cover_image: Set(None),
            sort_order: Set(position as i32),
        }
        .insert(db)
        .await?;
    }

    Ok(())
}
