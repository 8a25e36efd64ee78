use crate::models::{Record, TableKind};
use crate::services::table_gateway::AdminEntity;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "clients")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(indexed)]
    pub category_id: String,
    pub name: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub cover_image: Option<String>,
    pub sort_order: i32,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    // Restrict: a category that still owns clients cannot be deleted.
    #[sea_orm(
        belongs_to = "super::portfolio_categories::Entity",
        from = "Column::CategoryId",
        to = "super::portfolio_categories::Column::Id",
        on_update = "Cascade",
        on_delete = "Restrict"
    )]
    PortfolioCategories,
    #[sea_orm(has_many = "super::client_images::Entity")]
    ClientImages,
}

impl Related<super::portfolio_categories::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PortfolioCategories.def()
    }
}

impl Related<super::client_images::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ClientImages.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Record for Model {
    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

impl AdminEntity for Entity {
    const TABLE: TableKind = TableKind::Clients;

    fn list_order() -> Vec<Self::Column> {
        vec![Column::SortOrder, Column::CreatedAt, Column::Id]
    }
}
