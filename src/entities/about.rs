use crate::models::{Record, TableKind};
use crate::services::table_gateway::AdminEntity;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

pub const SINGLETON_ID: &str = "about";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "about")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub heading: String,
    #[sea_orm(column_type = "Text")]
    pub body: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub image: Option<String>,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

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
    const TABLE: TableKind = TableKind::About;

    fn list_order() -> Vec<Self::Column> {
        vec![Column::Id]
    }
}
