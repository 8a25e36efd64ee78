use crate::admin::CrudBackend;
use crate::entities::prelude::*;
use crate::error::DataError;
use crate::forms::{self, ValidationMode};
use crate::models::{CategorySlug, Patch, Record, TableKind, apply_patch};
use crate::services::data_client::DataClient;
use crate::utils::image_ref::ImageRef;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, EntityTrait, IntoActiveModel, PrimaryKeyTrait,
    QueryOrder,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// A sea-orm entity exposed through the admin API.
pub trait AdminEntity: EntityTrait {
    const TABLE: TableKind;

    /// Server-defined list order.
    fn list_order() -> Vec<Self::Column>;
}

/// Typed CRUD over one table. Every call runs through the [`DataClient`]
/// timeout and retry policy.
pub struct TableGateway<E> {
    client: DataClient,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for TableGateway<E> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E> TableGateway<E> {
    pub fn new(client: DataClient) -> Self {
        Self {
            client,
            _entity: PhantomData,
        }
    }
}

fn now_value() -> Result<Value, DataError> {
    serde_json::to_value(Utc::now()).map_err(|e| DataError::Database(e.to_string()))
}

/// Stamps the server-managed timestamp columns of `table` onto `record`.
fn stamp<R: Record>(record: &R, table: TableKind, created: bool) -> Result<R, DataError> {
    let mut patch = Patch::new();
    if created {
        if let Some(column) = table.created_column() {
            patch.insert(column.to_string(), now_value()?);
        }
    }
    if let Some(column) = table.updated_column() {
        patch.insert(column.to_string(), now_value()?);
    }
    if patch.is_empty() {
        return Ok(record.clone());
    }
    apply_patch(record, &patch)
}

/// Removes keys the client may echo back but never writes: annotations
/// (`_…`) and server-managed columns.
fn strip_managed(table: TableKind, values: &mut Map<String, Value>) {
    values.retain(|key, _| !key.starts_with('_'));
    for column in [table.created_column(), table.updated_column()]
        .into_iter()
        .flatten()
    {
        values.remove(column);
    }
}

/// Server-assigned primary key; stable for a given idempotency key.
fn row_id_for(table: TableKind, idempotency_key: Option<&str>) -> String {
    match idempotency_key {
        Some(key) => {
            Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("{}:{}", table, key).as_bytes()).to_string()
        }
        None => Uuid::new_v4().to_string(),
    }
}

impl<E> TableGateway<E>
where
    E: AdminEntity,
    E::Model: Record + IntoActiveModel<E::ActiveModel>,
    E::ActiveModel: ActiveModelTrait<Entity = E> + ActiveModelBehavior + Send,
    E::PrimaryKey: PrimaryKeyTrait<ValueType = String>,
{
    /// Inserts `record`. With an idempotency key the server-assigned id is
    /// derived from the key, so a replayed request returns the row the
    /// first attempt stored instead of inserting another one.
    pub async fn create_keyed(
        &self,
        record: E::Model,
        idempotency_key: Option<&str>,
    ) -> Result<E::Model, DataError> {
        let table = E::TABLE;
        if table.is_singleton() {
            return Err(DataError::validation(
                "id",
                format!("{} is a singleton and cannot be created", table),
            ));
        }

        let mut record = stamp(&record, table, true)?;
        let replayable = table.assigns_ids() && idempotency_key.is_some();
        if table.assigns_ids() {
            record.set_id(row_id_for(table, idempotency_key));
        } else if table == TableKind::PortfolioCategories {
            record.id().parse::<CategorySlug>()?;
        }

        if replayable {
            if let Some(existing) = self.find(record.id()).await? {
                info!("♻️ Replayed create of {} row {}", table, existing.id());
                return Ok(existing);
            }
        }

        let op_name = format!("{}.create", table);
        let inserted = self
            .client
            .query(&op_name, |db| {
                let model = record.clone();
                async move {
                    let active: E::ActiveModel = model.into_active_model();
                    active.reset_all().insert(&db).await
                }
            })
            .await;

        let created = match inserted {
            Ok(row) => row,
            // A concurrent replay won the insert.
            Err(e) if replayable => match self.find(record.id()).await? {
                Some(existing) => existing,
                None => return Err(e),
            },
            Err(e) => return Err(e),
        };

        info!("📝 Created {} row {}", table, created.id());
        Ok(created)
    }

    async fn find(&self, id: &str) -> Result<Option<E::Model>, DataError> {
        let op_name = format!("{}.find", E::TABLE);
        self.client
            .query(&op_name, |db| {
                let id = id.to_string();
                async move { E::find_by_id(id).one(&db).await }
            })
            .await
    }
}

#[async_trait]
impl<E> CrudBackend<E::Model> for TableGateway<E>
where
    E: AdminEntity,
    E::Model: Record + IntoActiveModel<E::ActiveModel>,
    E::ActiveModel: ActiveModelTrait<Entity = E> + ActiveModelBehavior + Send,
    E::PrimaryKey: PrimaryKeyTrait<ValueType = String>,
{
    async fn list(&self) -> Result<Vec<E::Model>, DataError> {
        let op_name = format!("{}.list", E::TABLE);
        self.client
            .query(&op_name, |db| async move {
                let mut select = E::find();
                for column in E::list_order() {
                    select = select.order_by_asc(column);
                }
                select.all(&db).await
            })
            .await
    }

    async fn create(&self, record: E::Model) -> Result<E::Model, DataError> {
        self.create_keyed(record, None).await
    }

    async fn update(&self, id: &str, patch: &Patch) -> Result<E::Model, DataError> {
        let table = E::TABLE;
        let mut patch = patch.clone();
        strip_managed(table, &mut patch);

        let current = self
            .find(id)
            .await?
            .ok_or_else(|| DataError::NotFound(format!("{} row '{}'", table, id)))?;

        let merged = apply_patch(&current, &patch)?;
        let merged = stamp(&merged, table, false)?;

        let op_name = format!("{}.update", table);
        self.client
            .query(&op_name, |db| {
                let model = merged.clone();
                async move {
                    let active: E::ActiveModel = model.into_active_model();
                    active.reset_all().update(&db).await
                }
            })
            .await
    }

    async fn delete(&self, id: &str) -> Result<(), DataError> {
        let table = E::TABLE;
        if table.is_singleton() {
            return Err(DataError::validation(
                "id",
                format!("{} is a singleton and cannot be deleted", table),
            ));
        }

        let op_name = format!("{}.delete", table);
        let result = self
            .client
            .query(&op_name, |db| {
                let id = id.to_string();
                async move { E::delete_by_id(id).exec(&db).await }
            })
            .await?;

        if result.rows_affected == 0 {
            return Err(DataError::NotFound(format!("{} row '{}'", table, id)));
        }
        info!("🗑️ Deleted {} row {}", table, id);
        Ok(())
    }
}

/// Type-erased, JSON-level access to an admin table. Payloads are
/// validated against the table's form descriptors.
#[async_trait]
pub trait DynTable: Send + Sync {
    fn kind(&self) -> TableKind;

    /// Rows as JSON, each annotated with `_image_refs` describing how its
    /// image columns are stored.
    async fn list_json(&self) -> Result<Vec<Value>, DataError>;

    async fn create_json(&self, payload: Map<String, Value>) -> Result<Value, DataError> {
        self.create_json_keyed(payload, None).await
    }

    /// Create that can be replayed safely with the same idempotency key.
    async fn create_json_keyed(
        &self,
        payload: Map<String, Value>,
        idempotency_key: Option<&str>,
    ) -> Result<Value, DataError>;

    async fn update_json(&self, id: &str, patch: Map<String, Value>)
    -> Result<Value, DataError>;

    async fn delete(&self, id: &str) -> Result<(), DataError>;
}

/// Serializes a row for the admin UI.
pub fn to_admin_json<R: Record>(record: &R, table: TableKind) -> Result<Value, DataError> {
    let mut value =
        serde_json::to_value(record).map_err(|e| DataError::Database(e.to_string()))?;
    if let Some(object) = value.as_object_mut() {
        let mut refs = Map::new();
        for column in table.image_columns() {
            let kind = ImageRef::parse(object.get(*column).and_then(Value::as_str)).kind();
            refs.insert(
                column.to_string(),
                serde_json::to_value(kind).unwrap_or(Value::Null),
            );
        }
        object.insert("_image_refs".to_string(), Value::Object(refs));
    }
    Ok(value)
}

#[async_trait]
impl<E> DynTable for TableGateway<E>
where
    E: AdminEntity,
    E::Model: Record + IntoActiveModel<E::ActiveModel>,
    E::ActiveModel: ActiveModelTrait<Entity = E> + ActiveModelBehavior + Send,
    E::PrimaryKey: PrimaryKeyTrait<ValueType = String>,
{
    fn kind(&self) -> TableKind {
        E::TABLE
    }

    async fn list_json(&self) -> Result<Vec<Value>, DataError> {
        let rows = CrudBackend::list(self).await?;
        rows.iter().map(|row| to_admin_json(row, E::TABLE)).collect()
    }

    async fn create_json_keyed(
        &self,
        mut payload: Map<String, Value>,
        idempotency_key: Option<&str>,
    ) -> Result<Value, DataError> {
        let table = E::TABLE;
        strip_managed(table, &mut payload);
        forms::validate_payload(table, &payload, ValidationMode::Create)?;
        forms::apply_defaults(table, &mut payload);

        // Placeholders so the row deserializes; replaced before insert.
        payload
            .entry("id".to_string())
            .or_insert_with(|| Value::String(String::new()));
        for column in [table.created_column(), table.updated_column()]
            .into_iter()
            .flatten()
        {
            payload.insert(column.to_string(), now_value()?);
        }

        let record: E::Model = serde_json::from_value(Value::Object(payload))
            .map_err(|e| DataError::validation("payload", e.to_string()))?;
        let created = self.create_keyed(record, idempotency_key).await?;
        to_admin_json(&created, table)
    }

    async fn update_json(
        &self,
        id: &str,
        mut patch: Map<String, Value>,
    ) -> Result<Value, DataError> {
        let table = E::TABLE;
        strip_managed(table, &mut patch);
        patch.remove("id");
        forms::validate_payload(table, &patch, ValidationMode::Update)?;
        let updated = CrudBackend::update(self, id, &patch).await?;
        to_admin_json(&updated, table)
    }

    async fn delete(&self, id: &str) -> Result<(), DataError> {
        CrudBackend::delete(self, id).await
    }
}

/// Table name → gateway, so one set of admin handlers serves every table.
#[derive(Clone)]
pub struct TableRegistry {
    tables: Arc<HashMap<TableKind, Arc<dyn DynTable>>>,
}

impl TableRegistry {
    pub fn new(client: &DataClient) -> Self {
        let gateways: Vec<Arc<dyn DynTable>> = vec![
            Arc::new(TableGateway::<Settings>::new(client.clone())),
            Arc::new(TableGateway::<About>::new(client.clone())),
            Arc::new(TableGateway::<PortfolioCategories>::new(client.clone())),
            Arc::new(TableGateway::<Clients>::new(client.clone())),
            Arc::new(TableGateway::<ClientImages>::new(client.clone())),
            Arc::new(TableGateway::<NavbarLinks>::new(client.clone())),
        ];

        let tables = gateways
            .into_iter()
            .map(|gateway| (gateway.kind(), gateway))
            .collect();

        Self {
            tables: Arc::new(tables),
        }
    }

    pub fn get(&self, table: TableKind) -> Result<Arc<dyn DynTable>, DataError> {
        self.tables
            .get(&table)
            .cloned()
            .ok_or_else(|| DataError::NotFound(format!("Unknown table '{}'", table)))
    }
}
