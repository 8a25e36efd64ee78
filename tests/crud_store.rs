mod common;

use async_trait::async_trait;
use portfolio_cms::admin::{CrudBackend, CrudStore, Operation};
use portfolio_cms::entities::{clients, portfolio_categories};
use portfolio_cms::error::DataError;
use portfolio_cms::models::{Patch, Record, apply_patch};
use portfolio_cms::services::table_gateway::TableGateway;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Client {
    id: String,
    name: String,
    sort_order: i32,
}

impl Record for Client {
    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

fn client(id: &str, name: &str) -> Client {
    Client {
        id: id.to_string(),
        name: name.to_string(),
        sort_order: 0,
    }
}

fn patch(v: serde_json::Value) -> Patch {
    v.as_object().unwrap().clone()
}

#[derive(Default)]
struct Step {
    delay: Duration,
    fail: Option<DataError>,
}

/// Scripted backend: each call consumes the next step (or succeeds
/// immediately) and records when it started and finished.
#[derive(Default)]
struct ScriptedBackend {
    rows: Mutex<Vec<Client>>,
    steps: Mutex<VecDeque<Step>>,
    log: Mutex<Vec<String>>,
    next_id: Mutex<u32>,
}

impl ScriptedBackend {
    fn with_rows(rows: Vec<Client>) -> Self {
        Self {
            rows: Mutex::new(rows),
            ..Default::default()
        }
    }

    fn script(&self, delay_ms: u64, fail: Option<DataError>) {
        self.steps.lock().unwrap().push_back(Step {
            delay: Duration::from_millis(delay_ms),
            fail,
        });
    }

    async fn step(&self, label: String) -> Result<(), DataError> {
        let step = self.steps.lock().unwrap().pop_front().unwrap_or_default();
        self.log.lock().unwrap().push(format!("start {}", label));
        tokio::time::sleep(step.delay).await;
        self.log.lock().unwrap().push(format!("end {}", label));
        match step.fail {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl CrudBackend<Client> for ScriptedBackend {
    async fn list(&self) -> Result<Vec<Client>, DataError> {
        self.step("list".into()).await?;
        Ok(self.rows.lock().unwrap().clone())
    }

    async fn create(&self, mut record: Client) -> Result<Client, DataError> {
        self.step(format!("create {}", record.name)).await?;
        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            format!("srv-{}", next)
        };
        record.set_id(id);
        self.rows.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn update(&self, id: &str, patch: &Patch) -> Result<Client, DataError> {
        self.step(format!("update {} {}", id, patch["name"])).await?;
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| DataError::NotFound(id.to_string()))?;
        *row = apply_patch(row, patch)?;
        Ok(row.clone())
    }

    async fn delete(&self, id: &str) -> Result<(), DataError> {
        self.step(format!("delete {}", id)).await?;
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| r.id != id);
        if rows.len() == before {
            return Err(DataError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

async fn loaded_store(rows: Vec<Client>) -> CrudStore<Client, ScriptedBackend> {
    let store = CrudStore::new(ScriptedBackend::with_rows(rows));
    store.list().await.unwrap();
    store
}

#[tokio::test]
async fn test_create_shows_row_before_server_confirms() {
    let store = loaded_store(vec![client("c1", "Acme")]).await;
    let backend = store_backend(&store);
    backend.script(50, None);

    let task = {
        let store = store.clone();
        tokio::spawn(async move { store.create(client("", "Bistro")).await })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    let rows = store.rows();
    assert_eq!(rows.len(), 2);
    assert!(rows[1].id.starts_with("temp-"));
    assert_eq!(rows[1].name, "Bistro");
    assert!(store.status(Operation::Create).loading());

    let created = task.await.unwrap().unwrap();
    assert_eq!(created.id, "srv-1");
    let rows = store.rows();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].id, "srv-1");
    assert!(!store.is_loading());
}

#[tokio::test]
async fn test_failed_create_removes_optimistic_row() {
    let store = loaded_store(vec![client("c1", "Acme")]).await;
    store_backend(&store).script(0, Some(DataError::validation("name", "taken")));

    let err = store.create(client("", "Acme")).await.unwrap_err();
    assert_eq!(err.operation, Operation::Create);
    assert_eq!(store.rows(), vec![client("c1", "Acme")]);
    assert!(store.status(Operation::Create).error.is_some());
}

#[tokio::test]
async fn test_timed_out_update_rolls_back_and_is_retryable() {
    let store = loaded_store(vec![client("c1", "Old Name")]).await;
    store_backend(&store).script(
        30,
        Some(DataError::Timeout(Duration::from_secs(8))),
    );

    let task = {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .update("c1", patch(json!({"name": "New Name"})))
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(store.get("c1").unwrap().name, "New Name");
    assert!(store.is_pending("c1"));

    let err = task.await.unwrap().unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(err.source, DataError::Timeout(_)));
    assert_eq!(store.get("c1").unwrap().name, "Old Name");
    assert!(!store.is_pending("c1"));

    let status = store.status(Operation::Update);
    assert!(!status.loading());
    assert!(status.error.unwrap().is_retryable());
}

#[tokio::test]
async fn test_writes_to_one_row_are_serialized() {
    let store = loaded_store(vec![client("c1", "Acme")]).await;
    let backend = store_backend(&store);
    backend.script(60, None);
    backend.script(0, None);

    let first = {
        let store = store.clone();
        tokio::spawn(async move { store.update("c1", patch(json!({"name": "First"}))).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = {
        let store = store.clone();
        tokio::spawn(async move { store.update("c1", patch(json!({"name": "Second"}))).await })
    };

    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    assert_eq!(
        backend.log()[2..],
        [
            "start update c1 \"First\"",
            "end update c1 \"First\"",
            "start update c1 \"Second\"",
            "end update c1 \"Second\"",
        ]
    );
    assert_eq!(store.get("c1").unwrap().name, "Second");
}

#[tokio::test]
async fn test_writes_to_different_rows_do_not_wait() {
    let store = loaded_store(vec![client("a", "A"), client("b", "B")]).await;
    let backend = store_backend(&store);
    backend.script(200, None);
    backend.script(0, None);

    let slow = {
        let store = store.clone();
        tokio::spawn(async move { store.update("a", patch(json!({"name": "A2"}))).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    tokio::time::timeout(
        Duration::from_millis(100),
        store.update("b", patch(json!({"name": "B2"}))),
    )
    .await
    .expect("update of another row must not queue behind 'a'")
    .unwrap();

    assert!(store.is_pending("a"));
    slow.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_failed_update_after_success_restores_confirmed_value() {
    let store = loaded_store(vec![client("c1", "Acme")]).await;
    let backend = store_backend(&store);
    backend.script(0, None);
    backend.script(0, Some(DataError::Transient("reset".into())));

    store
        .update("c1", patch(json!({"name": "Confirmed"})))
        .await
        .unwrap();
    store
        .update("c1", patch(json!({"name": "Lost"})))
        .await
        .unwrap_err();

    assert_eq!(store.get("c1").unwrap().name, "Confirmed");
}

#[tokio::test]
async fn test_failed_delete_reinserts_at_original_position() {
    let store = loaded_store(vec![
        client("a", "A"),
        client("b", "B"),
        client("c", "C"),
    ])
    .await;
    store_backend(&store).script(20, Some(DataError::Referential("images exist".into())));

    let task = {
        let store = store.clone();
        tokio::spawn(async move { store.delete("b").await })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(store.get("b").is_none());

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err.source, DataError::Referential(_)));
    let ids: Vec<String> = store.rows().into_iter().map(|r| r.id).collect();
    assert_eq!(ids, ["a", "b", "c"]);
}

#[tokio::test]
async fn test_update_queued_behind_create_targets_server_id() {
    let store = loaded_store(vec![]).await;
    let backend = store_backend(&store);
    backend.script(40, None);

    let create = {
        let store = store.clone();
        tokio::spawn(async move { store.create(client("", "Draft")).await })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    let temp_id = store.rows()[0].id.clone();
    assert!(temp_id.starts_with("temp-"));

    let updated = store
        .update(&temp_id, patch(json!({"name": "Published"})))
        .await
        .unwrap();
    create.await.unwrap().unwrap();

    assert_eq!(updated.id, "srv-1");
    assert_eq!(store.rows(), vec![client("srv-1", "Published")]);
    // The temporary id is forgotten once nothing waits on it
    assert!(store.get(&temp_id).is_none());
    assert!(!store.is_pending(&temp_id));
}

#[tokio::test]
async fn test_temporary_ids_are_forgotten_after_create() {
    let store = loaded_store(vec![]).await;
    let created = store.create(client("", "Draft")).await.unwrap();
    assert_eq!(store.get(&created.id), Some(created.clone()));
    assert_eq!(store.rows(), vec![created]);
    assert!(store.rows().iter().all(|r| !r.id.starts_with("temp-")));
}

#[tokio::test]
async fn test_refresh_during_delete_does_not_bring_row_back() {
    let store = loaded_store(vec![client("a", "A"), client("b", "B")]).await;
    let backend = store_backend(&store);
    backend.script(100, None);

    let delete = {
        let store = store.clone();
        tokio::spawn(async move { store.delete("b").await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    // The server still lists "b" while the delete is in flight
    let listed = store.list().await.unwrap();
    assert_eq!(listed, vec![client("a", "A")]);

    delete.await.unwrap().unwrap();
    assert_eq!(store.rows(), vec![client("a", "A")]);
    assert_eq!(*backend.rows.lock().unwrap(), vec![client("a", "A")]);
}

#[tokio::test]
async fn test_refresh_during_failed_delete_restores_listed_row() {
    let store = loaded_store(vec![client("a", "A"), client("b", "B")]).await;
    let backend = store_backend(&store);
    backend.script(60, Some(DataError::Referential("images exist".into())));

    let delete = {
        let store = store.clone();
        tokio::spawn(async move { store.delete("b").await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    backend.rows.lock().unwrap()[1].name = "B (edited elsewhere)".into();
    store.list().await.unwrap();
    assert!(store.get("b").is_none());

    delete.await.unwrap().unwrap_err();
    assert_eq!(
        store.rows(),
        vec![client("a", "A"), client("b", "B (edited elsewhere)")]
    );
}

#[tokio::test]
async fn test_refresh_during_update_keeps_patch_and_rolls_back_to_server_row() {
    let store = loaded_store(vec![client("c1", "Acme")]).await;
    let backend = store_backend(&store);
    backend.script(60, Some(DataError::Transient("reset".into())));

    let update = {
        let store = store.clone();
        tokio::spawn(async move { store.update("c1", patch(json!({"name": "New Name"}))).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    backend.rows.lock().unwrap()[0].sort_order = 7;
    store.list().await.unwrap();
    let during = store.get("c1").unwrap();
    assert_eq!(during.name, "New Name");
    assert_eq!(during.sort_order, 7);

    update.await.unwrap().unwrap_err();
    let after = store.get("c1").unwrap();
    assert_eq!(after.name, "Acme");
    assert_eq!(after.sort_order, 7);
}

#[tokio::test]
async fn test_write_queued_before_cancel_is_not_applied() {
    let store = loaded_store(vec![client("c1", "Acme")]).await;
    let backend = store_backend(&store);
    backend.script(60, None);

    let first = {
        let store = store.clone();
        tokio::spawn(async move { store.update("c1", patch(json!({"name": "First"}))).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = {
        let store = store.clone();
        tokio::spawn(async move { store.update("c1", patch(json!({"name": "Second"}))).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    store.cancel();

    first.await.unwrap().unwrap();
    let err = second.await.unwrap().unwrap_err();
    assert!(matches!(err.source, DataError::Cancelled));
    assert_eq!(store.get("c1").unwrap().name, "First");
    assert!(
        !backend
            .log()
            .iter()
            .any(|line| line.contains("Second"))
    );
}

#[tokio::test]
async fn test_cancelled_store_ignores_late_results() {
    let store = loaded_store(vec![client("c1", "Acme")]).await;
    store_backend(&store).script(40, Some(DataError::Transient("late".into())));

    let task = {
        let store = store.clone();
        tokio::spawn(async move { store.delete("c1").await })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    drop(store.handle());
    assert!(store.is_cancelled());

    assert!(task.await.unwrap().is_err());
    // No rollback after cancellation
    assert!(store.rows().is_empty());

    let err = store
        .update("c1", patch(json!({"name": "x"})))
        .await
        .unwrap_err();
    assert!(matches!(err.source, DataError::Cancelled));
}

fn store_backend(store: &CrudStore<Client, ScriptedBackend>) -> std::sync::Arc<ScriptedBackend> {
    store.backend()
}

#[tokio::test]
async fn test_store_over_database_gateway() {
    let (data, _storage) = common::data_client().await;
    let categories = CrudStore::new(TableGateway::<portfolio_categories::Entity>::new(data.clone()));
    let clients_store = CrudStore::new(TableGateway::<clients::Entity>::new(data.clone()));

    let seeded = categories.list().await.unwrap();
    assert_eq!(seeded.len(), 4);
    assert_eq!(seeded[0].id, "businesses");

    let created = clients_store
        .create(clients::Model {
            id: String::new(),
            category_id: "events".into(),
            name: "Gala".into(),
            description: None,
            cover_image: None,
            sort_order: 1,
            created_at: chrono::Utc::now(),
        })
        .await
        .unwrap();
    assert!(!created.id.is_empty());
    assert_eq!(clients_store.rows()[0].id, created.id);

    let renamed = clients_store
        .update(&created.id, patch(json!({"name": "Winter Gala"})))
        .await
        .unwrap();
    assert_eq!(renamed.name, "Winter Gala");
    assert_eq!(renamed.created_at, created.created_at);

    // The category still owns a client
    let err = categories.delete("events").await.unwrap_err();
    assert!(matches!(err.source, DataError::Referential(_)));
    assert!(categories.get("events").is_some());

    clients_store.delete(&created.id).await.unwrap();
    assert!(clients_store.rows().is_empty());
    assert!(clients_store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_client_with_unknown_category_is_rejected() {
    let (data, _storage) = common::data_client().await;
    let store = CrudStore::new(TableGateway::<clients::Entity>::new(data));
    let err = store
        .create(clients::Model {
            id: String::new(),
            category_id: "weddings".into(),
            name: "Nope".into(),
            description: None,
            cover_image: None,
            sort_order: 0,
            created_at: chrono::Utc::now(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err.source, DataError::Referential(_)));
    assert!(store.rows().is_empty());
}

#[tokio::test]
async fn test_keyed_create_is_stored_once() {
    let (data, _storage) = common::data_client().await;
    let gateway = TableGateway::<clients::Entity>::new(data.clone());
    let draft = clients::Model {
        id: String::new(),
        category_id: "people".into(),
        name: "Studio Portraits".into(),
        description: None,
        cover_image: None,
        sort_order: 0,
        created_at: chrono::Utc::now(),
    };

    let first = gateway.create_keyed(draft.clone(), Some("form-7")).await.unwrap();
    let replay = gateway.create_keyed(draft.clone(), Some("form-7")).await.unwrap();
    assert_eq!(first.id, replay.id);
    assert_eq!(first.created_at, replay.created_at);

    let other = gateway.create_keyed(draft, Some("form-8")).await.unwrap();
    assert_ne!(other.id, first.id);
    assert_eq!(CrudBackend::list(&gateway).await.unwrap().len(), 2);
}
