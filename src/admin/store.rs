use super::CrudBackend;
use crate::error::DataError;
use crate::models::{Patch, Record, apply_patch};
use crate::utils::keyed_mutex::KeyedMutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

pub const TEMP_ID_PREFIX: &str = "temp-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    List,
    Create,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::List => "list",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// A failed store operation, as shown to the user.
#[derive(Debug, Clone, Error)]
#[error("{operation} failed: {source}")]
pub struct CrudError {
    pub operation: Operation,
    pub source: DataError,
}

impl CrudError {
    pub fn new(operation: Operation, source: DataError) -> Self {
        Self { operation, source }
    }

    pub fn is_retryable(&self) -> bool {
        self.source.is_retryable()
    }
}

#[derive(Debug, Clone, Default)]
pub struct OperationStatus {
    in_flight: usize,
    pub error: Option<CrudError>,
}

impl OperationStatus {
    pub fn loading(&self) -> bool {
        self.in_flight > 0
    }
}

/// An optimistic edit the backend has not confirmed yet. `base` is the
/// last server row underneath it, which is what a failure restores.
enum PendingEdit<R> {
    Created(R),
    Updated { patch: Patch, base: R },
    Deleted { base: R, index: usize },
}

struct StoreState<R> {
    rows: Vec<R>,
    status: HashMap<Operation, OperationStatus>,
    /// Temporary id → server id, for writes queued behind a create.
    confirmed_ids: HashMap<String, String>,
    /// Unconfirmed edits in arrival order, replayed over every refresh.
    pending: Vec<(String, PendingEdit<R>)>,
}

impl<R: Record> StoreState<R> {
    fn position(&self, id: &str) -> Option<usize> {
        self.rows.iter().position(|r| r.id() == id)
    }

    fn begin(&mut self, op: Operation) {
        self.status.entry(op).or_default().in_flight += 1;
    }

    fn finish(&mut self, op: Operation, error: Option<CrudError>) {
        let status = self.status.entry(op).or_default();
        status.in_flight = status.in_flight.saturating_sub(1);
        status.error = error;
    }

    fn resolve(&self, id: &str) -> String {
        self.confirmed_ids
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    fn push_pending(&mut self, id: &str, edit: PendingEdit<R>) {
        self.pending.push((id.to_string(), edit));
    }

    fn take_pending(&mut self, id: &str) -> Option<PendingEdit<R>> {
        let i = self.pending.iter().position(|(key, _)| key == id)?;
        Some(self.pending.remove(i).1)
    }

    /// Swaps in freshly listed server rows, then re-applies the edits still
    /// in flight so a refresh never undoes them.
    fn refresh(&mut self, server_rows: Vec<R>) {
        self.rows = server_rows;
        for (id, edit) in self.pending.iter_mut() {
            let at = self.rows.iter().position(|r| r.id() == id.as_str());
            match edit {
                PendingEdit::Created(row) => {
                    if at.is_none() {
                        self.rows.push(row.clone());
                    }
                }
                PendingEdit::Updated { patch, base } => {
                    if let Some(i) = at {
                        *base = self.rows[i].clone();
                        match apply_patch(base, patch) {
                            Ok(patched) => self.rows[i] = patched,
                            Err(e) => debug!("Pending patch on {} no longer applies: {}", id, e),
                        }
                    }
                }
                PendingEdit::Deleted { base, .. } => {
                    if let Some(i) = at {
                        *base = self.rows.remove(i);
                    }
                }
            }
        }
    }
}

/// Local, optimistically-updated view of one table.
///
/// Writes apply to local state immediately and roll back when the backend
/// rejects them. Writes to the same row are queued in arrival order; each
/// one starts from the state its predecessor settled on. Writes to
/// different rows run independently.
///
/// Cloning yields another handle onto the same state.
pub struct CrudStore<R, B> {
    backend: Arc<B>,
    state: Arc<Mutex<StoreState<R>>>,
    ledger: KeyedMutex,
    cancel: CancellationToken,
}

impl<R, B> Clone for CrudStore<R, B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            state: self.state.clone(),
            ledger: self.ledger.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

/// Cancels the store when dropped, e.g. when an admin page is closed.
pub struct StoreHandle {
    cancel: CancellationToken,
}

impl Drop for StoreHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<R, B> CrudStore<R, B>
where
    R: Record,
    B: CrudBackend<R>,
{
    pub fn new(backend: B) -> Self {
        Self::with_backend(Arc::new(backend))
    }

    pub fn with_backend(backend: Arc<B>) -> Self {
        Self {
            backend,
            state: Arc::new(Mutex::new(StoreState {
                rows: Vec::new(),
                status: HashMap::new(),
                confirmed_ids: HashMap::new(),
                pending: Vec::new(),
            })),
            ledger: KeyedMutex::new(),
            cancel: CancellationToken::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, StoreState<R>> {
        // A poisoned lock only means another handle panicked mid-update;
        // the rows themselves are still consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn backend(&self) -> Arc<B> {
        self.backend.clone()
    }

    /// Guard that cancels this store when dropped.
    pub fn handle(&self) -> StoreHandle {
        StoreHandle {
            cancel: self.cancel.clone(),
        }
    }

    /// Stops reconciliation: operations already sent still complete on the
    /// backend but never touch local state again.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn rows(&self) -> Vec<R> {
        self.state().rows.clone()
    }

    pub fn get(&self, id: &str) -> Option<R> {
        let state = self.state();
        let id = state.resolve(id);
        state.position(&id).map(|i| state.rows[i].clone())
    }

    pub fn status(&self, op: Operation) -> OperationStatus {
        self.state().status.get(&op).cloned().unwrap_or_default()
    }

    pub fn is_loading(&self) -> bool {
        self.state().status.values().any(OperationStatus::loading)
    }

    /// True while a write to `id` is in flight or queued.
    pub fn is_pending(&self, id: &str) -> bool {
        self.ledger.is_pending(id)
    }

    fn cancelled_error(&self, op: Operation) -> CrudError {
        CrudError::new(op, DataError::Cancelled)
    }

    pub async fn list(&self) -> Result<Vec<R>, CrudError> {
        self.state().begin(Operation::List);
        let result = self.backend.list().await;

        if self.is_cancelled() {
            return result.map_err(|e| CrudError::new(Operation::List, e));
        }

        let mut state = self.state();
        match result {
            Ok(rows) => {
                state.refresh(rows);
                self.ledger.cleanup();
                state.finish(Operation::List, None);
                Ok(state.rows.clone())
            }
            Err(e) => {
                let err = CrudError::new(Operation::List, e);
                state.finish(Operation::List, Some(err.clone()));
                Err(err)
            }
        }
    }

    /// Forgets the ledger entry for `key` once nothing holds or awaits it,
    /// together with the temporary id mapping it may carry.
    fn release(&self, key: &str) {
        if self.ledger.remove_if_idle(key) && key.starts_with(TEMP_ID_PREFIX) {
            self.state().confirmed_ids.remove(key);
        }
    }

    pub async fn create(&self, record: R) -> Result<R, CrudError> {
        if self.is_cancelled() {
            return Err(self.cancelled_error(Operation::Create));
        }

        let temp_id = format!("{}{}", TEMP_ID_PREFIX, Uuid::new_v4());
        // Later writes to the temporary row wait for the server id.
        let guard = self.ledger.lock(&temp_id).await;
        let result = self.create_locked(&temp_id, record).await;
        drop(guard);
        self.release(&temp_id);
        result
    }

    async fn create_locked(&self, temp_id: &str, record: R) -> Result<R, CrudError> {
        {
            let mut optimistic = record.clone();
            optimistic.set_id(temp_id.to_string());
            let mut state = self.state();
            state.rows.push(optimistic.clone());
            state.push_pending(temp_id, PendingEdit::Created(optimistic));
            state.begin(Operation::Create);
        }

        let result = self.backend.create(record).await;

        if self.is_cancelled() {
            debug!("Store cancelled; dropping create reconciliation for {}", temp_id);
            return result.map_err(|e| CrudError::new(Operation::Create, e));
        }

        let mut state = self.state();
        state.take_pending(temp_id);
        let temp_at = state.position(temp_id);
        match result {
            Ok(row) => {
                if let Some(j) = state.position(row.id()) {
                    // A refresh already carries the new row.
                    state.rows[j] = row.clone();
                    if let Some(i) = temp_at {
                        state.rows.remove(i);
                    }
                } else if let Some(i) = temp_at {
                    state.rows[i] = row.clone();
                } else {
                    state.rows.push(row.clone());
                }
                state
                    .confirmed_ids
                    .insert(temp_id.to_string(), row.id().to_string());
                state.finish(Operation::Create, None);
                Ok(row)
            }
            Err(e) => {
                if let Some(i) = temp_at {
                    state.rows.remove(i);
                }
                let err = CrudError::new(Operation::Create, e);
                warn!("Create rolled back: {}", err);
                state.finish(Operation::Create, Some(err.clone()));
                Err(err)
            }
        }
    }

    /// Queues behind earlier writes to `id`. A temporary id is followed to
    /// its server id once the create settles, and that id is locked too.
    async fn lock_entity(&self, id: &str) -> (String, Vec<OwnedMutexGuard<()>>) {
        let mut guards = vec![self.ledger.lock(id).await];
        let resolved = self.state().resolve(id);
        if resolved != id {
            guards.push(self.ledger.lock(&resolved).await);
        }
        (resolved, guards)
    }

    /// Runs one write on `id` under its ledger lock, then releases the lock
    /// entries. Nothing is applied if the store was cancelled while queued.
    async fn locked_write<T, F, Fut>(
        &self,
        op: Operation,
        id: &str,
        write: F,
    ) -> Result<T, CrudError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<T, CrudError>>,
    {
        if self.is_cancelled() {
            return Err(self.cancelled_error(op));
        }

        let (resolved, guards) = self.lock_entity(id).await;
        let result = if self.is_cancelled() {
            Err(self.cancelled_error(op))
        } else {
            write(resolved.clone()).await
        };
        drop(guards);

        self.release(id);
        if resolved != id {
            self.release(&resolved);
        }
        result
    }

    pub async fn update(&self, id: &str, patch: Patch) -> Result<R, CrudError> {
        self.locked_write(Operation::Update, id, |id| self.update_locked(id, patch))
            .await
    }

    async fn update_locked(&self, id: String, patch: Patch) -> Result<R, CrudError> {
        {
            let mut state = self.state();
            let Some(index) = state.position(&id) else {
                return Err(CrudError::new(
                    Operation::Update,
                    DataError::NotFound(format!("No local row '{}'", id)),
                ));
            };
            let base = state.rows[index].clone();
            let patched =
                apply_patch(&base, &patch).map_err(|e| CrudError::new(Operation::Update, e))?;
            state.rows[index] = patched;
            state.push_pending(
                &id,
                PendingEdit::Updated {
                    patch: patch.clone(),
                    base,
                },
            );
            state.begin(Operation::Update);
        }

        let result = self.backend.update(&id, &patch).await;

        if self.is_cancelled() {
            return result.map_err(|e| CrudError::new(Operation::Update, e));
        }

        let mut state = self.state();
        let pending = state.take_pending(&id);
        match result {
            Ok(row) => {
                if let Some(i) = state.position(&id) {
                    state.rows[i] = row.clone();
                }
                state.finish(Operation::Update, None);
                Ok(row)
            }
            Err(e) => {
                if let (Some(i), Some(PendingEdit::Updated { base, .. })) =
                    (state.position(&id), pending)
                {
                    state.rows[i] = base;
                }
                let err = CrudError::new(Operation::Update, e);
                warn!("Update of {} rolled back: {}", id, err);
                state.finish(Operation::Update, Some(err.clone()));
                Err(err)
            }
        }
    }

    pub async fn delete(&self, id: &str) -> Result<(), CrudError> {
        self.locked_write(Operation::Delete, id, |id| self.delete_locked(id))
            .await
    }

    async fn delete_locked(&self, id: String) -> Result<(), CrudError> {
        {
            let mut state = self.state();
            let Some(index) = state.position(&id) else {
                return Err(CrudError::new(
                    Operation::Delete,
                    DataError::NotFound(format!("No local row '{}'", id)),
                ));
            };
            let base = state.rows.remove(index);
            state.push_pending(&id, PendingEdit::Deleted { base, index });
            state.begin(Operation::Delete);
        }

        let result = self.backend.delete(&id).await;

        if self.is_cancelled() {
            return result.map_err(|e| CrudError::new(Operation::Delete, e));
        }

        let mut state = self.state();
        let pending = state.take_pending(&id);
        match result {
            Ok(()) => {
                if let Some(i) = state.position(&id) {
                    state.rows.remove(i);
                }
                state.finish(Operation::Delete, None);
                Ok(())
            }
            Err(e) => {
                if let (None, Some(PendingEdit::Deleted { base, index })) =
                    (state.position(&id), pending)
                {
                    let at = index.min(state.rows.len());
                    state.rows.insert(at, base);
                }
                let err = CrudError::new(Operation::Delete, e);
                warn!("Delete of {} rolled back: {}", id, err);
                state.finish(Operation::Delete, Some(err.clone()));
                Err(err)
            }
        }
    }
}
