use crate::error::DataError;
use crate::services::storage::StorageService;
use crate::utils::retry::{RetryPolicy, retry_with_timeout};
use sea_orm::{DatabaseConnection, DbErr};
use std::future::Future;
use std::sync::Arc;

/// Shared handle to the hosted backend: database, object storage, and the
/// timeout/retry policy every call goes through.
///
/// Built once at start-up and passed explicitly (cloning is cheap; the
/// connection pool and storage client are shared).
#[derive(Clone)]
pub struct DataClient {
    db: DatabaseConnection,
    storage: Arc<dyn StorageService>,
    policy: RetryPolicy,
}

impl DataClient {
    pub fn new(db: DatabaseConnection, storage: Arc<dyn StorageService>, policy: RetryPolicy) -> Self {
        Self {
            db,
            storage,
            policy,
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn storage(&self) -> &Arc<dyn StorageService> {
        &self.storage
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs an arbitrary backend call under the timeout and retry policy.
    pub async fn execute<T, F, Fut>(&self, op_name: &str, op: F) -> Result<T, DataError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DataError>>,
    {
        retry_with_timeout(&self.policy, op_name, op).await
    }

    /// Runs a database call; each attempt receives its own handle to the pool.
    pub async fn query<T, F, Fut>(&self, op_name: &str, mut op: F) -> Result<T, DataError>
    where
        F: FnMut(DatabaseConnection) -> Fut,
        Fut: Future<Output = Result<T, DbErr>>,
    {
        let db = &self.db;
        self.execute(op_name, || {
            let fut = op(db.clone());
            async move { fut.await.map_err(DataError::from) }
        })
        .await
    }

    pub async fn put_object(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), DataError> {
        let storage = &self.storage;
        self.execute("storage.put", || {
            let data = data.clone();
            async move {
                storage
                    .upload_file(key, data, content_type)
                    .await
                    .map_err(|e| DataError::Storage(e.to_string()))
            }
        })
        .await
    }

    pub async fn object_exists(&self, key: &str) -> Result<bool, DataError> {
        let storage = &self.storage;
        self.execute("storage.head", || async move {
            storage
                .file_exists(key)
                .await
                .map_err(|e| DataError::Storage(e.to_string()))
        })
        .await
    }

    pub async fn delete_object(&self, key: &str) -> Result<(), DataError> {
        let storage = &self.storage;
        self.execute("storage.delete", || async move {
            storage
                .delete_file(key)
                .await
                .map_err(|e| DataError::Storage(e.to_string()))
        })
        .await
    }

    pub fn public_url(&self, key: &str) -> String {
        self.storage.public_url(key)
    }
}

/// Fan-out/fan-in: drives every future concurrently and reports each outcome
/// individually, in input order. One failure never cancels the others.
pub async fn settle_all<T, I>(futures: I) -> Vec<Result<T, DataError>>
where
    I: IntoIterator,
    I::Item: Future<Output = Result<T, DataError>>,
{
    futures::future::join_all(futures).await
}
