use crate::error::DataError;
use crate::models::{Patch, Record};
use async_trait::async_trait;

/// Persistence seam behind [`CrudStore`](super::CrudStore).
///
/// Implemented in-process by `TableGateway` and over HTTP by `RemoteTable`.
#[async_trait]
pub trait CrudBackend<R: Record>: Send + Sync {
    /// All rows, in server-defined order.
    async fn list(&self) -> Result<Vec<R>, DataError>;

    /// Persists `record` and returns the stored row (with its final id).
    async fn create(&self, record: R) -> Result<R, DataError>;

    async fn update(&self, id: &str, patch: &Patch) -> Result<R, DataError>;

    async fn delete(&self, id: &str) -> Result<(), DataError>;
}
