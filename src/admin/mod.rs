//! Client-side admin building blocks: the optimistic table store, the
//! descriptor-driven form, and an HTTP client for the admin API.

pub mod backend;
pub mod form;
pub mod remote;
pub mod store;

pub use backend::CrudBackend;
pub use form::{AdminForm, FormError, FormMode, InputType, RenderedField};
pub use remote::{ApiClient, RemoteTable};
pub use store::{CrudError, CrudStore, Operation, OperationStatus, StoreHandle};
