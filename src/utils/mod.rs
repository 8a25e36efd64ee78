pub mod auth;
pub mod image_ref;
pub mod keyed_mutex;
pub mod rate_limit;
pub mod retry;
