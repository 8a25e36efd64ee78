pub mod error;
pub mod handlers;
pub mod middleware;

/// Request header carrying a client-chosen key that makes a POST safe to replay.
pub const IDEMPOTENCY_KEY: &str = "idempotency-key";

/// Reads the idempotency key, if the client sent one.
pub fn idempotency_key(headers: &axum::http::HeaderMap) -> Option<&str> {
    headers
        .get(IDEMPOTENCY_KEY)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty() && k.len() <= 128)
}
