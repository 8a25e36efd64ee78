use crate::AppState;
use crate::api::error::AppError;
use crate::services::contact::ContactRequest;
use axum::{
    Json,
    extract::{ConnectInfo, State},
    http::HeaderMap,
};
use serde::Serialize;
use std::net::{IpAddr, SocketAddr};
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct ContactResponse {
    pub success: bool,
}

/// First hop of `X-Forwarded-For`, then `X-Real-IP`, then the socket peer.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok());
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    };
    forwarded.or_else(real_ip).or(peer.map(|p| p.ip()))
}

#[utoipa::path(
    post,
    path = "/api/contact",
    request_body = ContactRequest,
    responses(
        (status = 200, description = "Message accepted", body = ContactResponse),
        (status = 400, description = "Validation failed"),
        (status = 429, description = "Too many messages from this sender"),
        (status = 502, description = "Mail relay failed")
    ),
    tag = "site"
)]
pub async fn submit_contact(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(payload): Json<ContactRequest>,
) -> Result<Json<ContactResponse>, AppError> {
    let ip = client_ip(&headers, peer.map(|ConnectInfo(addr)| addr));
    state.contact.submit(payload, ip).await?;
    Ok(Json(ContactResponse { success: true }))
}
