use crate::AppState;
use crate::api::error::AppError;
use crate::utils::auth::{Claims, validate_jwt};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Cookie the hosted auth service stores the session token in.
pub const SESSION_COOKIE: &str = "sb-access-token";

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|v| !v.is_empty())
}

fn wants_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"))
}

fn authenticate(headers: &HeaderMap, secret: &str) -> Option<Claims> {
    let token = bearer_token(headers).or_else(|| cookie_token(headers))?;
    validate_jwt(&token, secret)
        .ok()
        .filter(Claims::is_admin)
}

/// Guards the admin area. Browsers without a session are redirected to the
/// login page with a `next` parameter; API callers get 401.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    if let Some(claims) = authenticate(req.headers(), &state.config.jwt_secret) {
        req.extensions_mut().insert(claims);
        return next.run(req).await;
    }

    if wants_html(req.headers()) {
        let target = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("next", target)
            .finish();
        let location = format!("{}?{}", state.config.login_path, query);
        return (StatusCode::SEE_OTHER, [(header::LOCATION, location)]).into_response();
    }

    AppError::Unauthorized("Missing or invalid session".to_string()).into_response()
}
