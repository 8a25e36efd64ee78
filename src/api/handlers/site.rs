use crate::AppState;
use crate::api::error::AppError;
use crate::services::site_service::{PortfolioPage, SiteContent};
use axum::{
    Json,
    extract::{Path, State},
};

/// Everything the landing page needs. Each section settles on its own; a
/// failing section is reported in place and does not fail the response.
#[utoipa::path(
    get,
    path = "/api/site",
    responses(
        (status = 200, description = "Settings, about, categories and navigation, each with its own status")
    ),
    tag = "site"
)]
pub async fn get_site(State(state): State<AppState>) -> Json<SiteContent> {
    Json(state.site.site().await)
}

#[utoipa::path(
    get,
    path = "/api/portfolio/{category}",
    params(
        ("category" = String, Path, description = "businesses, events, people or restaurants")
    ),
    responses(
        (status = 200, description = "Category with its clients and their galleries"),
        (status = 404, description = "Unknown category")
    ),
    tag = "site"
)]
pub async fn get_portfolio(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Result<Json<PortfolioPage>, AppError> {
    Ok(Json(state.site.portfolio(&category).await?))
}
