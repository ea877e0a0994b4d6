use axum::{Extension, Json, extract::State};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::middleware::auth::AuthenticatedUser;
use crate::services::web_scraper;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    pub url: String,
}

/// Stubbed extraction endpoint kept as a future extension point.
pub async fn extract_content(
    State(_state): State<AppState>,
    Extension(_user): Extension<AuthenticatedUser>,
    Json(request): Json<ExtractRequest>,
) -> Result<Json<serde_json::Value>> {
    if request.url.trim().is_empty() {
        return Err(Error::Validation("url is required".to_string()));
    }
    let outcome = web_scraper::extract_content(&request.url).await;
    Ok(Json(serde_json::to_value(outcome)?))
}
