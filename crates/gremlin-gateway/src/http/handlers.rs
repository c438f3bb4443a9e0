//! Query endpoints.

use axum::{
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::auth::SessionClaims;
use super::error::ApiError;
use super::router::AppState;
use crate::connection::Credentials;
use crate::credentials;
use crate::gateway::Health;
use crate::protocol::GsonResponse;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(rename = "GremlinServer")]
    pub gremlin_server: String,
    #[serde(rename = "GremlinHealthy")]
    pub gremlin_healthy: &'static str,
    #[serde(rename = "PrefetchPageSize")]
    pub prefetch_page_size: usize,
    #[serde(rename = "WatermarkText")]
    pub watermark_text: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub query: String,
}

/// Body of `/ui-api/props`. Missing or `null` fields read as empty.
#[derive(Debug, Deserialize)]
pub struct PropsRequest {
    #[serde(rename = "type", default)]
    element_type: Option<String>,
    #[serde(default)]
    ids: Option<Vec<String>>,
}

impl PropsRequest {
    /// Parse a body, which must be a JSON object.
    pub fn from_value(value: Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value).ok()
    }

    pub fn element_type(&self) -> &str {
        self.element_type.as_deref().unwrap_or_default()
    }

    pub fn ids(&self) -> &[String] {
        self.ids.as_deref().unwrap_or_default()
    }
}

fn session_credentials(
    state: &AppState,
    claims: &SessionClaims,
) -> Result<Option<Credentials>, crate::error::GatewayError> {
    credentials::resolve(&state.config.auth, &claims.identity())
}

/// GET /status
pub async fn status(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
) -> Json<StatusResponse> {
    let health = match session_credentials(&state, &claims) {
        Ok(credentials) => state.gateway.healthcheck(credentials.as_ref()).await,
        Err(e) => Health::Unhealthy(e),
    };
    let gremlin_healthy = health.as_status_str();
    if let Health::Unhealthy(e) = &health {
        tracing::info!(error = %e, "healthcheck error");
    }

    Json(StatusResponse {
        gremlin_server: state.gateway.endpoint().to_string(),
        gremlin_healthy,
        prefetch_page_size: state.config.prefetch.page_size(),
        watermark_text: state.config.watermark.clone(),
    })
}

/// POST /submit
pub async fn submit(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    body: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<Json<GsonResponse>, ApiError> {
    let Json(request) = body.map_err(|_| ApiError::bad_request("Invalid request"))?;

    let credentials = session_credentials(&state, &claims)
        .map_err(|e| ApiError::query("gremlin query error", &e))?;
    let result = state
        .gateway
        .submit(credentials.as_ref(), &request.query)
        .await
        .map_err(|e| ApiError::query("gremlin query error", &e))?;
    Ok(Json(result))
}

/// POST /ui-api/props
pub async fn props(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<GsonResponse>, ApiError> {
    let request = body
        .ok()
        .and_then(|Json(value)| PropsRequest::from_value(value))
        .ok_or_else(|| ApiError::bad_request("Invalid request body"))?;
    state
        .gateway
        .validate_lookup(request.element_type(), request.ids())
        .map_err(|e| ApiError::query("Gremlin query error", &e))?;

    let credentials = session_credentials(&state, &claims)
        .map_err(|e| ApiError::query("Gremlin query error", &e))?;
    let result = state
        .gateway
        .fetch_elements(credentials, request.element_type(), request.ids())
        .await
        .map_err(|e| ApiError::query("Gremlin query error", &e))?;
    Ok(Json(result))
}
