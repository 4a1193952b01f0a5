//! HTTP handlers
//!
//! Thin adapters: decode the request, call the store, encode the outcome.
//! A committed mutation is always reported as success, even when the
//! cache could not be synced.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use utoipa::ToSchema;

use super::middleware::AuthenticatedAccount;
use super::state::AppState;
use super::types::{
    ActionResponse, ApiResponse, ApiResult, AuthRequest, AuthResponse, InfoResponse,
    SendCoinRequest, error_codes, ok,
};
use crate::store::CacheSync;

/// Health check response data
#[derive(serde::Serialize, serde::Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Server timestamp in milliseconds
    #[schema(example = 1703494800000_u64)]
    pub timestamp_ms: u64,
    /// Build revision
    pub version: String,
}

/// Exchange credentials for a session token, registering on first login
#[utoipa::path(
    post,
    path = "/api/auth",
    request_body = AuthRequest,
    responses(
        (status = 200, description = "Token issued", body = AuthResponse),
        (status = 400, description = "Blank username or password"),
        (status = 401, description = "Wrong password")
    ),
    tag = "Auth"
)]
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AuthRequest>,
) -> ApiResult<AuthResponse> {
    let session = state.store.authenticate(&req.username, &req.password).await?;
    ok(AuthResponse {
        token: session.token,
    })
}

/// Buy one merch item at its catalog price
#[utoipa::path(
    post,
    path = "/api/merch/buy/{merch_name}",
    params(("merch_name" = String, Path, description = "Catalog item name")),
    responses(
        (status = 200, description = "Purchase committed", body = ActionResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Unknown merch item"),
        (status = 409, description = "Concurrent update, retry"),
        (status = 422, description = "Insufficient funds")
    ),
    security(("bearer_auth" = [])),
    tag = "Store"
)]
pub async fn buy_merch(
    State(state): State<Arc<AppState>>,
    Extension(account): Extension<AuthenticatedAccount>,
    Path(merch_name): Path<String>,
) -> ApiResult<ActionResponse> {
    let done = state
        .store
        .purchase(account.account_id, &merch_name)
        .await?;
    if let CacheSync::Stale(reason) = &done.cache {
        tracing::warn!(account_id = account.account_id, reason = %reason, "Purchase served with stale cache");
    }
    ok(ActionResponse {
        success: true,
        message: format!(
            "purchased {} for {} coins",
            done.value.merch_name, done.value.price
        ),
    })
}

/// Send coins to another account
#[utoipa::path(
    post,
    path = "/api/send-coin",
    request_body = SendCoinRequest,
    responses(
        (status = 200, description = "Transfer committed", body = ActionResponse),
        (status = 400, description = "Non-positive amount or self-transfer"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Receiver not found"),
        (status = 409, description = "Concurrent update, retry"),
        (status = 422, description = "Insufficient funds")
    ),
    security(("bearer_auth" = [])),
    tag = "Store"
)]
pub async fn send_coin(
    State(state): State<Arc<AppState>>,
    Extension(account): Extension<AuthenticatedAccount>,
    Json(req): Json<SendCoinRequest>,
) -> ApiResult<ActionResponse> {
    let done = state
        .store
        .transfer(account.account_id, req.to_user, req.amount)
        .await?;
    if let CacheSync::Stale(reason) = &done.cache {
        tracing::warn!(account_id = account.account_id, reason = %reason, "Transfer served with stale cache");
    }
    ok(ActionResponse {
        success: true,
        message: format!("sent {} coins to user {}", done.value.amount, req.to_user),
    })
}

/// Balance, purchases and transfers of the calling account
#[utoipa::path(
    get,
    path = "/api/info",
    responses(
        (status = 200, description = "Account snapshot", body = InfoResponse),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = [])),
    tag = "Store"
)]
pub async fn get_info(
    State(state): State<Arc<AppState>>,
    Extension(account): Extension<AuthenticatedAccount>,
) -> ApiResult<InfoResponse> {
    let info = state.store.get_info(account.account_id).await?;
    ok(info.into())
}

/// Health check endpoint
///
/// - Healthy: 200 OK + {code: 0, data: {timestamp_ms, version}}
/// - Unhealthy: 503 Service Unavailable + {code: 5001, msg: "unavailable"}
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service healthy", body = HealthResponse, content_type = "application/json"),
        (status = 503, description = "Service unavailable")
    ),
    tag = "System"
)]
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ApiResponse<HealthResponse>>) {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    let unavailable = || {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse {
                code: error_codes::SERVICE_UNAVAILABLE,
                msg: "unavailable".to_string(),
                data: None,
            }),
        )
    };

    if let Some(db) = &state.pg_db
        && let Err(e) = db.health_check().await
    {
        tracing::error!(error = %e, "[HEALTH] PostgreSQL ping failed");
        return unavailable();
    }
    if let Err(e) = state.cache.health_check().await {
        tracing::error!(error = %e, "[HEALTH] Cache ping failed");
        return unavailable();
    }

    (
        StatusCode::OK,
        Json(ApiResponse::success(HealthResponse {
            timestamp_ms: now_ms,
            version: env!("GIT_HASH").to_string(),
        })),
    )
}
