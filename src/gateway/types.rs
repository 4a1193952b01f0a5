//! API request/response types and error codes
//!
//! - `ApiResponse<T>`: Unified response wrapper
//! - `ApiError` / `ApiResult`: handler error plumbing
//! - `error_codes`: Standard error code constants
//! - Request and response DTOs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::core_types::{AccountId, Coins, EntityId};
use crate::models::{AccountInfo, Purchase, Transfer};
use crate::store::StoreError;

// ============================================================================
// Unified API Response Format
// ============================================================================

/// Unified API response wrapper
///
/// All API responses follow this structure:
/// - code: 0 = success, non-zero = error code
/// - msg: short message description
/// - data: actual data (success) or null (error)
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    /// Response code: 0 for success, non-zero for errors
    #[schema(example = 0)]
    pub code: i32,
    /// Response message
    #[schema(example = "ok")]
    pub msg: String,
    /// Response data (only present when code == 0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Create success response
    pub fn success(data: T) -> Self {
        Self {
            code: error_codes::SUCCESS,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }

    /// Create error response
    pub fn error(code: i32, msg: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            code,
            msg: msg.into(),
            data: None,
        }
    }
}

// ============================================================================
// Handler errors
// ============================================================================

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: i32,
    pub msg: String,
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Wrap a value in a success response
pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::success(data)))
}

impl ApiError {
    pub fn new(status: StatusCode, code: i32, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            msg: msg.into(),
        }
    }

    pub fn unauthorized(code: i32, msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, code, msg)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let status =
            StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let code = match &e {
            StoreError::InvalidArgument(_) => error_codes::INVALID_PARAMETER,
            StoreError::InsufficientFunds => error_codes::INSUFFICIENT_BALANCE,
            StoreError::InvalidCredentials => error_codes::AUTH_FAILED,
            StoreError::NotFound(_) => error_codes::NOT_FOUND,
            StoreError::Conflict(_) => error_codes::CONFLICT,
            StoreError::TransactionAborted(_) => error_codes::TX_ABORTED,
            StoreError::CacheSyncFailed(_) => error_codes::CACHE_SYNC_FAILED,
            StoreError::Internal(_) => error_codes::INTERNAL_ERROR,
        };
        // Internal details stay in the logs
        let msg = match &e {
            StoreError::Internal(_) | StoreError::CacheSyncFailed(_) => {
                tracing::error!(error = %e, code = e.code(), "Request failed");
                "internal error".to_string()
            }
            _ => e.to_string(),
        };
        Self::new(status, code, msg)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ApiResponse::<()>::error(self.code, self.msg)),
        )
            .into_response()
    }
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct AuthRequest {
    #[schema(example = "alice")]
    pub username: String,
    #[schema(example = "password123")]
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendCoinRequest {
    /// Receiver account id
    #[schema(example = 2)]
    pub to_user: AccountId,
    #[schema(example = 100)]
    pub amount: Coins,
}

// ============================================================================
// Response DTOs
// ============================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
}

/// Outcome of a mutating call
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ActionResponse {
    pub success: bool,
    #[schema(example = "purchased hoody for 300 coins")]
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PurchaseItem {
    pub id: EntityId,
    pub merch_name: String,
    pub price: Coins,
    /// RFC 3339
    pub purchase_date: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransactionItem {
    pub id: EntityId,
    pub sender_id: AccountId,
    pub receiver_id: AccountId,
    pub amount: Coins,
    /// RFC 3339
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InfoResponse {
    pub user_id: AccountId,
    pub username: String,
    pub balance: Coins,
    pub purchases: Vec<PurchaseItem>,
    pub transactions: Vec<TransactionItem>,
}

impl From<Purchase> for PurchaseItem {
    fn from(p: Purchase) -> Self {
        Self {
            id: p.id,
            merch_name: p.merch_name,
            price: p.price,
            purchase_date: p.created_at.to_rfc3339(),
        }
    }
}

impl From<Transfer> for TransactionItem {
    fn from(t: Transfer) -> Self {
        Self {
            id: t.id,
            sender_id: t.sender_id,
            receiver_id: t.receiver_id,
            amount: t.amount,
            created_at: t.created_at.to_rfc3339(),
        }
    }
}

impl From<AccountInfo> for InfoResponse {
    fn from(info: AccountInfo) -> Self {
        Self {
            user_id: info.account_id,
            username: info.username,
            balance: info.balance,
            purchases: info.purchases.into_iter().map(Into::into).collect(),
            transactions: info.transfers.into_iter().map(Into::into).collect(),
        }
    }
}

// ============================================================================
// Error Codes
// ============================================================================

/// Standard API error codes
pub mod error_codes {
    // Success
    pub const SUCCESS: i32 = 0;

    // Client errors (1xxx)
    pub const INVALID_PARAMETER: i32 = 1001;
    pub const INSUFFICIENT_BALANCE: i32 = 1002;

    // Auth errors (2xxx)
    pub const MISSING_AUTH: i32 = 2001;
    pub const AUTH_FAILED: i32 = 2002;

    // Resource errors (4xxx)
    pub const NOT_FOUND: i32 = 4004;
    pub const CONFLICT: i32 = 4009;
    pub const TX_ABORTED: i32 = 4090;

    // Server errors (5xxx)
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const SERVICE_UNAVAILABLE: i32 = 5001;
    pub const CACHE_SYNC_FAILED: i32 = 5002;
}
