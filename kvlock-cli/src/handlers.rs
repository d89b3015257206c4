use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use kvlock_core::{ErrorCategory, LockError, ServiceError};

// ─── Validation Constants ───────────────────────────────────────────────────

/// Longest ttl a remote holder may ask for.
pub const MAX_TTL_MS: u64 = 10 * 60 * 1000;
/// Upper bounds on retrying within one request.
pub const MAX_ATTEMPTS: u32 = 50;
pub const MAX_RETRY_DELAY_MS: u64 = 5_000;

// ─── Validation Helpers ─────────────────────────────────────────────────────

pub fn validate_ttl_ms(ttl_ms: u64) -> Result<(), String> {
    if ttl_ms == 0 || ttl_ms > MAX_TTL_MS {
        return Err(format!("ttl_ms must be between 1 and {}", MAX_TTL_MS));
    }
    Ok(())
}

// ─── Request Types ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct AcquireLockRequest {
    /// Unqualified lock name, e.g. `register:alice`
    pub name: String,
    pub ttl_ms: Option<u64>,
    pub max_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub deadline_ms: Option<u64>,
}

impl AcquireLockRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("name is required".to_string());
        }
        if let Some(ttl_ms) = self.ttl_ms {
            validate_ttl_ms(ttl_ms)?;
        }
        if let Some(attempts) = self.max_attempts {
            if attempts == 0 || attempts > MAX_ATTEMPTS {
                return Err(format!("max_attempts must be between 1 and {}", MAX_ATTEMPTS));
            }
        }
        if let Some(delay) = self.retry_delay_ms {
            if delay > MAX_RETRY_DELAY_MS {
                return Err(format!(
                    "retry_delay_ms must be at most {}",
                    MAX_RETRY_DELAY_MS
                ));
            }
        }
        Ok(())
    }
}

#[derive(Deserialize)]
pub struct ReleaseLockRequest {
    pub token: String,
}

#[derive(Deserialize)]
pub struct RefreshLockRequest {
    pub token: String,
    pub ttl_ms: Option<u64>,
}

impl RefreshLockRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.token.is_empty() {
            return Err("token is required".to_string());
        }
        if let Some(ttl_ms) = self.ttl_ms {
            validate_ttl_ms(ttl_ms)?;
        }
        Ok(())
    }
}

// ─── Response Types ─────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct LockResponse {
    pub key: String,
    pub token: String,
    pub ttl_ms: u64,
}

#[derive(Serialize, Deserialize)]
pub struct LockTtlResponse {
    pub key: String,
    pub ttl_ms: u64,
}

#[derive(Serialize, Deserialize)]
pub struct ReleaseResponse {
    pub key: String,
    pub released: bool,
}

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub lock_backend: String,
    pub version: String,
}

// ─── Error Mapping ──────────────────────────────────────────────────────────

/// An error already reduced to a status code and a caller-safe message.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::err(self.message))).into_response()
    }
}

/// Lock endpoints answer the holder itself, so the lock error text is kept;
/// store failures are the exception.
impl From<LockError> for ApiError {
    fn from(err: LockError) -> Self {
        let status = match &err {
            LockError::Contention { .. } => StatusCode::TOO_MANY_REQUESTS,
            LockError::Timeout { .. } => StatusCode::REQUEST_TIMEOUT,
            LockError::NotHeld { .. } | LockError::Mismatch { .. } => StatusCode::CONFLICT,
            LockError::InvalidTtl { .. } | LockError::InvalidKey { .. } => StatusCode::BAD_REQUEST,
            LockError::Store(store) => {
                tracing::error!(error = %store, "lock store failure");
                return Self {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    message: "lock store unavailable".to_string(),
                };
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let status = match err.category() {
            ErrorCategory::Busy => StatusCode::TOO_MANY_REQUESTS,
            ErrorCategory::Conflict => StatusCode::CONFLICT,
            ErrorCategory::NotFound => StatusCode::NOT_FOUND,
            ErrorCategory::BadRequest => StatusCode::BAD_REQUEST,
            ErrorCategory::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "user request failed");
        } else if let ServiceError::Lock(lock) = &err {
            tracing::info!(error = %lock, "user request hit a held lock");
        }
        Self {
            status,
            message: err.public_message(),
        }
    }
}
