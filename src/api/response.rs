//! Standardized API response types
//!
//! Successful calls return the resource itself as JSON; failures share one
//! envelope so the dashboard can read `error.code` uniformly.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Error envelope returned for every failed request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse {
    /// Always false
    pub success: bool,
    pub error: ApiError,
}

/// Error details in API response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code for programmatic handling
    #[schema(example = "CONFLICT")]
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

impl ApiResponse {
    /// Create an error response
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            error: ApiError {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}

/// Acknowledgement for operations without a resource body
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Ack {
    #[schema(example = "success")]
    pub status: String,
    pub message: String,
}

impl Ack {
    pub fn new(message: impl Into<String>) -> Self {
        Ack {
            status: "success".to_string(),
            message: message.into(),
        }
    }
}

/// `?limit=N` query parameter
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LimitParams {
    /// Maximum number of records to return
    pub limit: Option<usize>,
}

impl LimitParams {
    /// Requested limit, falling back to `default` and capped at `max`
    pub fn resolve(&self, default: usize, max: usize) -> usize {
        match self.limit {
            Some(0) | None => default,
            Some(limit) => limit.min(max),
        }
    }
}
