//! HTTP handlers for quota endpoints.
//!
//! These handlers connect Axum routes to the quota guard and the
//! status/operator handlers of the application layer.

use std::sync::Arc;

use axum::extract::{Json, Query, State};
use axum::http::{HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

use crate::adapters::http::middleware::identity::{CallerIdentity, ClientInfo};
use crate::adapters::http::middleware::quota::{
    apply_quota_headers, quota_error_response, rejection_response,
};
use crate::application::handlers::quota::{
    QuotaGuard, QuotaRequest, QuotaStatusHandler, QuotaStatusQuery, ResetUsageCommand,
    ResetUsageHandler, UnblockIdentityCommand, UnblockIdentityHandler,
};
use crate::domain::foundation::ErrorCode;
use crate::domain::quota::{Endpoint, QuotaDecision, QuotaError};

use super::dto::{
    ConsumeRequest, ConsumeResponse, ErrorResponse, OperatorResponse, QuotaStatusParams,
    QuotaStatusResponse, ResetUsageRequest, UnblockRequest,
};

/// Header carrying the operator key on admin routes.
pub static X_ADMIN_KEY: HeaderName = HeaderName::from_static("x-admin-key");

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared state for the quota routes.
#[derive(Clone)]
pub struct QuotaAppState {
    pub guard: Arc<QuotaGuard>,
    pub status_handler: Arc<QuotaStatusHandler>,
    pub unblock_handler: Arc<UnblockIdentityHandler>,
    pub reset_handler: Arc<ResetUsageHandler>,
    /// Admin routes answer 404 when unset.
    pub admin_key: Option<Arc<SecretString>>,
    /// Include storage error text in 503 bodies.
    pub verbose_errors: bool,
}

impl QuotaAppState {
    fn api_error(&self, error: QuotaError) -> QuotaApiError {
        QuotaApiError::Quota {
            error,
            verbose: self.verbose_errors,
        }
    }

    fn authorize_admin(&self, headers: &HeaderMap) -> Result<(), QuotaApiError> {
        let expected = self.admin_key.as_ref().ok_or(QuotaApiError::AdminDisabled)?;

        let provided = headers
            .get(&X_ADMIN_KEY)
            .and_then(|h| h.to_str().ok())
            .ok_or(QuotaApiError::AdminUnauthorized)?;

        let matches: bool = provided
            .as_bytes()
            .ct_eq(expected.expose_secret().as_bytes())
            .into();
        if !matches {
            tracing::warn!("admin request with a wrong key");
            return Err(QuotaApiError::AdminUnauthorized);
        }
        Ok(())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Caller Endpoints
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/v1/quota/status?endpoint=... - Report quota without consuming it
pub async fn get_quota_status(
    State(state): State<QuotaAppState>,
    CallerIdentity(caller): CallerIdentity,
    ClientInfo(signals): ClientInfo,
    Query(params): Query<QuotaStatusParams>,
) -> Result<impl IntoResponse, QuotaApiError> {
    let endpoint = Endpoint::new(params.endpoint).map_err(|e| state.api_error(e.into()))?;
    let query = QuotaStatusQuery {
        caller,
        signals,
        endpoint,
    };

    let result = state
        .status_handler
        .handle(query)
        .await
        .map_err(|e| state.api_error(e))?;

    Ok(Json(QuotaStatusResponse::from(result)))
}

/// POST /api/v1/quota/consume - Charge one unit against an endpoint
pub async fn consume_quota(
    State(state): State<QuotaAppState>,
    CallerIdentity(caller): CallerIdentity,
    ClientInfo(signals): ClientInfo,
    Json(request): Json<ConsumeRequest>,
) -> Result<Response, QuotaApiError> {
    let endpoint = Endpoint::new(request.endpoint).map_err(|e| state.api_error(e.into()))?;
    let quota_request = QuotaRequest {
        caller,
        signals,
        endpoint,
    };

    let enforcement = state
        .guard
        .check(&quota_request)
        .await
        .map_err(|e| state.api_error(e))?;

    match enforcement.decision {
        QuotaDecision::Admit(snapshot) => {
            let body = ConsumeResponse::admitted(enforcement.policy.tier(), &snapshot);
            let mut response = (StatusCode::OK, Json(body)).into_response();
            if let Some(usage) = snapshot.usage() {
                apply_quota_headers(response.headers_mut(), usage);
            }
            Ok(response)
        }
        QuotaDecision::Reject(reason) => Ok(rejection_response(&reason, state.guard.clock().now())),
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Operator Endpoints
// ════════════════════════════════════════════════════════════════════════════════

/// POST /admin/quota/unblock - Clear the block on an identity
pub async fn unblock_identity(
    State(state): State<QuotaAppState>,
    headers: HeaderMap,
    Json(request): Json<UnblockRequest>,
) -> Result<impl IntoResponse, QuotaApiError> {
    state.authorize_admin(&headers)?;

    let result = state
        .unblock_handler
        .handle(UnblockIdentityCommand {
            identity_key: request.identity_key,
        })
        .await
        .map_err(|e| state.api_error(e))?;

    Ok(Json(OperatorResponse::from(result)))
}

/// POST /admin/quota/reset - Zero an identity's usage in its live window
pub async fn reset_usage(
    State(state): State<QuotaAppState>,
    headers: HeaderMap,
    Json(request): Json<ResetUsageRequest>,
) -> Result<impl IntoResponse, QuotaApiError> {
    state.authorize_admin(&headers)?;

    let endpoint = Endpoint::new(request.endpoint).map_err(|e| state.api_error(e.into()))?;
    let result = state
        .reset_handler
        .handle(ResetUsageCommand {
            identity_key: request.identity_key,
            endpoint,
        })
        .await
        .map_err(|e| state.api_error(e))?;

    Ok(Json(OperatorResponse::from(result)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type for quota endpoints.
#[derive(Debug)]
pub enum QuotaApiError {
    Quota { error: QuotaError, verbose: bool },
    AdminDisabled,
    AdminUnauthorized,
}

impl From<QuotaError> for QuotaApiError {
    fn from(error: QuotaError) -> Self {
        QuotaApiError::Quota {
            error,
            verbose: false,
        }
    }
}

impl IntoResponse for QuotaApiError {
    fn into_response(self) -> Response {
        match self {
            QuotaApiError::Quota {
                error: QuotaError::LedgerUnavailable(detail),
                verbose: true,
            } => {
                let body = ErrorResponse::with_details(
                    ErrorCode::QuotaUnavailable.as_str(),
                    "Quota service temporarily unavailable",
                    serde_json::json!({ "cause": detail }),
                );
                (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
            }
            QuotaApiError::Quota { error, .. } => quota_error_response(&error),
            QuotaApiError::AdminDisabled => {
                let body = ErrorResponse::new(ErrorCode::NotFound.as_str(), "Not found");
                (StatusCode::NOT_FOUND, Json(body)).into_response()
            }
            QuotaApiError::AdminUnauthorized => {
                let body = ErrorResponse::new(
                    ErrorCode::Unauthorized.as_str(),
                    "A valid admin key is required",
                );
                (StatusCode::UNAUTHORIZED, Json(body)).into_response()
            }
        }
    }
}
