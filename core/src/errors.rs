use crate::amount::{Amount, AmountError};
use crate::ledger::{Address, LedgerError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Failure kinds surfaced to the caller of a purchase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TransportError,
    RangeError,
    ApprovalRejected,
    PurchaseRejected,
    AlreadyInProgress,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransportError => "transport_error",
            Self::RangeError => "range_error",
            Self::ApprovalRejected => "approval_rejected",
            Self::PurchaseRejected => "purchase_rejected",
            Self::AlreadyInProgress => "already_in_progress",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::TransportError => StatusCode::BAD_GATEWAY,
            Self::RangeError => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ApprovalRejected | Self::PurchaseRejected => StatusCode::PAYMENT_REQUIRED,
            Self::AlreadyInProgress => StatusCode::CONFLICT,
            Self::Cancelled => StatusCode::REQUEST_TIMEOUT,
        }
    }
}

#[derive(Error, Debug)]
pub enum PurchaseError {
    #[error("Transport error: {0}")]
    Transport(#[from] LedgerError),

    #[error("{0}")]
    Range(#[from] AmountError),

    #[error("Approval rejected: {0}")]
    ApprovalRejected(String),

    #[error("Purchase rejected: {0}")]
    PurchaseRejected(String),

    #[error("A purchase of token type {token_type_id} for {buyer} is already in progress")]
    AlreadyInProgress { buyer: Address, token_type_id: Amount },

    #[error("Purchase cancelled before completion")]
    Cancelled,
}

impl PurchaseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) => ErrorKind::TransportError,
            Self::Range(_) => ErrorKind::RangeError,
            Self::ApprovalRejected(_) => ErrorKind::ApprovalRejected,
            Self::PurchaseRejected(_) => ErrorKind::PurchaseRejected,
            Self::AlreadyInProgress { .. } => ErrorKind::AlreadyInProgress,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Only transport failures are worth retrying as a whole new attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

// ── HTTP surface ──────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    Purchase(#[from] PurchaseError),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Purchase(e) => e.kind().status_code(),
        }
    }

    fn error_type(&self) -> String {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST".to_string(),
            Self::Purchase(e) => e.kind().as_str().to_uppercase(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorResponse {
            error: self.error_type(),
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}
