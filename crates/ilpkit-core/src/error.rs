use crate::request_state::RequestState;
use crate::types::PaymentState;

/// Core domain errors.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid payment state transition from {from} to {to}")]
    InvalidPaymentTransition {
        from: PaymentState,
        to: PaymentState,
    },

    #[error("invalid request state transition from {from} to {to}")]
    InvalidRequestTransition {
        from: RequestState,
        to: RequestState,
    },

    #[error("validation failed: {0}")]
    ValidationError(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),
}
