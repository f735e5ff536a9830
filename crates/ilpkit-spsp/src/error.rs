use ilpkit_core::{Amount, CoreError};

#[derive(Debug, thiserror::Error)]
pub enum SpspError {
    #[error("invalid quote request: {0}")]
    InvalidQuoteRequest(String),

    #[error("quote failed: {0}")]
    Quote(String),

    #[error("payment failed: {0}")]
    Payment(String),

    #[error("payment setup failed: {0}")]
    Setup(String),

    /// The payee would deliver a different amount than the payer agreed to.
    #[error("destination amount mismatch: expected {expected}, quoted {quoted}")]
    AmountMismatch { expected: Amount, quoted: Amount },

    #[error("receiver failed to listen: {0}")]
    Listen(String),

    #[error("payment request {0} is already pending")]
    DuplicateRequest(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("invalid spsp config: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] CoreError),
}

impl SpspError {
    pub(crate) fn into_quote(self) -> Self {
        match self {
            Self::Quote(_) => self,
            other => Self::Quote(other.to_string()),
        }
    }

    pub(crate) fn into_payment(self) -> Self {
        match self {
            Self::Payment(_) => self,
            other => Self::Payment(other.to_string()),
        }
    }
}
