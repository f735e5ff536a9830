use async_trait::async_trait;

use crate::error::CoreError;
use crate::types::{PaymentRecord, SettlementMethod};

/// Read access to the operator's configured settlement methods.
#[async_trait]
pub trait SettlementMethodStore: Send + Sync {
    /// All methods currently marked enabled.
    async fn find_enabled(&self) -> Result<Vec<SettlementMethod>, CoreError>;
}

/// Payment persistence as seen by the incoming payment orchestrator.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Look up the payment awaiting the given execution condition.
    async fn find_by_execution_condition(
        &self,
        execution_condition: &str,
    ) -> Result<Option<PaymentRecord>, CoreError>;

    /// Persist an updated payment record.
    async fn save(&self, record: &PaymentRecord) -> Result<(), CoreError>;
}

/// Pushes payment updates to a user's live connection (e.g. a websocket).
pub trait PaymentNotifier: Send + Sync {
    fn payment(&self, username: &str, record: &PaymentRecord);
}
