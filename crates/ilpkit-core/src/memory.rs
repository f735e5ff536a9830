//! In-memory implementations of the persistence and notification traits.
//!
//! Used by the development node and by tests; production deployments plug in
//! their own database-backed stores.

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::CoreError;
use crate::store::{PaymentNotifier, PaymentStore, SettlementMethodStore};
use crate::types::{PaymentRecord, SettlementMethod};

/// Settlement methods held in memory.
pub struct InMemorySettlementMethodStore {
    methods: DashMap<Uuid, SettlementMethod>,
}

impl InMemorySettlementMethodStore {
    pub fn new() -> Self {
        Self {
            methods: DashMap::new(),
        }
    }

    pub fn insert(&self, method: SettlementMethod) {
        self.methods.insert(method.id, method);
    }

    /// Enable or disable a method. Returns false if it does not exist.
    pub fn set_enabled(&self, id: &Uuid, enabled: bool) -> bool {
        match self.methods.get_mut(id) {
            Some(mut method) => {
                method.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl Default for InMemorySettlementMethodStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SettlementMethodStore for InMemorySettlementMethodStore {
    async fn find_enabled(&self) -> Result<Vec<SettlementMethod>, CoreError> {
        let mut enabled: Vec<SettlementMethod> = self
            .methods
            .iter()
            .filter(|m| m.enabled)
            .map(|m| m.value().clone())
            .collect();
        // Uuid v7 ids sort by creation time.
        enabled.sort_by_key(|m| m.id);
        Ok(enabled)
    }
}

/// Payment records held in memory, keyed by id.
pub struct InMemoryPaymentStore {
    payments: DashMap<Uuid, PaymentRecord>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self {
            payments: DashMap::new(),
        }
    }

    pub fn insert(&self, record: PaymentRecord) {
        self.payments.insert(record.id, record);
    }

    pub fn get(&self, id: &Uuid) -> Option<PaymentRecord> {
        self.payments.get(id).map(|r| r.clone())
    }

    pub fn len(&self) -> usize {
        self.payments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payments.is_empty()
    }
}

impl Default for InMemoryPaymentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn find_by_execution_condition(
        &self,
        execution_condition: &str,
    ) -> Result<Option<PaymentRecord>, CoreError> {
        Ok(self
            .payments
            .iter()
            .find(|r| r.execution_condition == execution_condition)
            .map(|r| r.value().clone()))
    }

    async fn save(&self, record: &PaymentRecord) -> Result<(), CoreError> {
        self.payments.insert(record.id, record.clone());
        Ok(())
    }
}

/// A payment pushed to a user's live connection.
#[derive(Debug, Clone)]
pub struct PaymentNotification {
    pub username: String,
    pub record: PaymentRecord,
}

/// Fans payment notifications out over a broadcast channel.
pub struct BroadcastNotifier {
    tx: broadcast::Sender<PaymentNotification>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PaymentNotification> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

impl PaymentNotifier for BroadcastNotifier {
    fn payment(&self, username: &str, record: &PaymentRecord) {
        // No subscribers simply means nobody is online.
        let _ = self.tx.send(PaymentNotification {
            username: username.to_string(),
            record: record.clone(),
        });
    }
}
