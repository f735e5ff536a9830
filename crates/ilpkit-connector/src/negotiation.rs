//! Outstanding settlement method negotiations and descriptor construction.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use ilpkit_core::{Amount, Peer, SettlementMethod, SettlementMethodDescriptor};
use rust_decimal::Decimal;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::config::{ConnectorConfig, SettlementUriStyle};

struct PendingNegotiation {
    namespace: String,
    seq: u64,
    tx: oneshot::Sender<Vec<SettlementMethodDescriptor>>,
}

/// Requests we sent that are waiting for a `settlement_methods_response`.
#[derive(Default)]
pub struct PendingNegotiations {
    pending: DashMap<Uuid, PendingNegotiation>,
    next_seq: AtomicU64,
}

impl PendingNegotiations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a negotiation on `namespace` and return its correlation id.
    pub fn register(
        &self,
        namespace: &str,
    ) -> (Uuid, oneshot::Receiver<Vec<SettlementMethodDescriptor>>) {
        let (tx, rx) = oneshot::channel();
        let id = Uuid::now_v7();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.pending.insert(
            id,
            PendingNegotiation {
                namespace: namespace.to_string(),
                seq,
                tx,
            },
        );
        (id, rx)
    }

    pub fn remove(&self, id: &Uuid) {
        self.pending.remove(id);
    }

    /// Hand a response to the negotiation it answers.
    ///
    /// Without an id the oldest negotiation on the namespace is resolved.
    /// Returns false when nothing was waiting.
    pub fn resolve(
        &self,
        namespace: &str,
        id: Option<Uuid>,
        methods: Vec<SettlementMethodDescriptor>,
    ) -> bool {
        let key = match id {
            Some(id) => id,
            None => match self.oldest(namespace) {
                Some(id) => id,
                None => return false,
            },
        };

        match self
            .pending
            .remove_if(&key, |_, pending| pending.namespace == namespace)
        {
            Some((_, pending)) => pending.tx.send(methods).is_ok(),
            None => false,
        }
    }

    /// Drop every negotiation on `namespace`; waiters observe abandonment.
    pub fn abandon(&self, namespace: &str) {
        self.pending.retain(|_, pending| pending.namespace != namespace);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn oldest(&self, namespace: &str) -> Option<Uuid> {
        self.pending
            .iter()
            .filter(|entry| entry.namespace == namespace)
            .min_by_key(|entry| entry.seq)
            .map(|entry| *entry.key())
    }
}

/// Build the descriptors advertised to `peer` for the enabled methods.
pub fn build_descriptors(
    methods: &[SettlementMethod],
    peer: &Peer,
    balance: Amount,
    config: &ConnectorConfig,
) -> Vec<SettlementMethodDescriptor> {
    methods
        .iter()
        .map(|method| SettlementMethodDescriptor {
            id: method.id,
            name: method.name.clone(),
            description: method.description.clone(),
            uri: settlement_uri(method, peer, balance, config),
            logo: method.logo_url.clone(),
        })
        .collect()
}

fn settlement_uri(
    method: &SettlementMethod,
    peer: &Peer,
    balance: Amount,
    config: &ConnectorConfig,
) -> String {
    match config.uri_style(&method.method_type) {
        SettlementUriStyle::Direct => {
            let base = method.uri.as_deref().unwrap_or_default();
            let sep = if base.contains('?') { '&' } else { '?' };
            format!("{base}{sep}destination={}", peer.destination)
        }
        SettlementUriStyle::Hosted => {
            let amount = balance.max(Decimal::ZERO);
            format!(
                "{}/settle/{}/{}?amount={}",
                config.client_host.trim_end_matches('/'),
                method.method_type,
                peer.destination,
                amount
            )
        }
    }
}
