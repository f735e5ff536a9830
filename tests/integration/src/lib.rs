//! Fixtures shared by the integration tests.
//!
//! - [`StaticLookup`] and [`ConnectorNode`]: connector nodes wired together
//!   over a loopback network
//! - [`MockLedger`]: a ledger both payment runtimes settle through
//! - [`LocalSetup`]: routes payment setup calls to in-process receivers

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::broadcast;
use uuid::Uuid;

use ilpkit_connector::adapters::{LoopbackNetwork, LoopbackTransport};
use ilpkit_connector::{ConnectorConfig, ConnectorError, HostInfo, HostLookup, NodeKey, PeerManager};
use ilpkit_core::memory::{InMemoryPaymentStore, InMemorySettlementMethodStore};
use ilpkit_core::{Amount, PaymentRecord, Peer, PeerId};
use ilpkit_spsp::{
    IncomingTransfer, PaymentParams, PaymentRequest, PaymentSetup, Receiver, ReceiverFactory,
    ReceiverService, RuntimeConfig, Sender, SenderFactory, SetupRequest, SpspError, Teardown,
};

// =========================================================================
// Connector fixtures
// =========================================================================

/// Host identities answered from memory.
#[derive(Default)]
pub struct StaticLookup {
    hosts: DashMap<String, HostInfo>,
    calls: AtomicUsize,
}

impl StaticLookup {
    pub fn publish(&self, hostname: &str, key: &NodeKey) {
        self.hosts.insert(
            format!("https://{hostname}"),
            HostInfo {
                public_key: key.public_key_hex(),
                peers_rpc_uri: format!("https://{hostname}/api/peers/rpc"),
            },
        );
    }

    pub fn withdraw(&self, hostname: &str) {
        self.hosts.remove(&format!("https://{hostname}"));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HostLookup for StaticLookup {
    async fn lookup(&self, uri: &str) -> Result<HostInfo, ConnectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.hosts
            .get(uri)
            .map(|h| h.value().clone())
            .ok_or_else(|| ConnectorError::Discovery {
                host: uri.to_string(),
                reason: "host not found".into(),
            })
    }
}

pub struct ConnectorNode {
    pub hostname: String,
    pub key: NodeKey,
    pub manager: PeerManager,
    pub transport: Arc<LoopbackTransport>,
    pub methods: Arc<InMemorySettlementMethodStore>,
}

impl ConnectorNode {
    /// Create a node, publish its identity and attach it to `network`.
    pub fn spawn(network: &Arc<LoopbackNetwork>, lookup: &Arc<StaticLookup>, hostname: &str) -> Self {
        let key = NodeKey::generate();
        lookup.publish(hostname, &key);

        let config = ConnectorConfig {
            secret_key: key.secret_hex(),
            client_host: format!("https://{hostname}"),
            negotiation_timeout_secs: 2,
            ..ConnectorConfig::default()
        };
        let transport = Arc::new(LoopbackTransport::new(network.clone(), key.public_key_hex()));
        let methods = Arc::new(InMemorySettlementMethodStore::new());
        let manager = PeerManager::new(config, transport.clone(), lookup.clone(), methods.clone())
            .expect("valid connector config");

        Self {
            hostname: hostname.to_string(),
            key,
            manager,
            transport,
            methods,
        }
    }

    /// This node as seen from another node's peer list.
    pub fn as_peer(&self, id: i64, destination: &str) -> Peer {
        let mut peer = Peer::new(PeerId(id), &self.hostname, "USD", Decimal::from(500));
        peer.destination = destination.to_string();
        peer
    }
}

// =========================================================================
// Payment runtime fixtures
// =========================================================================

struct LedgerRequest {
    username: String,
    request_id: String,
}

/// Ledger shared by the mock runtimes. Transfers paid by a sender show up
/// on the listening receiver of the account the request belongs to.
pub struct MockLedger {
    prefix: String,
    listeners: DashMap<String, broadcast::Sender<IncomingTransfer>>,
    requests: DashMap<String, LedgerRequest>,
    transfers: AtomicUsize,
}

impl MockLedger {
    pub fn new(prefix: &str) -> Arc<Self> {
        Arc::new(Self {
            prefix: prefix.to_string(),
            listeners: DashMap::new(),
            requests: DashMap::new(),
            transfers: AtomicUsize::new(0),
        })
    }

    pub fn is_listening(&self, username: &str) -> bool {
        self.listeners.contains_key(username)
    }

    pub fn transfers(&self) -> usize {
        self.transfers.load(Ordering::SeqCst)
    }

    fn deliver(&self, params: &PaymentParams) -> Result<(), SpspError> {
        let request = self.requests.get(&params.destination_account).ok_or_else(|| {
            SpspError::Payment(format!("unknown destination {}", params.destination_account))
        })?;
        let listener = self.listeners.get(&request.username).ok_or_else(|| {
            SpspError::Payment(format!("{} is not listening", request.username))
        })?;

        listener
            .send(IncomingTransfer {
                id: params.uuid.unwrap_or_else(Uuid::now_v7),
                request_id: request.request_id.clone(),
                execution_condition: params.execution_condition.clone(),
                amount: params.destination_amount,
            })
            .map_err(|_| SpspError::Payment("receiver went away".into()))?;
        self.transfers.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockReceiver {
    ledger: Arc<MockLedger>,
    username: String,
    tx: broadcast::Sender<IncomingTransfer>,
}

#[async_trait]
impl Teardown for MockReceiver {
    async fn teardown(&self) -> Result<(), SpspError> {
        self.ledger.listeners.remove(&self.username);
        Ok(())
    }
}

#[async_trait]
impl Receiver for MockReceiver {
    async fn listen(&self) -> Result<(), SpspError> {
        self.ledger
            .listeners
            .insert(self.username.clone(), self.tx.clone());
        Ok(())
    }

    async fn create_request(&self, amount: Amount) -> Result<PaymentRequest, SpspError> {
        let request_id = Uuid::now_v7().simple().to_string();
        let address = format!("{}{}.{}", self.ledger.prefix, self.username, request_id);
        self.ledger.requests.insert(
            address.clone(),
            LedgerRequest {
                username: self.username.clone(),
                request_id,
            },
        );
        Ok(PaymentRequest {
            address,
            amount,
            expires_at: None,
            condition: format!("cc:{}", Uuid::now_v7().simple()),
            data: None,
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<IncomingTransfer> {
        self.tx.subscribe()
    }
}

#[derive(Default)]
pub struct CountingFactory {
    created: AtomicUsize,
}

impl CountingFactory {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

pub struct MockReceiverFactory {
    ledger: Arc<MockLedger>,
    pub counter: CountingFactory,
}

impl MockReceiverFactory {
    pub fn new(ledger: Arc<MockLedger>) -> Self {
        Self {
            ledger,
            counter: CountingFactory::default(),
        }
    }
}

#[async_trait]
impl ReceiverFactory for MockReceiverFactory {
    async fn create_receiver(&self, config: RuntimeConfig) -> Result<Arc<dyn Receiver>, SpspError> {
        self.counter.created.fetch_add(1, Ordering::SeqCst);
        let username = config
            .account
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        let (tx, _) = broadcast::channel(16);
        Ok(Arc::new(MockReceiver {
            ledger: self.ledger.clone(),
            username,
            tx,
        }))
    }
}

/// Sender converting at a fixed rate of destination units per source unit.
pub struct MockSender {
    ledger: Arc<MockLedger>,
    rate: Decimal,
}

#[async_trait]
impl Teardown for MockSender {
    async fn teardown(&self) -> Result<(), SpspError> {
        Ok(())
    }
}

#[async_trait]
impl Sender for MockSender {
    async fn quote_source_amount(&self, _: &str, source_amount: Amount) -> Result<Amount, SpspError> {
        Ok(source_amount * self.rate)
    }

    async fn quote_destination_amount(
        &self,
        _: &str,
        destination_amount: Amount,
    ) -> Result<Amount, SpspError> {
        Ok(destination_amount / self.rate)
    }

    async fn quote_request(&self, request: &PaymentRequest) -> Result<PaymentParams, SpspError> {
        Ok(PaymentParams {
            uuid: None,
            source_amount: request.amount / self.rate,
            destination_amount: request.amount,
            destination_account: request.address.clone(),
            connector_account: None,
            execution_condition: request.condition.clone(),
            expires_at: request.expires_at,
            data: request.data.clone(),
        })
    }

    async fn pay_request(&self, params: &PaymentParams) -> Result<(), SpspError> {
        self.ledger.deliver(params)
    }
}

pub struct MockSenderFactory {
    ledger: Arc<MockLedger>,
    rate: Decimal,
    pub counter: CountingFactory,
}

impl MockSenderFactory {
    pub fn new(ledger: Arc<MockLedger>, rate: Decimal) -> Self {
        Self {
            ledger,
            rate,
            counter: CountingFactory::default(),
        }
    }
}

#[async_trait]
impl SenderFactory for MockSenderFactory {
    async fn create_sender(&self, _: RuntimeConfig) -> Result<Arc<dyn Sender>, SpspError> {
        self.counter.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockSender {
            ledger: self.ledger.clone(),
            rate: self.rate,
        }))
    }
}

struct Payee {
    service: ReceiverService,
    username: String,
    payments: Arc<InMemoryPaymentStore>,
}

/// Answers payment setup calls the way a payee's SPSP endpoint would: it
/// records a pending payment and issues a request through the payee's
/// receiver service.
#[derive(Default)]
pub struct LocalSetup {
    payees: DashMap<String, Payee>,
}

impl LocalSetup {
    pub fn register(
        &self,
        payment_uri: &str,
        service: ReceiverService,
        username: &str,
        payments: Arc<InMemoryPaymentStore>,
    ) {
        self.payees.insert(
            payment_uri.to_string(),
            Payee {
                service,
                username: username.to_string(),
                payments,
            },
        );
    }
}

#[async_trait]
impl PaymentSetup for LocalSetup {
    async fn setup(
        &self,
        payment_uri: &str,
        request: &SetupRequest,
    ) -> Result<PaymentRequest, SpspError> {
        let (service, username, payments) = {
            let payee = self
                .payees
                .get(payment_uri)
                .ok_or_else(|| SpspError::Setup(format!("{payment_uri}: 404 Not Found")))?;
            (payee.service.clone(), payee.username.clone(), payee.payments.clone())
        };

        let payment_request = service.create_request(&username, request.amount).await?;

        let mut record = PaymentRecord::new(payment_request.condition.clone());
        record.source_identifier = Some(request.sender_identifier.clone());
        record.destination_identifier = Some(username);
        record.destination_amount = Some(request.amount);
        record.memo = request.memo.clone();
        payments.insert(record);

        Ok(payment_request)
    }
}

/// Poll `check` until it holds or roughly a second has passed.
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    check()
}
