//! Integration test: a payment from one local user to another, from quote
//! through setup and payment to the receiver marking it complete.

use std::sync::Arc;
use std::time::Duration;

use ilpkit_core::memory::{BroadcastNotifier, InMemoryPaymentStore};
use ilpkit_core::{PaymentState, RequestState};
use ilpkit_integration_tests::{
    eventually, LocalSetup, MockLedger, MockReceiverFactory, MockSenderFactory,
};
use ilpkit_spsp::{
    PayDestination, PayRequest, PaymentSource, QuoteDestination, QuoteRequest, ReceiverService,
    SenderService, SpspConfig, SpspError,
};
use rust_decimal::Decimal;

const BOB_URI: &str = "https://red.example/api/receivers/bob";

struct Wallet {
    ledger: Arc<MockLedger>,
    senders: Arc<MockSenderFactory>,
    receivers: Arc<MockReceiverFactory>,
    payments: Arc<InMemoryPaymentStore>,
    notifier: Arc<BroadcastNotifier>,
    sender: SenderService,
    receiver: ReceiverService,
}

fn wallet(request_timeout_ms: u64) -> Wallet {
    let config = Arc::new(SpspConfig {
        ledger_prefix: "example.red.".into(),
        request_timeout_ms,
        ..SpspConfig::default()
    });
    let ledger = MockLedger::new(&config.ledger_prefix);
    // Two destination units per source unit.
    let senders = Arc::new(MockSenderFactory::new(ledger.clone(), Decimal::from(2)));
    let receivers = Arc::new(MockReceiverFactory::new(ledger.clone()));
    let payments = Arc::new(InMemoryPaymentStore::new());
    let notifier = Arc::new(BroadcastNotifier::default());

    let receiver = ReceiverService::new(
        config.clone(),
        receivers.clone(),
        payments.clone(),
        notifier.clone(),
    );
    let setup = Arc::new(LocalSetup::default());
    setup.register(BOB_URI, receiver.clone(), "bob", payments.clone());
    let sender = SenderService::new(config, senders.clone(), setup);

    Wallet {
        ledger,
        senders,
        receivers,
        payments,
        notifier,
        sender,
        receiver,
    }
}

fn pay_bob(amount: i64) -> PayRequest {
    PayRequest {
        source: PaymentSource {
            username: "alice".into(),
        },
        destination: PayDestination {
            payment_uri: BOB_URI.into(),
        },
        source_amount: Decimal::from(amount) / Decimal::from(2),
        destination_amount: Decimal::from(amount),
        memo: Some("lunch".into()),
    }
}

#[tokio::test]
async fn test_quote_then_pay() {
    let wallet = wallet(2_000);
    let mut notifications = wallet.notifier.subscribe();

    let quote = wallet
        .sender
        .quote(QuoteRequest {
            source: PaymentSource {
                username: "alice".into(),
            },
            destination: QuoteDestination {
                ilp_address: "example.red.bob".into(),
            },
            source_amount: None,
            destination_amount: Some(Decimal::from(10)),
        })
        .await
        .unwrap();
    assert_eq!(quote.source_amount, Decimal::from(5));

    let params = wallet.sender.pay(pay_bob(10)).await.unwrap();
    assert_eq!(params.source_amount, Decimal::from(5));
    assert_eq!(params.destination_amount, Decimal::from(10));
    assert!(params.uuid.is_some());
    assert_eq!(wallet.ledger.transfers(), 1);

    let note = tokio::time::timeout(Duration::from_secs(1), notifications.recv())
        .await
        .expect("payment notification")
        .unwrap();
    assert_eq!(note.username, "bob");
    assert_eq!(note.record.state, PaymentState::Success);
    assert_eq!(note.record.source_identifier.as_deref(), Some("alice"));
    assert_eq!(note.record.memo.as_deref(), Some("lunch"));

    let stored = wallet.payments.get(&note.record.id).unwrap();
    assert_eq!(stored.state, PaymentState::Success);

    // Both sessions were released once the flows finished.
    assert!(wallet.sender.pool().is_empty().await);
    let receiver = &wallet.receiver;
    assert!(eventually(|| receiver.pending_count() == 0).await);
    let ledger = &wallet.ledger;
    assert!(eventually(|| !ledger.is_listening("bob")).await);
    assert!(wallet.receiver.pool().is_empty().await);
}

#[tokio::test]
async fn test_sessions_are_shared_across_payments() {
    let wallet = wallet(2_000);

    let (first, second, third) = tokio::join!(
        wallet.sender.pay(pay_bob(4)),
        wallet.sender.pay(pay_bob(6)),
        wallet.sender.pay(pay_bob(8)),
    );
    assert!(first.is_ok() && second.is_ok() && third.is_ok());
    assert_eq!(wallet.ledger.transfers(), 3);

    let payments = &wallet.payments;
    assert!(eventually(|| payments.len() == 3).await);
    let receiver = &wallet.receiver;
    assert!(eventually(|| receiver.pending_count() == 0).await);

    // Concurrent payments may reuse a live session or start a fresh one
    // after the previous was torn down, but never more than one each.
    assert!(wallet.senders.counter.created() <= 3);
    assert!(wallet.receivers.counter.created() <= 3);
    assert!(wallet.sender.pool().is_empty().await);
}

#[tokio::test]
async fn test_request_expires_without_payment() {
    let wallet = wallet(50);

    let request = wallet
        .receiver
        .create_request("bob", Decimal::from(3))
        .await
        .unwrap();
    let request_id = request.address.trim_start_matches("example.red.bob.").to_string();
    assert_eq!(wallet.receiver.pending_state(&request_id), Some(RequestState::Pending));
    assert!(wallet.ledger.is_listening("bob"));

    let receiver = &wallet.receiver;
    let id = request_id.clone();
    assert!(eventually(|| receiver.pending_state(&id) == Some(RequestState::Expired)).await);
    let ledger = &wallet.ledger;
    assert!(eventually(|| !ledger.is_listening("bob")).await);
}

#[tokio::test]
async fn test_unknown_payee_fails_setup() {
    let wallet = wallet(2_000);
    let mut request = pay_bob(10);
    request.destination.payment_uri = "https://red.example/api/receivers/carol".into();

    let err = wallet.sender.pay(request).await.unwrap_err();
    assert!(matches!(err, SpspError::Setup(_)));
    assert_eq!(wallet.ledger.transfers(), 0);
    assert!(wallet.sender.pool().is_empty().await);
}
