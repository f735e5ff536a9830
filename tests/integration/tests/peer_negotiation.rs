//! Integration test: two connector nodes negotiating settlement methods
//! over a shared loopback network.

use std::sync::Arc;

use ilpkit_connector::adapters::LoopbackNetwork;
use ilpkit_connector::{ConnectOutcome, ConnectorError};
use ilpkit_core::{PeerId, SettlementMethod};
use ilpkit_integration_tests::{ConnectorNode, StaticLookup};
use rust_decimal::Decimal;

fn pair() -> (Arc<StaticLookup>, ConnectorNode, ConnectorNode) {
    let network = LoopbackNetwork::new();
    let lookup = Arc::new(StaticLookup::default());
    let red = ConnectorNode::spawn(&network, &lookup, "red.example");
    let blue = ConnectorNode::spawn(&network, &lookup, "blue.example");
    (lookup, red, blue)
}

// =========================================================================
// Handshake
// =========================================================================

#[tokio::test]
async fn test_both_ends_derive_the_same_namespace() {
    let (_lookup, red, blue) = pair();
    let blue_peer = blue.as_peer(1, "red-at-blue");
    let red_peer = red.as_peer(7, "blue-at-red");

    assert_eq!(red.manager.connect(&blue_peer).await.unwrap(), ConnectOutcome::Connected);
    assert_eq!(blue.manager.connect(&red_peer).await.unwrap(), ConnectOutcome::Connected);

    let red_ns = red.manager.registry().snapshot(PeerId(1)).await.unwrap().namespace;
    let blue_ns = blue.manager.registry().snapshot(PeerId(7)).await.unwrap().namespace;
    assert!(red_ns.is_some());
    assert_eq!(red_ns, blue_ns);
    assert!(red_ns.unwrap().ends_with(".usd."));
}

#[tokio::test]
async fn test_settlement_methods_round_trip() {
    let (_lookup, red, blue) = pair();

    let mut wire = SettlementMethod::new("custom", "Wire");
    wire.uri = Some("https://bank.example/wire?bank=blue".into());
    let paypal = SettlementMethod::new("paypal", "PayPal");
    let mut disabled = SettlementMethod::new("bitcoin", "Bitcoin");
    disabled.enabled = false;
    blue.methods.insert(wire.clone());
    blue.methods.insert(paypal.clone());
    blue.methods.insert(disabled);

    let blue_peer = blue.as_peer(1, "red-at-blue");
    let red_peer = red.as_peer(2, "blue-at-red");
    red.manager.connect(&blue_peer).await.unwrap();
    blue.manager.connect(&red_peer).await.unwrap();

    // Blue owes red 25 on their shared channel.
    let namespace = blue
        .manager
        .registry()
        .snapshot(PeerId(2))
        .await
        .unwrap()
        .namespace
        .unwrap();
    blue.transport
        .loopback_channel(&namespace)
        .unwrap()
        .set_balance(Decimal::from(25));

    let methods = red.manager.request_settlement_methods(&blue_peer).await.unwrap();
    assert_eq!(methods.len(), 2);

    let wire_offer = methods.iter().find(|m| m.id == wire.id).unwrap();
    assert_eq!(
        wire_offer.uri,
        "https://bank.example/wire?bank=blue&destination=blue-at-red"
    );
    let paypal_offer = methods.iter().find(|m| m.id == paypal.id).unwrap();
    assert_eq!(
        paypal_offer.uri,
        "https://blue.example/settle/paypal/blue-at-red?amount=25"
    );
    assert_eq!(red.manager.pending_negotiations(), 0);
}

#[tokio::test]
async fn test_negotiation_in_both_directions() {
    let (_lookup, red, blue) = pair();
    red.methods.insert(SettlementMethod::new("paypal", "Red PayPal"));
    blue.methods.insert(SettlementMethod::new("paypal", "Blue PayPal"));

    let blue_peer = blue.as_peer(1, "d1");
    let red_peer = red.as_peer(2, "d2");
    red.manager.connect(&blue_peer).await.unwrap();
    blue.manager.connect(&red_peer).await.unwrap();

    let (from_blue, from_red) = tokio::join!(
        red.manager.request_settlement_methods(&blue_peer),
        blue.manager.request_settlement_methods(&red_peer),
    );
    assert_eq!(from_blue.unwrap()[0].name, "Blue PayPal");
    assert_eq!(from_red.unwrap()[0].name, "Red PayPal");
}

// =========================================================================
// Failure paths
// =========================================================================

#[tokio::test]
async fn test_peer_without_channel_fails_fast() {
    let (_lookup, red, blue) = pair();
    let blue_peer = blue.as_peer(1, "d1");
    red.manager.connect(&blue_peer).await.unwrap();

    let err = red
        .manager
        .request_settlement_methods(&blue_peer)
        .await
        .unwrap_err();
    // Blue never opened its end, so the request cannot be delivered.
    assert!(matches!(err, ConnectorError::Channel(_)));
    assert_eq!(red.manager.pending_negotiations(), 0);
}

#[tokio::test]
async fn test_unpublished_host_stays_offline() {
    let (lookup, red, blue) = pair();
    lookup.withdraw("blue.example");
    let blue_peer = blue.as_peer(1, "d1");

    let outcome = red.manager.connect(&blue_peer).await.unwrap();
    assert!(matches!(outcome, ConnectOutcome::Unreachable(_)));
    assert!(!red.manager.status(&blue_peer).await.online);
    assert_eq!(red.transport.channel_count(), 0);

    let err = red
        .manager
        .request_settlement_methods(&blue_peer)
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectorError::PeerOffline(PeerId(1))));
}

#[tokio::test]
async fn test_disconnect_then_reconnect() {
    let (lookup, red, blue) = pair();
    blue.methods.insert(SettlementMethod::new("paypal", "PayPal"));
    let blue_peer = blue.as_peer(1, "d1");
    let red_peer = red.as_peer(2, "d2");
    red.manager.connect(&blue_peer).await.unwrap();
    blue.manager.connect(&red_peer).await.unwrap();

    red.manager.disconnect(&blue_peer).await;
    assert!(!red.manager.registry().contains(PeerId(1)));
    assert_eq!(red.transport.channel_count(), 0);

    let calls_before = lookup.calls();
    let status = red.manager.reconnect(&blue_peer).await.unwrap();
    assert!(status.online);
    assert_eq!(status.balance, Some(Decimal::ZERO));
    assert_eq!(lookup.calls(), calls_before + 1);

    let methods = red.manager.request_settlement_methods(&blue_peer).await.unwrap();
    assert_eq!(methods.len(), 1);
}

#[tokio::test]
async fn test_rpc_reaches_the_peer_channel() {
    let (_lookup, red, blue) = pair();
    let blue_peer = blue.as_peer(1, "d1");
    red.manager.connect(&blue_peer).await.unwrap();
    let namespace = red
        .manager
        .registry()
        .snapshot(PeerId(1))
        .await
        .unwrap()
        .namespace
        .unwrap();

    red.transport
        .loopback_channel(&namespace)
        .unwrap()
        .set_balance(Decimal::from(-4));
    let balance = red
        .manager
        .rpc(&namespace, "get_balance", serde_json::json!([]))
        .await
        .unwrap();
    assert_eq!(balance, serde_json::json!("-4"));

    let err = red
        .manager
        .rpc("peer.nobody.usd.", "get_balance", serde_json::json!([]))
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectorError::UnknownChannel(_)));
}
