//! Outbound quoting and payment.

use std::sync::Arc;

use ilpkit_core::Amount;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::SpspConfig;
use crate::error::SpspError;
use crate::pool::{Lease, SessionPool};
use crate::runtime::{PaymentParams, Sender, SenderFactory};
use crate::setup::{PaymentSetup, SetupRequest};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSource {
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteDestination {
    pub ilp_address: String,
}

/// Quote request. Exactly one of the amounts is fixed by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub source: PaymentSource,
    pub destination: QuoteDestination,
    #[serde(default)]
    pub source_amount: Option<Amount>,
    #[serde(default)]
    pub destination_amount: Option<Amount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub source_amount: Amount,
    pub destination_amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayDestination {
    /// Payee's SPSP endpoint.
    pub payment_uri: String,
}

/// A payment the user agreed to after quoting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayRequest {
    pub source: PaymentSource,
    pub destination: PayDestination,
    pub source_amount: Amount,
    pub destination_amount: Amount,
    #[serde(default)]
    pub memo: Option<String>,
}

enum FixedAmount {
    Source(Amount),
    Destination(Amount),
}

pub struct SenderService {
    config: Arc<SpspConfig>,
    factory: Arc<dyn SenderFactory>,
    setup: Arc<dyn PaymentSetup>,
    pool: Arc<SessionPool<dyn Sender>>,
}

impl SenderService {
    pub fn new(
        config: Arc<SpspConfig>,
        factory: Arc<dyn SenderFactory>,
        setup: Arc<dyn PaymentSetup>,
    ) -> Self {
        Self {
            config,
            factory,
            setup,
            pool: Arc::new(SessionPool::new("senders")),
        }
    }

    pub fn pool(&self) -> &SessionPool<dyn Sender> {
        &self.pool
    }

    async fn lease_sender(&self, username: &str) -> Result<Lease<dyn Sender>, SpspError> {
        let config = self.config.runtime_config(username);
        let factory = self.factory.clone();
        self.pool
            .lease(username, || async move { factory.create_sender(config).await })
            .await
    }

    /// Quote the side of the payment the caller did not fix.
    pub async fn quote(&self, request: QuoteRequest) -> Result<Quote, SpspError> {
        let fixed = match (request.source_amount, request.destination_amount) {
            (Some(source), None) => FixedAmount::Source(source),
            (None, Some(destination)) => FixedAmount::Destination(destination),
            _ => {
                return Err(SpspError::InvalidQuoteRequest(
                    "exactly one of source_amount and destination_amount is required".into(),
                ))
            }
        };

        let lease = self.lease_sender(&request.source.username).await?;
        let result = quote_with(lease.instance(), &request.destination.ilp_address, fixed).await;
        lease.release().await;

        result.map_err(SpspError::into_quote)
    }

    /// Set up and execute a payment the user agreed to.
    ///
    /// Nothing is paid if the payee would deliver a different amount than
    /// the agreed `destination_amount`.
    pub async fn pay(&self, request: PayRequest) -> Result<PaymentParams, SpspError> {
        let lease = self.lease_sender(&request.source.username).await?;
        let result = self.pay_with(lease.instance(), &request).await;
        lease.release().await;
        result
    }

    async fn pay_with(
        &self,
        sender: &dyn Sender,
        request: &PayRequest,
    ) -> Result<PaymentParams, SpspError> {
        let setup = SetupRequest {
            amount: request.destination_amount,
            sender_identifier: request.source.username.clone(),
            memo: request.memo.clone(),
        };
        let payment_request = self
            .setup
            .setup(&request.destination.payment_uri, &setup)
            .await?;

        let mut params = sender
            .quote_request(&payment_request)
            .await
            .map_err(SpspError::into_payment)?;

        // The payee's figure is not trusted for the source side.
        params.source_amount = request.source_amount;
        params.uuid = Some(Uuid::now_v7());

        if params.destination_amount != request.destination_amount {
            warn!(
                username = %request.source.username,
                expected = %request.destination_amount,
                quoted = %params.destination_amount,
                "payee quoted a different destination amount"
            );
            return Err(SpspError::AmountMismatch {
                expected: request.destination_amount,
                quoted: params.destination_amount,
            });
        }

        sender
            .pay_request(&params)
            .await
            .map_err(SpspError::into_payment)?;

        info!(
            username = %request.source.username,
            source_amount = %params.source_amount,
            destination_amount = %params.destination_amount,
            "payment sent"
        );
        Ok(params)
    }
}

async fn quote_with(
    sender: &dyn Sender,
    destination_address: &str,
    fixed: FixedAmount,
) -> Result<Quote, SpspError> {
    match fixed {
        FixedAmount::Source(source_amount) => {
            let destination_amount = sender
                .quote_source_amount(destination_address, source_amount)
                .await?;
            Ok(Quote {
                source_amount,
                destination_amount,
            })
        }
        FixedAmount::Destination(destination_amount) => {
            let source_amount = sender
                .quote_destination_amount(destination_address, destination_amount)
                .await?;
            Ok(Quote {
                source_amount,
                destination_amount,
            })
        }
    }
}
