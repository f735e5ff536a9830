//! Payment setup against a payee's SPSP endpoint.

use async_trait::async_trait;
use ilpkit_core::Amount;
use serde::Serialize;
use std::time::Duration;

use crate::error::SpspError;
use crate::runtime::PaymentRequest;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetupRequest {
    pub amount: Amount,
    pub sender_identifier: String,
    pub memo: Option<String>,
}

#[async_trait]
pub trait PaymentSetup: Send + Sync {
    async fn setup(
        &self,
        payment_uri: &str,
        request: &SetupRequest,
    ) -> Result<PaymentRequest, SpspError>;
}

/// Posts setup requests over HTTP.
pub struct HttpPaymentSetup {
    client: reqwest::Client,
}

impl HttpPaymentSetup {
    pub fn new(timeout: Duration) -> Result<Self, SpspError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SpspError::Setup(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PaymentSetup for HttpPaymentSetup {
    async fn setup(
        &self,
        payment_uri: &str,
        request: &SetupRequest,
    ) -> Result<PaymentRequest, SpspError> {
        let resp = self
            .client
            .post(payment_uri)
            .json(request)
            .send()
            .await
            .map_err(|e| SpspError::Setup(format!("{payment_uri}: {e}")))?;

        let resp = resp
            .error_for_status()
            .map_err(|e| SpspError::Setup(e.to_string()))?;

        resp.json::<PaymentRequest>()
            .await
            .map_err(|e| SpspError::Setup(format!("invalid setup response: {e}")))
    }
}
