//! Incoming payment requests.
//!
//! Every request issued through [`ReceiverService::create_request`] holds an
//! allocation of the user's receiver until either the matching transfer
//! arrives or the request deadline passes. A watcher task races the two,
//! settles the request's [`RequestState`] and then releases the receiver.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use ilpkit_core::{
    Amount, PaymentNotifier, PaymentStore, RequestEvent, RequestState, RequestStateMachine,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::SpspConfig;
use crate::error::SpspError;
use crate::pool::{Lease, SessionPool, Teardown};
use crate::runtime::{IncomingTransfer, PaymentRequest, Receiver, ReceiverFactory, RuntimeConfig};

struct PendingRequest {
    state: RequestState,
    /// Fires the deadline early; taken on shutdown.
    expire: Option<oneshot::Sender<()>>,
    finished_at: Option<Instant>,
}

enum Trigger {
    Transfer(IncomingTransfer),
    Deadline,
}

#[derive(Clone)]
pub struct ReceiverService {
    config: Arc<SpspConfig>,
    factory: Arc<dyn ReceiverFactory>,
    pool: Arc<SessionPool<dyn Receiver>>,
    payments: Arc<dyn PaymentStore>,
    notifier: Arc<dyn PaymentNotifier>,
    requests: Arc<DashMap<String, PendingRequest>>,
}

impl ReceiverService {
    pub fn new(
        config: Arc<SpspConfig>,
        factory: Arc<dyn ReceiverFactory>,
        payments: Arc<dyn PaymentStore>,
        notifier: Arc<dyn PaymentNotifier>,
    ) -> Self {
        Self {
            config,
            factory,
            pool: Arc::new(SessionPool::new("receivers")),
            payments,
            notifier,
            requests: Arc::new(DashMap::new()),
        }
    }

    pub fn pool(&self) -> &SessionPool<dyn Receiver> {
        &self.pool
    }

    /// Allocate the user's receiver. A new receiver is listening before it
    /// is handed out. Pair with [`release_receiver`](Self::release_receiver).
    pub async fn allocate_receiver(&self, username: &str) -> Result<Arc<dyn Receiver>, SpspError> {
        let factory = self.factory.clone();
        let config = self.config.runtime_config(username);
        let user = username.to_string();
        self.pool
            .allocate(username, || listening_receiver(factory, config, user))
            .await
    }

    async fn lease_receiver(&self, username: &str) -> Result<Lease<dyn Receiver>, SpspError> {
        let factory = self.factory.clone();
        let config = self.config.runtime_config(username);
        let user = username.to_string();
        self.pool
            .lease(username, || listening_receiver(factory, config, user))
            .await
    }

    pub async fn release_receiver(&self, username: &str) {
        self.pool.release(username).await;
    }

    /// Issue a payment request for `destination_amount` to `username`.
    pub async fn create_request(
        &self,
        username: &str,
        destination_amount: Amount,
    ) -> Result<PaymentRequest, SpspError> {
        self.prune_finished();

        // The lease gives the allocation back if this future is dropped
        // before the watcher owns it.
        let lease = self.lease_receiver(username).await?;
        let transfers = lease.instance().subscribe();

        let request = match lease.instance().create_request(destination_amount).await {
            Ok(request) => request,
            Err(e) => {
                lease.release().await;
                return Err(e);
            }
        };
        let request_id = self.config.request_id(username, &request.address).to_string();

        let (expire_tx, expire_rx) = oneshot::channel();
        let registered = match self.requests.entry(request_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(entry)
                if entry.get().state == RequestState::Pending =>
            {
                false
            }
            entry => {
                entry.insert(PendingRequest {
                    state: RequestState::Pending,
                    expire: Some(expire_tx),
                    finished_at: None,
                });
                true
            }
        };
        if !registered {
            lease.release().await;
            return Err(SpspError::DuplicateRequest(request_id));
        }

        debug!(username, request_id = %request_id, amount = %destination_amount, "payment request created");
        self.spawn_watcher(request_id, username.to_string(), lease, transfers, expire_rx);
        Ok(request)
    }

    /// State of a request, while it is pending or shortly after it finished.
    pub fn pending_state(&self, request_id: &str) -> Option<RequestState> {
        self.requests.get(request_id).map(|r| r.state)
    }

    /// Number of requests still waiting for their transfer.
    pub fn pending_count(&self) -> usize {
        self.requests
            .iter()
            .filter(|r| r.state == RequestState::Pending)
            .count()
    }

    /// Expire every pending request now. Returns how many were signalled.
    pub fn shutdown(&self) -> usize {
        let mut signalled = 0;
        for mut request in self.requests.iter_mut() {
            if request.state != RequestState::Pending {
                continue;
            }
            if let Some(expire) = request.expire.take() {
                if expire.send(()).is_ok() {
                    signalled += 1;
                }
            }
        }
        info!(signalled, "pending payment requests expired");
        signalled
    }

    fn spawn_watcher(
        &self,
        request_id: String,
        username: String,
        lease: Lease<dyn Receiver>,
        mut transfers: broadcast::Receiver<IncomingTransfer>,
        mut expire: oneshot::Receiver<()>,
    ) {
        let service = self.clone();
        let timeout = self.config.request_timeout();

        tokio::spawn(async move {
            let deadline = tokio::time::sleep(timeout);
            tokio::pin!(deadline);
            let mut skipped_total = 0u64;

            let trigger = loop {
                tokio::select! {
                    _ = &mut deadline => break Trigger::Deadline,
                    _ = &mut expire => break Trigger::Deadline,
                    incoming = transfers.recv() => match incoming {
                        Ok(transfer) if transfer.request_id == request_id => {
                            break Trigger::Transfer(transfer)
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            // The matching transfer may be among the skipped ones.
                            skipped_total += skipped;
                            error!(request_id = %request_id, skipped, "incoming transfers dropped");
                        }
                        Err(RecvError::Closed) => {
                            // No transfer can arrive any more; wait out the deadline.
                            tokio::select! {
                                _ = &mut deadline => {}
                                _ = &mut expire => {}
                            }
                            break Trigger::Deadline;
                        }
                    },
                }
            };

            match trigger {
                Trigger::Transfer(transfer) => {
                    service.on_transfer(&request_id, &username, transfer).await
                }
                Trigger::Deadline => {
                    service
                        .on_deadline(&request_id, &username, skipped_total)
                        .await
                }
            }
            lease.release().await;
        });
    }

    /// Compare-and-transition on the request's state. Only the caller that
    /// moves it out of `Pending` may clean up.
    fn transition(&self, request_id: &str, event: RequestEvent) -> bool {
        let Some(mut request) = self.requests.get_mut(request_id) else {
            return false;
        };
        match RequestStateMachine::transition(request.state, event) {
            Ok(next) => {
                request.state = next;
                request.expire = None;
                request.finished_at = Some(Instant::now());
                true
            }
            Err(e) => {
                debug!(request_id, error = %e, "request already settled");
                false
            }
        }
    }

    async fn on_transfer(&self, request_id: &str, username: &str, transfer: IncomingTransfer) {
        if !self.transition(request_id, RequestEvent::TransferArrived) {
            return;
        }

        match self
            .payments
            .find_by_execution_condition(&transfer.execution_condition)
            .await
        {
            Ok(Some(mut record)) => match record.mark_success() {
                Ok(()) => match self.payments.save(&record).await {
                    Ok(()) => {
                        self.notifier.payment(username, &record);
                        info!(username, request_id, payment_id = %record.id, "incoming payment completed");
                    }
                    Err(e) => error!(username, request_id, error = %e, "failed to save payment"),
                },
                Err(e) => warn!(username, request_id, error = %e, "payment already settled"),
            },
            Ok(None) => warn!(
                username,
                request_id,
                condition = %transfer.execution_condition,
                "no payment matches the transfer condition"
            ),
            Err(e) => error!(username, request_id, error = %e, "payment lookup failed"),
        }
    }

    async fn on_deadline(&self, request_id: &str, username: &str, skipped: u64) {
        if !self.transition(request_id, RequestEvent::DeadlineElapsed) {
            return;
        }
        if skipped > 0 {
            error!(
                username,
                request_id,
                skipped,
                "payment request expired after dropping incoming transfers; its payment may need reconciliation"
            );
        } else {
            info!(username, request_id, "payment request expired");
        }
    }

    /// Forget requests that finished longer than one request timeout ago.
    fn prune_finished(&self) {
        let keep_for = self.config.request_timeout();
        self.requests.retain(|_, request| match request.finished_at {
            Some(at) => at.elapsed() < keep_for,
            None => true,
        });
    }
}

/// Create a receiver and start it listening. A receiver that cannot listen
/// is stopped again.
async fn listening_receiver(
    factory: Arc<dyn ReceiverFactory>,
    config: RuntimeConfig,
    username: String,
) -> Result<Arc<dyn Receiver>, SpspError> {
    let receiver = factory.create_receiver(config).await?;
    if let Err(e) = receiver.listen().await {
        if let Err(stop) = receiver.teardown().await {
            debug!(username = %username, error = %stop, "stop after failed listen");
        }
        return Err(match e {
            SpspError::Listen(_) => e,
            other => SpspError::Listen(other.to_string()),
        });
    }
    debug!(username = %username, "receiver listening");
    Ok(receiver)
}
