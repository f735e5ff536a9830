//! Reference counted session cache.
//!
//! Sender and receiver runtimes are expensive to set up (a receiver has to
//! start listening on the ledger), so one instance is shared per user for as
//! long as at least one payment flow holds it.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::error::SpspError;

/// Shutdown hook invoked when the last allocation of a session is released.
#[async_trait]
pub trait Teardown: Send + Sync {
    async fn teardown(&self) -> Result<(), SpspError>;
}

struct Allocation<T: ?Sized> {
    instance: Arc<T>,
    refcount: usize,
}

pub struct SessionPool<T: ?Sized + Teardown> {
    name: &'static str,
    /// One slot per key. A slot is empty while its first instance is being
    /// created.
    slots: DashMap<String, Arc<Mutex<Option<Allocation<T>>>>>,
}

impl<T: ?Sized + Teardown + 'static> SessionPool<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slots: DashMap::new(),
        }
    }

    fn is_current(&self, key: &str, slot: &Arc<Mutex<Option<Allocation<T>>>>) -> bool {
        self.slots
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current.value(), slot))
    }

    /// Lock the live slot for `key`, creating an empty one if there is none.
    async fn lock_slot(
        &self,
        key: &str,
    ) -> (
        Arc<Mutex<Option<Allocation<T>>>>,
        OwnedMutexGuard<Option<Allocation<T>>>,
    ) {
        loop {
            let slot = self
                .slots
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(None)))
                .value()
                .clone();
            let guard = slot.clone().lock_owned().await;

            // The last release removed this slot while we waited for it.
            if self.is_current(key, &slot) {
                return (slot, guard);
            }
        }
    }

    /// Take an allocation of the session for `key`, creating it with
    /// `factory` if there is none. A failed factory leaves no entry behind.
    ///
    /// Creation and teardown serialize per key only, so concurrent first
    /// allocations of a key create exactly one instance while other keys
    /// proceed.
    pub async fn allocate<F, Fut>(&self, key: &str, factory: F) -> Result<Arc<T>, SpspError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<T>, SpspError>>,
    {
        let (slot, mut guard) = self.lock_slot(key).await;

        if let Some(entry) = guard.as_mut() {
            entry.refcount += 1;
            return Ok(entry.instance.clone());
        }

        match factory().await {
            Ok(instance) => {
                *guard = Some(Allocation {
                    instance: instance.clone(),
                    refcount: 1,
                });
                debug!(pool = self.name, key, "session created");
                Ok(instance)
            }
            Err(e) => {
                self.slots.remove_if(key, |_, current| Arc::ptr_eq(current, &slot));
                Err(e)
            }
        }
    }

    /// Give back one allocation. The last release tears the session down;
    /// teardown failures are logged and swallowed. Unknown keys are ignored.
    pub async fn release(&self, key: &str) {
        let Some(slot) = self.slots.get(key).map(|s| s.value().clone()) else {
            return;
        };
        let mut guard = slot.lock().await;
        if !self.is_current(key, &slot) {
            return;
        }

        let Some(entry) = guard.as_mut() else {
            return;
        };
        entry.refcount = entry.refcount.saturating_sub(1);
        if entry.refcount > 0 {
            return;
        }

        // Allocations of this key wait on the slot until teardown is done.
        if let Some(entry) = guard.take() {
            if let Err(e) = entry.instance.teardown().await {
                debug!(pool = self.name, key, error = %e, "session teardown failed");
            }
            debug!(pool = self.name, key, "session closed");
        }
        self.slots.remove_if(key, |_, current| Arc::ptr_eq(current, &slot));
    }

    /// Like [`allocate`](Self::allocate) but returns a [`Lease`] that gives
    /// the allocation back even if the holder is dropped early.
    pub async fn lease<F, Fut>(self: &Arc<Self>, key: &str, factory: F) -> Result<Lease<T>, SpspError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<T>, SpspError>>,
    {
        let instance = self.allocate(key, factory).await?;
        Ok(Lease {
            pool: self.clone(),
            key: key.to_string(),
            instance,
            released: false,
        })
    }

    pub async fn refcount(&self, key: &str) -> usize {
        let Some(slot) = self.slots.get(key).map(|s| s.value().clone()) else {
            return 0;
        };
        let guard = slot.lock().await;
        guard.as_ref().map(|entry| entry.refcount).unwrap_or(0)
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        let slots: Vec<_> = self.slots.iter().map(|s| s.value().clone()).collect();
        let mut live = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                live += 1;
            }
        }
        live
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// One allocation taken from a [`SessionPool`].
pub struct Lease<T: ?Sized + Teardown + 'static> {
    pool: Arc<SessionPool<T>>,
    key: String,
    instance: Arc<T>,
    released: bool,
}

impl<T: ?Sized + Teardown + 'static> Lease<T> {
    pub fn instance(&self) -> &T {
        &self.instance
    }

    /// Give the allocation back and wait for it to be processed.
    ///
    /// The release runs on its own task, so it completes exactly once even
    /// if this future is dropped before it resolves.
    pub async fn release(mut self) {
        self.released = true;
        let pool = self.pool.clone();
        let key = std::mem::take(&mut self.key);
        let task = tokio::spawn(async move {
            pool.release(&key).await;
        });
        if let Err(e) = task.await {
            debug!(pool = self.pool.name, error = %e, "session release task failed");
        }
    }
}

impl<T: ?Sized + Teardown + 'static> Drop for Lease<T> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        // Dropped mid-flight (caller stopped awaiting); release in the background.
        let pool = self.pool.clone();
        let key = std::mem::take(&mut self.key);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                pool.release(&key).await;
            });
        }
    }
}
