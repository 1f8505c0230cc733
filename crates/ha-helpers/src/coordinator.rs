//! Update coordinator
//!
//! A coordinator owns one fetch function per integration instance, caches
//! the last good snapshot and tells listeners when it changes.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

/// A fetch failed; entities fed by the coordinator become unavailable
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct UpdateFailed(pub String);

impl UpdateFailed {
    pub fn new(message: impl std::fmt::Display) -> Self {
        Self(message.to_string())
    }
}

type FetchFuture<T> = Pin<Box<dyn Future<Output = Result<T, UpdateFailed>> + Send>>;
type FetchFn<T> = Box<dyn Fn() -> FetchFuture<T> + Send + Sync>;

/// Polls one fetch function and shares the result
pub struct DataUpdateCoordinator<T> {
    name: String,
    update_interval: Duration,
    fetch: FetchFn<T>,
    data: RwLock<Option<Arc<T>>>,
    last_update_success: AtomicBool,
    listeners: broadcast::Sender<()>,
}

impl<T: Send + Sync + 'static> DataUpdateCoordinator<T> {
    /// Create a coordinator; nothing is fetched until [`Self::refresh`]
    pub fn new<F, Fut>(name: impl Into<String>, update_interval: Duration, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, UpdateFailed>> + Send + 'static,
    {
        let (listeners, _) = broadcast::channel(16);
        Self {
            name: name.into(),
            update_interval,
            fetch: Box::new(move || Box::pin(fetch()) as FetchFuture<T>),
            data: RwLock::new(None),
            last_update_success: AtomicBool::new(true),
            listeners,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn update_interval(&self) -> Duration {
        self.update_interval
    }

    /// The last successfully fetched snapshot
    pub fn data(&self) -> Option<Arc<T>> {
        self.data
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Whether the most recent fetch succeeded
    pub fn last_update_success(&self) -> bool {
        self.last_update_success.load(Ordering::SeqCst)
    }

    /// Receive a notification after every refresh
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.listeners.subscribe()
    }

    /// Fetch now and notify listeners
    ///
    /// A failure keeps the previous snapshot and flips
    /// `last_update_success`; the transition is logged once.
    #[instrument(skip(self), fields(coordinator = %self.name))]
    pub async fn refresh(&self) -> Result<(), UpdateFailed> {
        let result = (self.fetch)().await;
        let was_ok = self.last_update_success.load(Ordering::SeqCst);

        let outcome = match result {
            Ok(data) => {
                self.store(data);
                if !was_ok {
                    info!("Fetching {} data recovered", self.name);
                }
                debug!("Finished fetching {} data", self.name);
                Ok(())
            }
            Err(err) => {
                self.last_update_success.store(false, Ordering::SeqCst);
                if was_ok {
                    error!("Error fetching {} data: {}", self.name, err);
                }
                Err(err)
            }
        };

        let _ = self.listeners.send(());
        outcome
    }

    /// Replace the snapshot with pushed data (no fetch)
    pub fn set_updated_data(&self, data: T) {
        self.store(data);
        let _ = self.listeners.send(());
    }

    fn store(&self, data: T) {
        *self
            .data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Arc::new(data));
        self.last_update_success.store(true, Ordering::SeqCst);
    }

    /// Refresh on a fixed interval until the task is aborted
    pub fn spawn_polling(self: &Arc<Self>) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(coordinator.update_interval);
            // The first tick completes immediately; setup already refreshed
            interval.tick().await;
            loop {
                interval.tick().await;
                let _ = coordinator.refresh().await;
            }
        })
    }
}
