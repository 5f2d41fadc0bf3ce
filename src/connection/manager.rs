//! Store connection manager.
//!
//! Owns the shared `KvClient` handle. Only this type installs, replaces or drops the
//! handle, always together with the state under one write lock, so the state is never
//! `Connected` while the handle is absent.

use super::types::{
    ConnectionError, ConnectionSettings, ConnectionState, ProbeOutcome, duration_millis, next_backoff,
};
use crate::kv::client::{KvClient, KvConnector};
use crate::kv::error::KvError;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{RwLock, mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};

/// Polling granularity of `wait_for_connection`.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

struct Link {
    state: ConnectionState,
    client: Option<Arc<dyn KvClient>>,
}

pub struct ConnectionManager {
    settings: ConnectionSettings,
    connector: Arc<dyn KvConnector>,
    link: RwLock<Link>,
    trigger_tx: mpsc::Sender<()>,
    trigger_rx: Mutex<Option<mpsc::Receiver<()>>>,
    shutdown_tx: watch::Sender<bool>,
    retry_interval_ms: AtomicU64,
}

impl ConnectionManager {
    /// Creates a disconnected manager. Nothing runs until `start` is called.
    pub fn new(settings: ConnectionSettings, connector: Arc<dyn KvConnector>) -> Arc<Self> {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (shutdown_tx, _) = watch::channel(false);
        let retry_interval_ms = AtomicU64::new(duration_millis(settings.reconnect_interval));

        Arc::new(Self {
            settings,
            connector,
            link: RwLock::new(Link {
                state: ConnectionState::Disconnected,
                client: None,
            }),
            trigger_tx,
            trigger_rx: Mutex::new(Some(trigger_rx)),
            shutdown_tx,
            retry_interval_ms,
        })
    }

    /// Spawns the reconnect and health check loops and fires the first connect attempt.
    /// Returns immediately; the first attempt happens in the background.
    pub fn start(self: &Arc<Self>) {
        let receiver = self
            .trigger_rx
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());

        let Some(receiver) = receiver else {
            tracing::warn!("Connection manager already started");
            return;
        };

        tracing::info!(
            "Starting store connection manager ({} endpoint(s))",
            self.settings.connect.endpoints.len()
        );

        let _connect_handle = {
            let manager = self.clone();
            tokio::spawn(async move {
                manager.connect_loop(receiver).await;
            })
        };

        let _health_handle = {
            let manager = self.clone();
            tokio::spawn(async move {
                manager.health_check_loop().await;
            })
        };

        self.trigger_connect();
    }

    pub async fn state(&self) -> ConnectionState {
        self.link.read().await.state
    }

    pub async fn is_connected(&self) -> bool {
        let link = self.link.read().await;
        link.state == ConnectionState::Connected && link.client.is_some()
    }

    /// The current handle, if any. It may go stale right after being returned; callers
    /// should treat I/O errors on it as a sign of disconnection.
    pub async fn client(&self) -> Option<Arc<dyn KvClient>> {
        self.link.read().await.client.clone()
    }

    /// Reconnect interval the connect loop will use after the next failure.
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms.load(Ordering::SeqCst))
    }

    /// Asks the connect loop for an attempt. Redundant requests coalesce.
    pub fn trigger_connect(&self) {
        let _ = self.trigger_tx.try_send(());
    }

    /// Waits up to `timeout` for a live connection.
    ///
    /// A zero timeout never waits: it fails with `NotConnected` unless already connected.
    /// Otherwise a connect attempt is requested and the state polled until connected or
    /// the timeout elapses.
    pub async fn wait_for_connection(&self, timeout: Duration) -> Result<(), ConnectionError> {
        if self.is_connected().await {
            return Ok(());
        }

        if timeout.is_zero() {
            return Err(ConnectionError::NotConnected);
        }

        self.trigger_connect();

        let poll = async {
            let mut ticker = tokio::time::interval(WAIT_POLL_INTERVAL);
            loop {
                ticker.tick().await;
                if self.is_connected().await {
                    return;
                }
            }
        };

        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| ConnectionError::Timeout(timeout))
    }

    /// `wait_for_connection` followed by fetching the handle.
    pub async fn ready_client(&self, timeout: Duration) -> Result<Arc<dyn KvClient>, ConnectionError> {
        self.wait_for_connection(timeout).await?;
        self.client().await.ok_or(ConnectionError::NotConnected)
    }

    /// One connect attempt: build a client, probe the first endpoint, install the handle.
    ///
    /// Never retries; on failure the state is `Disconnected` and the error returned.
    pub async fn try_connect(&self) -> Result<(), ConnectionError> {
        if self.is_shutdown() {
            return Err(ConnectionError::ShuttingDown);
        }

        let Some(endpoint) = self.settings.connect.probe_endpoint().map(str::to_string) else {
            self.disconnect().await;
            return Err(ConnectionError::NoEndpoints);
        };

        self.link.write().await.state = ConnectionState::Connecting;

        let dial_timeout = self.settings.connect.dial_timeout;
        let built = tokio::time::timeout(dial_timeout, self.connector.connect(&self.settings.connect)).await;
        let client = match built {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => {
                self.disconnect().await;
                return Err(ConnectionError::Connect(e));
            }
            Err(_) => {
                self.disconnect().await;
                return Err(ConnectionError::Connect(KvError::Transport(format!(
                    "dial timed out after {:?}",
                    dial_timeout
                ))));
            }
        };

        if let Err(e) = probe(client.as_ref(), &endpoint, dial_timeout).await {
            client.close().await;
            self.disconnect().await;
            return Err(ConnectionError::Probe(e));
        }

        if self.is_shutdown() {
            client.close().await;
            self.disconnect().await;
            return Err(ConnectionError::ShuttingDown);
        }

        let previous = {
            let mut link = self.link.write().await;
            link.state = ConnectionState::Connected;
            link.client.replace(client.clone())
        };

        if let Some(previous) = previous
            && !Arc::ptr_eq(&previous, &client)
        {
            previous.close().await;
        }

        Ok(())
    }

    /// One health check tick. A no-op while not connected.
    pub async fn check_health(&self) -> ProbeOutcome {
        let client = {
            let link = self.link.read().await;
            if link.state != ConnectionState::Connected {
                return ProbeOutcome::Skipped;
            }
            match &link.client {
                Some(client) => client.clone(),
                None => return ProbeOutcome::Skipped,
            }
        };

        let Some(endpoint) = self.settings.connect.probe_endpoint() else {
            return ProbeOutcome::Skipped;
        };

        match probe(client.as_ref(), endpoint, self.settings.connect.dial_timeout).await {
            Ok(()) => {
                tracing::trace!("Store health check passed");
                ProbeOutcome::Healthy
            }
            Err(e) => {
                tracing::error!("Store health check failed: {}", e);
                self.disconnect_if_current(&client).await;
                self.trigger_connect();
                ProbeOutcome::Failed
            }
        }
    }

    /// Stops the background loops and closes the live handle. Safe to call twice.
    pub async fn close(&self) {
        self.shutdown_tx.send_replace(true);
        if self.disconnect().await {
            tracing::info!("Store connection closed");
        }
    }

    fn is_shutdown(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    async fn connect_loop(self: Arc<Self>, mut trigger_rx: mpsc::Receiver<()>) {
        let base = self.settings.reconnect_interval;
        let max = self.settings.max_reconnect_interval;
        let mut current = base;
        let mut shutdown = self.shutdown_tx.subscribe();

        loop {
            if self.is_shutdown() {
                break;
            }

            tokio::select! {
                _ = shutdown.changed() => break,
                received = trigger_rx.recv() => {
                    if received.is_none() {
                        break;
                    }
                    if self.is_connected().await {
                        continue;
                    }

                    tracing::info!("Attempting to connect to store (interval: {:?})", current);

                    match self.try_connect().await {
                        Ok(()) => {
                            tracing::info!("Store connection established");
                            current = base;
                        }
                        Err(ConnectionError::ShuttingDown) => break,
                        Err(e) => {
                            tracing::error!("Store connection failed: {}", e);
                            current = next_backoff(current, max);
                            self.schedule_reconnect(current);
                        }
                    }
                    self.retry_interval_ms
                        .store(duration_millis(current), Ordering::SeqCst);
                }
            }
        }

        tracing::debug!("Connect loop stopped");
    }

    async fn health_check_loop(self: Arc<Self>) {
        let period = self.settings.health_check_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown = self.shutdown_tx.subscribe();

        loop {
            if self.is_shutdown() {
                break;
            }

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    self.check_health().await;
                }
            }
        }

        tracing::debug!("Health check loop stopped");
    }

    /// Fires a connect trigger after `delay` plus a little jitter, unless shut down first.
    fn schedule_reconnect(&self, delay: Duration) {
        let jitter_cap = (duration_millis(delay) / 10).max(1);
        let jitter = Duration::from_millis(rand::random::<u64>() % jitter_cap);
        let trigger = self.trigger_tx.clone();
        let mut shutdown = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.changed() => {}
                _ = tokio::time::sleep(delay.saturating_add(jitter)) => {
                    let _ = trigger.try_send(());
                }
            }
        });
    }

    /// Moves to `Disconnected` and closes the handle. Returns whether a handle was dropped.
    async fn disconnect(&self) -> bool {
        let stale = {
            let mut link = self.link.write().await;
            link.state = ConnectionState::Disconnected;
            link.client.take()
        };

        match stale {
            Some(client) => {
                client.close().await;
                true
            }
            None => false,
        }
    }

    /// Like `disconnect`, but only if `client` is still the installed handle.
    async fn disconnect_if_current(&self, client: &Arc<dyn KvClient>) {
        let stale = {
            let mut link = self.link.write().await;
            match &link.client {
                Some(current) if Arc::ptr_eq(current, client) => {
                    link.state = ConnectionState::Disconnected;
                    link.client.take()
                }
                _ => None,
            }
        };

        if let Some(stale) = stale {
            stale.close().await;
        }
    }
}

async fn probe(client: &dyn KvClient, endpoint: &str, timeout: Duration) -> Result<(), KvError> {
    match tokio::time::timeout(timeout, client.status(endpoint)).await {
        Ok(result) => result,
        Err(_) => Err(KvError::Transport(format!(
            "liveness probe timed out after {:?}",
            timeout
        ))),
    }
}
