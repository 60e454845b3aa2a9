//! Real-time channel manager
//!
//! Maintains the one live event channel, authenticated with the current
//! session token from the credential store.
//!
//! # State machine
//!
//! ```text
//! Disconnected ──connect/arm──► Connecting ──handshake ok──► Connected
//!      ▲                            │  ▲                        │
//!      │ give-up (5 failures)       │  │ backoff delay          │ transport
//!      └──────────── Reconnecting ◄─┘  └───── Reconnecting ◄────┘ drop
//! ```
//!
//! `reconnect_attempt` resets to zero on entering `Connected` and grows by
//! one per failed attempt. Failures below the attempt budget are invisible
//! to the rest of the system; terminal give-up is surfaced once and
//! requires an explicit `connect()` to re-arm.
//!
//! Outbound commands are never buffered across a disconnect: `send` while
//! not connected drops the command with a logged warning. Callers needing
//! delivery guarantees use the request/response path instead.

use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::backoff::{delay_for_attempt, with_jitter};
use super::connection::{ChannelConnector, EstablishedChannel, WsConnector};
use super::events::{ChannelEvent, EventSubscription, HandlerRegistry};
use crate::cache::{CacheStore, Resource, ResourceItem};
use crate::config::ClientConfig;
use crate::credentials::CredentialStore;
use crate::error::ChannelError;
use crate::identity::SessionEvents;

/// Connection status, mirrored to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Observable connection state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChannelState {
    pub status: ChannelStatus,
    /// Server-assigned id, present only while connected.
    pub connection_id: Option<String>,
    pub reconnect_attempt: u32,
    pub last_error: Option<String>,
}

/// Read-only subscription to channel state transitions.
pub struct ChannelStateEvents {
    rx: watch::Receiver<ChannelState>,
}

impl ChannelStateEvents {
    pub fn current(&self) -> ChannelState {
        self.rx.borrow().clone()
    }

    pub async fn changed(&mut self) -> Option<ChannelState> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

struct ChannelShared {
    state: watch::Sender<ChannelState>,
    handlers: Arc<HandlerRegistry>,
    outbound: Mutex<Option<mpsc::Sender<ChannelEvent>>>,
    cache: Option<Arc<CacheStore>>,
}

impl ChannelShared {
    fn publish(&self, state: ChannelState) {
        self.state.send_replace(state);
    }

    fn set_outbound(&self, sender: Option<mpsc::Sender<ChannelEvent>>) {
        *locked(&self.outbound) = sender;
    }

    fn outbound_sender(&self) -> Option<mpsc::Sender<ChannelEvent>> {
        locked(&self.outbound).clone()
    }
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Owns the channel lifecycle. One instance per client.
pub struct ChannelManager {
    config: ClientConfig,
    store: Arc<dyn CredentialStore>,
    connector: Arc<dyn ChannelConnector>,
    shared: Arc<ChannelShared>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    lifecycle: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelManager {
    pub fn new(
        config: ClientConfig,
        store: Arc<dyn CredentialStore>,
        cache: Option<Arc<CacheStore>>,
    ) -> Self {
        Self::with_connector(config, store, cache, Arc::new(WsConnector))
    }

    /// Construct with an explicit connector. The seam tests inject through.
    pub fn with_connector(
        config: ClientConfig,
        store: Arc<dyn CredentialStore>,
        cache: Option<Arc<CacheStore>>,
        connector: Arc<dyn ChannelConnector>,
    ) -> Self {
        let (state, _) = watch::channel(ChannelState::default());
        Self {
            config,
            store,
            connector,
            shared: Arc::new(ChannelShared {
                state,
                handlers: Arc::new(HandlerRegistry::default()),
                outbound: Mutex::new(None),
                cache,
            }),
            supervisor: Mutex::new(None),
            lifecycle: Mutex::new(None),
        }
    }

    /// The channel state as of now.
    pub fn state(&self) -> ChannelState {
        self.shared.state.borrow().clone()
    }

    /// Subscribe to state transitions.
    pub fn subscribe_state(&self) -> ChannelStateEvents {
        ChannelStateEvents {
            rx: self.shared.state.subscribe(),
        }
    }

    /// Drive the channel from session state: connect when the session
    /// becomes authenticated, tear down when it no longer is.
    pub fn arm(self: &Arc<Self>, mut session: SessionEvents) {
        let manager = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut armed = false;
            loop {
                let snapshot = session.current();
                if snapshot.is_authenticated() && !armed {
                    armed = true;
                    manager.start_supervisor();
                } else if !snapshot.is_authenticated() && armed {
                    armed = false;
                    manager.stop_supervisor("session unauthenticated");
                }
                if session.changed().await.is_none() {
                    break;
                }
            }
        });
        if let Some(previous) = locked(&self.lifecycle).replace(task) {
            previous.abort();
        }
    }

    /// Connect and wait for the outcome. A no-op success while already
    /// connected; re-arms the state machine after a terminal give-up.
    pub async fn connect(&self) -> Result<(), ChannelError> {
        if self.state().status == ChannelStatus::Connected {
            return Ok(());
        }
        self.start_supervisor();

        let mut rx = self.shared.state.subscribe();
        loop {
            let snapshot = rx.borrow_and_update().clone();
            match snapshot.status {
                ChannelStatus::Connected => return Ok(()),
                ChannelStatus::Disconnected => {
                    if let Some(reason) = snapshot.last_error {
                        return if snapshot.reconnect_attempt >= self.config.max_reconnect_attempts
                        {
                            Err(ChannelError::MaxReconnectExceeded(
                                self.config.max_reconnect_attempts,
                            ))
                        } else {
                            Err(ChannelError::HandshakeRejected(reason))
                        };
                    }
                }
                _ => {}
            }
            if rx.changed().await.is_err() {
                return Err(ChannelError::TransportDropped("channel state closed".into()));
            }
        }
    }

    /// Tear down synchronously: the connection is dropped, all registered
    /// listeners are cleared, and the status returns to `Disconnected`.
    pub fn disconnect(&self) {
        self.stop_supervisor("disconnected by caller");
    }

    /// Register a handler for a named event. The handler stays registered
    /// across automatic reconnects and is removed when the returned
    /// subscription drops or [`ChannelManager::off`] consumes it.
    pub fn on(
        &self,
        event: &str,
        handler: impl Fn(&Value) + Send + Sync + 'static,
    ) -> EventSubscription {
        let id = self.shared.handlers.register(event, Arc::new(handler));
        EventSubscription::new(&self.shared.handlers, event.to_string(), id)
    }

    /// Remove a handler registered with [`ChannelManager::on`].
    pub fn off(&self, subscription: EventSubscription) {
        drop(subscription);
    }

    /// Emit a command to the server. Dropped with a warning when not
    /// connected — this channel never queues across a disconnect.
    pub fn send(&self, event: &str, payload: Value) {
        if self.state().status != ChannelStatus::Connected {
            warn!(event = %event, "channel not connected, dropping outbound command");
            return;
        }
        match self.shared.outbound_sender() {
            Some(tx) => {
                if let Err(e) = tx.try_send(ChannelEvent::new(event, payload)) {
                    warn!(event = %event, error = %e, "outbound queue full, dropping command");
                }
            }
            None => warn!(event = %event, "channel not connected, dropping outbound command"),
        }
    }

    pub fn join_match(&self, match_id: &str) {
        self.send("match:join", json!({ "matchId": match_id }));
    }

    pub fn leave_match(&self, match_id: &str) {
        self.send("match:leave", json!({ "matchId": match_id }));
    }

    pub fn typing_started(&self, conversation_id: &str) {
        self.send("typing:start", json!({ "conversationId": conversation_id }));
    }

    pub fn typing_stopped(&self, conversation_id: &str) {
        self.send("typing:stop", json!({ "conversationId": conversation_id }));
    }

    fn start_supervisor(&self) {
        let mut slot = locked(&self.supervisor);
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        // Published before the task spawns so a caller subscribing right
        // after never observes a stale give-up state.
        self.shared.publish(ChannelState {
            status: ChannelStatus::Connecting,
            ..ChannelState::default()
        });
        *slot = Some(tokio::spawn(run_supervisor(
            self.config.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.connector),
            Arc::clone(&self.shared),
        )));
    }

    fn stop_supervisor(&self, reason: &str) {
        if let Some(task) = locked(&self.supervisor).take() {
            task.abort();
        }
        self.shared.set_outbound(None);
        self.shared.handlers.clear();
        self.shared.publish(ChannelState::default());
        info!(reason = reason, "channel torn down");
    }
}

impl Drop for ChannelManager {
    fn drop(&mut self) {
        if let Some(task) = locked(&self.supervisor).take() {
            task.abort();
        }
        if let Some(task) = locked(&self.lifecycle).take() {
            task.abort();
        }
    }
}

async fn run_supervisor(
    config: ClientConfig,
    store: Arc<dyn CredentialStore>,
    connector: Arc<dyn ChannelConnector>,
    shared: Arc<ChannelShared>,
) {
    let mut attempt: u32 = 0;
    let mut last_error: Option<String> = None;

    loop {
        if attempt > 0 {
            shared.publish(ChannelState {
                status: ChannelStatus::Reconnecting,
                connection_id: None,
                reconnect_attempt: attempt,
                last_error: last_error.clone(),
            });
            let delay = with_jitter(
                delay_for_attempt(attempt, config.reconnect_base_delay),
                config.reconnect_jitter,
            );
            debug!(attempt, delay_ms = delay.as_millis() as u64, "waiting before reconnect");
            sleep(delay).await;
        }

        shared.publish(ChannelState {
            status: ChannelStatus::Connecting,
            connection_id: None,
            reconnect_attempt: attempt,
            last_error: last_error.clone(),
        });

        let token = match store.read() {
            Ok(Some(set)) if set.is_complete() => set.session_token,
            Ok(_) => {
                warn!("no session credential for channel handshake");
                give_up(&shared, attempt, "no session credential available");
                return;
            }
            Err(e) => {
                warn!(error = %e, "credential read failed before handshake");
                give_up(&shared, attempt, &format!("credential read failed: {}", e));
                return;
            }
        };

        match connector
            .open(&config.channel_url, &token, config.handshake_timeout)
            .await
        {
            Ok(channel) => {
                attempt = 0;
                last_error = None;
                let connection_id = channel.connection_id.clone();
                shared.set_outbound(Some(channel.outbound.clone()));
                shared.publish(ChannelState {
                    status: ChannelStatus::Connected,
                    connection_id: Some(connection_id.clone()),
                    reconnect_attempt: 0,
                    last_error: None,
                });
                info!(connection_id = %connection_id, "channel connected");

                let reason = run_connected(channel, &shared).await;
                shared.set_outbound(None);
                warn!(reason = %reason, "channel dropped");
                last_error = Some(reason);
                attempt = 1;
            }
            Err(err) => {
                attempt += 1;
                last_error = Some(err.to_string());
                warn!(error = %err, attempt, "channel connect failed");
                if attempt > config.max_reconnect_attempts {
                    give_up(&shared, attempt - 1, &err.to_string());
                    return;
                }
            }
        }
    }
}

fn give_up(shared: &ChannelShared, attempts: u32, reason: &str) {
    warn!(attempts, reason = reason, "channel giving up, manual reconnect required");
    shared.set_outbound(None);
    shared.publish(ChannelState {
        status: ChannelStatus::Disconnected,
        connection_id: None,
        reconnect_attempt: attempts,
        last_error: Some(reason.to_string()),
    });
}

/// Pump inbound events until the transport drops. Events are processed in
/// server-delivery order: dispatched to local subscribers first, then
/// merged into the cache when the event names a cached resource.
async fn run_connected(mut channel: EstablishedChannel, shared: &ChannelShared) -> String {
    while let Some(event) = channel.inbound.recv().await {
        debug!(event = %event.event, "channel event");
        shared.handlers.dispatch(&event.event, &event.payload);

        if let Some(cache) = &shared.cache {
            if let Some(resource) = Resource::for_event(&event.event) {
                match serde_json::from_value::<ResourceItem>(event.payload.clone()) {
                    Ok(item) => cache.apply_push(resource, item).await,
                    Err(e) => {
                        warn!(event = %event.event, error = %e, "push payload not cacheable");
                    }
                }
            }
        }
    }
    "transport dropped".into()
}
