use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    cache::SessionCache,
    domain::{EndpointId, InstanceId},
    protocol::{Channel, ClientRequest, Message, ServerEvent, SessionData},
};
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, info, warn};

pub mod backend;
pub mod config;
pub mod recovery;
pub mod snapshot;
pub mod transport;
pub mod view;

use recovery::{RecoveryTarget, ResendTimer};
use snapshot::SnapshotStore;
use transport::HostLink;
use view::ViewState;

#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A snapshot from a previous run was restored into the view.
    Restored(ViewState),
    Attached {
        instance_id: InstanceId,
    },
    ViewUpdated {
        channel: Channel,
        replayed: bool,
        view: ViewState,
    },
    ResendRequested,
    Error(String),
}

pub struct EndpointClient {
    endpoint: EndpointId,
    link: Arc<dyn HostLink>,
    store: Arc<dyn SnapshotStore>,
    inner: Mutex<EndpointClientState>,
    resend_timer: std::sync::Mutex<ResendTimer>,
    resend_after: Duration,
    ready_announced: AtomicBool,
    events: broadcast::Sender<ClientEvent>,
}

#[derive(Default)]
struct EndpointClientState {
    cache: SessionCache,
    view: ViewState,
    instance_id: Option<InstanceId>,
    /// Session this client started and has not yet seen replayed by the host.
    pending_own_session: Option<SessionData>,
}

impl EndpointClientState {
    /// Replays carry the host cache as it was when they were produced. Until
    /// the host echoes a session this client started, older replays are
    /// stale. A replayed copy of the session already shown keeps progress.
    fn accepts_replay(&mut self, message: &Message) -> bool {
        if let Some(own) = self.pending_own_session.take() {
            if !matches!(message, Message::SessionStart(session) if *session == own) {
                self.pending_own_session = Some(own);
                return false;
            }
        }
        match message {
            Message::SessionStart(session) => self.view.session.as_ref() != Some(session),
            _ => true,
        }
    }
}

impl EndpointClient {
    pub fn new(
        endpoint: EndpointId,
        link: Arc<dyn HostLink>,
        store: Arc<dyn SnapshotStore>,
        resend_after: Duration,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            endpoint,
            link,
            store,
            inner: Mutex::new(EndpointClientState::default()),
            resend_timer: std::sync::Mutex::new(ResendTimer::new()),
            resend_after,
            ready_announced: AtomicBool::new(false),
            events,
        })
    }

    /// Connect to the host over WebSocket, start the client and pump its events.
    pub async fn connect(
        server_url: &str,
        endpoint: EndpointId,
        store: Arc<dyn SnapshotStore>,
        resend_after: Duration,
    ) -> Result<Arc<Self>> {
        let (link, events_rx) = transport::connect(server_url, endpoint).await?;
        let client = Self::new(endpoint, Arc::new(link), store, resend_after);
        client.start().await?;
        let pump = Arc::clone(&client);
        tokio::spawn(async move { pump.run_events(events_rx).await });
        Ok(client)
    }

    pub fn endpoint(&self) -> EndpointId {
        self.endpoint
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub async fn view(&self) -> ViewState {
        self.inner.lock().await.view.clone()
    }

    pub async fn instance_id(&self) -> Option<InstanceId> {
        self.inner.lock().await.instance_id
    }

    pub fn is_waiting_for_state(&self) -> bool {
        self.resend_timer
            .lock()
            .map(|timer| timer.is_armed())
            .unwrap_or(false)
    }

    /// Restore the local snapshot, announce readiness (once per client) and
    /// arm the recovery timer if no session is known yet.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.restore().await;

        if !self.ready_announced.swap(true, Ordering::SeqCst) {
            self.link.send(ClientRequest::Ready).await?;
            info!(endpoint = %self.endpoint, "client: readiness announced");
        }

        if !self.has_expected_state().await {
            self.arm_resend_timer();
        }
        Ok(())
    }

    async fn restore(&self) {
        let snapshot = match self.store.load().await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                warn!(endpoint = %self.endpoint, %error, "client: snapshot unreadable, discarding it");
                let _ = self.events.send(ClientEvent::Error(error.to_string()));
                if let Err(error) = self.store.clear().await {
                    warn!(endpoint = %self.endpoint, %error, "client: failed to discard snapshot");
                }
                None
            }
        };
        let Some(cache) = snapshot else {
            return;
        };

        let view = {
            let mut guard = self.inner.lock().await;
            guard.view = ViewState::from_cache(&cache);
            guard.cache = cache;
            guard.view.clone()
        };
        info!(
            endpoint = %self.endpoint,
            has_session = view.session.is_some(),
            "client: snapshot restored"
        );
        let _ = self.events.send(ClientEvent::Restored(view));
    }

    fn arm_resend_timer(self: &Arc<Self>) {
        if let Ok(mut timer) = self.resend_timer.lock() {
            timer.arm(Arc::downgrade(self), self.resend_after);
        }
    }

    fn cancel_resend_timer(&self) {
        if let Ok(mut timer) = self.resend_timer.lock() {
            timer.cancel();
        }
    }

    pub async fn run_events(self: Arc<Self>, mut events_rx: mpsc::UnboundedReceiver<ServerEvent>) {
        while let Some(event) = events_rx.recv().await {
            self.handle_event(event).await;
        }
        debug!(endpoint = %self.endpoint, "client: host event stream ended");
    }

    pub async fn handle_event(&self, event: ServerEvent) {
        match event {
            ServerEvent::Attached {
                endpoint,
                instance_id,
            } => {
                if endpoint != self.endpoint {
                    warn!(
                        expected = %self.endpoint,
                        attached = %endpoint,
                        "client: host attached a different endpoint"
                    );
                }
                self.inner.lock().await.instance_id = Some(instance_id);
                let _ = self.events.send(ClientEvent::Attached { instance_id });
            }
            ServerEvent::Delivery { message, replayed } => {
                self.apply(message, replayed).await;
            }
        }
    }

    /// Persist cacheable state before it reaches the view.
    async fn apply(&self, message: Message, replayed: bool) {
        let channel = message.channel();
        let (view, has_session) = {
            let mut guard = self.inner.lock().await;
            if replayed && !guard.accepts_replay(&message) {
                debug!(
                    endpoint = %self.endpoint,
                    channel = channel.name(),
                    "client: replayed delivery skipped"
                );
                return;
            }
            if channel.is_state() && guard.cache.record(&message) {
                if let Err(error) = self.store.save(&guard.cache).await {
                    warn!(
                        endpoint = %self.endpoint,
                        channel = channel.name(),
                        %error,
                        "client: snapshot write failed"
                    );
                    let _ = self.events.send(ClientEvent::Error(error.to_string()));
                }
            }
            if !guard.view.apply(&message) {
                debug!(
                    endpoint = %self.endpoint,
                    channel = channel.name(),
                    replayed,
                    "client: delivery did not change the view"
                );
                return;
            }
            (guard.view.clone(), guard.view.session.is_some())
        };

        if has_session {
            self.cancel_resend_timer();
        }
        let _ = self.events.send(ClientEvent::ViewUpdated {
            channel,
            replayed,
            view,
        });
    }

    /// Relay a message to the other endpoint. State sent by this endpoint is
    /// mirrored into its own snapshot so it survives a reload here too.
    pub async fn send(&self, destination: EndpointId, message: Message) -> Result<()> {
        message
            .validate()
            .map_err(|error| anyhow!("refusing to send {}: {error}", message.channel().name()))?;
        self.link
            .send(ClientRequest::Send {
                destination,
                message: message.clone(),
            })
            .await?;
        if let Message::SessionStart(session) = &message {
            self.inner.lock().await.pending_own_session = Some(session.clone());
        }
        if message.channel().is_state() {
            self.apply(message, false).await;
        }
        Ok(())
    }

    /// User-facing fallback: ask the host to replay its cached state now.
    pub async fn request_resend(&self) -> Result<()> {
        info!(endpoint = %self.endpoint, "client: resend requested");
        self.link.send(ClientRequest::RequestResend).await?;
        let _ = self.events.send(ClientEvent::ResendRequested);
        Ok(())
    }

    /// Wait until requests sent so far have reached the socket.
    pub async fn flush(&self) -> Result<()> {
        self.link.flush().await
    }
}

#[async_trait]
impl RecoveryTarget for EndpointClient {
    async fn has_expected_state(&self) -> bool {
        self.inner.lock().await.view.session.is_some()
    }

    async fn send_resend_request(&self) -> Result<()> {
        self.request_resend().await
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
