//! # Playback Session Host
//!
//! Owns the platform [`MediaEngine`] inside a dedicated tokio task and
//! executes transport commands in FIFO order.
//!
//! ## Overview
//!
//! The host is an actor. [`SessionHandle`] values send [`Command`]s over a
//! bounded `mpsc` channel and await a `oneshot` reply. Asynchronous engine
//! notifications and detached disconnects travel as [`Notice`]s on an
//! unbounded side channel that the host drains before its next command, so
//! they are never dropped or reordered and the engine is never touched
//! outside the host task.
//!
//! Connected clients receive a [`PlaybackSnapshot`] together with a
//! broadcast subscription taken in the same step, so a late joiner never
//! misses a transition between the two. Every transition is also published
//! on the runtime [`EventBus`] as a [`PlaybackEvent`].
//!
//! ## State machine
//!
//! ```text
//! Idle --set_media ok--> Paused --play--> Playing --pause--> Paused
//! Playing --item ends--> Completed --> Idle (item unloaded)
//! any --engine failure--> Error --set_media--> Paused
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bridge_traits::playback::{EngineEvent, EngineListener, MediaEngine, MediaItem};
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::PlaybackConfig;
use crate::error::{ConnectionError, PlaybackError, Result};
use crate::state::{
    clamp_position, HostEvent, PlaybackSnapshot, PlaybackState, PositionSample, UNKNOWN_DURATION,
};

// ============================================================================
// Connection Policy
// ============================================================================

/// Identity presented by a client when it connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub id: Uuid,
    pub name: String,
}

impl ClientInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }
}

/// Decides whether a client may connect to the host.
pub trait ConnectionPolicy: Send + Sync {
    /// Returns the rejection reason when the client is refused.
    fn accept(&self, client: &ClientInfo) -> std::result::Result<(), String>;
}

/// Accepts every client.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl ConnectionPolicy for AllowAll {
    fn accept(&self, _client: &ClientInfo) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// Result of a successful connect.
#[derive(Debug)]
pub struct Connection {
    pub client_id: Uuid,
    pub session_id: Uuid,
    /// Host state at the moment `events` was subscribed
    pub snapshot: PlaybackSnapshot,
    pub events: broadcast::Receiver<HostEvent>,
}

// ============================================================================
// Commands
// ============================================================================

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    Connect {
        client: ClientInfo,
        reply: Reply<Connection>,
    },
    Disconnect {
        client_id: Uuid,
        reply: oneshot::Sender<()>,
    },
    SetMedia {
        item: MediaItem,
        reply: Reply<()>,
    },
    Play {
        reply: Reply<()>,
    },
    Pause {
        reply: Reply<()>,
    },
    Seek {
        position_ms: i64,
        reply: oneshot::Sender<u64>,
    },
    Position {
        reply: oneshot::Sender<PositionSample>,
    },
    Snapshot {
        reply: oneshot::Sender<PlaybackSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Messages that need no reply and must not wait for queue capacity.
enum Notice {
    Engine(EngineEvent),
    Disconnect(Uuid),
}

/// Forwards engine callbacks into the host from any thread.
///
/// Holds a weak sender so the host still stops once every handle is dropped.
struct EngineEventForwarder {
    notices: mpsc::WeakUnboundedSender<Notice>,
}

impl EngineListener for EngineEventForwarder {
    fn on_engine_event(&self, event: EngineEvent) {
        let Some(notices) = self.notices.upgrade() else {
            debug!(?event, "Engine event after host shutdown dropped");
            return;
        };
        if notices.send(Notice::Engine(event)).is_err() {
            debug!("Engine event after host shutdown dropped");
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Entry point for starting a playback session host.
pub struct PlaybackSessionHost;

impl PlaybackSessionHost {
    pub fn builder(engine: Box<dyn MediaEngine>) -> HostBuilder {
        HostBuilder {
            engine,
            config: PlaybackConfig::default(),
            event_bus: None,
            policy: Arc::new(AllowAll),
        }
    }
}

/// Configures and spawns the host task.
pub struct HostBuilder {
    engine: Box<dyn MediaEngine>,
    config: PlaybackConfig,
    event_bus: Option<EventBus>,
    policy: Arc<dyn ConnectionPolicy>,
}

impl HostBuilder {
    pub fn config(mut self, config: PlaybackConfig) -> Self {
        self.config = config;
        self
    }

    /// Publish transitions as [`PlaybackEvent`]s on `bus`.
    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn policy(mut self, policy: Arc<dyn ConnectionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Spawn the host task. Must be called within a tokio runtime.
    pub fn start(self) -> Result<SessionHandle> {
        self.config.validate()?;

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PlaybackError::Config(format!("no tokio runtime: {}", e)))?;

        let session_id = Uuid::new_v4();
        let (commands, receiver) = mpsc::channel(self.config.command_channel_capacity);
        let (notices, notice_receiver) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(self.config.event_channel_capacity);
        let (client_count, client_count_rx) = watch::channel(0usize);

        let mut engine = self.engine;
        engine.set_listener(Arc::new(EngineEventForwarder {
            notices: notices.downgrade(),
        }));

        let session = Session {
            session_id,
            engine,
            item: None,
            state: PlaybackState::Idle,
            prepared: false,
            started: false,
            clients: HashMap::new(),
            events,
            client_count,
            bus: self.event_bus,
            policy: self.policy,
        };

        runtime.spawn(session.run(receiver, notice_receiver));
        info!(%session_id, "Playback session host started");

        Ok(SessionHandle {
            session_id,
            commands,
            notices,
            client_count: client_count_rx,
        })
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Cloneable handle to a running host.
///
/// Every call fails with [`ConnectionError::HostUnavailable`] once the host
/// has shut down.
#[derive(Clone)]
pub struct SessionHandle {
    session_id: Uuid,
    commands: mpsc::Sender<Command>,
    notices: mpsc::UnboundedSender<Notice>,
    client_count: watch::Receiver<usize>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("session_id", &self.session_id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl SessionHandle {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// `false` once the host task has exited.
    pub fn is_alive(&self) -> bool {
        !self.commands.is_closed()
    }

    pub fn client_count(&self) -> usize {
        *self.client_count.borrow()
    }

    pub fn watch_client_count(&self) -> watch::Receiver<usize> {
        self.client_count.clone()
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| ConnectionError::HostUnavailable)?;
        response
            .await
            .map_err(|_| PlaybackError::from(ConnectionError::HostUnavailable))
    }

    pub async fn connect(&self, name: impl Into<String>) -> Result<Connection> {
        let client = ClientInfo::new(name);
        self.request(|reply| Command::Connect { client, reply }).await?
    }

    pub async fn disconnect(&self, client_id: Uuid) -> Result<()> {
        self.request(|reply| Command::Disconnect { client_id, reply })
            .await
    }

    /// Queue a disconnect without waiting, for use from `Drop`.
    pub(crate) fn disconnect_detached(&self, client_id: Uuid) {
        if self.notices.send(Notice::Disconnect(client_id)).is_err() {
            debug!(%client_id, "Detached disconnect after host shutdown ignored");
        }
    }

    /// Replace the loaded item. Resolves once the engine accepted or
    /// rejected it.
    pub async fn set_media(&self, item: MediaItem) -> Result<()> {
        self.request(|reply| Command::SetMedia { item, reply })
            .await?
    }

    pub async fn play(&self) -> Result<()> {
        self.request(|reply| Command::Play { reply }).await?
    }

    pub async fn pause(&self) -> Result<()> {
        self.request(|reply| Command::Pause { reply }).await?
    }

    /// Seek and return the clamped position actually applied.
    pub async fn seek(&self, position_ms: i64) -> Result<u64> {
        self.request(|reply| Command::Seek { position_ms, reply })
            .await
    }

    pub async fn position(&self) -> Result<PositionSample> {
        self.request(|reply| Command::Position { reply }).await
    }

    pub async fn snapshot(&self) -> Result<PlaybackSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Release the engine and stop the host. Idempotent.
    pub async fn shutdown(&self) -> Result<()> {
        match self.request(|reply| Command::Shutdown { reply }).await {
            Err(e) if e.is_host_unavailable() => Ok(()),
            other => other,
        }
    }
}

// ============================================================================
// Host Task
// ============================================================================

struct Session {
    session_id: Uuid,
    engine: Box<dyn MediaEngine>,
    item: Option<MediaItem>,
    state: PlaybackState,
    /// Engine prepared for the loaded item
    prepared: bool,
    /// `Started` already published for the loaded item
    started: bool,
    clients: HashMap<Uuid, String>,
    events: broadcast::Sender<HostEvent>,
    client_count: watch::Sender<usize>,
    bus: Option<EventBus>,
    policy: Arc<dyn ConnectionPolicy>,
}

impl Session {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut notices: mpsc::UnboundedReceiver<Notice>,
    ) {
        loop {
            let command = tokio::select! {
                biased;
                Some(notice) = notices.recv() => {
                    self.on_notice(notice).await;
                    continue;
                }
                command = commands.recv() => command,
            };
            let Some(command) = command else {
                break;
            };

            match command {
                Command::Connect { client, reply } => {
                    let _ = reply.send(self.connect(client));
                }
                Command::Disconnect { client_id, reply } => {
                    self.disconnect(client_id);
                    let _ = reply.send(());
                }
                Command::SetMedia { item, reply } => {
                    let _ = reply.send(self.set_media(item).await);
                }
                Command::Play { reply } => {
                    let _ = reply.send(self.play().await);
                }
                Command::Pause { reply } => {
                    let _ = reply.send(self.pause().await);
                }
                Command::Seek { position_ms, reply } => {
                    let _ = reply.send(self.seek(position_ms).await);
                }
                Command::Position { reply } => {
                    let _ = reply.send(self.position());
                }
                Command::Snapshot { reply } => {
                    let _ = reply.send(self.snapshot());
                }
                Command::Shutdown { reply } => {
                    self.release().await;
                    let _ = reply.send(());
                    info!(session_id = %self.session_id, "Playback session host stopped");
                    return;
                }
            }
        }

        // Every handle was dropped without an explicit shutdown.
        self.release().await;
        info!(session_id = %self.session_id, "Playback session host dropped");
    }

    // ------------------------------------------------------------------
    // Clients
    // ------------------------------------------------------------------

    fn connect(&mut self, client: ClientInfo) -> Result<Connection> {
        if let Err(reason) = self.policy.accept(&client) {
            warn!(client = %client.name, %reason, "Client connection rejected");
            return Err(ConnectionError::Rejected(reason).into());
        }

        let events = self.events.subscribe();
        let snapshot = self.snapshot();
        self.clients.insert(client.id, client.name.clone());
        self.client_count.send_replace(self.clients.len());

        info!(
            client = %client.name,
            client_id = %client.id,
            clients = self.clients.len(),
            "Client connected"
        );

        Ok(Connection {
            client_id: client.id,
            session_id: self.session_id,
            snapshot,
            events,
        })
    }

    fn disconnect(&mut self, client_id: Uuid) {
        if let Some(name) = self.clients.remove(&client_id) {
            self.client_count.send_replace(self.clients.len());
            info!(client = %name, clients = self.clients.len(), "Client disconnected");
        }
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    async fn set_media(&mut self, item: MediaItem) -> Result<()> {
        if item.uri.trim().is_empty() {
            return Err(PlaybackError::invalid("media item has no URI"));
        }

        self.stop_current();
        self.item = None;
        self.prepared = false;
        self.started = false;

        if let Err(e) = self.engine.reset().await {
            self.broadcast_item();
            return Err(self.fail(e.into()));
        }

        let media_id = media_id(Some(&item));
        debug!(media_id = ?media_id, uri = %item.uri, "Loading media item");

        if let Err(e) = self.engine.load(&item).await {
            self.broadcast_item();
            return Err(self.fail(e.into()));
        }

        self.item = Some(item);
        self.broadcast_item();
        self.transition(PlaybackState::Paused);
        info!(media_id = ?media_id, "Media item loaded");
        Ok(())
    }

    async fn play(&mut self) -> Result<()> {
        self.require_item()?;
        if self.state.is_playing() {
            return Ok(());
        }

        if !self.prepared {
            if let Err(e) = self.engine.prepare().await {
                return Err(self.fail(e.into()));
            }
            self.prepared = true;
        }

        if let Err(e) = self.engine.play().await {
            return Err(self.fail(e.into()));
        }

        self.transition(PlaybackState::Playing);

        let episode_id = media_id(self.item.as_ref()).unwrap_or_default();
        if self.started {
            let sample = self.position();
            self.emit(PlaybackEvent::Resumed {
                episode_id,
                position_ms: sample.position_ms,
            });
        } else {
            self.started = true;
            let title = self
                .item
                .as_ref()
                .and_then(|item| item.metadata.as_ref())
                .map(|metadata| metadata.title.clone())
                .unwrap_or_default();
            self.emit(PlaybackEvent::Started { episode_id, title });
        }
        Ok(())
    }

    async fn pause(&mut self) -> Result<()> {
        self.require_item()?;
        if self.state == PlaybackState::Paused {
            return Ok(());
        }

        if let Err(e) = self.engine.pause().await {
            return Err(self.fail(e.into()));
        }

        self.transition(PlaybackState::Paused);

        let sample = self.position();
        self.emit(PlaybackEvent::Paused {
            episode_id: media_id(self.item.as_ref()).unwrap_or_default(),
            position_ms: sample.position_ms,
            duration_ms: sample.duration_ms,
        });
        Ok(())
    }

    async fn seek(&mut self, position_ms: i64) -> u64 {
        if self.item.is_none() {
            debug!(position_ms, "Seek ignored, no media loaded");
            return 0;
        }

        let duration_ms = self.duration_ms();
        let target = clamp_position(position_ms, duration_ms);

        if let Err(e) = self.engine.seek(Duration::from_millis(target)).await {
            warn!(error = %e, target, "Engine rejected seek");
        }

        let _ = self.events.send(HostEvent::PositionDiscontinuity {
            position_ms: target,
            duration_ms,
        });
        self.emit(PlaybackEvent::Seeked {
            episode_id: media_id(self.item.as_ref()).unwrap_or_default(),
            position_ms: target,
        });
        target
    }

    // ------------------------------------------------------------------
    // Engine events
    // ------------------------------------------------------------------

    async fn on_notice(&mut self, notice: Notice) {
        match notice {
            Notice::Engine(event) => self.on_engine_event(event).await,
            Notice::Disconnect(client_id) => self.disconnect(client_id),
        }
    }

    async fn on_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Completed => {
                let Some(episode_id) = self.item.as_ref().map(|item| media_id(Some(item))) else {
                    debug!("Completion without a loaded item ignored");
                    return;
                };

                info!(episode_id = ?episode_id, "Media item completed");
                self.transition(PlaybackState::Completed);
                self.emit(PlaybackEvent::Completed {
                    episode_id: episode_id.unwrap_or_default(),
                });

                if let Err(e) = self.engine.reset().await {
                    warn!(error = %e, "Engine reset after completion failed");
                }
                self.item = None;
                self.prepared = false;
                self.started = false;
                self.broadcast_item();
                self.transition(PlaybackState::Idle);
            }
            EngineEvent::Error { code, message } => {
                self.fail(PlaybackError::Engine { code, message });
            }
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn require_item(&self) -> Result<()> {
        if self.item.is_none() {
            return Err(PlaybackError::invalid("no media loaded"));
        }
        if self.state == PlaybackState::Error {
            return Err(PlaybackError::invalid(
                "player is in error state, load media again",
            ));
        }
        Ok(())
    }

    fn duration_ms(&self) -> u64 {
        if self.item.is_none() {
            return UNKNOWN_DURATION;
        }
        self.engine
            .duration()
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(UNKNOWN_DURATION))
            .or_else(|| self.item.as_ref().and_then(MediaItem::duration_ms))
            .unwrap_or(UNKNOWN_DURATION)
    }

    fn position(&self) -> PositionSample {
        if self.item.is_none() {
            return PositionSample {
                position_ms: 0,
                duration_ms: UNKNOWN_DURATION,
            };
        }

        let duration_ms = self.duration_ms();
        let raw = u64::try_from(self.engine.position().as_millis()).unwrap_or(u64::MAX);
        PositionSample {
            position_ms: raw.min(duration_ms),
            duration_ms,
        }
    }

    fn snapshot(&self) -> PlaybackSnapshot {
        let sample = self.position();
        PlaybackSnapshot {
            state: self.state,
            metadata: self.item.as_ref().and_then(|item| item.metadata.clone()),
            position_ms: sample.position_ms,
            duration_ms: sample.duration_ms,
        }
    }

    fn transition(&mut self, state: PlaybackState) {
        if self.state == state {
            return;
        }
        debug!(from = ?self.state, to = ?state, "Playback state transition");
        self.state = state;
        let _ = self.events.send(HostEvent::StateChanged(state));
    }

    fn broadcast_item(&self) {
        let sample = self.position();
        let start = self
            .item
            .as_ref()
            .map(|item| item.start_position_ms.min(sample.duration_ms))
            .unwrap_or(0);
        let _ = self.events.send(HostEvent::ItemChanged {
            loaded: self.item.is_some(),
            metadata: self.item.as_ref().and_then(|item| item.metadata.clone()),
            position_ms: start,
            duration_ms: sample.duration_ms,
        });
    }

    /// Move to `Error` and hand the failure back to the caller.
    fn fail(&mut self, error: PlaybackError) -> PlaybackError {
        error!(error = %error, "Playback failed");
        self.transition(PlaybackState::Error);
        self.emit(PlaybackEvent::Error {
            episode_id: media_id(self.item.as_ref()),
            code: error.engine_code(),
            message: error.to_string(),
        });
        error
    }

    /// Publish `Stopped` for an item that is being replaced or released.
    fn stop_current(&mut self) {
        if self.item.is_none() {
            return;
        }
        let sample = self.position();
        self.emit(PlaybackEvent::Stopped {
            episode_id: media_id(self.item.as_ref()).unwrap_or_default(),
            position_ms: sample.position_ms,
            duration_ms: sample.duration_ms,
        });
    }

    async fn release(&mut self) {
        self.stop_current();
        self.item = None;
        if let Err(e) = self.engine.release().await {
            warn!(error = %e, "Engine release failed");
        }
        self.transition(PlaybackState::Idle);
    }

    fn emit(&self, event: PlaybackEvent) {
        if let Some(bus) = &self.bus {
            if bus.emit(CoreEvent::Playback(event)).is_err() {
                debug!("No subscribers for playback event");
            }
        }
    }
}

fn media_id(item: Option<&MediaItem>) -> Option<String> {
    item.and_then(|item| item.metadata.as_ref())
        .map(|metadata| metadata.media_id.clone())
}
