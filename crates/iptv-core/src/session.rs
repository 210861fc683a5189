//! SessionCore: single-owner event loop for the playback session.
//!
//! Every input (client commands, engine events from the native player,
//! debounce commits, timers, playlist results) is a `CoreEvent` on one mpsc
//! channel.  The loop handles them one at a time, so a `Select` that arrives
//! while another is tearing down or constructing a player simply waits its
//! turn.  SessionCore owns the native handle exclusively; no other task
//! touches it.
//!
//! After each change the loop publishes a `SessionState` snapshot to the
//! `StateManager` and sends `BroadcastMessage::StateUpdated`.  Playback
//! transitions are additionally broadcast as `BroadcastMessage::Playback`.
//!
//! Spawned helpers (engine forwarders, load/dwell timers, playlist fetch)
//! only ever send events back into the loop.  Each carries a generation or
//! token so that anything arriving after its handle or timer was superseded
//! is ignored.

use std::sync::Arc;

use iptv_proto::catalog::{self, Catalog};
use iptv_proto::config::Config;
use iptv_proto::locator::MediaLocator;
use iptv_proto::protocol::{
    CatalogStatus, Command, Direction, LifecycleSignal, PlaybackEvent, PlaybackStatus,
    SessionState,
};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::backend::{EngineEvent, PlayerBackend};
use crate::client::SessionClient;
use crate::error::{EngineError, SessionError};
use crate::overlay::IndicatorTracker;
use crate::state::StateManager;
use crate::switcher::{ChannelSwitcher, StepOutcome, SwitchCommit};
use crate::BroadcastMessage;

// ── CoreEvent ─────────────────────────────────────────────────────────────────

pub type Reply = oneshot::Sender<Result<Outcome, SessionError>>;

/// All inputs into the SessionCore loop.
#[derive(Debug)]
pub enum CoreEvent {
    /// A command from a screen, the socket or the HTTP API.
    Command {
        command: Command,
        reply: Option<Reply>,
    },
    /// Engine event from the handle with this generation.
    Engine { generation: u64, event: EngineEvent },
    /// A debounce timer fired.
    SwitchCommit(SwitchCommit),
    LoadTimeout { token: u64 },
    IndicatorExpired { token: u64 },
    /// A channel list to browse, from the playlist fetch or an embedding app.
    CatalogLoaded(Catalog),
    CatalogFailed(String),
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selected {
    pub url: String,
    /// Generation of the native handle now playing `url`.
    pub handle_id: u64,
    /// True when the existing handle was kept.
    pub reused: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Selected(Selected),
    Stepped(StepOutcome),
    Done,
}

struct ActivePlayer<H> {
    handle: H,
    locator: MediaLocator,
    generation: u64,
    /// Halted by `stop`; the handle is kept and `resume` reloads it.
    stopped: bool,
}

async fn start<B: PlayerBackend>(
    backend: &B,
    handle: &mut B::Handle,
    locator: &MediaLocator,
) -> Result<(), EngineError> {
    backend.load(handle, locator).await?;
    backend.play(handle).await
}

// ── SessionCore ───────────────────────────────────────────────────────────────

pub struct SessionCore<B: PlayerBackend> {
    config: Config,
    backend: B,
    state_manager: Arc<StateManager>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
    /// Loop-back sender handed to spawned helpers.
    event_tx: mpsc::Sender<CoreEvent>,
    player: Option<ActivePlayer<B::Handle>>,
    next_generation: u64,
    active_url: Option<String>,
    status: PlaybackStatus,
    paused: bool,
    last_error: Option<String>,
    last_good_url: Option<String>,
    load_timer: Option<AbortHandle>,
    load_token: u64,
    catalog: Catalog,
    catalog_status: CatalogStatus,
    catalog_fetch: Option<AbortHandle>,
    switcher: ChannelSwitcher,
    indicator: IndicatorTracker,
}

impl<B: PlayerBackend> SessionCore<B> {
    pub async fn new(
        config: Config,
        backend: B,
        state_manager: Arc<StateManager>,
        broadcast_tx: broadcast::Sender<BroadcastMessage>,
        event_tx: mpsc::Sender<CoreEvent>,
    ) -> Self {
        // Debounce timers report on their own channel; forward into the loop.
        let (commit_tx, mut commit_rx) = mpsc::channel::<SwitchCommit>(16);
        let core_tx = event_tx.clone();
        tokio::spawn(async move {
            while let Some(commit) = commit_rx.recv().await {
                if core_tx.send(CoreEvent::SwitchCommit(commit)).await.is_err() {
                    break;
                }
            }
        });

        let last_good_url = state_manager.get_state().await.last_good_url;
        let switcher = ChannelSwitcher::new(config.switcher.quiet_period(), commit_tx);
        let indicator = IndicatorTracker::new(config.switcher.now_playing());

        Self {
            config,
            backend,
            state_manager,
            broadcast_tx,
            event_tx,
            player: None,
            next_generation: 1,
            active_url: None,
            status: PlaybackStatus::Idle,
            paused: false,
            last_error: None,
            last_good_url,
            load_timer: None,
            load_token: 0,
            catalog: Catalog::default(),
            catalog_status: CatalogStatus::Empty,
            catalog_fetch: None,
            switcher,
            indicator,
        }
    }

    /// Build a core, spawn its loop and return a client for it.
    pub async fn spawn(
        config: Config,
        backend: B,
        state_manager: Arc<StateManager>,
        broadcast_tx: broadcast::Sender<BroadcastMessage>,
    ) -> (SessionClient, JoinHandle<anyhow::Result<()>>) {
        let (event_tx, event_rx) = mpsc::channel::<CoreEvent>(256);
        let core = Self::new(
            config,
            backend,
            Arc::clone(&state_manager),
            broadcast_tx.clone(),
            event_tx.clone(),
        )
        .await;
        let task = tokio::spawn(core.run(event_rx));
        (
            SessionClient::new(event_tx, state_manager, broadcast_tx),
            task,
        )
    }

    /// Run the core event loop.  Returns when a `Shutdown` event is received,
    /// the event channel is closed, or a fatal engine error occurs (returned
    /// as the error).  The native handle is released on the way out.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<CoreEvent>) -> anyhow::Result<()> {
        info!("SessionCore: starting event loop");
        self.publish().await;

        let result = loop {
            match event_rx.recv().await {
                None => {
                    info!("SessionCore: event channel closed, shutting down");
                    break Ok(());
                }
                Some(CoreEvent::Shutdown) => {
                    info!("SessionCore: shutdown requested");
                    break Ok(());
                }
                Some(evt) => {
                    if let Err(e) = self.handle_event(evt).await {
                        error!("SessionCore: {}", e);
                        break Err(e);
                    }
                }
            }
        };

        self.cleanup().await;
        result.map_err(anyhow::Error::from)
    }

    /// Only fatal errors escape this function.
    async fn handle_event(&mut self, evt: CoreEvent) -> Result<(), SessionError> {
        match evt {
            CoreEvent::Command { command, reply } => {
                info!("SessionCore: command {:?}", command);
                let result = self.handle_command(command).await;
                let fatal = match &result {
                    Err(SessionError::Fatal(msg)) => Some(msg.clone()),
                    Err(e) => {
                        warn!("SessionCore: command failed: {}", e);
                        None
                    }
                    Ok(_) => None,
                };
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
                if let Some(msg) = fatal {
                    return Err(SessionError::Fatal(msg));
                }
            }
            CoreEvent::Engine { generation, event } => {
                self.handle_engine_event(generation, event).await;
            }
            CoreEvent::SwitchCommit(commit) => {
                if let Some(index) = self.switcher.accept(commit) {
                    info!("SessionCore: debounced switch to index {}", index);
                    only_fatal(self.commit_index(index).await)?;
                }
            }
            CoreEvent::LoadTimeout { token } => self.handle_load_timeout(token).await,
            CoreEvent::IndicatorExpired { token } => {
                if self.indicator.expire(token) {
                    self.publish().await;
                }
            }
            CoreEvent::CatalogLoaded(catalog) => self.install_catalog(catalog).await?,
            CoreEvent::CatalogFailed(message) => {
                warn!("SessionCore: playlist load failed: {}", message);
                self.catalog_fetch = None;
                self.catalog_status = CatalogStatus::Failed { message };
                self.publish().await;
            }
            CoreEvent::Shutdown => {}
        }
        Ok(())
    }

    async fn handle_command(&mut self, command: Command) -> Result<Outcome, SessionError> {
        match command {
            Command::Select { url } => self.select_channel(&url).await.map(Outcome::Selected),
            Command::Pick { index } => self.commit_index(index).await.map(Outcome::Selected),
            Command::Step { direction } => Ok(Outcome::Stepped(self.step(direction).await)),
            Command::Pause => {
                self.pause().await;
                Ok(Outcome::Done)
            }
            Command::Resume => self.resume().await.map(|_| Outcome::Done),
            Command::Stop => {
                self.stop().await;
                Ok(Outcome::Done)
            }
            Command::Release => {
                self.release().await;
                Ok(Outcome::Done)
            }
            Command::Lifecycle { signal } => self.on_lifecycle(signal).await.map(|_| Outcome::Done),
            Command::ReloadPlaylist => {
                self.reload_playlist().await;
                Ok(Outcome::Done)
            }
            Command::GetState => Ok(Outcome::Done),
        }
    }

    // ── selection ─────────────────────────────────────────────────────────────

    /// Play `url`.  Catalog urls also move the channel cursor.
    async fn select_channel(&mut self, url: &str) -> Result<Selected, SessionError> {
        let locator = MediaLocator::parse(url)
            .ok_or_else(|| SessionError::InvalidLocator(url.to_string()))?;

        match self.catalog.position(locator.url()) {
            Some(index) => self.mark_committed(index),
            None => self.switcher.sync_committed(None),
        }
        self.open(locator).await
    }

    /// Play the catalog channel at `index` right away.
    async fn commit_index(&mut self, index: usize) -> Result<Selected, SessionError> {
        let url = self
            .catalog
            .get(index)
            .map(|c| c.url.clone())
            .ok_or(SessionError::UnknownChannel(index))?;
        let locator =
            MediaLocator::parse(&url).ok_or_else(|| SessionError::InvalidLocator(url.clone()))?;

        self.mark_committed(index);
        self.open(locator).await
    }

    fn mark_committed(&mut self, index: usize) {
        self.switcher.pick(index);
        let token = self.indicator.committed(index);
        let dwell = self.indicator.dwell();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(dwell).await;
            let _ = tx.send(CoreEvent::IndicatorExpired { token }).await;
        });
    }

    async fn step(&mut self, direction: Direction) -> StepOutcome {
        let outcome = self.switcher.step(direction);
        match outcome {
            StepOutcome::Moved { display_index } => {
                debug!("SessionCore: step {:?} → {}", direction, display_index);
                self.publish().await;
            }
            StepOutcome::Clamped => debug!("SessionCore: step {:?} clamped", direction),
        }
        outcome
    }

    /// Reuse the live handle for the same url; otherwise release it and build
    /// a new one.  The old handle is fully released before construction starts.
    async fn open(&mut self, locator: MediaLocator) -> Result<Selected, SessionError> {
        if self
            .player
            .as_ref()
            .is_some_and(|p| p.locator.url() == locator.url())
        {
            return self.reuse().await;
        }

        let url = locator.url().to_string();
        info!("SessionCore: select {} ({:?})", url, locator.pipeline());
        self.emit(PlaybackEvent::Loading { url: url.clone() });

        if self.teardown().await {
            // Give the platform a moment to reclaim decoder resources.
            tokio::time::sleep(self.config.player.grace_delay()).await;
        }
        self.active_url = None;
        self.status = PlaybackStatus::Idle;
        self.paused = false;

        let generation = self.next_generation;
        self.next_generation += 1;

        let built = self.backend.build(&locator).await;
        let mut handle = match built {
            Ok(handle) => handle,
            Err(e) => return Err(self.construction_failed(&url, e).await),
        };
        self.backend
            .subscribe(&mut handle, self.engine_listener(generation));

        let started = start(&self.backend, &mut handle, &locator).await;
        if let Err(e) = started {
            self.backend.release(handle).await;
            return Err(self.construction_failed(&url, e).await);
        }

        info!("SessionCore: player #{} loading {}", generation, url);
        self.player = Some(ActivePlayer {
            handle,
            locator,
            generation,
            stopped: false,
        });
        self.active_url = Some(url.clone());
        self.status = PlaybackStatus::Loading;
        self.last_error = None;
        self.arm_load_timeout();
        self.publish().await;

        Ok(Selected {
            url,
            handle_id: generation,
            reused: false,
        })
    }

    async fn reuse(&mut self) -> Result<Selected, SessionError> {
        let Some((generation, url, stopped)) = self
            .player
            .as_ref()
            .map(|p| (p.generation, p.locator.url().to_string(), p.stopped))
        else {
            return Err(SessionError::Closed);
        };
        let reload = stopped || !self.status.is_active();

        if !reload {
            debug!("SessionCore: {} already live on player #{}", url, generation);
            if self.paused {
                if let Some(player) = self.player.as_mut() {
                    match self.backend.play(&mut player.handle).await {
                        Ok(()) => {
                            self.paused = false;
                            self.publish().await;
                        }
                        Err(e) => warn!("SessionCore: resume on reselect failed: {}", e),
                    }
                }
            }
            return Ok(Selected {
                url,
                handle_id: generation,
                reused: true,
            });
        }

        info!("SessionCore: reloading {} on player #{}", url, generation);
        self.emit(PlaybackEvent::Loading { url: url.clone() });
        let started = match self.player.as_mut() {
            Some(player) => {
                player.stopped = false;
                start(&self.backend, &mut player.handle, &player.locator).await
            }
            None => Ok(()),
        };
        if let Err(e) = started {
            self.teardown().await;
            return Err(self.construction_failed(&url, e).await);
        }

        self.status = PlaybackStatus::Loading;
        self.paused = false;
        self.last_error = None;
        self.arm_load_timeout();
        self.publish().await;

        Ok(Selected {
            url,
            handle_id: generation,
            reused: true,
        })
    }

    async fn construction_failed(&mut self, url: &str, err: EngineError) -> SessionError {
        let err = SessionError::from(err);
        warn!("SessionCore: could not start {}: {}", url, err);
        self.cancel_load_timer();
        self.active_url = Some(url.to_string());
        self.status = PlaybackStatus::Error;
        self.paused = false;
        self.last_error = Some(err.to_string());
        self.emit(PlaybackEvent::Error {
            message: err.to_string(),
        });
        self.publish().await;
        err
    }

    /// Stop and release the live handle.  Returns `false` if there was none.
    async fn teardown(&mut self) -> bool {
        self.cancel_load_timer();
        let Some(mut player) = self.player.take() else {
            return false;
        };
        if !player.stopped {
            if let Err(e) = self.backend.stop(&mut player.handle).await {
                warn!("SessionCore: stop before release failed: {}", e);
            }
        }
        info!("SessionCore: releasing player #{}", player.generation);
        self.backend.release(player.handle).await;
        true
    }

    // ── transport controls ────────────────────────────────────────────────────

    async fn pause(&mut self) {
        let Some(player) = self.player.as_mut() else {
            return;
        };
        if self.paused || player.stopped {
            return;
        }
        match self.backend.pause(&mut player.handle).await {
            Ok(()) => {
                info!("SessionCore: paused");
                self.paused = true;
                self.publish().await;
            }
            Err(e) => warn!("SessionCore: pause failed: {}", e),
        }
    }

    async fn resume(&mut self) -> Result<(), SessionError> {
        let Some(player) = self.player.as_mut() else {
            return Ok(());
        };

        if player.stopped {
            player.stopped = false;
            let url = player.locator.url().to_string();
            info!("SessionCore: resuming stopped player with {}", url);
            let started = start(&self.backend, &mut player.handle, &player.locator).await;
            match started {
                Ok(()) => {
                    self.paused = false;
                    self.status = PlaybackStatus::Loading;
                    self.last_error = None;
                    self.emit(PlaybackEvent::Loading { url });
                    self.arm_load_timeout();
                }
                Err(e) => {
                    let err = SessionError::from(e);
                    if let SessionError::Fatal(_) = err {
                        return Err(err);
                    }
                    warn!("SessionCore: resume failed: {}", err);
                    self.status = PlaybackStatus::Error;
                    self.last_error = Some(err.to_string());
                    self.emit(PlaybackEvent::Error {
                        message: err.to_string(),
                    });
                }
            }
            self.publish().await;
        } else if self.paused {
            match self.backend.play(&mut player.handle).await {
                Ok(()) => {
                    info!("SessionCore: resumed");
                    self.paused = false;
                    self.publish().await;
                }
                Err(e) => warn!("SessionCore: resume failed: {}", e),
            }
        }
        Ok(())
    }

    async fn stop(&mut self) {
        let Some(player) = self.player.as_mut() else {
            return;
        };
        if player.stopped {
            return;
        }
        if let Err(e) = self.backend.stop(&mut player.handle).await {
            warn!("SessionCore: stop failed: {}", e);
        }
        player.stopped = true;
        info!("SessionCore: stopped");

        self.cancel_load_timer();
        self.paused = false;
        self.status = PlaybackStatus::Idle;
        self.emit(PlaybackEvent::Idle);
        self.publish().await;
    }

    /// Free the handle.  Safe to call when nothing is allocated.
    async fn release(&mut self) {
        let had_player = self.teardown().await;
        if !had_player && self.active_url.is_none() && self.status == PlaybackStatus::Idle {
            debug!("SessionCore: release with nothing allocated");
            return;
        }
        self.indicator.clear();
        self.active_url = None;
        self.status = PlaybackStatus::Idle;
        self.paused = false;
        self.last_error = None;
        self.emit(PlaybackEvent::Idle);
        self.publish().await;
    }

    async fn on_lifecycle(&mut self, signal: LifecycleSignal) -> Result<(), SessionError> {
        info!("SessionCore: lifecycle {:?}", signal);
        match signal {
            LifecycleSignal::EnteredForeground => self.resume().await?,
            LifecycleSignal::EnteredBackground => {
                self.switcher.cancel_pending();
                self.pause().await;
            }
            LifecycleSignal::Stopped => {
                self.switcher.cancel_pending();
                self.stop().await;
            }
            LifecycleSignal::Destroyed => {
                self.switcher.cancel_pending();
                self.release().await;
            }
        }
        // Cancelling a pending switch changes the snapshot even when the
        // player itself had nothing to do.
        self.publish().await;
        Ok(())
    }

    // ── engine events ─────────────────────────────────────────────────────────

    fn engine_listener(&self, generation: u64) -> mpsc::Sender<EngineEvent> {
        let (tx, mut rx) = mpsc::channel::<EngineEvent>(64);
        let core_tx = self.event_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if core_tx
                    .send(CoreEvent::Engine { generation, event })
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });
        tx
    }

    async fn handle_engine_event(&mut self, generation: u64, event: EngineEvent) {
        if self.player.as_ref().map(|p| p.generation) != Some(generation) {
            debug!(
                "SessionCore: dropping {:?} from released player #{}",
                event, generation
            );
            return;
        }
        let Some(next) = event.next_status(self.status) else {
            debug!("SessionCore: {:?} ignored in {:?}", event, self.status);
            return;
        };

        info!("SessionCore: status {:?} → {:?}", self.status, next);
        self.status = next;

        match next {
            PlaybackStatus::Ready => {
                self.cancel_load_timer();
                self.last_error = None;
                if let Some(url) = self.active_url.clone() {
                    self.emit(PlaybackEvent::Ready { url: url.clone() });
                    if self.last_good_url.as_deref() != Some(url.as_str()) {
                        self.state_manager.save_last_good(&url).await;
                        self.last_good_url = Some(url);
                    }
                }
            }
            PlaybackStatus::Buffering => self.emit(PlaybackEvent::Buffering),
            PlaybackStatus::Ended => self.emit(PlaybackEvent::Ended),
            PlaybackStatus::Error => {
                self.cancel_load_timer();
                let message = match event {
                    EngineEvent::Error(message) => message,
                    _ => "stream ended before playback started".to_string(),
                };
                warn!("SessionCore: playback error: {}", message);
                self.last_error = Some(message.clone());
                self.emit(PlaybackEvent::Error { message });
            }
            PlaybackStatus::Idle | PlaybackStatus::Loading => {}
        }
        self.publish().await;
    }

    fn arm_load_timeout(&mut self) {
        self.cancel_load_timer();
        self.load_token += 1;
        let token = self.load_token;
        let timeout = self.config.player.load_timeout();
        let tx = self.event_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx.send(CoreEvent::LoadTimeout { token }).await;
        });
        self.load_timer = Some(task.abort_handle());
    }

    fn cancel_load_timer(&mut self) {
        if let Some(timer) = self.load_timer.take() {
            timer.abort();
        }
    }

    async fn handle_load_timeout(&mut self, token: u64) {
        if token != self.load_token
            || self.status != PlaybackStatus::Loading
            || self.player.is_none()
        {
            return;
        }
        self.load_timer = None;
        let message = format!(
            "no playback after {}s",
            self.config.player.load_timeout().as_secs()
        );
        warn!("SessionCore: {}", message);
        self.status = PlaybackStatus::Error;
        self.last_error = Some(message.clone());
        self.emit(PlaybackEvent::Error { message });
        self.publish().await;
    }

    // ── catalog ───────────────────────────────────────────────────────────────

    async fn reload_playlist(&mut self) {
        if let Some(fetch) = self.catalog_fetch.take() {
            fetch.abort();
        }
        let source = self.config.playlist.url.clone();
        let timeout = self.config.playlist.fetch_timeout();
        info!("SessionCore: loading playlist from {}", source);

        self.catalog_status = CatalogStatus::Loading;
        self.publish().await;

        let tx = self.event_tx.clone();
        let task = tokio::spawn(async move {
            let evt = match catalog::load_playlist(&source, timeout).await {
                Ok(catalog) => CoreEvent::CatalogLoaded(catalog),
                Err(e) => CoreEvent::CatalogFailed(e.to_string()),
            };
            let _ = tx.send(evt).await;
        });
        self.catalog_fetch = Some(task.abort_handle());
    }

    async fn install_catalog(&mut self, catalog: Catalog) -> Result<(), SessionError> {
        self.catalog_fetch = None;
        info!("SessionCore: catalog has {} channels", catalog.len());

        let current = self
            .active_url
            .as_deref()
            .and_then(|url| catalog.position(url));
        self.catalog_status = CatalogStatus::Loaded {
            count: catalog.len(),
        };
        self.catalog = catalog;
        self.switcher.reset(self.catalog.len(), current);
        self.publish().await;

        let idle = self.player.is_none() && self.active_url.is_none();
        if self.config.playlist.autoplay_first && idle && !self.catalog.is_empty() {
            let index = self
                .last_good_url
                .as_deref()
                .and_then(|url| self.catalog.position(url))
                .unwrap_or(0);
            info!("SessionCore: autoplay index {}", index);
            only_fatal(self.commit_index(index).await)?;
        }
        Ok(())
    }

    // ── helpers ───────────────────────────────────────────────────────────────

    async fn publish(&mut self) {
        let active_index = self
            .active_url
            .as_deref()
            .and_then(|url| self.catalog.position(url));
        let pending_index = self.switcher.pending().map(|p| p.requested_index);

        let snapshot = SessionState {
            rev: 0,
            channels: self.catalog.channels().to_vec(),
            groups: self.catalog.groups(),
            catalog_status: self.catalog_status.clone(),
            active_url: self.active_url.clone(),
            active_index,
            status: self.status,
            paused: self.paused,
            last_error: self.last_error.clone(),
            last_good_url: self.last_good_url.clone(),
            display_index: self.switcher.display_index(),
            pending: self.switcher.pending_info(),
            committed_index: self.switcher.committed_index(),
            indicator: self.indicator.current(pending_index),
        };
        self.state_manager.publish(snapshot).await;
        let _ = self.broadcast_tx.send(BroadcastMessage::StateUpdated);
    }

    fn emit(&self, event: PlaybackEvent) {
        debug!("SessionCore: emit {:?}", event);
        let _ = self.broadcast_tx.send(BroadcastMessage::Playback(event));
    }

    async fn cleanup(&mut self) {
        info!("SessionCore: cleanup, releasing player");
        self.switcher.cancel_pending();
        if let Some(fetch) = self.catalog_fetch.take() {
            fetch.abort();
        }
        self.teardown().await;
    }
}

/// Log and swallow recoverable selection errors; only fatal ones propagate.
fn only_fatal(result: Result<Selected, SessionError>) -> Result<(), SessionError> {
    match result {
        Ok(_) => Ok(()),
        Err(SessionError::Fatal(msg)) => Err(SessionError::Fatal(msg)),
        Err(e) => {
            warn!("SessionCore: switch failed: {}", e);
            Ok(())
        }
    }
}
