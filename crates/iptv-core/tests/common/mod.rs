//! In-memory player backend for driving SessionCore in tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use iptv_core::{
    BroadcastMessage, EngineError, EngineEvent, PlayerBackend, SessionClient, SessionCore,
    StateManager,
};
use iptv_proto::catalog::Catalog;
use iptv_proto::config::Config;
use iptv_proto::locator::MediaLocator;
use iptv_proto::protocol::{ChannelRecord, PlaybackEvent};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildFailure {
    Unreachable,
    Fatal,
}

#[derive(Default)]
pub struct Recorder {
    next_id: AtomicU64,
    live: AtomicUsize,
    /// Highest number of live handles seen at the moment a build began.
    max_live_at_build: AtomicUsize,
    builds: Mutex<Vec<String>>,
    loads: Mutex<Vec<(u64, String)>>,
    calls: Mutex<Vec<String>>,
    releases: Mutex<Vec<u64>>,
    listeners: Mutex<HashMap<u64, mpsc::Sender<EngineEvent>>>,
    fail_build: Mutex<Option<BuildFailure>>,
}

#[derive(Clone, Default)]
pub struct FakeBackend {
    pub rec: Arc<Recorder>,
    build_delay: Duration,
}

#[derive(Debug)]
pub struct FakeHandle {
    pub id: u64,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_build_delay(delay: Duration) -> Self {
        Self {
            rec: Arc::default(),
            build_delay: delay,
        }
    }

    pub fn fail_next_build(&self, failure: BuildFailure) {
        *self.rec.fail_build.lock().unwrap() = Some(failure);
    }

    pub fn live(&self) -> usize {
        self.rec.live.load(Ordering::SeqCst)
    }

    pub fn max_live_at_build(&self) -> usize {
        self.rec.max_live_at_build.load(Ordering::SeqCst)
    }

    pub fn builds(&self) -> Vec<String> {
        self.rec.builds.lock().unwrap().clone()
    }

    pub fn loads(&self) -> Vec<(u64, String)> {
        self.rec.loads.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.rec.calls.lock().unwrap().clone()
    }

    pub fn releases(&self) -> Vec<u64> {
        self.rec.releases.lock().unwrap().clone()
    }

    pub fn latest_handle(&self) -> u64 {
        self.rec.next_id.load(Ordering::SeqCst)
    }

    /// Push an engine event as if handle `id` raised it.
    pub async fn emit(&self, id: u64, event: EngineEvent) {
        let listener = self.rec.listeners.lock().unwrap().get(&id).cloned();
        if let Some(tx) = listener {
            let _ = tx.send(event).await;
        }
    }

    /// A clone of the listener handed to handle `id`, kept alive past release.
    pub fn listener(&self, id: u64) -> Option<mpsc::Sender<EngineEvent>> {
        self.rec.listeners.lock().unwrap().get(&id).cloned()
    }

    pub async fn emit_latest(&self, event: EngineEvent) {
        self.emit(self.latest_handle(), event).await;
    }

    fn record(&self, call: String) {
        self.rec.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl PlayerBackend for FakeBackend {
    type Handle = FakeHandle;

    async fn build(&self, locator: &MediaLocator) -> Result<FakeHandle, EngineError> {
        let live = self.rec.live.load(Ordering::SeqCst);
        self.rec.max_live_at_build.fetch_max(live, Ordering::SeqCst);
        self.rec.builds.lock().unwrap().push(locator.url().to_string());

        if !self.build_delay.is_zero() {
            tokio::time::sleep(self.build_delay).await;
        }
        let failure = self.rec.fail_build.lock().unwrap().take();
        match failure {
            Some(BuildFailure::Unreachable) => {
                return Err(EngineError::Unreachable(locator.url().to_string()))
            }
            Some(BuildFailure::Fatal) => {
                return Err(EngineError::Fatal("decoder crashed".to_string()))
            }
            None => {}
        }

        let id = self.rec.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.rec.live.fetch_add(1, Ordering::SeqCst);
        self.record(format!("build:{}", id));
        Ok(FakeHandle { id })
    }

    fn subscribe(&self, handle: &mut FakeHandle, listener: mpsc::Sender<EngineEvent>) {
        self.rec.listeners.lock().unwrap().insert(handle.id, listener);
    }

    async fn load(&self, handle: &mut FakeHandle, locator: &MediaLocator) -> Result<(), EngineError> {
        self.rec
            .loads
            .lock()
            .unwrap()
            .push((handle.id, locator.url().to_string()));
        self.record(format!("load:{}", handle.id));
        Ok(())
    }

    async fn play(&self, handle: &mut FakeHandle) -> Result<(), EngineError> {
        self.record(format!("play:{}", handle.id));
        Ok(())
    }

    async fn pause(&self, handle: &mut FakeHandle) -> Result<(), EngineError> {
        self.record(format!("pause:{}", handle.id));
        Ok(())
    }

    async fn stop(&self, handle: &mut FakeHandle) -> Result<(), EngineError> {
        self.record(format!("stop:{}", handle.id));
        Ok(())
    }

    async fn release(&self, handle: FakeHandle) {
        self.record(format!("release:{}", handle.id));
        self.rec.listeners.lock().unwrap().remove(&handle.id);
        self.rec.releases.lock().unwrap().push(handle.id);
        self.rec.live.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.playlist.autoplay_first = false;
    config
}

pub struct Harness {
    pub client: SessionClient,
    pub backend: FakeBackend,
    pub events: broadcast::Receiver<BroadcastMessage>,
    pub task: JoinHandle<anyhow::Result<()>>,
}

pub async fn start(backend: FakeBackend) -> Harness {
    start_with(backend, test_config(), Arc::new(StateManager::ephemeral())).await
}

pub async fn start_with(
    backend: FakeBackend,
    config: Config,
    state_manager: Arc<StateManager>,
) -> Harness {
    let (broadcast_tx, events) = broadcast::channel(1024);
    let (client, task) =
        SessionCore::spawn(config, backend.clone(), state_manager, broadcast_tx).await;
    Harness {
        client,
        backend,
        events,
        task,
    }
}

pub fn channel(n: usize) -> ChannelRecord {
    ChannelRecord {
        name: format!("Channel {}", n),
        url: url(n),
        logo: None,
        group: Some(if n % 2 == 0 { "News" } else { "Sports" }.to_string()),
    }
}

pub fn url(n: usize) -> String {
    format!("http://10.0.0.1/ch{}.m3u8", n)
}

pub fn catalog(len: usize) -> Catalog {
    Catalog::new((0..len).map(channel).collect())
}

/// Let spawned forwarders run and the core drain its queue.
pub async fn settle(client: &SessionClient) {
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
    let _ = client.send(iptv_proto::protocol::Command::GetState).await;
}

pub fn drain_playback(rx: &mut broadcast::Receiver<BroadcastMessage>) -> Vec<PlaybackEvent> {
    let mut events = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        if let BroadcastMessage::Playback(event) = msg {
            events.push(event);
        }
    }
    events
}
