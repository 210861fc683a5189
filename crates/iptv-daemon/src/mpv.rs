/// mpv-backed native player.
///
/// Every handle is its own mpv process with its own IPC endpoint, so a
/// released handle takes its decoder and window with it.
///
/// ```text
///   MpvBackend::build()
///         │
///         ├── mpv child process  (--idle, --input-ipc-server=<per-handle>)
///         ├── writer_task   ← receives MpvRequest via mpsc, serialises → socket
///         └── reader_task   ← reads JSON lines from socket
///                                ├── response (has request_id) → matched oneshot::Sender
///                                └── event / property-change   → MpvEvent channel
///
///   MpvBackend::subscribe()
///         └── translator task: MpvEvent → EngineEvent → session listener
/// ```
///
/// Platform notes:
/// - Unix:   Unix domain sockets
/// - Windows: Named pipes  \\.\pipe\<name>
use async_trait::async_trait;
use iptv_core::{EngineError, EngineEvent, PlayerBackend};
use iptv_proto::config::PlayerConfig;
use iptv_proto::locator::{MediaLocator, Pipeline};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(windows)]
use tokio::net::windows::named_pipe::ClientOptions;

// ── global request-id counter ─────────────────────────────────────────────────

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

// ── observation property IDs ──────────────────────────────────────────────────

/// Fixed observe_property IDs.  We match on these in property-change events.
pub const OBS_PAUSED_FOR_CACHE: u64 = 1;
pub const OBS_CORE_IDLE: u64 = 2;

const IPC_TIMEOUT: Duration = Duration::from_secs(5);
const QUIT_TIMEOUT: Duration = Duration::from_secs(2);

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>;

// ── internal channel types ────────────────────────────────────────────────────

struct PendingRequest {
    req_id: u64,
    payload: String, // serialised JSON line (already has '\n')
    reply: oneshot::Sender<anyhow::Result<Value>>,
}

/// An mpv event / property-change that arrived unsolicited (no request_id).
#[derive(Debug, Clone)]
pub struct MpvEvent {
    pub raw: Value,
}

impl MpvEvent {
    /// Returns `Some((obs_id, data))` if this is a property-change event.
    pub fn as_property_change(&self) -> Option<(u64, &Value)> {
        if self.raw.get("event")?.as_str()? == "property-change" {
            let id = self.raw.get("id")?.as_u64()?;
            let data = self.raw.get("data").unwrap_or(&Value::Null);
            Some((id, data))
        } else {
            None
        }
    }

    /// Returns the event name, e.g. "end-file", "start-file", "file-loaded".
    pub fn event_name(&self) -> Option<&str> {
        self.raw.get("event")?.as_str()
    }

    /// Map a player event to the engine event the session cares about, if
    /// any.  Property changes carry no meaning on their own; see
    /// [`EventTranslator`].
    pub fn to_engine_event(&self) -> Option<EngineEvent> {
        match self.event_name()? {
            "playback-restart" => Some(EngineEvent::Ready),
            "end-file" => match self.raw.get("reason").and_then(|r| r.as_str()) {
                Some("eof") => Some(EngineEvent::Ended),
                Some("error") => {
                    let message = self
                        .raw
                        .get("file_error")
                        .and_then(|e| e.as_str())
                        .unwrap_or("playback failed");
                    Some(EngineEvent::Error(message.to_string()))
                }
                // stop / quit / redirect come from our own loadfile and release.
                _ => None,
            },
            _ => None,
        }
    }
}

/// Per-player event mapping.  `paused-for-cache` turning false is reported
/// as Ready only when it ends a stall this translator saw start; mpv also
/// reports it while a file is still opening, before the first frame.
#[derive(Debug, Default)]
struct EventTranslator {
    stalled: bool,
}

impl EventTranslator {
    fn translate(&mut self, evt: &MpvEvent) -> Option<EngineEvent> {
        if let Some((id, data)) = evt.as_property_change() {
            if id != OBS_PAUSED_FOR_CACHE {
                return None;
            }
            let stalled = data.as_bool().unwrap_or(false);
            let was_stalled = std::mem::replace(&mut self.stalled, stalled);
            return match (was_stalled, stalled) {
                (false, true) => Some(EngineEvent::Buffering),
                (true, false) => Some(EngineEvent::Ready),
                _ => None,
            };
        }
        if evt.event_name() == Some("start-file") {
            self.stalled = false;
        }
        evt.to_engine_event()
    }
}

// ── IPC handle ────────────────────────────────────────────────────────────────

/// Cloneable handle to the mpv writer task.  Use `send()` to fire a command
/// and await the response.
#[derive(Clone)]
pub struct MpvIpc {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvIpc {
    pub async fn send(&self, command: Value) -> anyhow::Result<Value> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = serde_json::to_string(&msg)?;
        raw.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload: raw,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("mpv writer task gone"))?;

        tokio::time::timeout(IPC_TIMEOUT, reply_rx)
            .await
            .map_err(|_| anyhow::anyhow!("mpv IPC timeout for req={}", req_id))?
            .map_err(|_| anyhow::anyhow!("mpv reply channel dropped req={}", req_id))?
    }

    async fn command(&self, command: Value) -> Result<(), EngineError> {
        self.send(command)
            .await
            .map(|_| ())
            .map_err(|e| EngineError::Ipc(e.to_string()))
    }

    async fn observe_properties(&self) {
        let props = [
            (OBS_PAUSED_FOR_CACHE, "paused-for-cache"),
            (OBS_CORE_IDLE, "core-idle"),
        ];
        for (id, name) in &props {
            match self.send(json!(["observe_property", id, name])).await {
                Ok(_) => debug!("mpv: observe_property id={} name={}", id, name),
                Err(e) => warn!("mpv: observe_property {} failed: {}", name, e),
            }
        }
    }
}

// ── backend ───────────────────────────────────────────────────────────────────

/// One live mpv process.
pub struct MpvPlayer {
    id: u64,
    socket_name: String,
    process: tokio::process::Child,
    ipc: MpvIpc,
    events: Option<mpsc::Receiver<MpvEvent>>,
    translator: Option<AbortHandle>,
}

pub struct MpvBackend {
    config: PlayerConfig,
    next_id: AtomicU64,
}

impl MpvBackend {
    pub fn new(config: PlayerConfig) -> Self {
        Self {
            config,
            next_id: AtomicU64::new(1),
        }
    }

    /// Command-line options for a player on `pipeline`.
    pub fn player_args(&self, pipeline: Pipeline) -> Vec<String> {
        let cfg = &self.config;
        let mut args = vec![
            "--idle=yes".to_string(),
            "--quiet".to_string(),
            "--force-window=immediate".to_string(),
            "--keep-open=no".to_string(),
            "--cache=yes".to_string(),
            format!("--cache-secs={}", cfg.max_buffer_ms.div_ceil(1000)),
            format!("--demuxer-readahead-secs={}", cfg.max_buffer_ms.div_ceil(1000)),
            format!("--cache-pause-wait={}", cfg.min_buffer_ms as f64 / 1000.0),
            format!("--network-timeout={}", cfg.network_timeout_secs),
            format!("--user-agent={}", cfg.user_agent),
        ];
        if let Some(referrer) = &cfg.referrer {
            args.push(format!("--referrer={}", referrer));
            args.push(format!(
                "--http-header-fields=Origin: {}",
                referrer.trim_end_matches('/')
            ));
        }
        match pipeline {
            Pipeline::Adaptive => args.push("--hls-bitrate=max".to_string()),
            Pipeline::Progressive => args.push("--demuxer-lavf-probesize=65536".to_string()),
        }
        args
    }

    async fn spawn(&self, mpv_binary: PathBuf, locator: &MediaLocator) -> anyhow::Result<MpvPlayer> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let socket_name = iptv_proto::platform::mpv_socket_name(id);

        #[cfg(unix)]
        let _ = tokio::fs::remove_file(&socket_name).await;

        info!("mpv: spawning player #{} for {}", id, locator);
        let mut process = tokio::process::Command::new(mpv_binary)
            .arg(iptv_proto::platform::mpv_socket_arg(&socket_name))
            .args(self.player_args(locator.pipeline()))
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let (event_tx, event_rx) = mpsc::channel::<MpvEvent>(64);
        let ipc = match connect_ipc(&socket_name, event_tx).await {
            Ok(ipc) => ipc,
            Err(e) => {
                let _ = process.kill().await;
                return Err(e);
            }
        };
        ipc.observe_properties().await;

        Ok(MpvPlayer {
            id,
            socket_name,
            process,
            ipc,
            events: Some(event_rx),
            translator: None,
        })
    }
}

#[async_trait]
impl PlayerBackend for MpvBackend {
    type Handle = MpvPlayer;

    async fn build(&self, locator: &MediaLocator) -> Result<MpvPlayer, EngineError> {
        let mpv_binary = iptv_proto::platform::find_mpv_binary()
            .ok_or_else(|| EngineError::Unsupported("mpv binary not found".to_string()))?;
        self.spawn(mpv_binary, locator)
            .await
            .map_err(|e| EngineError::Unreachable(e.to_string()))
    }

    fn subscribe(&self, handle: &mut MpvPlayer, listener: mpsc::Sender<EngineEvent>) {
        let Some(mut events) = handle.events.take() else {
            warn!("mpv: player #{} already subscribed", handle.id);
            return;
        };
        let id = handle.id;
        let task = tokio::spawn(async move {
            let mut translator = EventTranslator::default();
            while let Some(evt) = events.recv().await {
                if let Some(engine_event) = translator.translate(&evt) {
                    debug!("mpv: player #{} {:?}", id, engine_event);
                    if listener.send(engine_event).await.is_err() {
                        return;
                    }
                }
            }
            // Reader hit EOF while we were still subscribed.
            warn!("mpv: player #{} IPC closed", id);
            let _ = listener
                .send(EngineEvent::Error("player process exited".to_string()))
                .await;
        });
        handle.translator = Some(task.abort_handle());
    }

    async fn load(&self, handle: &mut MpvPlayer, locator: &MediaLocator) -> Result<(), EngineError> {
        debug!("mpv: player #{} loadfile {}", handle.id, locator);
        handle
            .ipc
            .command(json!(["loadfile", locator.url(), "replace"]))
            .await
    }

    async fn play(&self, handle: &mut MpvPlayer) -> Result<(), EngineError> {
        handle
            .ipc
            .command(json!(["set_property", "pause", false]))
            .await
    }

    async fn pause(&self, handle: &mut MpvPlayer) -> Result<(), EngineError> {
        handle
            .ipc
            .command(json!(["set_property", "pause", true]))
            .await
    }

    async fn stop(&self, handle: &mut MpvPlayer) -> Result<(), EngineError> {
        handle.ipc.command(json!(["stop"])).await
    }

    async fn release(&self, mut handle: MpvPlayer) {
        if let Some(task) = handle.translator.take() {
            task.abort();
        }
        let _ = handle.ipc.send(json!(["playlist-clear"])).await;
        let _ = handle.ipc.send(json!(["quit"])).await;

        match tokio::time::timeout(QUIT_TIMEOUT, handle.process.wait()).await {
            Ok(Ok(status)) => debug!("mpv: player #{} exited with {}", handle.id, status),
            _ => {
                warn!("mpv: player #{} did not quit, killing", handle.id);
                let _ = handle.process.kill().await;
            }
        }

        #[cfg(unix)]
        let _ = tokio::fs::remove_file(&handle.socket_name).await;
        info!("mpv: player #{} released", handle.id);
    }
}

// ── connect ───────────────────────────────────────────────────────────────────

#[cfg(unix)]
async fn connect_ipc(socket_name: &str, event_tx: mpsc::Sender<MpvEvent>) -> anyhow::Result<MpvIpc> {
    let socket_path = std::path::PathBuf::from(socket_name);

    // Wait for socket to appear
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if socket_path.exists() {
            break;
        }
    }
    if !socket_path.exists() {
        anyhow::bail!("mpv IPC socket did not appear");
    }

    let stream = UnixStream::connect(&socket_path).await?;
    debug!("mpv: connected to {}", socket_name);
    let (read_half, write_half) = stream.into_split();
    Ok(start_io_tasks(read_half, write_half, event_tx))
}

#[cfg(windows)]
async fn connect_ipc(socket_name: &str, event_tx: mpsc::Sender<MpvEvent>) -> anyhow::Result<MpvIpc> {
    let pipe_path = format!(r"\\.\pipe\{}", socket_name);
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if let Ok(client) = ClientOptions::new().open(&pipe_path) {
            debug!("mpv: connected to named pipe {}", pipe_path);
            let (read_half, write_half) = tokio::io::split(client);
            return Ok(start_io_tasks(read_half, write_half, event_tx));
        }
    }
    anyhow::bail!("mpv named pipe did not appear")
}

fn start_io_tasks<R, W>(read_half: R, write_half: W, event_tx: mpsc::Sender<MpvEvent>) -> MpvIpc
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    // req_id → reply channel.  Writer inserts, reader resolves.
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

    tokio::spawn(writer_task(write_half, cmd_rx, pending.clone()));
    tokio::spawn(reader_task(BufReader::new(read_half), pending, event_tx));

    MpvIpc { tx: cmd_tx }
}

// ── reader task ───────────────────────────────────────────────────────────────

async fn reader_task<R>(mut reader: BufReader<R>, pending: PendingMap, event_tx: mpsc::Sender<MpvEvent>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpv reader: connection closed");
                fail_pending(&pending, "mpv IPC connection closed").await;
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let val: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("mpv reader: invalid json '{}': {}", trimmed, e);
                        continue;
                    }
                };

                if let Some(req_id) = val.get("request_id").and_then(|v| v.as_u64()) {
                    let mut map = pending.lock().await;
                    if let Some(tx) = map.remove(&req_id) {
                        let result = if val["error"].as_str() == Some("success") {
                            Ok(val)
                        } else {
                            let err = val["error"].as_str().unwrap_or("unknown error").to_string();
                            debug!("mpv reader: response req={} err={}", req_id, err);
                            Err(anyhow::anyhow!("mpv error: {}", err))
                        };
                        let _ = tx.send(result);
                    } else {
                        debug!("mpv reader: response for unknown req={}", req_id);
                    }
                } else {
                    debug!("mpv reader: event {}", trimmed);
                    let _ = event_tx.send(MpvEvent { raw: val }).await;
                }
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                fail_pending(&pending, &format!("mpv IPC read error: {}", e)).await;
                break;
            }
        }
    }
}

async fn fail_pending(pending: &PendingMap, reason: &str) {
    let mut map = pending.lock().await;
    for (_, tx) in map.drain() {
        let _ = tx.send(Err(anyhow::anyhow!("{}", reason)));
    }
}

// ── writer task ───────────────────────────────────────────────────────────────

async fn writer_task<W>(mut writer: W, mut rx: mpsc::Receiver<PendingRequest>, pending: PendingMap)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Register reply channel before writing so reader can match it
        pending.lock().await.insert(req.req_id, req.reply);
        debug!("mpv writer: send req={} payload={}", req.req_id, req.payload.trim());
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            if let Some(tx) = pending.lock().await.remove(&req.req_id) {
                let _ = tx.send(Err(anyhow::anyhow!("mpv write error: {}", e)));
            }
            break;
        }
    }
    debug!("mpv writer: task exiting");
}
