/// mpv IPC driver and the transport worker built on it.
///
/// Architecture:
///
/// ```text
///   MpvTransport (controller side, non-blocking)
///         │  TransportCommand via unbounded mpsc
///         ▼
///   run_transport()  ← executes commands strictly in order
///         │
///         ├── MpvDriver::spawn_and_connect()
///         │       ├── writer_task  ← receives PendingRequest, serialises → socket
///         │       └── reader_task  ← reads JSON lines from socket
///         │                             ├── response (has request_id) → oneshot
///         │                             └── event / property-change  → worker
///         └── TitleTracker  ← tags icy-title changes with the playing session
/// ```
///
/// One mpv process (`--idle=yes`) serves every session: `stop` is awaited
/// before the next `loadfile` is written, so two streams never overlap.
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

#[cfg(unix)]
use tokio::net::UnixStream;

use radio_control::{ControlEvent, SessionId, Transport};

use crate::core::DaemonEvent;

// ── global request-id counter ─────────────────────────────────────────────────

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

// ── observation property IDs ──────────────────────────────────────────────────

/// `metadata/by-key/icy-title`
pub const OBS_ICY_TITLE: u64 = 1;
/// `icy-title` (some mpv versions only expose it here)
pub const OBS_ICY_TITLE_DIRECT: u64 = 2;

const HEARTBEAT: tokio::time::Duration = tokio::time::Duration::from_secs(10);

// ── internal channel types ────────────────────────────────────────────────────

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>;

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
}

// ── public handle ─────────────────────────────────────────────────────────────

/// Cloneable handle to the mpv writer task.  Use `send()` to fire a command
/// and await the response.
#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvHandle {
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

        tokio::time::timeout(tokio::time::Duration::from_secs(5), reply_rx)
            .await
            .map_err(|_| anyhow::anyhow!("mpv IPC timeout for req={}", req_id))?
            .map_err(|_| anyhow::anyhow!("mpv reply channel dropped req={}", req_id))?
    }

    pub async fn load_stream(&self, url: &str) -> anyhow::Result<()> {
        self.send(json!(["loadfile", url, "replace"])).await?;
        Ok(())
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        self.send(json!(["stop"])).await?;
        Ok(())
    }

    pub async fn set_volume(&self, percent: u8) -> anyhow::Result<()> {
        self.send(json!(["set_property", "volume", percent.min(100)]))
            .await?;
        Ok(())
    }

    /// Register observe_property for the title properties.  Must be called
    /// after every fresh connection.
    pub async fn observe_titles(&self) {
        let props = [
            (OBS_ICY_TITLE, "metadata/by-key/icy-title"),
            (OBS_ICY_TITLE_DIRECT, "icy-title"),
        ];
        for (id, name) in &props {
            match self.send(json!(["observe_property", id, name])).await {
                Ok(_) => debug!("mpv: observe_property id={} name={}", id, name),
                Err(e) => warn!("mpv: observe_property {} failed: {}", name, e),
            }
        }
    }
}

// ── driver ────────────────────────────────────────────────────────────────────

/// Owns the mpv child process.
pub struct MpvDriver {
    socket_name: String,
    process: Option<tokio::process::Child>,
    pub last_volume: u8,
}

impl MpvDriver {
    pub fn new() -> Self {
        Self {
            socket_name: radio_proto::platform::mpv_socket_name(),
            process: None,
            last_volume: 0,
        }
    }

    pub fn process_alive(&mut self) -> bool {
        if let Some(ref mut child) = self.process {
            child.try_wait().ok().flatten().is_none()
        } else {
            false
        }
    }

    /// Kill the process if running.
    pub async fn kill(&mut self) {
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }
    }

    #[cfg(unix)]
    pub async fn spawn_and_connect(
        &mut self,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        // Kill stale process
        self.kill().await;

        let socket_path = std::path::PathBuf::from(&self.socket_name);
        quit_orphan(&socket_path).await;
        let _ = tokio::fs::remove_file(&socket_path).await;

        info!("mpv: spawning new process");
        let mpv_binary = radio_proto::platform::find_mpv_binary()
            .ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;

        let child = tokio::process::Command::new(mpv_binary)
            .arg("--no-video")
            .arg("--idle=yes")
            .arg(radio_proto::platform::mpv_socket_arg())
            .arg("--quiet")
            .arg(format!("--volume={}", self.last_volume.min(100)))
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        self.process = Some(child);

        // Wait for socket to appear
        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if socket_path.exists() {
                break;
            }
        }
        if !socket_path.exists() {
            anyhow::bail!("mpv IPC socket did not appear");
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;

        let stream = UnixStream::connect(&socket_path).await?;
        info!("mpv: connected to IPC socket");
        Ok(Self::start_io_tasks(stream, event_tx))
    }

    #[cfg(not(unix))]
    pub async fn spawn_and_connect(
        &mut self,
        _event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        anyhow::bail!("mpv IPC is only supported on unix")
    }

    #[cfg(unix)]
    fn start_io_tasks(stream: UnixStream, event_tx: mpsc::Sender<MpvEvent>) -> MpvHandle {
        let (read_half, write_half) = stream.into_split();
        let reader = BufReader::new(read_half);

        // req_id → reply channel.  Writer inserts, reader resolves.
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);
        tokio::spawn(writer_task(write_half, cmd_rx, pending.clone()));
        tokio::spawn(reader_task(reader, pending, event_tx));

        MpvHandle { tx: cmd_tx }
    }
}

/// An mpv left behind by a run that was killed still holds the socket and
/// may still be playing.  Ask it to quit before spawning our own.
#[cfg(unix)]
async fn quit_orphan(socket_path: &std::path::Path) {
    let Ok(mut stream) = UnixStream::connect(socket_path).await else {
        return;
    };
    warn!("mpv: found a running instance on {:?}, asking it to quit", socket_path);
    let _ = stream.write_all(b"{\"command\":[\"quit\"]}\n").await;
    let _ = stream.shutdown().await;
    tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;
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
                let mut map = pending.lock().await;
                for (_, tx) in map.drain() {
                    let _ = tx.send(Err(anyhow::anyhow!("mpv IPC connection closed")));
                }
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
                            let err = val["error"]
                                .as_str()
                                .unwrap_or("unknown error")
                                .to_string();
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
                let mut map = pending.lock().await;
                for (_, tx) in map.drain() {
                    let _ = tx.send(Err(anyhow::anyhow!("mpv IPC read error: {}", e)));
                }
                break;
            }
        }
    }
}

// ── writer task ───────────────────────────────────────────────────────────────

async fn writer_task<W>(mut writer: W, mut rx: mpsc::Receiver<PendingRequest>, pending: PendingMap)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Register reply channel before writing so reader can match it
        {
            let mut map = pending.lock().await;
            map.insert(req.req_id, req.reply);
        }
        debug!("mpv writer: send req={} payload={}", req.req_id, req.payload.trim());
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            let mut map = pending.lock().await;
            if let Some(tx) = map.remove(&req.req_id) {
                let _ = tx.send(Err(anyhow::anyhow!("mpv write error: {}", e)));
            }
            break;
        }
    }
    debug!("mpv writer: task exiting");
}

// ── title tracking ────────────────────────────────────────────────────────────

/// Decides which session an icy-title belongs to.  Titles are only forwarded
/// once mpv reports `file-loaded` for the most recent `loadfile`; anything in
/// between still describes the previous stream.
#[derive(Debug, Default)]
pub struct TitleTracker {
    requested: Option<SessionId>,
    active: Option<SessionId>,
    last_title: Option<String>,
}

impl TitleTracker {
    pub fn loading(&mut self, session: SessionId) {
        self.requested = Some(session);
        self.active = None;
        self.last_title = None;
    }

    pub fn stopped(&mut self) {
        self.requested = None;
        self.active = None;
        self.last_title = None;
    }

    pub fn on_event(&mut self, evt: &MpvEvent) -> Option<(SessionId, String)> {
        if evt.event_name() == Some("file-loaded") {
            self.active = self.requested;
            return None;
        }
        let (id, data) = evt.as_property_change()?;
        if id != OBS_ICY_TITLE && id != OBS_ICY_TITLE_DIRECT {
            return None;
        }
        let session = self.active?;
        let title = clean_title(data)?;
        if self.last_title.as_deref() == Some(title.as_str()) {
            return None;
        }
        self.last_title = Some(title.clone());
        Some((session, title))
    }
}

/// Filter trivial values (null, blank, lone dashes).
fn clean_title(data: &Value) -> Option<String> {
    let raw = data.as_str()?;
    let trimmed = raw.trim().trim_matches('-').trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(raw.trim().to_string())
    }
}

/// Drop every event already waiting in the queue.
fn discard_queued(rx: &mut mpsc::Receiver<MpvEvent>) -> usize {
    let mut dropped = 0;
    while rx.try_recv().is_ok() {
        dropped += 1;
    }
    dropped
}

// ── transport worker ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    Play { session: SessionId, url: String },
    Stop,
    SetVolume(u8),
    Shutdown,
}

/// Controller-side `Transport`: queues commands for [`run_transport`].
#[derive(Clone)]
pub struct MpvTransport {
    tx: mpsc::UnboundedSender<TransportCommand>,
}

impl MpvTransport {
    pub fn new(tx: mpsc::UnboundedSender<TransportCommand>) -> Self {
        Self { tx }
    }

    fn queue(&self, cmd: TransportCommand) {
        if self.tx.send(cmd).is_err() {
            warn!("transport worker gone, command dropped");
        }
    }

    pub fn shutdown(&self) {
        self.queue(TransportCommand::Shutdown);
    }
}

impl Transport for MpvTransport {
    fn play(&mut self, session: SessionId, url: &str) {
        self.queue(TransportCommand::Play {
            session,
            url: url.to_string(),
        });
    }

    fn stop(&mut self) {
        self.queue(TransportCommand::Stop);
    }

    fn set_volume(&mut self, percent: u8) {
        self.queue(TransportCommand::SetVolume(percent));
    }
}

/// State of the worker between commands.
struct Worker {
    driver: MpvDriver,
    handle: Option<MpvHandle>,
    mpv_event_tx: mpsc::Sender<MpvEvent>,
    mpv_event_rx: mpsc::Receiver<MpvEvent>,
    titles: TitleTracker,
    /// What should be playing, for restarts after mpv dies.
    current: Option<(SessionId, String)>,
}

/// Execute transport commands in order and forward stream titles to the
/// control loop.  Failures are logged; the controller never hears about them.
pub async fn run_transport(
    mut rx: mpsc::UnboundedReceiver<TransportCommand>,
    event_tx: mpsc::Sender<DaemonEvent>,
) {
    let (mpv_event_tx, mpv_event_rx) = mpsc::channel::<MpvEvent>(64);
    let mut worker = Worker {
        driver: MpvDriver::new(),
        handle: None,
        mpv_event_tx,
        mpv_event_rx,
        titles: TitleTracker::default(),
        current: None,
    };
    let mut heartbeat = tokio::time::interval(HEARTBEAT);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            cmd = rx.recv() => match cmd {
                None | Some(TransportCommand::Shutdown) => break,
                Some(cmd) => worker.execute(cmd).await,
            },
            Some(evt) = worker.mpv_event_rx.recv() => {
                if evt.event_name() == Some("file-loaded") {
                    // Re-register observations so mpv pushes current values.
                    if let Some(h) = worker.handle.clone() {
                        tokio::spawn(async move { h.observe_titles().await });
                    }
                }
                if let Some((session, title)) = worker.titles.on_event(&evt) {
                    info!("mpv: icy-title for session {}: {}", session, title);
                    let event = DaemonEvent::Control(ControlEvent::StreamTitle { session, title });
                    if event_tx.send(event).await.is_err() {
                        break;
                    }
                }
            }
            _ = heartbeat.tick() => worker.check_alive().await,
        }
    }

    info!("transport: shutting down mpv");
    if let Some(handle) = worker.handle.take() {
        let _ = handle.stop().await;
    }
    worker.driver.kill().await;
}

impl Worker {
    async fn execute(&mut self, cmd: TransportCommand) {
        match cmd {
            TransportCommand::Play { session, url } => {
                self.current = Some((session, url.clone()));
                self.load(session, &url).await;
            }
            TransportCommand::Stop => {
                self.current = None;
                self.titles.stopped();
                if let Some(handle) = self.handle.as_ref() {
                    if let Err(e) = handle.stop().await {
                        warn!("transport: stop failed: {}", e);
                    }
                }
            }
            TransportCommand::SetVolume(percent) => {
                self.driver.last_volume = percent;
                if let Some(handle) = self.handle.as_ref() {
                    if let Err(e) = handle.set_volume(percent).await {
                        warn!("transport: set volume failed: {}", e);
                    }
                }
            }
            TransportCommand::Shutdown => {}
        }
    }

    async fn load(&mut self, session: SessionId, url: &str) {
        let Some(handle) = self.ensure_handle().await else {
            warn!("transport: no mpv available for session {}", session);
            return;
        };
        // The reader forwards events in socket order and `stop` has already
        // been answered, so everything queued belongs to the previous file.
        let stale = discard_queued(&mut self.mpv_event_rx);
        if stale > 0 {
            debug!("transport: dropped {} queued mpv events before session {}", stale, session);
        }
        self.titles.loading(session);
        info!("transport: session {} loading {}", session, url);
        if let Err(e) = handle.load_stream(url).await {
            warn!("transport: failed to load '{}': {}", url, e);
            return;
        }
        if let Err(e) = handle.set_volume(self.driver.last_volume).await {
            warn!("transport: set volume failed: {}", e);
        }
    }

    async fn ensure_handle(&mut self) -> Option<MpvHandle> {
        if self.handle.is_some() && !self.driver.process_alive() {
            warn!("transport: mpv process died, dropping handle");
            self.handle = None;
        }
        if self.handle.is_none() {
            match self.driver.spawn_and_connect(self.mpv_event_tx.clone()).await {
                Ok(h) => {
                    h.observe_titles().await;
                    self.handle = Some(h);
                }
                Err(e) => {
                    warn!("transport: failed to start mpv: {}", e);
                    return None;
                }
            }
        }
        self.handle.clone()
    }

    /// Restart mpv and resume the current session if the process died.
    async fn check_alive(&mut self) {
        if self.handle.is_none() || self.driver.process_alive() {
            return;
        }
        warn!("transport: heartbeat found mpv dead");
        self.handle = None;
        if let Some((session, url)) = self.current.clone() {
            self.load(session, &url).await;
        }
    }
}
