/// mpv IPC driver with separated reader/writer tasks, and the `Player`
/// implementation the daemon core talks to.
///
/// ```text
///   MpvPlayer (Player)
///     └── MpvDriver::spawn_and_connect()      spawned lazily on first load
///           ├── writer_task   ← PendingRequest via mpsc, serialised → socket
///           └── reader_task   ← JSON lines from socket
///                                 ├── response (request_id) → matched oneshot
///                                 └── event                 → forward_events
///                                                               └── DaemonEvent::PlayerStopped
/// ```
///
/// Platform notes:
/// - Unix:    Unix domain socket
/// - Windows: named pipe  \\.\pipe\<name>
use async_trait::async_trait;
use radiodir::Player;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

use crate::core::DaemonEvent;

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>;

struct PendingRequest {
    req_id: u64,
    payload: String, // serialised JSON line, '\n' included
    reply: oneshot::Sender<anyhow::Result<Value>>,
}

/// An mpv event that arrived unsolicited (no request_id).
#[derive(Debug, Clone)]
pub struct MpvEvent {
    pub raw: Value,
}

impl MpvEvent {
    /// Synthesised by the reader when the IPC connection goes away.
    fn connection_closed() -> Self {
        Self {
            raw: json!({ "event": "shutdown" }),
        }
    }

    /// Event name, e.g. "end-file", "start-file", "file-loaded".
    pub fn event_name(&self) -> Option<&str> {
        self.raw.get("event")?.as_str()
    }

    /// Playback ended without us asking: stream finished, failed, or mpv went
    /// away.  `end-file` with reason `stop` follows our own commands.
    pub fn is_playback_end(&self) -> bool {
        match self.event_name() {
            Some("end-file") => matches!(
                self.raw.get("reason").and_then(Value::as_str),
                Some("eof") | Some("error")
            ),
            Some("shutdown") => true,
            _ => false,
        }
    }
}

// ── handle ────────────────────────────────────────────────────────────────────

/// Cloneable handle to the mpv writer task.
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
        self.send(json!(["loadfile", url])).await?;
        Ok(())
    }

    pub async fn set_pause(&self, paused: bool) -> anyhow::Result<()> {
        self.send(json!(["set_property", "pause", paused])).await?;
        Ok(())
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        self.send(json!(["stop"])).await?;
        Ok(())
    }
}

// ── driver ────────────────────────────────────────────────────────────────────

/// Owns the mpv child process and the handle of its current connection.
pub struct MpvDriver {
    socket_name: String,
    process: Option<tokio::process::Child>,
    handle: Option<MpvHandle>,
}

impl MpvDriver {
    pub fn new() -> Self {
        Self {
            socket_name: radiodir::platform::mpv_socket_name(),
            process: None,
            handle: None,
        }
    }

    pub fn process_alive(&mut self) -> bool {
        match self.process {
            Some(ref mut child) => child.try_wait().ok().flatten().is_none(),
            None => false,
        }
    }

    /// Handle of the running process, if there is one.
    pub fn live_handle(&mut self) -> Option<MpvHandle> {
        if self.process_alive() {
            self.handle.clone()
        } else {
            None
        }
    }

    pub async fn kill(&mut self) {
        self.handle = None;
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }
    }

    /// Handle of the running process, spawning a fresh one when needed.
    pub async fn ensure_running(
        &mut self,
        event_tx: &mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        if let Some(handle) = self.live_handle() {
            return Ok(handle);
        }
        let handle = self.spawn_and_connect(event_tx.clone()).await?;
        self.handle = Some(handle.clone());
        Ok(handle)
    }

    async fn spawn_and_connect(
        &mut self,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        self.kill().await;

        #[cfg(unix)]
        let _ = tokio::fs::remove_file(&self.socket_name).await;

        info!("mpv: spawning new process");
        let mpv_binary = radiodir::platform::find_mpv_binary()
            .ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;

        let child = tokio::process::Command::new(mpv_binary)
            .arg("--no-video")
            .arg("--idle=yes")
            .arg(radiodir::platform::mpv_socket_arg())
            .arg("--quiet")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        self.process = Some(child);

        self.connect(event_tx).await
    }

    #[cfg(unix)]
    async fn connect(&self, event_tx: mpsc::Sender<MpvEvent>) -> anyhow::Result<MpvHandle> {
        let socket_path = std::path::PathBuf::from(&self.socket_name);
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

        let stream = tokio::net::UnixStream::connect(&socket_path).await?;
        info!("mpv: connected to IPC socket");
        Ok(start_io_tasks(stream, event_tx))
    }

    #[cfg(windows)]
    async fn connect(&self, event_tx: mpsc::Sender<MpvEvent>) -> anyhow::Result<MpvHandle> {
        use tokio::net::windows::named_pipe::ClientOptions;

        let pipe_path = format!(r"\\.\pipe\{}", self.socket_name);
        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if let Ok(client) = ClientOptions::new().open(&pipe_path) {
                info!("mpv: connected to named pipe");
                return Ok(start_io_tasks(client, event_tx));
            }
        }
        anyhow::bail!("mpv named pipe did not appear")
    }
}

fn start_io_tasks<T>(stream: T, event_tx: mpsc::Sender<MpvEvent>) -> MpvHandle
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

    tokio::spawn(writer_task(write_half, cmd_rx, pending.clone()));
    tokio::spawn(reader_task(BufReader::new(read_half), pending, event_tx));

    MpvHandle { tx: cmd_tx }
}

// ── reader task ───────────────────────────────────────────────────────────────

async fn fail_pending(pending: &PendingMap, reason: &str) {
    let mut map = pending.lock().await;
    for (_, tx) in map.drain() {
        let _ = tx.send(Err(anyhow::anyhow!("mpv IPC {}", reason)));
    }
}

async fn reader_task<R>(
    mut reader: BufReader<R>,
    pending: PendingMap,
    event_tx: mpsc::Sender<MpvEvent>,
) where
    R: AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpv reader: connection closed");
                fail_pending(&pending, "connection closed").await;
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

                if let Some(req_id) = val.get("request_id").and_then(Value::as_u64) {
                    let mut map = pending.lock().await;
                    match map.remove(&req_id) {
                        Some(tx) => {
                            let result = match val["error"].as_str() {
                                Some("success") => Ok(val),
                                other => Err(anyhow::anyhow!(
                                    "mpv error: {}",
                                    other.unwrap_or("unknown error")
                                )),
                            };
                            let _ = tx.send(result);
                        }
                        None => debug!("mpv reader: response for unknown req={}", req_id),
                    }
                } else {
                    debug!("mpv reader: event {}", trimmed);
                    let _ = event_tx.send(MpvEvent { raw: val }).await;
                }
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                fail_pending(&pending, "read error").await;
                break;
            }
        }
    }
    let _ = event_tx.send(MpvEvent::connection_closed()).await;
}

// ── writer task ───────────────────────────────────────────────────────────────

async fn writer_task<W>(mut writer: W, mut rx: mpsc::Receiver<PendingRequest>, pending: PendingMap)
where
    W: AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Register before writing so the reader can match the response.
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

/// Turn unsolicited playback ends into core events.
async fn forward_events(mut rx: mpsc::Receiver<MpvEvent>, core_tx: mpsc::Sender<DaemonEvent>) {
    while let Some(event) = rx.recv().await {
        if event.is_playback_end() {
            info!("mpv: playback ended ({:?})", event.event_name());
            if core_tx.send(DaemonEvent::PlayerStopped).await.is_err() {
                break;
            }
        }
    }
}

// ── Player ────────────────────────────────────────────────────────────────────

pub struct MpvPlayer {
    driver: Mutex<MpvDriver>,
    event_tx: mpsc::Sender<MpvEvent>,
}

impl MpvPlayer {
    pub fn new(core_tx: mpsc::Sender<DaemonEvent>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(64);
        tokio::spawn(forward_events(event_rx, core_tx));
        Self {
            driver: Mutex::new(MpvDriver::new()),
            event_tx,
        }
    }

    async fn running(&self) -> anyhow::Result<MpvHandle> {
        self.driver
            .lock()
            .await
            .live_handle()
            .ok_or_else(|| anyhow::anyhow!("mpv is not running"))
    }

    pub async fn shutdown(&self) {
        self.driver.lock().await.kill().await;
    }
}

#[async_trait]
impl Player for MpvPlayer {
    async fn load(&self, url: &str) -> anyhow::Result<()> {
        let handle = self.driver.lock().await.ensure_running(&self.event_tx).await?;
        handle.set_pause(false).await?;
        handle.load_stream(url).await
    }

    async fn pause(&self) -> anyhow::Result<()> {
        self.running().await?.set_pause(true).await
    }

    async fn resume(&self) -> anyhow::Result<()> {
        self.running().await?.set_pause(false).await
    }

    async fn stop(&self) -> anyhow::Result<()> {
        // Nothing to stop without a process.
        match self.driver.lock().await.live_handle() {
            Some(handle) => handle.stop().await,
            None => Ok(()),
        }
    }
}
