//! Audio output seam.
//!
//! The playback controller only sees the [`AudioOutput`] trait: one object
//! per track, constructed paused, closed before the next one exists. The
//! production backend spawns an `mpv` process per track and drives it over
//! the mpv JSON IPC socket; tests substitute an in-memory fake.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::config::MAX_GAIN;

/// One live audio output. Control calls are best-effort: transient IPC
/// failures degrade to no-ops and zero position/duration readings.
pub trait AudioOutput: Send {
    fn set_volume(&mut self, gain: f64);
    fn set_pause(&mut self, paused: bool);
    fn position_secs(&mut self) -> f64;
    fn duration_secs(&mut self) -> f64;
    fn close(&mut self);
}

/// Factory producing one output per track.
pub trait OutputBackend: Send + Sync {
    fn open(&self, path: &Path, start_paused: bool) -> Result<Box<dyn AudioOutput>>;
}

// ── mpv backend ───────────────────────────────────────────────────────────────

static NEXT_SOCKET: AtomicU64 = AtomicU64::new(1);

pub struct MpvBackend {
    mpv: PathBuf,
}

impl MpvBackend {
    pub fn new(mpv: PathBuf) -> Self {
        Self { mpv }
    }

    pub fn discover() -> Result<Self> {
        let mpv = crate::platform::find_mpv_binary()
            .context("mpv not found (install it on PATH)")?;
        Ok(Self::new(mpv))
    }
}

impl OutputBackend for MpvBackend {
    fn open(&self, path: &Path, start_paused: bool) -> Result<Box<dyn AudioOutput>> {
        let output = MpvOutput::spawn(&self.mpv, path, start_paused)?;
        Ok(Box::new(output))
    }
}

/// Reader/writer halves of the IPC connection, split so line buffering on
/// the read side cannot interfere with command writes.
struct MpvOutput {
    child: Child,
    reader: BufReader<Box<dyn Read + Send>>,
    writer: Box<dyn Write + Send>,
    #[cfg(unix)]
    socket_path: PathBuf,
    next_req: u64,
    closed: bool,
}

#[cfg(unix)]
fn socket_name(nonce: u64) -> String {
    format!(
        "{}/jockey-mpv-{}-{}.sock",
        std::env::temp_dir().display(),
        std::process::id(),
        nonce
    )
}

#[cfg(windows)]
fn socket_name(nonce: u64) -> String {
    format!(r"\\.\pipe\jockey-mpv-{}-{}", std::process::id(), nonce)
}

impl MpvOutput {
    fn spawn(mpv: &Path, file: &Path, start_paused: bool) -> Result<Self> {
        let nonce = NEXT_SOCKET.fetch_add(1, Ordering::Relaxed);
        let socket = socket_name(nonce);

        #[cfg(unix)]
        let _ = std::fs::remove_file(&socket);

        let mut cmd = Command::new(mpv);
        cmd.arg("--no-video")
            .arg("--really-quiet")
            .arg("--no-terminal")
            // Constructed silent and paused; the controller applies the
            // target gain before un-pausing so a new stream never starts at
            // full volume.
            .arg("--volume=0")
            .arg(format!("--input-ipc-server={socket}"))
            .arg(file)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .stdin(Stdio::null());
        if start_paused {
            cmd.arg("--pause");
        }
        let child = cmd.spawn().context("failed to spawn mpv")?;

        let (read_half, write_half) = connect_ipc(&socket)?;
        debug!("mpv: connected to IPC at {}", socket);

        Ok(Self {
            child,
            reader: BufReader::new(read_half),
            writer: write_half,
            #[cfg(unix)]
            socket_path: PathBuf::from(socket),
            next_req: 1,
            closed: false,
        })
    }

    /// Send one command and wait for its matching response, skipping
    /// unsolicited events. Bounded by the stream read timeout.
    fn request(&mut self, command: Value) -> Result<Value> {
        let req_id = self.next_req;
        self.next_req += 1;
        let mut payload = serde_json::to_string(&json!({
            "command": command,
            "request_id": req_id,
        }))?;
        payload.push('\n');
        self.writer.write_all(payload.as_bytes())?;
        self.writer.flush()?;

        let mut line = String::new();
        // Events arrive interleaved with responses; drain until ours shows
        // up, with a hard cap so a flood cannot spin forever.
        for _ in 0..128 {
            line.clear();
            let n = self.reader.read_line(&mut line)?;
            if n == 0 {
                anyhow::bail!("mpv IPC connection closed");
            }
            let Ok(val) = serde_json::from_str::<Value>(line.trim()) else {
                continue;
            };
            if val.get("request_id").and_then(|v| v.as_u64()) != Some(req_id) {
                continue;
            }
            if val.get("error").and_then(|e| e.as_str()) == Some("success") {
                return Ok(val);
            }
            let err = val
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown error")
                .to_string();
            anyhow::bail!("mpv error: {}", err);
        }
        anyhow::bail!("mpv response for req={} never arrived", req_id)
    }

    fn set_property(&mut self, name: &str, value: Value) {
        if let Err(e) = self.request(json!(["set_property", name, value])) {
            debug!("mpv set_property {} failed: {}", name, e);
        }
    }

    fn get_f64(&mut self, name: &str) -> f64 {
        match self.request(json!(["get_property", name])) {
            Ok(resp) => resp.get("data").and_then(|d| d.as_f64()).unwrap_or(0.0),
            Err(_) => 0.0,
        }
    }

    fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        // Polite quit first, then make sure the process is gone.
        let _ = self.request(json!(["quit"]));
        let _ = self.child.kill();
        let _ = self.child.wait();
        #[cfg(unix)]
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

impl AudioOutput for MpvOutput {
    fn set_volume(&mut self, gain: f64) {
        // Internal gain 0.0..=MAX_GAIN maps onto mpv's 0..100 softvol scale;
        // never above 100, so no software amplification.
        let volume = (gain.clamp(0.0, MAX_GAIN) / MAX_GAIN * 100.0).round();
        self.set_property("volume", json!(volume));
    }

    fn set_pause(&mut self, paused: bool) {
        self.set_property("pause", json!(paused));
    }

    fn position_secs(&mut self) -> f64 {
        self.get_f64("time-pos")
    }

    fn duration_secs(&mut self) -> f64 {
        self.get_f64("duration")
    }

    fn close(&mut self) {
        self.teardown();
    }
}

impl Drop for MpvOutput {
    fn drop(&mut self) {
        self.teardown();
    }
}

type IpcHalves = (Box<dyn Read + Send>, Box<dyn Write + Send>);

#[cfg(unix)]
fn connect_ipc(socket: &str) -> Result<IpcHalves> {
    use std::os::unix::net::UnixStream;
    let path = Path::new(socket);
    // The socket appears shortly after mpv starts.
    for _ in 0..50 {
        if path.exists() {
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    if !path.exists() {
        anyhow::bail!("mpv IPC socket did not appear");
    }
    let stream = UnixStream::connect(path).context("mpv IPC connect failed")?;
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    stream.set_write_timeout(Some(Duration::from_secs(2)))?;
    let reader = stream.try_clone().context("mpv IPC clone failed")?;
    Ok((Box::new(reader), Box::new(stream)))
}

#[cfg(windows)]
fn connect_ipc(socket: &str) -> Result<IpcHalves> {
    // mpv named pipes are duplex byte-mode; a plain file handle works.
    for _ in 0..50 {
        match std::fs::OpenOptions::new().read(true).write(true).open(socket) {
            Ok(file) => {
                let reader = file.try_clone().context("mpv IPC clone failed")?;
                return Ok((Box::new(reader), Box::new(file)));
            }
            Err(_) => std::thread::sleep(Duration::from_millis(100)),
        }
    }
    anyhow::bail!("mpv IPC pipe did not appear")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_names_unique() {
        assert_ne!(socket_name(1), socket_name(2));
    }
}
