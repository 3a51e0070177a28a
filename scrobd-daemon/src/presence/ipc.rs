//! Discord IPC transport
//!
//! Speaks the local Discord client's socket protocol: frames of
//! `[opcode LE u32][length LE u32][JSON payload]` over a unix socket
//! at `$TMPDIR/discord-ipc-{0..9}`. Connection is a handshake frame
//! followed by SET_ACTIVITY command frames.

use super::{Activity, PresenceConnector, PresenceTransport};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::debug;

const OP_HANDSHAKE: u32 = 0;
const OP_FRAME: u32 = 1;
const OP_CLOSE: u32 = 2;

static NONCE: AtomicU64 = AtomicU64::new(1);

/// Connector that dials the local Discord client
pub struct DiscordIpc {
    app_id: String,
}

impl DiscordIpc {
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
        }
    }
}

#[async_trait]
impl PresenceConnector for DiscordIpc {
    async fn connect(&self) -> io::Result<Box<dyn PresenceTransport>> {
        let stream = dial_socket().await?;
        let mut transport = IpcTransport { stream };

        let handshake = json!({ "v": 1, "client_id": self.app_id });
        transport
            .write_frame(OP_HANDSHAKE, &handshake.to_string())
            .await?;
        // The client answers with a READY dispatch; content unused.
        transport.read_frame().await?;

        debug!("connected to discord ipc");
        Ok(Box::new(transport))
    }
}

async fn dial_socket() -> io::Result<UnixStream> {
    let base = std::env::temp_dir();
    let mut last_err = io::Error::new(io::ErrorKind::NotFound, "no discord socket found");

    for i in 0..10 {
        let path = base.join(format!("discord-ipc-{}", i));
        match UnixStream::connect(&path).await {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = e,
        }
    }

    Err(last_err)
}

struct IpcTransport {
    stream: UnixStream,
}

#[derive(Debug, Deserialize)]
struct CommandResponse {
    #[serde(default)]
    evt: Option<String>,
    #[serde(default)]
    data: Option<ErrorData>,
}

#[derive(Debug, Deserialize)]
struct ErrorData {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

impl IpcTransport {
    async fn write_frame(&mut self, opcode: u32, payload: &str) -> io::Result<()> {
        let bytes = payload.as_bytes();
        let mut frame = Vec::with_capacity(8 + bytes.len());
        frame.extend_from_slice(&opcode.to_le_bytes());
        frame.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        frame.extend_from_slice(bytes);
        self.stream.write_all(&frame).await
    }

    async fn read_frame(&mut self) -> io::Result<(u32, Vec<u8>)> {
        let mut header = [0u8; 8];
        self.stream.read_exact(&mut header).await?;

        let opcode = u32::from_le_bytes(header[0..4].try_into().unwrap());
        let length = u32::from_le_bytes(header[4..8].try_into().unwrap());

        // Sized to the declared length, so oversized payloads are
        // never truncated.
        let mut payload = vec![0u8; length as usize];
        self.stream.read_exact(&mut payload).await?;
        Ok((opcode, payload))
    }

    async fn send_activity(&mut self, activity: Option<&Activity>) -> io::Result<()> {
        let payload = json!({
            "cmd": "SET_ACTIVITY",
            "args": {
                "pid": std::process::id(),
                "activity": activity,
            },
            "nonce": NONCE.fetch_add(1, Ordering::Relaxed).to_string(),
        });
        self.write_frame(OP_FRAME, &payload.to_string()).await?;

        let (_, data) = self.read_frame().await?;
        let response: CommandResponse = serde_json::from_slice(&data)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        if response.evt.as_deref() == Some("ERROR") {
            let detail = response.data.unwrap_or(ErrorData {
                code: 0,
                message: "unknown error".to_string(),
            });
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("discord error {}: {}", detail.code, detail.message),
            ));
        }

        Ok(())
    }
}

#[async_trait]
impl PresenceTransport for IpcTransport {
    async fn set_activity(&mut self, activity: &Activity) -> io::Result<()> {
        self.send_activity(Some(activity)).await
    }

    async fn clear_activity(&mut self) -> io::Result<()> {
        self.send_activity(None).await
    }

    async fn close(&mut self) {
        let _ = self.write_frame(OP_CLOSE, "{}").await;
        let _ = self.stream.shutdown().await;
    }
}
