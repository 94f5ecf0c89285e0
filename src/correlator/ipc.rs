// Flow-event ingestion over Unix domain sockets with length-prefixed JSON framing

use crate::error::{FlowlensError, Result};
use crate::flow::{RequestEvent, ResponseEvent};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};

/// Maximum frame size (10MB)
const MAX_MESSAGE_SIZE: u32 = 10 * 1024 * 1024;

/// Messages the interception layer sends over the socket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FlowMessage {
    /// A request was observed
    Request(RequestEvent),
    /// A response was observed
    Response(ResponseEvent),
    /// The browsing session is over; finalize and write the artifact
    Done,
    /// Liveness / progress probe
    Status,
}

/// Acknowledgement sent back for every message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowAck {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl FlowAck {
    /// Create a successful acknowledgement
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: None,
        }
    }

    /// Create a successful acknowledgement with data
    pub fn success_with_data(data: serde_json::Value) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    /// Create an error acknowledgement
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
        }
    }
}

/// Unix domain socket server the proxy bridge connects to
pub struct IngestServer {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
}

impl IngestServer {
    /// Create a new server for the given socket path
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            listener: None,
        }
    }

    /// Bind to the socket path and start listening
    pub async fn bind(&mut self) -> Result<()> {
        // Remove existing socket file if it exists
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| FlowlensError::Io {
                source: e,
                context: format!("Failed to remove existing socket: {:?}", self.socket_path),
            })?;
        }

        // Ensure parent directory exists
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FlowlensError::Io {
                source: e,
                context: format!("Failed to create socket directory: {:?}", parent),
            })?;
        }

        let listener = UnixListener::bind(&self.socket_path).map_err(|e| FlowlensError::Io {
            source: e,
            context: format!("Failed to bind to socket: {:?}", self.socket_path),
        })?;

        self.listener = Some(listener);

        tracing::info!("Ingest server listening on {:?}", self.socket_path);
        Ok(())
    }

    /// Accept an incoming connection
    pub async fn accept(&mut self) -> Result<UnixStream> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| FlowlensError::Ingest("Server not bound".to_string()))?;

        let (stream, _addr) = listener.accept().await.map_err(|e| FlowlensError::Io {
            source: e,
            context: "Failed to accept connection".to_string(),
        })?;

        Ok(stream)
    }

    /// Shutdown the server and clean up the socket file
    pub fn shutdown(&self) -> Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| FlowlensError::Io {
                source: e,
                context: format!("Failed to remove socket: {:?}", self.socket_path),
            })?;
        }
        Ok(())
    }

    /// Get the socket path
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

/// Read one length-prefixed message. Returns None on a clean EOF, so a
/// connection can stream any number of frames and hang up.
pub async fn read_message(stream: &mut UnixStream) -> Result<Option<FlowMessage>> {
    // Read 4-byte length prefix; EOF here means the peer is done
    let length = match stream.read_u32().await {
        Ok(length) => length,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => {
            return Err(FlowlensError::Io {
                source: e,
                context: "Failed to read message length".to_string(),
            })
        }
    };

    if length > MAX_MESSAGE_SIZE {
        return Err(FlowlensError::Ingest(format!(
            "Message too large: {} bytes (max: {})",
            length, MAX_MESSAGE_SIZE
        )));
    }

    let mut buffer = vec![0u8; length as usize];
    stream
        .read_exact(&mut buffer)
        .await
        .map_err(|e| FlowlensError::Io {
            source: e,
            context: "Failed to read message payload".to_string(),
        })?;

    let message: FlowMessage = serde_json::from_slice(&buffer).map_err(|e| FlowlensError::Json {
        source: e,
        context: "Failed to deserialize flow message".to_string(),
    })?;

    Ok(Some(message))
}

/// Write a length-prefixed acknowledgement
pub async fn write_ack(stream: &mut UnixStream, ack: &FlowAck) -> Result<()> {
    let payload = serde_json::to_vec(ack).map_err(|e| FlowlensError::Json {
        source: e,
        context: "Failed to serialize acknowledgement".to_string(),
    })?;

    if payload.len() > MAX_MESSAGE_SIZE as usize {
        return Err(FlowlensError::Ingest(format!(
            "Acknowledgement too large: {} bytes (max: {})",
            payload.len(),
            MAX_MESSAGE_SIZE
        )));
    }

    let length = payload.len() as u32;
    stream.write_u32(length).await.map_err(|e| FlowlensError::Io {
        source: e,
        context: "Failed to write acknowledgement length".to_string(),
    })?;

    stream
        .write_all(&payload)
        .await
        .map_err(|e| FlowlensError::Io {
            source: e,
            context: "Failed to write acknowledgement payload".to_string(),
        })?;

    stream.flush().await.map_err(|e| FlowlensError::Io {
        source: e,
        context: "Failed to flush acknowledgement".to_string(),
    })?;

    Ok(())
}

/// Client used by the proxy bridge and by tooling to talk to a collector
pub struct IngestClient {
    socket_path: PathBuf,
}

impl IngestClient {
    /// Create a new client
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    /// Open a connection for streaming multiple messages
    pub async fn connect(&self) -> Result<IngestConnection> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| FlowlensError::Io {
                source: e,
                context: format!("Failed to connect to collector at {:?}", self.socket_path),
            })?;
        Ok(IngestConnection { stream })
    }

    /// Connect, send one message, and return the acknowledgement
    pub async fn send(&self, message: &FlowMessage) -> Result<FlowAck> {
        let mut conn = self.connect().await?;
        conn.send(message).await
    }
}

/// One open streaming connection to a collector
pub struct IngestConnection {
    stream: UnixStream,
}

impl IngestConnection {
    /// Send one message and await its acknowledgement
    pub async fn send(&mut self, message: &FlowMessage) -> Result<FlowAck> {
        let payload = serde_json::to_vec(message).map_err(|e| FlowlensError::Json {
            source: e,
            context: "Failed to serialize flow message".to_string(),
        })?;

        let length = payload.len() as u32;
        self.stream
            .write_u32(length)
            .await
            .map_err(|e| FlowlensError::Io {
                source: e,
                context: "Failed to write message length".to_string(),
            })?;

        self.stream
            .write_all(&payload)
            .await
            .map_err(|e| FlowlensError::Io {
                source: e,
                context: "Failed to write message payload".to_string(),
            })?;

        self.stream.flush().await.map_err(|e| FlowlensError::Io {
            source: e,
            context: "Failed to flush message".to_string(),
        })?;

        let ack_length = self.stream.read_u32().await.map_err(|e| FlowlensError::Io {
            source: e,
            context: "Failed to read acknowledgement length".to_string(),
        })?;

        if ack_length > MAX_MESSAGE_SIZE {
            return Err(FlowlensError::Ingest(format!(
                "Acknowledgement too large: {} bytes",
                ack_length
            )));
        }

        let mut buffer = vec![0u8; ack_length as usize];
        self.stream
            .read_exact(&mut buffer)
            .await
            .map_err(|e| FlowlensError::Io {
                source: e,
                context: "Failed to read acknowledgement payload".to_string(),
            })?;

        let ack: FlowAck = serde_json::from_slice(&buffer).map_err(|e| FlowlensError::Json {
            source: e,
            context: "Failed to deserialize acknowledgement".to_string(),
        })?;

        Ok(ack)
    }
}
