//! # Unix-Socket Transport
//!
//! Newline-delimited JSON over a Unix domain socket: one `ActionRequest` per
//! line in, one `ActionResponse` per line out.
//!
//! ## Security Properties
//!
//! - The socket is bound inside a fresh `0700` directory, set to `0600` and
//!   only then renamed into place, so no other user can ever connect.
//!   Signatures still authenticate every request.
//! - Frames are capped at `MAX_FRAME_BYTES`; a longer line closes the
//!   connection after an error response.
//! - A line that is not a valid `ActionRequest`, invalid UTF-8 included,
//!   gets a `SCHEMA_INVALID` response with an empty `requestId`, since no id
//!   could be trusted. The connection stays open.
//! - A response too large for one frame is replaced by a
//!   `RESPONSE_TOO_LARGE` error carrying the same `requestId` and `auditRef`.

use super::{ensure_correlated, IpcTransport, TransportError, MAX_FRAME_BYTES};
use crate::domain::format_timestamp;
use crate::ports::inbound::RequestHandler;
use async_trait::async_trait;
use chrono::Utc;
use shared_types::errors::RESPONSE_TOO_LARGE;
use shared_types::{ActionError, ActionRequest, ActionResponse, ErrorCode};
use std::fs::DirBuilder;
use std::future::Future;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

// =============================================================================
// FRAMING
// =============================================================================

/// Read one newline-terminated frame as raw bytes. `Ok(None)` on clean EOF.
///
/// Bytes are not checked for UTF-8 here; the JSON decoder reports that as
/// a malformed frame.
async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, TransportError>
where
    R: AsyncBufRead + Unpin,
{
    let mut frame = Vec::new();
    let limit = (MAX_FRAME_BYTES + 1) as u64;
    let n = reader.take(limit).read_until(b'\n', &mut frame).await?;
    if n == 0 {
        return Ok(None);
    }
    if frame.last() != Some(&b'\n') && n as u64 >= limit {
        return Err(TransportError::FrameTooLarge {
            limit: MAX_FRAME_BYTES,
        });
    }
    Ok(Some(frame))
}

/// Serialize `value` as one frame, newline included.
fn encode_frame<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, TransportError> {
    let mut bytes = serde_json::to_vec(value).map_err(|e| TransportError::Codec(e.to_string()))?;
    if bytes.len() > MAX_FRAME_BYTES {
        return Err(TransportError::FrameTooLarge {
            limit: MAX_FRAME_BYTES,
        });
    }
    bytes.push(b'\n');
    Ok(bytes)
}

fn malformed_frame_response(reason: impl Into<String>) -> ActionResponse {
    ActionResponse::failure(
        "",
        format_timestamp(Utc::now()),
        ActionError::from_code(ErrorCode::SchemaInvalid, reason),
        None,
    )
}

/// Stand-in for a response that would not fit in one frame.
fn oversized_response(response: &ActionResponse, limit: usize) -> ActionResponse {
    ActionResponse::failure(
        response.request_id.clone(),
        response.timestamp.clone(),
        ActionError::new(
            RESPONSE_TOO_LARGE,
            format!("response exceeds the {limit}-byte frame limit"),
        ),
        response.audit_ref.clone(),
    )
}

/// Encode `response`, substituting `oversized_response` when it is too big.
fn encode_response(response: &ActionResponse) -> Result<Vec<u8>, TransportError> {
    match encode_frame(response) {
        Err(TransportError::FrameTooLarge { limit }) => {
            warn!(
                component = "ipc",
                request_id = %response.request_id,
                limit,
                "Response exceeds frame limit"
            );
            encode_frame(&oversized_response(response, limit))
        }
        encoded => encoded,
    }
}

// =============================================================================
// SERVER (GATEWAY SIDE)
// =============================================================================

/// Accepts Core connections and feeds every frame to the handler.
pub struct UnixSocketServer {
    listener: UnixListener,
    path: PathBuf,
    handler: Arc<dyn RequestHandler>,
}

impl UnixSocketServer {
    /// Bind `path`, replacing a stale socket file. Missing parent
    /// directories are created mode `0700`.
    pub fn bind(
        path: impl AsRef<Path>,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<Self, TransportError> {
        let path = path.as_ref().to_path_buf();
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        DirBuilder::new().recursive(true).mode(0o700).create(&parent)?;

        let staging = staging_dir(&parent, &path);
        if staging.exists() {
            std::fs::remove_dir_all(&staging)?;
        }
        DirBuilder::new().mode(0o700).create(&staging)?;
        let bound = bind_private(&staging, &path);
        if let Err(e) = std::fs::remove_dir_all(&staging) {
            debug!(component = "ipc", error = %e, "Staging directory not removed");
        }
        let listener = bound?;
        info!(component = "ipc", path = %path.display(), "Gateway listening");

        Ok(Self {
            listener,
            path,
            handler,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serve connections until `shutdown` resolves. The socket file is
    /// removed on return.
    pub async fn serve_until<F>(self, shutdown: F) -> Result<(), TransportError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        let handler = Arc::clone(&self.handler);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(handler, stream).await {
                                warn!(component = "ipc", error = %e, "Connection error");
                            }
                        });
                    }
                    Err(e) => warn!(component = "ipc", error = %e, "Accept error"),
                },
            }
        }

        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!(component = "ipc", error = %e, "Socket file already gone");
        }
        info!(component = "ipc", "Gateway listener stopped");
        Ok(())
    }
}

/// Per-process directory next to the socket, used only while binding.
fn staging_dir(parent: &Path, path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "gateway.sock".to_string());
    parent.join(format!(".{name}.{}.bind", std::process::id()))
}

/// Bind inside `staging`, restrict the socket to its owner, then rename it
/// to `path`. The rename replaces any stale file already there.
fn bind_private(staging: &Path, path: &Path) -> Result<UnixListener, TransportError> {
    let staged = staging.join("socket");
    let listener = UnixListener::bind(&staged)?;
    std::fs::set_permissions(&staged, std::fs::Permissions::from_mode(0o600))?;
    std::fs::rename(&staged, path)?;
    Ok(listener)
}

async fn handle_connection(
    handler: Arc<dyn RequestHandler>,
    stream: UnixStream,
) -> Result<(), TransportError> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(TransportError::FrameTooLarge { limit }) => {
                let response = malformed_frame_response(format!("frame exceeds {limit} bytes"));
                writer.write_all(&encode_frame(&response)?).await?;
                writer.flush().await?;
                return Err(TransportError::FrameTooLarge { limit });
            }
            Err(e) => return Err(e),
        };

        if frame.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let response = match serde_json::from_slice::<ActionRequest>(&frame) {
            Ok(request) => handler.handle(request).await,
            Err(e) => {
                // The decoder's message can quote the frame, so only its
                // position is logged.
                warn!(
                    component = "ipc",
                    category = ?e.classify(),
                    line = e.line(),
                    column = e.column(),
                    "Malformed request frame"
                );
                malformed_frame_response(format!("malformed request: {e}"))
            }
        };

        writer.write_all(&encode_response(&response)?).await?;
        writer.flush().await?;
    }
    Ok(())
}

// =============================================================================
// CLIENT (CORE SIDE)
// =============================================================================

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

/// Core's end of the socket. One request is in flight at a time.
pub struct UnixSocketTransport {
    path: PathBuf,
    connection: Mutex<Option<Connection>>,
    ready: AtomicBool,
}

impl UnixSocketTransport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            connection: Mutex::new(None),
            ready: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl IpcTransport for UnixSocketTransport {
    async fn start(&self) -> Result<(), TransportError> {
        let mut connection = self.connection.lock().await;
        if connection.is_some() {
            return Ok(());
        }
        let stream = UnixStream::connect(&self.path).await?;
        let (reader, writer) = stream.into_split();
        *connection = Some(Connection {
            reader: BufReader::new(reader),
            writer,
        });
        self.ready.store(true, Ordering::SeqCst);
        debug!(component = "ipc", path = %self.path.display(), "Connected to gateway");
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        let mut connection = self.connection.lock().await;
        self.ready.store(false, Ordering::SeqCst);
        if let Some(mut conn) = connection.take() {
            conn.writer.shutdown().await?;
        }
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn send(&self, request: ActionRequest) -> Result<ActionResponse, TransportError> {
        let mut guard = self.connection.lock().await;
        let conn = guard.as_mut().ok_or(TransportError::NotStarted)?;

        conn.writer.write_all(&encode_frame(&request)?).await?;
        conn.writer.flush().await?;

        let frame = match read_frame(&mut conn.reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                guard.take();
                self.ready.store(false, Ordering::SeqCst);
                return Err(TransportError::Closed);
            }
            Err(e) => return Err(e),
        };
        let response: ActionResponse =
            serde_json::from_slice(&frame).map_err(|e| TransportError::Codec(e.to_string()))?;
        ensure_correlated(&request.id, response)
    }
}
