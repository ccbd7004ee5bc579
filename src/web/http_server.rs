use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::time::{self, Duration};
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use crate::service::Shutdown;
use crate::web::streamer::ChunkedFileStreamer;
use crate::{global_config, AppError, AppResult};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// request head larger than this is rejected outright
const MAX_HEAD_SIZE: usize = 8 * 1024;

/// Secure static-file listener.
///
/// Accepts TLS connections, answers a single GET per connection with the
/// resolved file streamed in bounded chunks, and closes. File-serving errors
/// are surfaced once as a terminal 400 response, never retried.
pub struct HttpServer {
    listener: TcpListener,
    tls_acceptor: TlsAcceptor,
    limit_connections: Arc<Semaphore>,
    notify_shutdown: broadcast::Sender<()>,
    shutdown_complete_tx: mpsc::Sender<()>,
}

impl HttpServer {
    pub fn new(
        listener: TcpListener,
        tls_acceptor: TlsAcceptor,
        limit_connections: Arc<Semaphore>,
        notify_shutdown: broadcast::Sender<()>,
        shutdown_complete_tx: mpsc::Sender<()>,
    ) -> Self {
        HttpServer {
            listener,
            tls_acceptor,
            limit_connections,
            notify_shutdown,
            shutdown_complete_tx,
        }
    }

    pub async fn run(&self) -> AppResult<()> {
        info!("https server started");
        loop {
            let permit = self
                .limit_connections
                .clone()
                .acquire_owned()
                .await
                .unwrap();

            let socket = self.accept().await?;
            let connection_id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
            let tls_acceptor = self.tls_acceptor.clone();
            let notify_shutdown = self.notify_shutdown.clone();
            let _shutdown_complete_tx = self.shutdown_complete_tx.clone();

            tokio::spawn(async move {
                let mut shutdown = Shutdown::new(notify_shutdown.subscribe());
                let serve = async {
                    let stream = tls_acceptor
                        .accept(socket)
                        .await
                        .map_err(|e| AppError::Tls(format!("tls accept: {}", e)))?;
                    serve_connection(connection_id, stream).await
                };
                tokio::select! {
                    res = serve => {
                        if let Err(err) = res {
                            error!(connection_id, "http connection error: {}", err);
                        }
                    }
                    _ = shutdown.recv() => {
                        debug!(connection_id, "http connection dropped on shutdown");
                    }
                }
                drop(permit);
                drop(_shutdown_complete_tx);
            });
        }
    }

    async fn accept(&self) -> AppResult<TcpStream> {
        let mut backoff = 1;

        loop {
            match self.listener.accept().await {
                Ok((socket, _)) => return Ok(socket),
                Err(err) => {
                    if backoff > 64 {
                        return Err(AppError::DetailedIoError(format!(
                            "accept https server error: {}",
                            err
                        )));
                    }
                }
            }

            time::sleep(Duration::from_secs(backoff)).await;
            backoff *= 2;
        }
    }
}

async fn serve_connection(
    connection_id: u64,
    mut stream: TlsStream<TcpStream>,
) -> AppResult<()> {
    let (method, target) = read_request_head(&mut stream).await?;
    debug!(connection_id, method = %method, target = %target, "http request");

    if method != "GET" {
        let body = format!("method {} not allowed", method);
        write_response(&mut stream, "405 Method Not Allowed", &body).await?;
        return Ok(());
    }

    let general = &global_config().general;
    let path = match resolve_static_path(&general.static_root, &general.default_document, &target)
    {
        Ok(path) => path,
        Err(e) => {
            warn!(connection_id, target = %target, "rejected path: {}", e);
            let body = format!("Could not open path {}: {}", target, e);
            write_response(&mut stream, "400 Bad Request", &body).await?;
            return Ok(());
        }
    };

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) => {
            warn!(connection_id, path = %path.display(), "could not read file: {}", e);
            let body = format!("Could not open path {}: {}", target, e);
            write_response(&mut stream, "400 Bad Request", &body).await?;
            return Ok(());
        }
    };

    let length = file.metadata().await?.len();
    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        length
    );
    stream.write_all(head.as_bytes()).await?;

    let mut streamer = ChunkedFileStreamer::new();
    match streamer.stream(file, &mut stream).await {
        Ok(sent) => {
            debug!(
                connection_id,
                path = %path.display(),
                sent,
                reads = streamer.reads_issued(),
                "file streamed"
            );
        }
        Err(e) => {
            // connection interrupted mid-body, nothing left to tell the client
            error!(connection_id, path = %path.display(), "connection interrupted: {}", e);
        }
    }
    stream.shutdown().await.ok();
    Ok(())
}

/// Reads and parses the request head, returning `(method, target)`.
async fn read_request_head(stream: &mut TlsStream<TcpStream>) -> AppResult<(String, String)> {
    let mut buffer = BytesMut::with_capacity(1024);
    loop {
        if let Some(pos) = find_head_end(&buffer) {
            let head = std::str::from_utf8(&buffer[..pos])
                .map_err(|_| AppError::BadRequest("request head is not utf-8".to_string()))?;
            return parse_request_line(head);
        }
        if buffer.len() > MAX_HEAD_SIZE {
            return Err(AppError::BadRequest("request head too large".to_string()));
        }
        if 0 == stream.read_buf(&mut buffer).await? {
            return Err(AppError::DetailedIoError(
                "connection closed before a complete request head".to_string(),
            ));
        }
    }
}

fn find_head_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Parses `GET /path HTTP/1.1` into its method and target. Headers beyond
/// the request line are irrelevant to static file serving and ignored.
pub(crate) fn parse_request_line(head: &str) -> AppResult<(String, String)> {
    let line = head.lines().next().unwrap_or_default();
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(target), Some(version)) if version.starts_with("HTTP/") => {
            Ok((method.to_string(), target.to_string()))
        }
        _ => Err(AppError::BadRequest(format!(
            "malformed request line: {:?}",
            line
        ))),
    }
}

/// Maps a request target to a file under the static root.
///
/// `/` serves the default document. Anything that would escape the root
/// (`..` components, absolute paths) is rejected the same way an unreadable
/// file is.
pub(crate) fn resolve_static_path(
    static_root: &str,
    default_document: &str,
    target: &str,
) -> AppResult<PathBuf> {
    let path = target.split(['?', '#']).next().unwrap_or_default();
    let relative = if path == "/" {
        default_document
    } else {
        path.trim_start_matches('/')
    };
    if relative.is_empty() {
        return Err(AppError::BadRequest("empty request path".to_string()));
    }

    let relative = Path::new(relative);
    let escapes_root = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if escapes_root {
        return Err(AppError::BadRequest(
            "path escapes the static root".to_string(),
        ));
    }

    Ok(Path::new(static_root).join(relative))
}

async fn write_response(
    stream: &mut TlsStream<TcpStream>,
    status: &str,
    body: &str,
) -> AppResult<()> {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await.ok();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_line() {
        let (method, target) =
            parse_request_line("GET /device-share.html HTTP/1.1\r\nHost: x\r\n").unwrap();
        assert_eq!(method, "GET");
        assert_eq!(target, "/device-share.html");
    }

    #[test]
    fn test_parse_request_line_rejects_garbage() {
        assert!(parse_request_line("").is_err());
        assert!(parse_request_line("GET /x").is_err());
        assert!(parse_request_line("completely wrong").is_err());
    }

    #[test]
    fn test_root_target_serves_default_document() {
        let path = resolve_static_path("web", "device-share.html", "/").unwrap();
        assert_eq!(path, Path::new("web").join("device-share.html"));
    }

    #[test]
    fn test_plain_target_resolves_under_root() {
        let path = resolve_static_path("web", "device-share.html", "/js/app.js").unwrap();
        assert_eq!(path, Path::new("web").join("js/app.js"));
    }

    #[test]
    fn test_query_string_is_stripped() {
        let path = resolve_static_path("web", "index.html", "/a.css?v=3").unwrap();
        assert_eq!(path, Path::new("web").join("a.css"));
    }

    #[test]
    fn test_parent_components_are_rejected() {
        assert!(resolve_static_path("web", "index.html", "/../secret").is_err());
        assert!(resolve_static_path("web", "index.html", "/a/../../b").is_err());
    }
}
