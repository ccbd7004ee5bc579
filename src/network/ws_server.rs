use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::time::{self, Duration};
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info};

use crate::ingest::{IngestContext, MediaIngestSink};
use crate::service::Shutdown;
use crate::{AppError, AppResult};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// the single ingest endpoint, optionally with a trailing slash
fn is_ingest_path(path: &str) -> bool {
    path == "/echo" || path == "/echo/"
}

/// Secure WebSocket ingest listener.
///
/// Every accepted connection gets its own handler task and its own
/// `MediaIngestSink` over the shared `IngestContext`; frame routing happens
/// inline on the connection's read loop. A broken frame never closes the
/// connection, a broken connection never touches its neighbours.
pub struct WsServer {
    listener: TcpListener,
    tls_acceptor: TlsAcceptor,
    limit_connections: Arc<Semaphore>,
    notify_shutdown: broadcast::Sender<()>,
    shutdown_complete_tx: mpsc::Sender<()>,
    context: Arc<IngestContext>,
}

impl WsServer {
    pub fn new(
        listener: TcpListener,
        tls_acceptor: TlsAcceptor,
        limit_connections: Arc<Semaphore>,
        notify_shutdown: broadcast::Sender<()>,
        shutdown_complete_tx: mpsc::Sender<()>,
        context: Arc<IngestContext>,
    ) -> Self {
        WsServer {
            listener,
            tls_acceptor,
            limit_connections,
            notify_shutdown,
            shutdown_complete_tx,
            context,
        }
    }

    pub async fn run(&self) -> AppResult<()> {
        info!("wss server started");
        loop {
            let permit = self
                .limit_connections
                .clone()
                .acquire_owned()
                .await
                .unwrap();

            let socket = self.accept().await?;
            let connection_id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);

            let mut handler = ConnectionHandler {
                _shutdown_complete_tx: self.shutdown_complete_tx.clone(),
                notify_shutdown: self.notify_shutdown.clone(),
                connection_id,
                sink: MediaIngestSink::new(self.context.clone(), connection_id),
            };
            let tls_acceptor = self.tls_acceptor.clone();

            tokio::spawn(async move {
                if let Err(err) = handler.handle_connection(tls_acceptor, socket).await {
                    error!(connection_id, "connection error: {}", err);
                }
                // whether gracefully or unexpectedly closed, release connection
                drop(permit);
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
                            "accept wss server error: {}",
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

// handler for each websocket connection
struct ConnectionHandler {
    notify_shutdown: broadcast::Sender<()>,
    _shutdown_complete_tx: mpsc::Sender<()>,
    connection_id: u64,
    sink: MediaIngestSink,
}

impl ConnectionHandler {
    async fn handle_connection(
        &mut self,
        tls_acceptor: TlsAcceptor,
        socket: TcpStream,
    ) -> AppResult<()> {
        let peer = socket.peer_addr()?;
        let stream = tls_acceptor
            .accept(socket)
            .await
            .map_err(|e| AppError::Tls(format!("tls accept: {}", e)))?;

        let ws_stream = tokio_tungstenite::accept_hdr_async(stream, reject_unknown_paths).await?;
        info!(
            connection_id = self.connection_id,
            peer = %peer,
            "opened connection"
        );

        self.read_loop(ws_stream).await
    }

    async fn read_loop(
        &mut self,
        mut ws_stream: WebSocketStream<TlsStream<TcpStream>>,
    ) -> AppResult<()> {
        let mut shutdown = Shutdown::new(self.notify_shutdown.subscribe());
        loop {
            let maybe_message = tokio::select! {
                msg = ws_stream.next() => msg,
                _ = shutdown.recv() => {
                    debug!(
                        connection_id = self.connection_id,
                        "connection handler exit read loop after recv shutdown signal"
                    );
                    return Ok(());
                }
            };

            let message = match maybe_message {
                Some(message) => message?,
                // client went away without a close frame
                None => break,
            };

            match message {
                Message::Binary(data) => {
                    self.sink.on_message(Bytes::from(data));
                }
                Message::Text(text) => {
                    // no text-message contract on this endpoint
                    debug!(
                        connection_id = self.connection_id,
                        len = text.len(),
                        "ignoring text message"
                    );
                }
                Message::Close(frame) => {
                    match frame {
                        Some(frame) => info!(
                            connection_id = self.connection_id,
                            status = u16::from(frame.code),
                            "closed connection"
                        ),
                        None => info!(
                            connection_id = self.connection_id,
                            "closed connection without status"
                        ),
                    }
                    break;
                }
                // control frames are answered by the protocol layer
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
        debug!(
            connection_id = self.connection_id,
            "connection handler exit read loop"
        );

        Ok(())
    }
}

fn reject_unknown_paths(
    request: &Request,
    response: Response,
) -> Result<Response, ErrorResponse> {
    let path = request.uri().path();
    if is_ingest_path(path) {
        Ok(response)
    } else {
        debug!(path, "rejecting websocket upgrade on unknown path");
        let mut response = ErrorResponse::new(Some("no such endpoint".to_string()));
        *response.status_mut() = StatusCode::NOT_FOUND;
        Err(response)
    }
}

impl Drop for ConnectionHandler {
    fn drop(&mut self) {
        debug!(
            connection_id = self.connection_id,
            "connection handler dropped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_path_matching() {
        assert!(is_ingest_path("/echo"));
        assert!(is_ingest_path("/echo/"));
        assert!(!is_ingest_path("/"));
        assert!(!is_ingest_path("/echo/extra"));
        assert!(!is_ingest_path("/Echo"));
    }
}
