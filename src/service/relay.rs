use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::{runtime, signal};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, trace};

use crate::ingest::IngestContext;
use crate::network::{build_tls_acceptor, WsServer};
use crate::web::HttpServer;
use crate::AppError::IllegalStateError;
use crate::{global_config, AppResult};

/// The whole endpoint: one HTTPS static-file listener and one WSS ingest
/// listener over a shared TLS identity and a shared `IngestContext`.
pub struct Relay;

impl Relay {
    pub fn new() -> Self {
        Relay
    }

    pub fn start(&mut self) -> AppResult<()> {
        let (notify_shutdown, _) = broadcast::channel(1);
        let (shutdown_complete_tx, mut shutdown_complete_rx) = mpsc::channel(1);

        // startup tokio runtime
        let rt = runtime::Builder::new_multi_thread()
            .worker_threads(num_cpus::get())
            .enable_all()
            .build()?;

        // the ingest rings live for the whole process, constructed once and
        // handed to every connection by reference
        let context = Arc::new(IngestContext::new(&global_config().ingest));

        let network = &global_config().network;
        let tls_acceptor = build_tls_acceptor(&network.tls_cert, &network.tls_key)?;

        rt.block_on(Self::run_servers(
            context,
            tls_acceptor,
            notify_shutdown.clone(),
            shutdown_complete_tx,
        ))?;

        // servers are down, tell the remaining connection handlers
        if notify_shutdown.send(()).is_err() {
            debug!("no connection handlers left to notify");
        }
        // wait for shutdown complete
        trace!("waiting for shutdown complete...");
        rt.block_on(shutdown_complete_rx.recv());
        info!("relay shutdown complete");
        Ok(())
    }

    async fn run_servers(
        context: Arc<IngestContext>,
        tls_acceptor: TlsAcceptor,
        notify_shutdown: broadcast::Sender<()>,
        shutdown_complete_tx: mpsc::Sender<()>,
    ) -> AppResult<()> {
        let network = &global_config().network;

        let http_address = format!("{}:{}", network.ip, network.http_port);
        let http_listener = TcpListener::bind(&http_address).await.map_err(|err| {
            let error_msg = format!(
                "Failed to bind https server to address: {} - Error: {}",
                http_address, err
            );
            error!(error_msg);
            IllegalStateError(error_msg)
        })?;
        info!("https server binding to {} for listening", &http_address);

        let ws_address = format!("{}:{}", network.ip, network.ws_port);
        let ws_listener = TcpListener::bind(&ws_address).await.map_err(|err| {
            let error_msg = format!(
                "Failed to bind wss server to address: {} - Error: {}",
                ws_address, err
            );
            error!(error_msg);
            IllegalStateError(error_msg)
        })?;
        info!("wss server binding to {} for listening", &ws_address);

        let http_server = HttpServer::new(
            http_listener,
            tls_acceptor.clone(),
            Arc::new(Semaphore::new(network.max_connection)),
            notify_shutdown.clone(),
            shutdown_complete_tx.clone(),
        );
        let ws_server = WsServer::new(
            ws_listener,
            tls_acceptor,
            Arc::new(Semaphore::new(network.max_connection)),
            notify_shutdown,
            shutdown_complete_tx,
            context,
        );

        tokio::select! {
            res = http_server.run() => {
                if let Err(err) = res {
                    error!(cause = %err, "https server failed");
                }
            }
            res = ws_server.run() => {
                if let Err(err) = res {
                    error!(cause = %err, "wss server failed");
                }
            }
            _ = signal::ctrl_c() => {
                info!("get shutdown signal");
            }
        }

        Ok(())
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}
