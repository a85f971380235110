//! WebSocket delivery server.
//!
//! [`FrameServer`] listens on TCP, upgrades requests for the configured path
//! to WebSocket connections and hands each one to its own [`Session`] task.
//! Every session reads from the same frozen [`FrameStore`]; nothing is
//! written after extraction, so the store is shared without locks.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use framescrub::{FfprobeResolver, FrameExtractor, FrameServer, ServerConfig};
//!
//! # async fn run() -> Result<(), framescrub::ScrubError> {
//! let store = FrameExtractor::default().load("input.mp4", &FfprobeResolver::new())?;
//! let server = FrameServer::new(Arc::new(store), ServerConfig::new())
//!     .bind()
//!     .await?;
//! println!("listening on {}", server.local_addr()?);
//! server.run_until(async { tokio::signal::ctrl_c().await.ok(); }).await;
//! # Ok(())
//! # }
//! ```

use std::{future::Future, net::SocketAddr, sync::Arc};

use tokio::{
    net::{TcpListener, TcpStream},
    task::{JoinError, JoinSet},
};
use tokio_tungstenite::tungstenite::{
    handshake::server::{ErrorResponse, Request, Response},
    http::{StatusCode, header::ORIGIN},
};

use crate::{
    config::ServerConfig, error::ScrubError, progress::CancellationToken, session::Session,
    store::FrameStore,
};

/// Serves one frame store to any number of WebSocket clients.
#[derive(Debug, Clone)]
pub struct FrameServer {
    store: Arc<FrameStore>,
    config: Arc<ServerConfig>,
    shutdown: CancellationToken,
}

/// A [`FrameServer`] with an open listening socket.
#[derive(Debug)]
pub struct BoundServer {
    server: FrameServer,
    listener: TcpListener,
}

/// Counters reported when the server stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServerSummary {
    /// TCP connections accepted, including rejected upgrades.
    pub connections: u64,
}

impl FrameServer {
    /// Create a server for `store`. Nothing is bound until [`bind`](Self::bind).
    pub fn new(store: Arc<FrameStore>, config: ServerConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
        }
    }

    /// A token that stops the server and all of its sessions when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Open the listening socket at the configured bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ScrubError::IoError`] if the address cannot be bound.
    pub async fn bind(self) -> Result<BoundServer, ScrubError> {
        let listener = TcpListener::bind(self.config.bind_address).await?;
        log::info!(
            "Listening on ws://{}{}",
            listener.local_addr()?,
            self.config.path
        );
        Ok(BoundServer {
            server: self,
            listener,
        })
    }
}

impl BoundServer {
    /// The address actually bound, useful when the port was `0`.
    pub fn local_addr(&self) -> Result<SocketAddr, ScrubError> {
        Ok(self.listener.local_addr()?)
    }

    /// See [`FrameServer::shutdown_token`].
    pub fn shutdown_token(&self) -> CancellationToken {
        self.server.shutdown_token()
    }

    /// Serve until the shutdown token is cancelled.
    pub async fn run(self) -> ServerSummary {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` completes or the shutdown token is cancelled.
    ///
    /// On shutdown the listener is closed, every session is cancelled, and
    /// this waits for all connection tasks to finish.
    pub async fn run_until<F>(self, shutdown: F) -> ServerSummary
    where
        F: Future<Output = ()>,
    {
        let BoundServer { server, listener } = self;
        let token = server.shutdown.clone();
        let mut connections = JoinSet::new();
        let mut summary = ServerSummary::default();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                () = &mut shutdown => break,
                () = token.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        summary.connections += 1;
                        connections.spawn(handle_connection(
                            stream,
                            peer,
                            Arc::clone(&server.store),
                            Arc::clone(&server.config),
                            token.clone(),
                        ));
                    }
                    Err(error) => log::warn!("Failed to accept connection: {error}"),
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    log_join(joined);
                }
            }
        }

        drop(listener);
        token.cancel();
        log::info!(
            "Shutting down, waiting for {} connection(s)",
            connections.len()
        );
        while let Some(joined) = connections.join_next().await {
            log_join(joined);
        }

        summary
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    store: Arc<FrameStore>,
    config: Arc<ServerConfig>,
    cancellation: CancellationToken,
) {
    let callback =
        |request: &Request, response: Response| authorize(&config, request).map(|()| response);
    let upgrade = tokio_tungstenite::accept_hdr_async(stream, callback);

    let socket = tokio::select! {
        () = cancellation.cancelled() => return,
        upgraded = upgrade => match upgraded {
            Ok(socket) => socket,
            Err(error) => {
                log::warn!("[{peer}] WebSocket upgrade failed: {error}");
                return;
            }
        },
    };

    log::info!("[{peer}] connected");
    match Session::new(store, cancellation)
        .with_peer(peer.to_string())
        .run(socket)
        .await
    {
        Ok(summary) => log::info!(
            "[{peer}] disconnected after {} frame(s), {} error(s): {:?}",
            summary.frames_sent,
            summary.errors_sent,
            summary.close_reason,
        ),
        Err(error) => log::warn!("[{peer}] connection failed: {error}"),
    }
}

/// Check an upgrade request against the path and origin policy.
fn authorize(config: &ServerConfig, request: &Request) -> Result<(), ErrorResponse> {
    if request.uri().path() != config.path {
        return Err(reject(
            StatusCode::NOT_FOUND,
            format!("no WebSocket endpoint at {}", request.uri().path()),
        ));
    }

    let origin = request
        .headers()
        .get(ORIGIN)
        .and_then(|value| value.to_str().ok());
    if !config.origin_policy.allows(origin) {
        return Err(reject(
            StatusCode::FORBIDDEN,
            format!("origin {} is not allowed", origin.unwrap_or_default()),
        ));
    }

    Ok(())
}

fn reject(status: StatusCode, reason: String) -> ErrorResponse {
    log::warn!("Rejecting WebSocket upgrade ({status}): {reason}");
    let mut response = ErrorResponse::new(Some(reason));
    *response.status_mut() = status;
    response
}

fn log_join(joined: Result<(), JoinError>) {
    if let Err(error) = joined {
        log::warn!("Connection task failed: {error}");
    }
}
