//! WebSocket server.
//!
//! The server:
//! - Listens on a TCP socket and upgrades each connection to WebSocket
//! - Spawns a SessionHandler for each client
//! - Creates a registry per session, or shares one, per `registry_scope`
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  ObjectServer   │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept() + WebSocket handshake
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │ SessionHandler  │────▶│   Dispatcher    │────▶│ RegistryHandle  │
//! │  (per client)   │     │                 │     │ (session/shared)│
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Accept and handshake errors are logged and allow continued operation

mod session;

pub use session::{SessionError, SessionHandler, SessionState};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use objlink_core::ObjectRef;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{RegistryScope, ServerConfig};
use crate::registry::RegistryHandle;
use crate::root::ServerRoot;

/// WebSocket object server.
pub struct ObjectServer {
    listener: TcpListener,
    config: Arc<ServerConfig>,

    /// Application object handed out by `get_root`
    app_root: Option<ObjectRef>,

    /// Present when `registry_scope` is shared
    shared: Option<(ObjectRef, RegistryHandle)>,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter for session ids
    connection_counter: AtomicU64,

    active_sessions: Arc<AtomicUsize>,
}

impl ObjectServer {
    /// Binds the listen socket.
    ///
    /// Use port 0 in `config.bind` to let the OS pick one, then read it
    /// back with [`local_addr`](Self::local_addr).
    pub async fn bind(
        config: ServerConfig,
        app_root: Option<ObjectRef>,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        config
            .validate()
            .map_err(|e| ServerError::Config(e.to_string()))?;

        let listener = TcpListener::bind(config.bind)
            .await
            .map_err(|e| ServerError::Bind {
                addr: config.bind,
                error: e.to_string(),
            })?;

        let shared = match config.registry_scope {
            RegistryScope::Shared => {
                let (root, registry) = ServerRoot::spawn(app_root.clone(), config.registry_limits());
                let root: ObjectRef = root;
                Some((root, registry))
            }
            RegistryScope::Session => None,
        };

        Ok(Self {
            listener,
            config: Arc::new(config),
            app_root,
            shared,
            cancel_token,
            connection_counter: AtomicU64::new(0),
            active_sessions: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::Bind {
                addr: self.config.bind,
                error: e.to_string(),
            })
    }

    /// `ws://` URL clients should connect to.
    pub fn url(&self) -> Result<String, ServerError> {
        Ok(format!("ws://{}", self.local_addr()?))
    }

    /// Shared registry, if the server runs with `registry_scope = "shared"`.
    pub fn shared_registry(&self) -> Option<&RegistryHandle> {
        self.shared.as_ref().map(|(_, registry)| registry)
    }

    /// Runs the server.
    ///
    /// Accepts connections until the cancellation token is triggered.
    /// Open sessions observe the same token and close.
    pub async fn run(self) -> Result<(), ServerError> {
        info!(
            addr = %self.local_addr()?,
            scope = %self.config.registry_scope,
            "Object server listening"
        );

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, peer, conn_num);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        info!(
            active = self.active_sessions.load(Ordering::Relaxed),
            "Server stopped"
        );
        Ok(())
    }

    /// Spawns a task that upgrades the connection and runs its session.
    fn handle_connection(&self, stream: TcpStream, peer: SocketAddr, session_id: u64) {
        let Some(guard) = SessionSlot::acquire(&self.active_sessions, self.config.max_connections)
        else {
            warn!(
                %peer,
                max = self.config.max_connections,
                "Too many sessions, rejecting connection"
            );
            return;
        };

        let config = Arc::clone(&self.config);
        let cancel_token = self.cancel_token.child_token();
        let shared = self.shared.clone();
        let app_root = self.app_root.clone();

        tokio::spawn(async move {
            let _guard = guard;

            let ws = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    warn!(%peer, error = %e, "WebSocket handshake failed");
                    return;
                }
            };
            debug!(%peer, session = session_id, "WebSocket connection accepted");

            let (root, registry) = match shared {
                Some(shared) => shared,
                None => {
                    let (root, registry) = ServerRoot::spawn(app_root, config.registry_limits());
                    let root: ObjectRef = root;
                    (root, registry)
                }
            };

            let handler = SessionHandler::new(ws, root, registry, config, cancel_token, session_id);
            handler.run().await;
        });
    }
}

/// Counts an active session until dropped.
struct SessionSlot {
    active: Arc<AtomicUsize>,
}

impl SessionSlot {
    fn acquire(active: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .ok()?;
        Some(Self {
            active: Arc::clone(active),
        })
    }
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: SocketAddr, error: String },

    #[error("Invalid configuration: {0}")]
    Config(String),
}
