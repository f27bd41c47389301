//! objlink server - exposes a live object graph over WebSocket.
//!
//! Clients receive a reference to the server root on connect and then call
//! methods on any object the server has handed out. Objects returned by a
//! call are registered so later calls can address them by id.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐  ws   ┌────────────────┐     ┌────────────┐     ┌───────────────┐
//! │   Client   │──────▶│ SessionHandler │────▶│ Dispatcher │────▶│ RegistryActor │
//! └────────────┘       └────────────────┘     └────────────┘     └───────────────┘
//!                              │                                          ▲
//!                              │ serialize result, merge discovered refs  │
//!                              └──────────────────────────────────────────┘
//! ```

pub mod config;
pub mod dispatch;
pub mod registry;
pub mod root;
pub mod server;

pub use config::{ConfigError, RegistryScope, ServerConfig, BIND_ENV, DEFAULT_BIND};
pub use dispatch::{DispatchError, Dispatcher};
pub use registry::{spawn_registry, RegistryError, RegistryHandle, RegistryLimits};
pub use root::{ServerRoot, SERVER_CLASS};
pub use server::{ObjectServer, ServerError, SessionHandler, SessionState};
