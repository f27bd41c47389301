//! objlink client library.
//!
//! Connects to an objlink server over WebSocket and invokes methods on the
//! objects it exposes. Used by the `objlink` command-line tool and by the
//! server's integration tests.

pub mod client;
pub mod error;

pub use client::{CallReply, ObjectClient, DEFAULT_TIMEOUT};
pub use error::{ClientError, Result};
