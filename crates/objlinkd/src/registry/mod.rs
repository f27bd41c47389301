//! Object registry using Actor pattern.
//!
//! A registry maps identifiers handed to clients back to live objects. Each
//! registry is one actor; the server runs one per session or one shared by
//! all sessions, depending on `registry_scope`.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │ SessionHandler  │────▶│  RegistryActor  │────▶│ Broadcast Channel│
//! └─────────────────┘     └─────────────────┘     └──────────────────┘
//!         │                       │                       │
//!         │   RegistryCommand     │   RegistryEvent       │
//!         │   (mpsc channel)      │   (broadcast)         │
//!         ▼                       ▼                       ▼
//!   Resolve/Merge/           HashMap<ObjectId,       Subscribers
//!   Release                  Entry>
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use objlink_core::ObjectRef;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, Duration};
use tracing::debug;

mod actor;
mod commands;
mod handle;

pub use actor::{RegistryActor, RegistryLimits, DEFAULT_MAX_OBJECTS};
pub use commands::{EntryInfo, RegistryCommand, RegistryError, RegistryEvent, RemovalReason};
pub use handle::{RegistryHandle, WeakRegistryHandle};

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 100;
const EVENT_BUFFER: usize = 100;

/// Cleanup interval bounds
const MIN_CLEANUP_INTERVAL: Duration = Duration::from_millis(10);
const MAX_CLEANUP_INTERVAL: Duration = Duration::from_secs(2);

/// Spawn a registry actor seeded with pinned `roots` and return a handle.
///
/// When `limits.idle_ttl` is set a cleanup task sweeps idle entries. The
/// cleanup task only holds a weak sender, so the actor stops as soon as
/// the last `RegistryHandle` is dropped.
///
/// # Example
///
/// ```no_run
/// use objlinkd::registry::{spawn_registry, RegistryLimits};
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_registry(Vec::new(), RegistryLimits::default());
///     assert_eq!(handle.len().await, 0);
/// }
/// ```
pub fn spawn_registry(roots: Vec<ObjectRef>, limits: RegistryLimits) -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = RegistryActor::new(cmd_rx, event_tx.clone(), limits, roots);
    tokio::spawn(actor.run());

    if let Some(ttl) = limits.idle_ttl {
        spawn_cleanup_task(cmd_tx.downgrade(), cleanup_interval(ttl));
    }

    RegistryHandle::new(cmd_tx, event_tx)
}

fn cleanup_interval(ttl: Duration) -> Duration {
    (ttl / 2).clamp(MIN_CLEANUP_INTERVAL, MAX_CLEANUP_INTERVAL)
}

/// Spawn a background task that triggers periodic idle eviction.
fn spawn_cleanup_task(sender: mpsc::WeakSender<RegistryCommand>, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let Some(sender) = sender.upgrade() else {
                debug!("Cleanup task stopping: registry dropped");
                break;
            };

            // Fire-and-forget eviction command
            if sender.send(RegistryCommand::EvictIdle).await.is_err() {
                debug!("Cleanup task stopping: registry channel closed");
                break;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_interval_bounds() {
        assert_eq!(
            cleanup_interval(Duration::from_millis(1)),
            MIN_CLEANUP_INTERVAL
        );
        assert_eq!(
            cleanup_interval(Duration::from_millis(400)),
            Duration::from_millis(200)
        );
        assert_eq!(
            cleanup_interval(Duration::from_secs(3600)),
            MAX_CLEANUP_INTERVAL
        );
    }
}
