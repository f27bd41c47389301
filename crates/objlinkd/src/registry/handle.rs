//! Client interface for interacting with the RegistryActor.
//!
//! The `RegistryHandle` provides a cheap-to-clone interface for sending commands
//! to the registry actor and subscribing to registry events.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `RegistryError::ChannelClosed`

use objlink_core::{ObjectId, ObjectRef};
use tokio::sync::{broadcast, mpsc, oneshot};

use super::commands::{EntryInfo, RegistryCommand, RegistryError, RegistryEvent};

// ============================================================================
// Registry Handle
// ============================================================================

/// Handle for interacting with the registry actor.
///
/// The actor stops once every handle is dropped.
///
/// # Usage
///
/// ```ignore
/// let id = handle.register(object).await?;
/// let same = handle.resolve(id).await?;
///
/// let mut rx = handle.subscribe();
/// while let Ok(event) = rx.recv().await {
///     // Handle event
/// }
/// ```
#[derive(Clone)]
pub struct RegistryHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<RegistryCommand>,

    /// Event broadcaster for subscribing to updates
    event_sender: broadcast::Sender<RegistryEvent>,
}

impl RegistryHandle {
    pub fn new(
        sender: mpsc::Sender<RegistryCommand>,
        event_sender: broadcast::Sender<RegistryEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Register an object and return its identifier.
    ///
    /// # Errors
    ///
    /// - `RegistryError::RegistryFull` if the registry is at maximum capacity
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn register(&self, object: ObjectRef) -> Result<ObjectId, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Register {
                object,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Look up the live object for an identifier.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ReferenceNotFound` if nothing is registered under `id`
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn resolve(&self, id: ObjectId) -> Result<ObjectRef, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Resolve { id, respond_to: tx })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Insert the objects discovered by one serializer pass.
    ///
    /// Returns how many were not registered before.
    ///
    /// # Errors
    ///
    /// - `RegistryError::RegistryFull` if the new entries do not fit
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn merge(&self, entries: Vec<(ObjectId, ObjectRef)>) -> Result<usize, RegistryError> {
        if entries.is_empty() {
            return Ok(0);
        }

        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Merge {
                entries,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Remove an entry so its identifier stops resolving.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ReferenceNotFound` if nothing is registered under `id`
    /// - `RegistryError::Pinned` for seeded roots
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn release(&self, id: ObjectId) -> Result<(), RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Release { id, respond_to: tx })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Describe all entries, oldest first.
    ///
    /// Returns an empty vector if communication with the actor fails.
    pub async fn list(&self) -> Vec<EntryInfo> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::List { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Number of entries, or 0 if the actor is unreachable.
    pub async fn len(&self) -> usize {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Count { respond_to: tx })
            .await
            .is_err()
        {
            return 0;
        }

        rx.await.unwrap_or(0)
    }

    /// Run an idle sweep now instead of waiting for the cleanup task.
    pub async fn evict_idle(&self) -> Result<(), RegistryError> {
        self.sender
            .send(RegistryCommand::EvictIdle)
            .await
            .map_err(|_| RegistryError::ChannelClosed)
    }

    /// Subscribe to registry events.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_sender.subscribe()
    }

    /// Check if the actor is still running.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Create a handle that does not keep the actor alive.
    pub fn downgrade(&self) -> WeakRegistryHandle {
        WeakRegistryHandle {
            sender: self.sender.downgrade(),
            event_sender: self.event_sender.clone(),
        }
    }
}

/// Non-owning counterpart of [`RegistryHandle`].
///
/// Objects held by the registry use this to reach it without forming a
/// cycle that would keep the actor running forever.
#[derive(Clone)]
pub struct WeakRegistryHandle {
    sender: mpsc::WeakSender<RegistryCommand>,
    event_sender: broadcast::Sender<RegistryEvent>,
}

impl WeakRegistryHandle {
    /// Returns a strong handle if the actor is still reachable.
    pub fn upgrade(&self) -> Option<RegistryHandle> {
        self.sender
            .upgrade()
            .map(|sender| RegistryHandle::new(sender, self.event_sender.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handle_channel_closed() {
        let (tx, rx) = mpsc::channel(1);
        let (event_tx, _) = broadcast::channel(1);
        let handle = RegistryHandle::new(tx, event_tx);

        drop(rx);

        assert!(!handle.is_connected());
        assert_eq!(
            handle.resolve(ObjectId::new(1)).await.err(),
            Some(RegistryError::ChannelClosed)
        );
        assert_eq!(handle.len().await, 0);
        assert!(handle.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_merge_empty_skips_actor() {
        let (tx, rx) = mpsc::channel(1);
        let (event_tx, _) = broadcast::channel(1);
        let handle = RegistryHandle::new(tx, event_tx);
        drop(rx);

        assert_eq!(handle.merge(Vec::new()).await, Ok(0));
    }

    #[test]
    fn test_weak_handle_does_not_keep_channel_open() {
        let (tx, _rx) = mpsc::channel(1);
        let (event_tx, _) = broadcast::channel(1);
        let handle = RegistryHandle::new(tx, event_tx);
        let weak = handle.downgrade();

        assert!(weak.upgrade().is_some());
        drop(handle);
        assert!(weak.upgrade().is_none());
    }
}
