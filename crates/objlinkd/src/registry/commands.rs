//! Registry actor commands, errors, and events.
//!
//! This module defines the message types for communicating with the `RegistryActor`:
//! - `RegistryCommand`: Commands sent to the actor
//! - `RegistryError`: Errors that can occur during registry operations
//! - `RegistryEvent`: Events published by the registry for subscribers

use chrono::{DateTime, Utc};
use objlink_core::{ObjectId, ObjectRef};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Each command uses a oneshot channel for the response, enabling
/// request-response patterns in async code without blocking.
pub enum RegistryCommand {
    /// Register a single object, returning its identifier.
    ///
    /// Idempotent: registering the same object again returns the same id.
    ///
    /// # Errors
    /// - `RegistryError::RegistryFull` if the object is new and the registry is at capacity
    Register {
        object: ObjectRef,
        respond_to: oneshot::Sender<Result<ObjectId, RegistryError>>,
    },

    /// Look up a live object by identifier.
    ///
    /// # Errors
    /// - `RegistryError::ReferenceNotFound` if the id is not registered
    Resolve {
        id: ObjectId,
        respond_to: oneshot::Sender<Result<ObjectRef, RegistryError>>,
    },

    /// Insert a batch of objects discovered by the serializer.
    ///
    /// Responds with the number of entries that were new.
    ///
    /// # Errors
    /// - `RegistryError::RegistryFull` if the new entries do not fit; nothing is inserted
    Merge {
        entries: Vec<(ObjectId, ObjectRef)>,
        respond_to: oneshot::Sender<Result<usize, RegistryError>>,
    },

    /// Remove an object at the client's request.
    ///
    /// # Errors
    /// - `RegistryError::ReferenceNotFound` if the id is not registered
    /// - `RegistryError::Pinned` if the entry is a seeded root
    Release {
        id: ObjectId,
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },

    /// Describe every entry.
    List {
        respond_to: oneshot::Sender<Vec<EntryInfo>>,
    },

    /// Number of entries.
    Count { respond_to: oneshot::Sender<usize> },

    /// Drop unpinned entries idle past the configured TTL.
    ///
    /// Fire-and-forget; sent by the cleanup task.
    EvictIdle,
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The registry has reached its maximum object capacity.
    #[error("registry is full (max: {max} objects)")]
    RegistryFull { max: usize },

    /// No object is registered under this identifier.
    #[error("Object with id {0} not found")]
    ReferenceNotFound(ObjectId),

    /// The entry is a seeded root and cannot be removed.
    #[error("object {0} is pinned and cannot be released")]
    Pinned(ObjectId),

    /// The response channel was closed before receiving a response.
    ///
    /// This typically indicates the actor was shut down.
    #[error("response channel closed")]
    ChannelClosed,
}

// ============================================================================
// Registry Events
// ============================================================================

/// Events published by the registry to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// An object became addressable.
    Registered { id: ObjectId, class: &'static str },

    /// An object stopped being addressable.
    Removed { id: ObjectId, reason: RemovalReason },
}

/// Reason why an entry was removed from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Client released the reference.
    Released,

    /// Entry was idle longer than the configured TTL.
    Idle,
}

impl std::fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Released => write!(f, "released by client"),
            Self::Idle => write!(f, "idle timeout"),
        }
    }
}

/// Snapshot of one registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryInfo {
    pub that: ObjectId,
    pub class: &'static str,
    pub registered_at: DateTime<Utc>,
    pub pinned: bool,
}
