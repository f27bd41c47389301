//! Registry actor - owns the identifier table and processes commands.
//!
//! The RegistryActor is the single owner of the id-to-object table for one
//! registry scope. It receives commands via an mpsc channel and publishes
//! events via broadcast.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel send failures are logged but don't panic

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use objlink_core::{ObjectId, ObjectRef};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::commands::{EntryInfo, RegistryCommand, RegistryError, RegistryEvent, RemovalReason};

// ============================================================================
// Resource Limits
// ============================================================================

/// Default maximum number of objects one registry can hold.
pub const DEFAULT_MAX_OBJECTS: usize = 100_000;

/// Bounds applied by the actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryLimits {
    /// Upper bound on entries, pinned roots included
    pub max_objects: usize,

    /// Unpinned entries untouched for this long are evicted
    pub idle_ttl: Option<Duration>,
}

impl Default for RegistryLimits {
    fn default() -> Self {
        Self {
            max_objects: DEFAULT_MAX_OBJECTS,
            idle_ttl: None,
        }
    }
}

// ============================================================================
// Registry Actor
// ============================================================================

struct Entry {
    object: ObjectRef,
    registered_at: DateTime<Utc>,
    last_access: Instant,
    pinned: bool,
}

impl Entry {
    fn new(object: ObjectRef, pinned: bool) -> Self {
        Self {
            object,
            registered_at: Utc::now(),
            last_access: Instant::now(),
            pinned,
        }
    }

    fn touch(&mut self) {
        self.last_access = Instant::now();
    }
}

/// The registry actor - owns every entry of one registry scope.
///
/// Holding an entry keeps its object alive, so an identifier can never be
/// reused by a different object while it is registered.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    /// Identifier table
    objects: HashMap<ObjectId, Entry>,

    limits: RegistryLimits,

    /// Event publisher for subscribers
    event_publisher: broadcast::Sender<RegistryEvent>,
}

impl RegistryActor {
    /// Creates a new registry actor seeded with pinned root objects.
    ///
    /// Roots are inserted even if they exceed `limits.max_objects`.
    pub fn new(
        receiver: mpsc::Receiver<RegistryCommand>,
        event_publisher: broadcast::Sender<RegistryEvent>,
        limits: RegistryLimits,
        roots: Vec<ObjectRef>,
    ) -> Self {
        let objects = roots
            .into_iter()
            .map(|root| (ObjectId::of(&root), Entry::new(root, true)))
            .collect();

        Self {
            receiver,
            objects,
            limits,
            event_publisher,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all senders dropped).
    pub async fn run(mut self) {
        debug!(roots = self.objects.len(), "Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        debug!(objects = self.objects.len(), "Registry actor stopped");
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Register { object, respond_to } => {
                let result = self.handle_register(object);
                // Ignore send error - caller may have dropped the receiver
                let _ = respond_to.send(result);
            }
            RegistryCommand::Resolve { id, respond_to } => {
                let _ = respond_to.send(self.handle_resolve(id));
            }
            RegistryCommand::Merge {
                entries,
                respond_to,
            } => {
                let _ = respond_to.send(self.handle_merge(entries));
            }
            RegistryCommand::Release { id, respond_to } => {
                let _ = respond_to.send(self.handle_release(id));
            }
            RegistryCommand::List { respond_to } => {
                let _ = respond_to.send(self.handle_list());
            }
            RegistryCommand::Count { respond_to } => {
                let _ = respond_to.send(self.objects.len());
            }
            RegistryCommand::EvictIdle => {
                self.handle_evict_idle();
            }
        }
    }

    fn handle_register(&mut self, object: ObjectRef) -> Result<ObjectId, RegistryError> {
        let id = ObjectId::of(&object);
        if let Some(entry) = self.objects.get_mut(&id) {
            entry.touch();
            return Ok(id);
        }

        if self.objects.len() >= self.limits.max_objects {
            warn!(
                max = self.limits.max_objects,
                class = object.class_name(),
                "Registry full, rejecting object"
            );
            return Err(RegistryError::RegistryFull {
                max: self.limits.max_objects,
            });
        }

        self.insert(id, object);
        Ok(id)
    }

    fn handle_resolve(&mut self, id: ObjectId) -> Result<ObjectRef, RegistryError> {
        match self.objects.get_mut(&id) {
            Some(entry) => {
                entry.touch();
                Ok(entry.object.clone())
            }
            None => Err(RegistryError::ReferenceNotFound(id)),
        }
    }

    /// Inserts every unseen entry, or none of them if they do not fit.
    fn handle_merge(&mut self, entries: Vec<(ObjectId, ObjectRef)>) -> Result<usize, RegistryError> {
        let mut fresh: Vec<(ObjectId, ObjectRef)> = Vec::new();
        for (id, object) in entries {
            match self.objects.get_mut(&id) {
                Some(entry) => entry.touch(),
                None if fresh.iter().any(|(seen, _)| *seen == id) => {}
                None => fresh.push((id, object)),
            }
        }

        if self.objects.len() + fresh.len() > self.limits.max_objects {
            warn!(
                max = self.limits.max_objects,
                current = self.objects.len(),
                incoming = fresh.len(),
                "Registry full, rejecting merge"
            );
            return Err(RegistryError::RegistryFull {
                max: self.limits.max_objects,
            });
        }

        let added = fresh.len();
        for (id, object) in fresh {
            self.insert(id, object);
        }
        Ok(added)
    }

    fn handle_release(&mut self, id: ObjectId) -> Result<(), RegistryError> {
        match self.objects.get(&id) {
            None => return Err(RegistryError::ReferenceNotFound(id)),
            Some(entry) if entry.pinned => return Err(RegistryError::Pinned(id)),
            Some(_) => {}
        }

        self.remove(id, RemovalReason::Released);
        Ok(())
    }

    fn handle_list(&self) -> Vec<EntryInfo> {
        let mut entries: Vec<EntryInfo> = self
            .objects
            .iter()
            .map(|(id, entry)| EntryInfo {
                that: *id,
                class: entry.object.class_name(),
                registered_at: entry.registered_at,
                pinned: entry.pinned,
            })
            .collect();
        entries.sort_by(|a, b| (a.registered_at, a.that).cmp(&(b.registered_at, b.that)));
        entries
    }

    fn handle_evict_idle(&mut self) {
        let Some(ttl) = self.limits.idle_ttl else {
            return;
        };

        let now = Instant::now();
        let expired: Vec<ObjectId> = self
            .objects
            .iter()
            .filter(|(_, entry)| !entry.pinned && now.duration_since(entry.last_access) >= ttl)
            .map(|(id, _)| *id)
            .collect();

        if expired.is_empty() {
            return;
        }

        for id in &expired {
            self.remove(*id, RemovalReason::Idle);
        }

        info!(
            evicted = expired.len(),
            remaining = self.objects.len(),
            "Evicted idle objects"
        );
    }

    fn insert(&mut self, id: ObjectId, object: ObjectRef) {
        let class = object.class_name();
        self.objects.insert(id, Entry::new(object, false));
        debug!(that = %id, class, "Object registered");

        // No subscribers is fine
        let _ = self
            .event_publisher
            .send(RegistryEvent::Registered { id, class });
    }

    fn remove(&mut self, id: ObjectId, reason: RemovalReason) {
        if self.objects.remove(&id).is_some() {
            debug!(that = %id, %reason, "Object removed");
            let _ = self
                .event_publisher
                .send(RegistryEvent::Removed { id, reason });
        }
    }
}
