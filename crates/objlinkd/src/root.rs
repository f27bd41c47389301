//! The server root object.
//!
//! Every session starts from this object: its reference is the control
//! message payload. It hands out the application root and exposes registry
//! maintenance to clients.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use objlink_core::{Args, InvokeError, InvokeResult, ObjectId, ObjectRef, RemoteObject, Value};

use crate::registry::{spawn_registry, RegistryHandle, RegistryLimits, WeakRegistryHandle};

/// Class name reported in the control message.
pub const SERVER_CLASS: &str = "Server";

const METHODS: &[&str] = &["get_root", "release", "object_count", "list_objects"];

/// Root object of a registry scope.
pub struct ServerRoot {
    app_root: Option<ObjectRef>,
    /// Weak so the registry holding this object can still shut down
    registry: OnceLock<WeakRegistryHandle>,
}

impl ServerRoot {
    /// Creates the root and a registry seeded with it and `app_root`.
    ///
    /// Both seeds are pinned.
    pub fn spawn(app_root: Option<ObjectRef>, limits: RegistryLimits) -> (Arc<Self>, RegistryHandle) {
        let root = Arc::new(Self {
            app_root: app_root.clone(),
            registry: OnceLock::new(),
        });

        let mut seeds: Vec<ObjectRef> = vec![root.clone()];
        seeds.extend(app_root);
        let handle = spawn_registry(seeds, limits);

        // Freshly created, so the cell is empty
        let _ = root.registry.set(handle.downgrade());
        (root, handle)
    }

    pub fn app_root(&self) -> Option<&ObjectRef> {
        self.app_root.as_ref()
    }

    fn registry(&self) -> InvokeResult<RegistryHandle> {
        self.registry
            .get()
            .and_then(WeakRegistryHandle::upgrade)
            .ok_or_else(|| InvokeError::failed("registry is not available"))
    }

    async fn release(&self, args: Args<'_>) -> InvokeResult<Value> {
        args.expect_len(1)?;
        let id = match args.value(0)? {
            Value::Object(object) => ObjectId::of(object),
            other => other
                .as_i64()
                .and_then(|raw| u64::try_from(raw).ok())
                .map(ObjectId::new)
                .ok_or(InvokeError::InvalidArgument {
                    method: "release".to_string(),
                    index: 0,
                    expected: "an object reference or id",
                })?,
        };

        self.registry()?
            .release(id)
            .await
            .map_err(InvokeError::failed)?;
        Ok(Value::Null)
    }

    async fn list_objects(&self) -> InvokeResult<Value> {
        let entries = self.registry()?.list().await;
        Ok(Value::List(
            entries
                .into_iter()
                .map(|entry| {
                    Value::map([
                        ("that", Value::from(entry.that.get())),
                        ("class", Value::from(entry.class)),
                        ("registered_at", Value::from(entry.registered_at.to_rfc3339())),
                        ("pinned", Value::from(entry.pinned)),
                    ])
                })
                .collect(),
        ))
    }
}

#[async_trait]
impl RemoteObject for ServerRoot {
    fn class_name(&self) -> &'static str {
        SERVER_CLASS
    }

    fn methods(&self) -> &'static [&'static str] {
        METHODS
    }

    fn attributes(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("version", Value::from(env!("CARGO_PKG_VERSION"))),
            ("root", Value::from(self.app_root.clone())),
        ]
    }

    async fn invoke(&self, method: &str, args: Vec<Value>) -> InvokeResult<Value> {
        let args = Args::new(method, args);
        match method {
            "get_root" => {
                args.expect_len(0)?;
                Ok(Value::from(self.app_root.clone()))
            }
            "release" => self.release(args).await,
            "object_count" => {
                args.expect_len(0)?;
                Ok(Value::from(self.registry()?.len().await))
            }
            "list_objects" => {
                args.expect_len(0)?;
                self.list_objects().await
            }
            _ => Err(InvokeError::unknown(SERVER_CLASS, method)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Leaf;

    #[async_trait]
    impl RemoteObject for Leaf {
        fn class_name(&self) -> &'static str {
            "Leaf"
        }

        fn methods(&self) -> &'static [&'static str] {
            &[]
        }

        async fn invoke(&self, method: &str, _args: Vec<Value>) -> InvokeResult<Value> {
            Err(InvokeError::unknown("Leaf", method))
        }
    }

    #[tokio::test]
    async fn test_spawn_seeds_root_and_app_root() {
        let app: ObjectRef = Arc::new(Leaf);
        let (root, registry) = ServerRoot::spawn(Some(app.clone()), RegistryLimits::default());
        let root_ref: ObjectRef = root.clone();

        assert_eq!(registry.len().await, 2);
        assert!(registry.resolve(ObjectId::of(&root_ref)).await.is_ok());
        assert!(registry.resolve(ObjectId::of(&app)).await.is_ok());
    }

    #[tokio::test]
    async fn test_get_root_returns_app_root() {
        let app: ObjectRef = Arc::new(Leaf);
        let (root, _registry) = ServerRoot::spawn(Some(app.clone()), RegistryLimits::default());

        let value = root.invoke("get_root", Vec::new()).await.unwrap();
        assert_eq!(value, Value::Object(app));

        let (bare, _registry) = ServerRoot::spawn(None, RegistryLimits::default());
        assert!(bare.invoke("get_root", Vec::new()).await.unwrap().is_null());
    }

    #[tokio::test]
    async fn test_release_by_reference_and_id() {
        let (root, registry) = ServerRoot::spawn(None, RegistryLimits::default());
        let a: ObjectRef = Arc::new(Leaf);
        let b: ObjectRef = Arc::new(Leaf);
        registry.register(a.clone()).await.unwrap();
        let b_id = registry.register(b.clone()).await.unwrap();

        root.invoke("release", vec![Value::Object(a.clone())])
            .await
            .unwrap();
        root.invoke("release", vec![Value::from(b_id.get())])
            .await
            .unwrap();

        assert_eq!(registry.len().await, 1);
        let count = root.invoke("object_count", Vec::new()).await.unwrap();
        assert_eq!(count, Value::from(1));
    }

    #[tokio::test]
    async fn test_release_pinned_fails() {
        let (root, _registry) = ServerRoot::spawn(None, RegistryLimits::default());
        let own: ObjectRef = root.clone();

        let err = root
            .invoke("release", vec![Value::Object(own)])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("pinned"));
    }

    #[tokio::test]
    async fn test_list_objects_shape() {
        let (root, _registry) = ServerRoot::spawn(None, RegistryLimits::default());

        let list = root.invoke("list_objects", Vec::new()).await.unwrap();
        let entries = list.as_list().unwrap();
        assert_eq!(entries.len(), 1);

        let Value::Map(entry) = &entries[0] else {
            panic!("expected map entry");
        };
        assert_eq!(entry["class"], Value::from("Server"));
        assert_eq!(entry["pinned"], Value::from(true));
    }

    #[tokio::test]
    async fn test_registry_gone_after_handles_dropped() {
        let (root, registry) = ServerRoot::spawn(None, RegistryLimits::default());
        drop(registry);

        let err = root.invoke("object_count", Vec::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "registry is not available");
    }
}
