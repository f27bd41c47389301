//! Call dispatch.
//!
//! Turns a decoded call into an invocation on a registered object:
//! resolve the target, resolve reference arguments, check the capability
//! table, invoke.

use std::time::Duration;

use objlink_core::{marker_id, InvokeError, ObjectId, Value};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

use crate::registry::{RegistryError, RegistryHandle};

/// Why a call produced no value.
///
/// The `Display` text of each variant is what the client sees as the error
/// payload.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    /// Target or argument id is not registered
    #[error("Object with id {0} not found")]
    ReferenceNotFound(ObjectId),

    #[error("Function {name} not found in {class}")]
    MethodNotFound { name: String, class: &'static str },

    /// The name is an attribute, not a method
    #[error("Property {name} of {class} is not a function")]
    NotCallable { name: String, class: &'static str },

    /// The method body failed
    #[error("{0}")]
    TargetInvocation(#[from] InvokeError),

    #[error("call timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error(transparent)]
    Registry(RegistryError),
}

impl From<RegistryError> for DispatchError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::ReferenceNotFound(id) => Self::ReferenceNotFound(id),
            other => Self::Registry(other),
        }
    }
}

/// Resolves and invokes calls against one registry.
#[derive(Clone)]
pub struct Dispatcher {
    registry: RegistryHandle,
}

impl Dispatcher {
    pub fn new(registry: RegistryHandle) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    /// Invokes `name` on the object registered as `that`.
    ///
    /// Arguments that are reference markers are replaced by the objects they
    /// name; everything else is passed through as plain data.
    pub async fn dispatch(
        &self,
        that: ObjectId,
        name: &str,
        args: Vec<JsonValue>,
    ) -> Result<Value, DispatchError> {
        let target = self.registry.resolve(that).await?;
        let args = self.resolve_args(args).await?;

        if !target.has_method(name) {
            let class = target.class_name();
            let name = name.to_string();
            return Err(if target.has_attribute(&name) {
                DispatchError::NotCallable { name, class }
            } else {
                DispatchError::MethodNotFound { name, class }
            });
        }

        debug!(%that, class = target.class_name(), method = name, args = args.len(), "Invoking");
        Ok(target.invoke(name, args).await?)
    }

    async fn resolve_args(&self, args: Vec<JsonValue>) -> Result<Vec<Value>, DispatchError> {
        let mut resolved = Vec::with_capacity(args.len());
        for arg in args {
            match marker_id(&arg) {
                Some(id) => resolved.push(Value::Object(self.registry.resolve(id).await?)),
                None => resolved.push(Value::from_json(arg)),
            }
        }
        Ok(resolved)
    }
}
