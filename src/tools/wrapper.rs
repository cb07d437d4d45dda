//! Agent-facing capability wrappers.
//!
//! A [`CapabilityWrapper`] is what the agent runtime sees: a name, a
//! description, a parameter schema and a `call`. Arguments are validated
//! against the translated schema before anything reaches the provider.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::translate::translate_schema;
use super::types::ArgumentSchema;
use super::validation::{validate_arguments, JsonObject};
use crate::config::QUALIFIED_NAME_SEPARATOR;
use crate::error::CapabilityError;
use crate::mcp::schema::CapabilityDescriptor;

/// Something that can run a capability once its arguments are validated.
#[async_trait]
pub trait CapabilityInvoker: Send + Sync {
    /// `capability` is the provider-local name.
    async fn invoke(
        &self,
        capability: &str,
        arguments: JsonObject,
        cancel: &CancellationToken,
    ) -> Result<String, CapabilityError>;
}

type CapabilityHandler = dyn Fn(JsonObject) -> Pin<Box<dyn Future<Output = Result<String, CapabilityError>> + Send>>
    + Send
    + Sync;

/// Closure-backed invoker for capabilities implemented in-process.
struct FnInvoker {
    handler: Arc<CapabilityHandler>,
}

#[async_trait]
impl CapabilityInvoker for FnInvoker {
    async fn invoke(
        &self,
        capability: &str,
        arguments: JsonObject,
        cancel: &CancellationToken,
    ) -> Result<String, CapabilityError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(CapabilityError::Cancelled {
                capability: capability.to_owned(),
            }),
            result = (self.handler)(arguments) => result,
        }
    }
}

/// A callable capability exposed to agents.
#[derive(Clone)]
pub struct CapabilityWrapper {
    name: String,
    capability: String,
    provider: Option<String>,
    description: String,
    input_schema: Arc<serde_json::Value>,
    schema: Arc<ArgumentSchema>,
    invoker: Arc<dyn CapabilityInvoker>,
    always_available: bool,
}

impl CapabilityWrapper {
    /// Wrap a capability discovered on `provider`, exposed as `<provider>.<capability>`.
    pub fn for_provider(
        provider: &str,
        descriptor: &CapabilityDescriptor,
        schema: Arc<ArgumentSchema>,
        invoker: Arc<dyn CapabilityInvoker>,
    ) -> Self {
        Self {
            name: format!("{provider}{QUALIFIED_NAME_SEPARATOR}{}", descriptor.name),
            capability: descriptor.name.clone(),
            provider: Some(provider.to_owned()),
            description: descriptor.description.clone().unwrap_or_default(),
            input_schema: Arc::new(descriptor.input_schema.clone()),
            schema,
            invoker,
            always_available: false,
        }
    }

    /// An in-process capability backed by a closure.
    pub fn from_fn<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
        handler: F,
    ) -> Self
    where
        F: Fn(JsonObject) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, CapabilityError>> + Send + 'static,
    {
        let name = name.into();
        let schema = translate_schema(&input_schema);
        Self {
            capability: name.clone(),
            name,
            provider: None,
            description: description.into(),
            input_schema: Arc::new(input_schema),
            schema: Arc::new(schema),
            invoker: Arc::new(FnInvoker {
                handler: Arc::new(move |args| Box::pin(handler(args))),
            }),
            always_available: false,
        }
    }

    /// Offer this capability to every agent regardless of its allow-list.
    pub fn always_available(mut self) -> Self {
        self.always_available = true;
        self
    }

    /// Exposed (qualified) name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Provider-local name.
    pub fn capability(&self) -> &str {
        &self.capability
    }

    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// The provider's JSON Schema, as advertised.
    pub fn parameters(&self) -> &serde_json::Value {
        &self.input_schema
    }

    pub fn argument_schema(&self) -> &ArgumentSchema {
        &self.schema
    }

    pub fn is_always_available(&self) -> bool {
        self.always_available
    }

    /// Validate and invoke.
    pub async fn call(&self, arguments: serde_json::Value) -> Result<String, CapabilityError> {
        self.call_with_cancel(arguments, &CancellationToken::new()).await
    }

    /// Validate and invoke; `cancel` aborts an in-flight invocation.
    pub async fn call_with_cancel(
        &self,
        arguments: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<String, CapabilityError> {
        let arguments = validate_arguments(&self.schema, arguments).map_err(|issues| {
            tracing::debug!(capability = %self.name, issues = issues.len(), "rejected capability arguments");
            CapabilityError::Validation {
                capability: self.name.clone(),
                issues,
            }
        })?;

        self.invoker
            .invoke(&self.capability, arguments, cancel)
            .await
    }
}

impl std::fmt::Debug for CapabilityWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityWrapper")
            .field("name", &self.name)
            .field("provider", &self.provider)
            .field("description", &self.description)
            .field("always_available", &self.always_available)
            .finish()
    }
}
