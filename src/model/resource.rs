use crate::error::Error;
use crate::invoker::{ClientProxy, InvocationResult};
use crate::model::operation::OperationDescriptor;
use crate::uri::template::UriTemplate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Where a declared client header gets its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderValueSource {
    /// Fixed values, joined with `,` on the wire.
    Static(Vec<String>),
    /// Name of a compute function registered with the client runtime.
    Compute(String),
}

/// A header declared on a resource or operation rather than bound to an argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientHeaderParam {
    pub name: String,
    pub value: HeaderValueSource,
    /// A failing compute function aborts the call instead of skipping the header.
    #[serde(default = "default_required")]
    pub required: bool,
}

const fn default_required() -> bool {
    true
}

impl ClientHeaderParam {
    #[must_use]
    pub fn fixed(name: &str, values: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            value: HeaderValueSource::Static(values.iter().map(ToString::to_string).collect()),
            required: true,
        }
    }

    #[must_use]
    pub fn computed(name: &str, function: &str, required: bool) -> Self {
        Self {
            name: name.to_string(),
            value: HeaderValueSource::Compute(function.to_string()),
            required,
        }
    }
}

type DefaultOperationFn =
    dyn Fn(&ClientProxy, &[Value]) -> Result<InvocationResult, Error> + Send + Sync;

/// Local behavior run for an operation name that has no descriptor.
#[derive(Clone)]
pub struct DefaultOperation(Arc<DefaultOperationFn>);

impl DefaultOperation {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&ClientProxy, &[Value]) -> Result<InvocationResult, Error> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Runs the operation against `client`.
    ///
    /// # Errors
    ///
    /// Returns whatever the operation itself fails with.
    pub fn call(&self, client: &ClientProxy, args: &[Value]) -> Result<InvocationResult, Error> {
        (self.0)(client, args)
    }
}

impl fmt::Debug for DefaultOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DefaultOperation(..)")
    }
}

/// The operation set a client handle implements.
///
/// The operation table is the handle's dispatch table: an operation name maps
/// to its pre-resolved descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub name: String,
    /// Class-level template, appended ahead of operation templates on root handles.
    #[serde(default)]
    pub uri_template: String,
    #[serde(default)]
    pub operations: IndexMap<String, Arc<OperationDescriptor>>,
    #[serde(default)]
    pub client_headers: Vec<ClientHeaderParam>,
    /// Name of the header factory merged into every call.
    #[serde(default)]
    pub headers_factory: Option<String>,
    #[serde(default)]
    pub sub_resources: IndexMap<String, Arc<ResourceDescriptor>>,
    #[serde(skip)]
    pub default_operations: IndexMap<String, DefaultOperation>,
}

impl ResourceDescriptor {
    #[must_use]
    pub fn new(name: &str, uri_template: &str) -> Self {
        Self {
            name: name.to_string(),
            uri_template: uri_template.to_string(),
            operations: IndexMap::new(),
            client_headers: Vec::new(),
            headers_factory: None,
            sub_resources: IndexMap::new(),
            default_operations: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn with_operation(mut self, operation: OperationDescriptor) -> Self {
        self.operations
            .insert(operation.name.clone(), Arc::new(operation));
        self
    }

    #[must_use]
    pub fn with_sub_resource(mut self, resource: Self) -> Self {
        self.sub_resources
            .insert(resource.name.clone(), Arc::new(resource));
        self
    }

    #[must_use]
    pub fn with_client_header(mut self, header: ClientHeaderParam) -> Self {
        self.client_headers.push(header);
        self
    }

    #[must_use]
    pub fn with_headers_factory(mut self, factory: &str) -> Self {
        self.headers_factory = Some(factory.to_string());
        self
    }

    #[must_use]
    pub fn with_default_operation(mut self, name: &str, operation: DefaultOperation) -> Self {
        self.default_operations.insert(name.to_string(), operation);
        self
    }

    #[must_use]
    pub fn operation(&self, name: &str) -> Option<&Arc<OperationDescriptor>> {
        self.operations.get(name)
    }

    /// Class-level template variables, in declaration order.
    #[must_use]
    pub fn template_variables(&self) -> Vec<String> {
        UriTemplate::parse(&self.uri_template)
            .map(|t| t.variables().to_vec())
            .unwrap_or_default()
    }

    /// Validates every operation and every reachable sub-resource.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] for the first operation that
    /// breaks a declaration rule or names an unknown sub-resource.
    pub fn validate(&self) -> Result<(), Error> {
        UriTemplate::parse(&self.uri_template)
            .map_err(|reason| Error::invalid_operation(&self.name, reason))?;
        for operation in self.operations.values() {
            operation.validate()?;
            if let Some(target) = &operation.sub_resource {
                if !self.sub_resources.contains_key(target) {
                    return Err(Error::invalid_operation(
                        &operation.name,
                        format!("unknown sub-resource '{target}'"),
                    ));
                }
            }
        }
        for sub in self.sub_resources.values() {
            sub.validate()?;
        }
        Ok(())
    }
}
