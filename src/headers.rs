//! Declared client headers and header factories.
//!
//! Client headers come from three places, applied in order: values bound to
//! arguments, headers declared on the operation or resource (fixed or
//! computed), and an optional factory that sees the incoming headers of the
//! surrounding call and may rewrite the outgoing set.

use crate::constants;
use crate::error::{BoxError, Error};
use crate::model::resource::{ClientHeaderParam, HeaderValueSource};
use crate::multimap::MultiMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Produces extra headers for outgoing calls.
pub trait ClientHeadersFactory: Send + Sync {
    /// Returns headers to merge over `outgoing`.
    ///
    /// # Errors
    ///
    /// A failing factory is logged and its headers are left out.
    fn update(&self, incoming: &MultiMap, outgoing: &MultiMap) -> Result<MultiMap, BoxError>;
}

/// Creates factory instances on first use.
pub trait HeaderFactoryProvider: Send + Sync {
    /// # Errors
    ///
    /// Returns the reason the factory could not be created.
    fn create(&self) -> Result<Arc<dyn ClientHeadersFactory>, BoxError>;
}

impl<F> HeaderFactoryProvider for F
where
    F: Fn() -> Result<Arc<dyn ClientHeadersFactory>, BoxError> + Send + Sync,
{
    fn create(&self) -> Result<Arc<dyn ClientHeadersFactory>, BoxError> {
        self()
    }
}

/// Named header factory providers with lazily created, cached instances.
#[derive(Default)]
pub struct HeaderFactoryRegistry {
    providers: HashMap<String, Arc<dyn HeaderFactoryProvider>>,
    instances: RwLock<HashMap<String, Arc<dyn ClientHeadersFactory>>>,
}

impl std::fmt::Debug for HeaderFactoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeaderFactoryRegistry")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("instances", &self.instances.read().len())
            .finish()
    }
}

impl HeaderFactoryRegistry {
    #[must_use]
    pub fn with_provider(mut self, name: &str, provider: Arc<dyn HeaderFactoryProvider>) -> Self {
        self.providers.insert(name.to_string(), provider);
        self
    }

    /// Registers an existing instance, bypassing the provider step.
    #[must_use]
    pub fn with_instance(self, name: &str, factory: Arc<dyn ClientHeadersFactory>) -> Self {
        self.instances.write().insert(name.to_string(), factory);
        self
    }

    /// Looks up the instance for `name`, creating it through its provider on
    /// first use.
    ///
    /// # Errors
    ///
    /// Returns an error when no provider is registered or creation fails.
    pub fn instance(&self, name: &str) -> Result<Arc<dyn ClientHeadersFactory>, BoxError> {
        if let Some(existing) = self.instances.read().get(name) {
            return Ok(existing.clone());
        }
        let provider = self
            .providers
            .get(name)
            .ok_or_else(|| format!("no header factory registered as '{name}'"))?;
        let created = provider.create()?;
        // Two racing creators are harmless: the first stored instance wins.
        let mut instances = self.instances.write();
        Ok(instances.entry(name.to_string()).or_insert(created).clone())
    }

    /// Drops cached instances created through providers.
    pub fn release(&self) {
        let mut instances = self.instances.write();
        instances.retain(|name, _| !self.providers.contains_key(name));
    }
}

/// Function computing a header value from the header name.
pub type HeaderComputeFn =
    Arc<dyn Fn(&str) -> anyhow::Result<Option<Vec<String>>> + Send + Sync>;

/// Compute functions referenced by [`HeaderValueSource::Compute`].
#[derive(Clone, Default)]
pub struct HeaderComputeRegistry {
    functions: HashMap<String, HeaderComputeFn>,
}

impl std::fmt::Debug for HeaderComputeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.functions.keys()).finish()
    }
}

impl HeaderComputeRegistry {
    #[must_use]
    pub fn with_function(mut self, name: &str, function: HeaderComputeFn) -> Self {
        self.functions.insert(name.to_string(), function);
        self
    }

    fn compute(&self, function: &str, header: &str) -> anyhow::Result<Option<Vec<String>>> {
        let f = self
            .functions
            .get(function)
            .ok_or_else(|| anyhow::anyhow!("no compute function registered as '{function}'"))?;
        f(header)
    }
}

/// Adds every declared header whose name is not already present.
///
/// # Errors
///
/// Returns [`Error::HeaderCompute`] when a required computed header fails.
pub fn apply_declared_headers(
    declared: &[ClientHeaderParam],
    headers: &mut MultiMap,
    computes: &HeaderComputeRegistry,
) -> Result<(), Error> {
    for param in declared {
        if headers.contains_key_ignore_case(&param.name) {
            continue;
        }
        let values = match &param.value {
            HeaderValueSource::Static(values) => Some(values.clone()),
            HeaderValueSource::Compute(function) => match computes.compute(function, &param.name) {
                Ok(values) => values,
                Err(e) if param.required => {
                    return Err(Error::HeaderCompute {
                        header: param.name.clone(),
                        source: e.into(),
                    })
                }
                Err(e) => {
                    debug!(
                        target: constants::LOG_TARGET,
                        "Skipping optional header '{}': {e}",
                        param.name
                    );
                    None
                }
            },
        };
        if let Some(values) = values.filter(|v| !v.is_empty()) {
            headers.put_single(param.name.as_str(), values.join(","));
        }
    }
    Ok(())
}

/// Merges the factory's headers over `outgoing`. Factory failures are
/// logged and leave `outgoing` unchanged.
pub fn apply_factory(
    registry: &HeaderFactoryRegistry,
    factory_name: &str,
    incoming: &MultiMap,
    outgoing: &mut MultiMap,
) {
    let updated = registry
        .instance(factory_name)
        .and_then(|factory| factory.update(incoming, outgoing));
    match updated {
        Ok(updated) => outgoing.put_all(&updated),
        Err(e) => warn!(
            target: constants::LOG_TARGET,
            "Header factory '{factory_name}' failed, its headers are skipped: {e}"
        ),
    }
}
