//! Client handles and operation dispatch.
//!
//! A [`ClientProxy`] implements one [`ResourceDescriptor`]: every call names
//! an operation, the handle looks the descriptor up in the resource's
//! operation table, binds the arguments, assembles the request and runs it
//! through the [`Pipeline`] of its [`ClientRuntime`]. Sub-resource locators
//! produce new handles instead of network calls.

use crate::assembler;
use crate::async_bridge::{spawn_delivery, CompletionSlot, InvocationCallback, ResponseFuture};
use crate::binder::{value_to_text, Binder, BoundParameters, ConverterRegistry, ParamConverter};
use crate::codec::{self, CodecRegistry};
use crate::config::ClientConfig;
use crate::constants;
use crate::error::Error;
use crate::headers::{
    apply_declared_headers, apply_factory, ClientHeadersFactory, HeaderComputeFn,
    HeaderComputeRegistry, HeaderFactoryProvider, HeaderFactoryRegistry,
};
use crate::model::operation::{OperationDescriptor, ParamKind};
use crate::model::resource::ResourceDescriptor;
use crate::multimap::MultiMap;
use crate::pipeline::exchange::{Exchange, InvocationContext};
use crate::pipeline::message::{RawResponse, RequestBody};
use crate::pipeline::{BodyWriter, FaultObserver, Interceptor, Pipeline, Transport};
use crate::resilience::RetryingTransport;
use crate::resolver::{ExceptionMapperRegistry, ResponseExceptionMapper, ResponseResolver};
use crate::state::ClientState;
use crate::transport::HttpTransport;
use crate::uri::template::variables_of;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a call hands back to the caller.
#[derive(Debug)]
pub enum InvocationResult {
    /// Void operations, oneway calls and empty bodies of void declarations.
    Empty,
    /// A decoded body.
    Entity(Value),
    /// The raw response, for operations declared to return it.
    Response(RawResponse),
    /// An asynchronous call in flight.
    Pending(ResponseFuture),
    /// An asynchronous call whose outcome goes to the supplied callback.
    Submitted,
    /// A sub-resource handle.
    SubResource(ClientProxy),
}

impl InvocationResult {
    const fn kind(&self) -> &'static str {
        match self {
            Self::Empty => "empty result",
            Self::Entity(_) => "entity",
            Self::Response(_) => "raw response",
            Self::Pending(_) => "pending future",
            Self::Submitted => "callback submission",
            Self::SubResource(_) => "sub-resource handle",
        }
    }

    #[must_use]
    pub const fn entity(&self) -> Option<&Value> {
        match self {
            Self::Entity(value) => Some(value),
            _ => None,
        }
    }

    /// Deserializes the decoded body into `T`. An empty result reads as null
    /// and a raw response is parsed as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] when the value does not fit `T`, or
    /// [`Error::Codec`] when the result carries no entity.
    pub fn into_entity<T: DeserializeOwned>(self) -> Result<T, Error> {
        match self {
            Self::Entity(value) => Ok(serde_json::from_value(value)?),
            Self::Empty => Ok(serde_json::from_value(Value::Null)?),
            Self::Response(response) => Ok(serde_json::from_slice(&response.body)?),
            other => Err(Error::codec(
                constants::CONTENT_TYPE_JSON,
                format!("{} carries no entity", other.kind()),
            )),
        }
    }

    #[must_use]
    pub fn into_response(self) -> Option<RawResponse> {
        match self {
            Self::Response(response) => Some(response),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_sub_resource(self) -> Option<ClientProxy> {
        match self {
            Self::SubResource(client) => Some(client),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_future(self) -> Option<ResponseFuture> {
        match self {
            Self::Pending(future) => Some(future),
            _ => None,
        }
    }
}

/// Per-call inputs beyond the arguments.
#[derive(Default)]
pub struct CallContext {
    /// Headers of the request being served, handed to the header factory.
    pub incoming_headers: MultiMap,
    pub callback: Option<Box<dyn InvocationCallback>>,
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("incoming_headers", &self.incoming_headers)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

impl CallContext {
    #[must_use]
    pub fn with_incoming_headers(mut self, headers: MultiMap) -> Self {
        self.incoming_headers = headers;
        self
    }

    #[must_use]
    pub fn with_callback(mut self, callback: Box<dyn InvocationCallback>) -> Self {
        self.callback = Some(callback);
        self
    }
}

/// A typed view over a client handle.
pub trait Capability: Sized {
    fn from_client(client: ClientProxy) -> Self;
}

impl Capability for ClientProxy {
    fn from_client(client: ClientProxy) -> Self {
        client
    }
}

/// Collaborators shared by every handle of one client tree.
#[derive(Debug)]
pub struct ClientRuntime {
    pipeline: Pipeline,
    codecs: CodecRegistry,
    mappers: ExceptionMapperRegistry,
    converters: ConverterRegistry,
    header_computes: HeaderComputeRegistry,
    header_factories: HeaderFactoryRegistry,
    config: ClientConfig,
}

impl ClientRuntime {
    /// A runtime over `transport` with the default codecs and configuration.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            pipeline: Pipeline::new(transport),
            codecs: CodecRegistry::default(),
            mappers: ExceptionMapperRegistry::default(),
            converters: ConverterRegistry::default(),
            header_computes: HeaderComputeRegistry::default(),
            header_factories: HeaderFactoryRegistry::default(),
            config: ClientConfig::default(),
        }
    }

    /// A runtime over the HTTP transport configured by `config`, wrapped in
    /// a retrying transport when `config.retry` is set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] when the HTTP client cannot be built.
    pub fn http(config: ClientConfig) -> Result<Self, Error> {
        let http = HttpTransport::new(&config.timeouts())?;
        let transport: Arc<dyn Transport> = match config.retry.clone() {
            Some(retry) => Arc::new(RetryingTransport::new(http, retry)),
            None => Arc::new(http),
        };
        Ok(Self::new(transport).with_config(config))
    }

    #[must_use]
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.pipeline = self.pipeline.with_interceptor(interceptor);
        self
    }

    #[must_use]
    pub fn with_fault_observer(mut self, observer: Arc<dyn FaultObserver>) -> Self {
        self.pipeline = self.pipeline.with_fault_observer(observer);
        self
    }

    #[must_use]
    pub fn with_codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = codecs;
        self
    }

    #[must_use]
    pub fn with_mapper(mut self, failure_type: &str, mapper: Arc<dyn ResponseExceptionMapper>) -> Self {
        self.mappers = self.mappers.with_mapper(failure_type, mapper);
        self
    }

    #[must_use]
    pub fn with_converter(mut self, name: &str, converter: Arc<dyn ParamConverter>) -> Self {
        self.converters = self.converters.with_converter(name, converter);
        self
    }

    #[must_use]
    pub fn with_header_compute(mut self, name: &str, function: HeaderComputeFn) -> Self {
        self.header_computes = self.header_computes.with_function(name, function);
        self
    }

    #[must_use]
    pub fn with_header_factory(mut self, name: &str, provider: Arc<dyn HeaderFactoryProvider>) -> Self {
        self.header_factories = self.header_factories.with_provider(name, provider);
        self
    }

    #[must_use]
    pub fn with_header_factory_instance(
        mut self,
        name: &str,
        factory: Arc<dyn ClientHeadersFactory>,
    ) -> Self {
        self.header_factories = self.header_factories.with_instance(name, factory);
        self
    }

    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }
}

/// A client handle implementing one resource.
///
/// Clones share state; handles returned by sub-resource locators do not.
#[derive(Clone)]
pub struct ClientProxy {
    state: Arc<Mutex<ClientState>>,
    resource: Arc<ResourceDescriptor>,
    is_root: bool,
    runtime: Arc<ClientRuntime>,
    closed: Arc<AtomicBool>,
}

impl fmt::Debug for ClientProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientProxy")
            .field("resource", &self.resource.name)
            .field("base_uri", &self.state.lock().base_uri)
            .field("is_root", &self.is_root)
            .finish_non_exhaustive()
    }
}

impl ClientProxy {
    /// Creates a root handle. `root_values` fill the resource's class-level
    /// template variables positionally.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBaseUri`] for an unparseable base URI and
    /// [`Error::InvalidOperation`] when the resource fails validation.
    pub fn new(
        base_uri: &str,
        resource: impl Into<Arc<ResourceDescriptor>>,
        runtime: Arc<ClientRuntime>,
        root_values: &[Value],
    ) -> Result<Self, Error> {
        reqwest::Url::parse(base_uri).map_err(|e| Error::InvalidBaseUri {
            uri: base_uri.to_string(),
            reason: e.to_string(),
        })?;
        let resource = resource.into();
        resource.validate()?;

        let mut headers = MultiMap::new();
        for (name, value) in &runtime.config.default_headers {
            headers.add(name.as_str(), value.as_str());
        }
        let mut state = ClientState::new(base_uri, headers);
        state.root_values = init_root_values(&resource.template_variables(), root_values);

        Ok(Self {
            state: Arc::new(Mutex::new(state)),
            resource,
            is_root: true,
            runtime,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    fn derived(&self, resource: Arc<ResourceDescriptor>, state: ClientState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            resource,
            is_root: false,
            runtime: Arc::clone(&self.runtime),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Converts this handle into a typed capability.
    #[must_use]
    pub fn into_capability<T: Capability>(self) -> T {
        T::from_client(self)
    }

    /// Invokes `operation` synchronously with no per-call context.
    ///
    /// # Errors
    ///
    /// See [`ClientProxy::invoke_with`].
    pub async fn invoke(&self, operation: &str, args: Vec<Value>) -> Result<InvocationResult, Error> {
        self.invoke_with(operation, args, CallContext::default()).await
    }

    /// Invokes `operation`.
    ///
    /// Asynchronous operations return [`InvocationResult::Pending`] and a
    /// compatible callback yields [`InvocationResult::Submitted`]; either way
    /// the exchange runs on a spawned task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClientClosed`] after [`ClientProxy::close`],
    /// [`Error::InvalidOperation`] or [`Error::MissingPathValue`] before any
    /// I/O, and transport, remote or codec failures of synchronous calls.
    pub async fn invoke_with(
        &self,
        operation: &str,
        args: Vec<Value>,
        call: CallContext,
    ) -> Result<InvocationResult, Error> {
        if self.is_closed() {
            return Err(Error::ClientClosed);
        }
        let Some(descriptor) = self.resource.operation(operation).cloned() else {
            return match self.resource.default_operations.get(operation) {
                Some(default) => {
                    debug!(
                        target: constants::LOG_TARGET,
                        "Running default operation '{operation}' locally"
                    );
                    default.call(self, &args)
                }
                None => Err(Error::invalid_operation(
                    operation,
                    format!("'{}' declares no such operation", self.resource.name),
                )),
            };
        };
        descriptor.validate()?;
        let required = descriptor.required_arguments();
        if args.len() < required {
            return Err(Error::invalid_operation(
                operation,
                format!("expected at least {required} arguments, got {}", args.len()),
            ));
        }

        let (builder, mut headers, mut root_values) = {
            let mut state = self.state.lock();
            state.last_response = None;
            (
                state.current_builder.clone(),
                state.headers.clone(),
                state.root_values.clone(),
            )
        };
        let class_variables = if self.is_root {
            self.resource.template_variables()
        } else {
            Vec::new()
        };

        let binder = Binder::new(&descriptor, &args, &self.runtime.converters);
        let bound = binder.bind(self.is_root, &class_variables, &mut root_values)?;
        let templates = resolved_templates(&class_variables, &descriptor, &bound.path_values);
        {
            let mut state = self.state.lock();
            state.root_values = root_values;
        }

        if let Some(target) = &descriptor.sub_resource {
            return self
                .locate(&descriptor, target, builder, &bound, headers, templates)
                .map(InvocationResult::SubResource);
        }
        self.state.lock().templates = templates;

        let body = select_body(&binder, &descriptor, &bound)?;
        headers.put_all(&bound.headers);
        apply_declared_headers(
            &descriptor.client_headers,
            &mut headers,
            &self.runtime.header_computes,
        )?;
        apply_declared_headers(
            &self.resource.client_headers,
            &mut headers,
            &self.runtime.header_computes,
        )?;

        let mut request = assembler::assemble(
            &builder,
            &descriptor,
            self.is_root,
            &self.resource.uri_template,
            &bound,
            &mut headers,
            body.as_ref(),
        )?;
        if let Some(factory) = &self.resource.headers_factory {
            apply_factory(
                &self.runtime.header_factories,
                factory,
                &call.incoming_headers,
                &mut request.headers,
            );
        }
        request.timeout = Some(self.runtime.config.timeouts().receive_timeout());

        info!(
            target: constants::LOG_TARGET,
            "Invoking {}.{}",
            self.resource.name,
            descriptor.name
        );
        let ctx = InvocationContext::new(descriptor, args, request, body);
        self.submit(ctx, call.callback).await
    }

    /// Invokes a sub-resource locator and wraps the new handle as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] when `operation` is not a locator,
    /// plus every failure of [`ClientProxy::invoke`].
    pub async fn sub_resource<T: Capability>(&self, operation: &str, args: Vec<Value>) -> Result<T, Error> {
        match self.invoke(operation, args).await? {
            InvocationResult::SubResource(client) => Ok(client.into_capability()),
            other => Err(Error::invalid_operation(
                operation,
                format!("returned {} instead of a sub-resource", other.kind()),
            )),
        }
    }

    fn locate(
        &self,
        descriptor: &OperationDescriptor,
        target: &str,
        mut builder: crate::uri::UriBuilder,
        bound: &BoundParameters,
        parent_headers: MultiMap,
        templates: IndexMap<String, String>,
    ) -> Result<Self, Error> {
        let resource = self.resource.sub_resources.get(target).cloned().ok_or_else(|| {
            Error::invalid_operation(&descriptor.name, format!("unknown sub-resource '{target}'"))
        })?;
        assembler::extend_uri(
            &mut builder,
            descriptor,
            self.is_root,
            &self.resource.uri_template,
            bound,
        );
        let uri = assembler::build_uri(&builder, descriptor, &bound.path_values)?;

        let mut headers = bound.headers.clone();
        if self.runtime.config.inherit_headers {
            headers.put_all(&parent_headers);
        }
        debug!(
            target: constants::LOG_TARGET,
            "Sub-resource '{target}' located at {uri}"
        );
        Ok(self.derived(resource, ClientState::derive(&uri, headers, templates)))
    }

    async fn submit(
        &self,
        ctx: InvocationContext,
        callback: Option<Box<dyn InvocationCallback>>,
    ) -> Result<InvocationResult, Error> {
        let return_type = ctx.operation.return_type.clone();
        let callback = callback.filter(|callback| {
            let accepted = callback.target().accepts(&return_type);
            if !accepted {
                debug!(
                    target: constants::LOG_TARGET,
                    "Callback does not accept {return_type:?}, invoking synchronously"
                );
            }
            accepted
        });
        let dispatcher = self.dispatcher();

        if let Some(callback) = callback {
            ctx.exchange.set_synchronous(false);
            spawn_delivery(dispatcher.run(ctx), CompletionSlot::for_callback(callback));
            return Ok(InvocationResult::Submitted);
        }
        if return_type.is_async() {
            ctx.exchange.set_synchronous(false);
            let (slot, future) = CompletionSlot::for_future();
            spawn_delivery(dispatcher.run(ctx), slot);
            return Ok(InvocationResult::Pending(future));
        }
        dispatcher.run(ctx).await
    }

    /// Re-dispatches a previously assembled call to `new_uri`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClientClosed`] after [`ClientProxy::close`], or any
    /// failure of the exchange.
    pub async fn retry_invoke(
        &self,
        ctx: &InvocationContext,
        new_uri: &str,
    ) -> Result<InvocationResult, Error> {
        if self.is_closed() {
            return Err(Error::ClientClosed);
        }
        self.state.lock().last_response = None;
        self.dispatcher().run(ctx.redirected(new_uri)).await
    }

    fn dispatcher(&self) -> Dispatcher {
        Dispatcher {
            runtime: Arc::clone(&self.runtime),
            state: Arc::clone(&self.state),
        }
    }

    /// Adds a header sent with every following call of this handle.
    pub fn header(&self, name: &str, value: impl Into<String>) -> &Self {
        self.state.lock().headers.add(name, value);
        self
    }

    #[must_use]
    pub fn headers(&self) -> MultiMap {
        self.state.lock().headers.clone()
    }

    #[must_use]
    pub fn base_uri(&self) -> String {
        self.state.lock().base_uri.clone()
    }

    /// The handle's URI with templates substituted where the last call
    /// resolved them.
    #[must_use]
    pub fn current_uri(&self) -> String {
        let state = self.state.lock();
        let values: Vec<String> = state
            .current_builder
            .variables()
            .iter()
            .filter_map(|var| state.templates.get(var).cloned())
            .collect();
        state
            .current_builder
            .build_from_encoded(&values)
            .unwrap_or_else(|_| state.base_uri.clone())
    }

    #[must_use]
    pub fn templates(&self) -> IndexMap<String, String> {
        self.state.lock().templates.clone()
    }

    #[must_use]
    pub fn last_response(&self) -> Option<RawResponse> {
        self.state.lock().last_response.clone()
    }

    #[must_use]
    pub fn last_exchange(&self) -> Option<Arc<Exchange>> {
        self.state.lock().last_exchange.clone()
    }

    #[must_use]
    pub fn resource(&self) -> &ResourceDescriptor {
        &self.resource
    }

    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.is_root
    }

    /// Clears pending headers and the last response.
    pub fn reset(&self) {
        self.state.lock().reset();
    }

    /// Marks the handle closed. Header-factory instances are shared by every
    /// handle of the runtime, so only closing the root handle releases them.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(
                target: constants::LOG_TARGET,
                "Closing client for '{}'",
                self.resource.name
            );
            if self.is_root {
                self.runtime.header_factories.release();
            }
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// The owned half of a call that may outlive the handle borrow.
struct Dispatcher {
    runtime: Arc<ClientRuntime>,
    state: Arc<Mutex<ClientState>>,
}

impl Dispatcher {
    async fn run(self, mut ctx: InvocationContext) -> Result<InvocationResult, Error> {
        let result = match self.exchange(&mut ctx).await {
            Ok(response) => {
                self.state.lock().last_response = Some(response.clone());
                if ctx.exchange.is_one_way() {
                    Ok(InvocationResult::Empty)
                } else {
                    ResponseResolver::new(&self.runtime.codecs, &self.runtime.mappers)
                        .resolve(response, &ctx.operation)
                }
            }
            Err(error) => Err(error),
        };

        ctx.exchange.complete();
        self.state.lock().last_exchange = Some(Arc::clone(&ctx.exchange));
        if let Err(error) = &result {
            warn!(
                target: constants::LOG_TARGET,
                "'{}' failed: {error}",
                ctx.operation.name
            );
            self.runtime.pipeline.publish_fault(&ctx, error);
        }
        result
    }

    async fn exchange(&self, ctx: &mut InvocationContext) -> Result<RawResponse, Error> {
        let steps: Vec<Arc<dyn Interceptor>> =
            vec![Arc::new(BodyWriter::new(self.runtime.codecs.clone()))];
        let mut response = self.round_trip(ctx, &steps).await?;

        let mut followed = 0;
        while followed < self.runtime.config.max_redirects && (300..400).contains(&response.status) {
            let Some(location) = response.header(constants::HEADER_LOCATION) else {
                break;
            };
            let target = resolve_location(&ctx.uri, location);
            info!(
                target: constants::LOG_TARGET,
                "Following HTTP {} to {target}",
                response.status
            );
            let see_other = response.status == 303;
            *ctx = ctx.redirected(&target);
            if see_other {
                ctx.method = "GET".to_string();
                ctx.body = None;
                ctx.headers.remove(constants::HEADER_CONTENT_TYPE);
            }
            response = self.round_trip(ctx, &steps).await?;
            followed += 1;
        }
        Ok(response)
    }

    /// One send plus inbound pass. A response rejected by an inbound
    /// interceptor is still recorded as the last response.
    async fn round_trip(
        &self,
        ctx: &mut InvocationContext,
        steps: &[Arc<dyn Interceptor>],
    ) -> Result<RawResponse, Error> {
        let mut response = self.runtime.pipeline.send(ctx, steps).await?;
        if let Err(error) = self.runtime.pipeline.receive(ctx, &mut response).await {
            self.state.lock().last_response = Some(response);
            return Err(error);
        }
        Ok(response)
    }
}

fn resolve_location(current: &str, location: &str) -> String {
    reqwest::Url::parse(current)
        .and_then(|base| base.join(location))
        .map_or_else(|_| location.to_string(), String::from)
}

fn init_root_values(variables: &[String], values: &[Value]) -> IndexMap<String, String> {
    let mut map = IndexMap::new();
    for (position, var) in variables.iter().enumerate() {
        if values.is_empty() {
            map.insert(var.clone(), String::new());
            continue;
        }
        let Some(value) = values.get(position) else {
            info!(
                target: constants::LOG_TARGET,
                "Only {} of {} class template variables have values",
                values.len(),
                variables.len()
            );
            break;
        };
        map.insert(var.clone(), value_to_text(value));
    }
    map
}

fn resolved_templates(
    class_variables: &[String],
    descriptor: &OperationDescriptor,
    path_values: &[String],
) -> IndexMap<String, String> {
    class_variables
        .iter()
        .cloned()
        .chain(variables_of(&descriptor.uri_template))
        .zip(path_values.iter().cloned())
        .collect()
}

/// Picks the body source: explicit body, declared form fields, multipart
/// parts, then form values found in parameter bags.
fn select_body(
    binder: &Binder<'_>,
    descriptor: &OperationDescriptor,
    bound: &BoundParameters,
) -> Result<Option<RequestBody>, Error> {
    if let Some((binding, value)) = binder.explicit_body() {
        if binding.form_map {
            let form = codec::form_from_value(value).ok_or_else(|| {
                Error::invalid_operation(&descriptor.name, "form map body must be an object")
            })?;
            return Ok(Some(RequestBody::Form(form)));
        }
        return Ok(Some(RequestBody::Entity(value.clone())));
    }
    if descriptor.has_parameters_of(ParamKind::Form) {
        return Ok(Some(RequestBody::Form(bound.form.clone())));
    }
    let parts = binder.multipart_parts();
    if !parts.is_empty() {
        return Ok(Some(RequestBody::Multipart(parts)));
    }
    if binder.has_bean_form_values()? {
        return Ok(Some(RequestBody::Form(bound.form.clone())));
    }
    Ok(None)
}
