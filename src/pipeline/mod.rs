//! The processing pipeline between the invoker and the transport.
//!
//! A [`Pipeline`] runs its outbound interceptors in registration order, then
//! any steps appended for the current call, hands the request to the
//! [`Transport`], and finally runs the inbound half of the same interceptors
//! in reverse order.

pub mod exchange;
pub mod message;

use crate::codec::{self, CodecRegistry};
use crate::constants;
use crate::error::{Error, TransportError};
use crate::logging;
use crate::pipeline::message::{RawResponse, RequestBody, RequestDescription};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

pub use exchange::{Exchange, InvocationContext};

/// Delivers an assembled request and buffers the response.
#[async_trait]
pub trait Transport: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`TransportError`] when no response could be obtained.
    async fn submit(&self, request: &RequestDescription) -> Result<RawResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn submit(&self, request: &RequestDescription) -> Result<RawResponse, TransportError> {
        (**self).submit(request).await
    }
}

/// A step that observes or rewrites calls passing through the pipeline.
#[async_trait]
pub trait Interceptor: Send + Sync {
    fn name(&self) -> &str;

    /// Outbound phase, before the transport is called.
    ///
    /// # Errors
    ///
    /// Any error aborts the call before it reaches the transport.
    async fn handle_request(&self, _ctx: &mut InvocationContext) -> Result<(), Error> {
        Ok(())
    }

    /// Inbound phase, after a response has been received.
    ///
    /// # Errors
    ///
    /// Any error replaces the response as the outcome of the call.
    async fn handle_response(
        &self,
        _ctx: &InvocationContext,
        _response: &mut RawResponse,
    ) -> Result<(), Error> {
        Ok(())
    }
}

/// Notified once for every failure raised by an invocation.
pub trait FaultObserver: Send + Sync {
    fn on_fault(&self, ctx: &InvocationContext, error: &Error);
}

/// Encodes the selected request body, appended as the last outbound step of
/// every call that carries one.
pub struct BodyWriter {
    codecs: CodecRegistry,
}

impl BodyWriter {
    #[must_use]
    pub const fn new(codecs: CodecRegistry) -> Self {
        Self { codecs }
    }
}

#[async_trait]
impl Interceptor for BodyWriter {
    fn name(&self) -> &str {
        "body-writer"
    }

    async fn handle_request(&self, ctx: &mut InvocationContext) -> Result<(), Error> {
        let Some(body) = &ctx.body else {
            return Ok(());
        };
        if matches!(body, RequestBody::Multipart(_))
            && !ctx
                .content_type()
                .is_some_and(|ct| ct.to_lowercase().contains("boundary="))
        {
            ctx.headers
                .put_single(constants::HEADER_CONTENT_TYPE, codec::multipart_content_type());
        }
        let encoded = self.codecs.write(body, ctx.content_type())?;
        debug!(
            target: constants::LOG_TARGET,
            "Encoded {} byte request body for '{}'",
            encoded.len(),
            ctx.operation.name
        );
        ctx.encoded_body = Some(encoded);
        Ok(())
    }
}

/// Outbound interceptors, a transport and the fault observers of a client.
#[derive(Clone)]
pub struct Pipeline {
    interceptors: Vec<Arc<dyn Interceptor>>,
    transport: Arc<dyn Transport>,
    fault_observers: Vec<Arc<dyn FaultObserver>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.interceptors.iter().map(|i| i.name()).collect();
        f.debug_struct("Pipeline")
            .field("interceptors", &names)
            .field("fault_observers", &self.fault_observers.len())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            interceptors: Vec::new(),
            transport,
            fault_observers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    #[must_use]
    pub fn with_fault_observer(mut self, observer: Arc<dyn FaultObserver>) -> Self {
        self.fault_observers.push(observer);
        self
    }

    /// Runs the outbound chain with `per_call` steps appended after the
    /// registered interceptors, then submits the request.
    ///
    /// # Errors
    ///
    /// Returns the first interceptor failure, or the transport failure.
    pub async fn send(
        &self,
        ctx: &mut InvocationContext,
        per_call: &[Arc<dyn Interceptor>],
    ) -> Result<RawResponse, Error> {
        for step in self.interceptors.iter().chain(per_call) {
            step.handle_request(ctx).await?;
        }

        let request = ctx.to_request();
        logging::log_request(&request);
        let started = Instant::now();
        let response = self.transport.submit(&request).await?;
        logging::log_response(&response, started.elapsed().as_millis());
        ctx.exchange.set_response_code(response.status);
        Ok(response)
    }

    /// Runs the inbound chain in reverse registration order.
    ///
    /// # Errors
    ///
    /// Returns the first interceptor failure.
    pub async fn receive(
        &self,
        ctx: &InvocationContext,
        response: &mut RawResponse,
    ) -> Result<(), Error> {
        for step in self.interceptors.iter().rev() {
            step.handle_response(ctx, response).await?;
        }
        Ok(())
    }

    /// Publishes `error` to every fault observer.
    pub fn publish_fault(&self, ctx: &InvocationContext, error: &Error) {
        for observer in &self.fault_observers {
            observer.on_fault(ctx, error);
        }
    }
}
