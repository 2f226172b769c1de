//! Declarative-to-wire request/response translation for REST client proxies.
//!
//! A [`ResourceDescriptor`] declares operations; a [`ClientProxy`] binds the
//! runtime arguments of a call to path, query, matrix, header, cookie, form
//! and body locations, runs the assembled request through a [`Pipeline`] and
//! turns the response back into the declared return shape.

pub mod assembler;
pub mod async_bridge;
pub mod binder;
pub mod codec;
pub mod config;
pub mod constants;
pub mod error;
pub mod headers;
pub mod invoker;
pub mod logging;
pub mod model;
pub mod multimap;
pub mod pipeline;
pub mod resilience;
pub mod resolver;
pub mod state;
pub mod tracing_init;
pub mod transport;
pub mod uri;

pub use async_bridge::{CallbackTarget, InvocationCallback, ResponseFuture};
pub use config::ClientConfig;
pub use error::{Error, TransportError};
pub use invoker::{CallContext, Capability, ClientProxy, ClientRuntime, InvocationResult};
pub use model::{OperationDescriptor, ParameterBinding, ResourceDescriptor, ReturnType};
pub use multimap::MultiMap;
pub use pipeline::message::{RawResponse, RequestDescription};
pub use pipeline::{Interceptor, Pipeline, Transport};
