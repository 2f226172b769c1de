//! Per-call records threaded through the pipeline.

use crate::constants;
use crate::model::operation::OperationDescriptor;
use crate::multimap::MultiMap;
use crate::pipeline::message::{RequestBody, RequestDescription};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Tracks one request/response round trip.
///
/// Shared between the invocation and any asynchronous completion, so its
/// flags are atomics. Completion is idempotent: only the first call to
/// [`Exchange::complete`] reports `true`.
#[derive(Debug, Default)]
pub struct Exchange {
    one_way: bool,
    synchronous: AtomicBool,
    completed: AtomicBool,
    response_code: AtomicU16,
}

impl Exchange {
    #[must_use]
    pub fn new(one_way: bool, synchronous: bool) -> Self {
        Self {
            one_way,
            synchronous: AtomicBool::new(synchronous),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn is_one_way(&self) -> bool {
        self.one_way
    }

    #[must_use]
    pub fn is_synchronous(&self) -> bool {
        self.synchronous.load(Ordering::Acquire)
    }

    pub fn set_synchronous(&self, synchronous: bool) {
        self.synchronous.store(synchronous, Ordering::Release);
    }

    /// Marks the exchange finished. Returns `false` if it already was.
    pub fn complete(&self) -> bool {
        !self.completed.swap(true, Ordering::AcqRel)
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    pub fn set_response_code(&self, status: u16) {
        self.response_code.store(status, Ordering::Release);
    }

    /// Status of the response, once one has been received.
    #[must_use]
    pub fn response_code(&self) -> Option<u16> {
        match self.response_code.load(Ordering::Acquire) {
            0 => None,
            status => Some(status),
        }
    }
}

/// Everything known about one invocation while it passes through the pipeline.
///
/// Outbound interceptors may rewrite the URI, headers and body. The encoded
/// body is produced by the body-writer step appended for each call.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub operation: Arc<OperationDescriptor>,
    pub arguments: Vec<Value>,
    pub method: String,
    pub uri: String,
    pub headers: MultiMap,
    pub body: Option<RequestBody>,
    /// Formal index of the explicit body argument, if one was bound.
    pub body_index: Option<usize>,
    pub encoded_body: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
    pub exchange: Arc<Exchange>,
    pub properties: HashMap<String, String>,
}

impl InvocationContext {
    #[must_use]
    pub fn new(
        operation: Arc<OperationDescriptor>,
        arguments: Vec<Value>,
        request: RequestDescription,
        body: Option<RequestBody>,
    ) -> Self {
        let exchange = Arc::new(Exchange::new(operation.oneway, true));
        let body_index = body
            .as_ref()
            .filter(|b| matches!(b, RequestBody::Entity(_)))
            .and_then(|_| operation.body_index());

        let mut properties = HashMap::new();
        properties.insert(
            constants::PROP_INVOKED_OPERATION.to_string(),
            operation.name.clone(),
        );
        if let Some(index) = body_index {
            properties.insert(constants::PROP_BODY_INDEX.to_string(), index.to_string());
        }

        Self {
            operation,
            arguments,
            method: request.method,
            uri: request.uri,
            headers: request.headers,
            body,
            body_index,
            encoded_body: request.body,
            timeout: request.timeout,
            exchange,
            properties,
        }
    }

    /// A fresh context for the same call aimed at `uri`, with a new exchange.
    #[must_use]
    pub fn redirected(&self, uri: &str) -> Self {
        Self {
            uri: uri.to_string(),
            encoded_body: None,
            exchange: Arc::new(Exchange::new(
                self.exchange.is_one_way(),
                self.exchange.is_synchronous(),
            )),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get_first_ignore_case(constants::HEADER_CONTENT_TYPE)
    }

    /// The wire request as it stands now.
    #[must_use]
    pub fn to_request(&self) -> RequestDescription {
        RequestDescription {
            method: self.method.clone(),
            uri: self.uri.clone(),
            headers: self.headers.clone(),
            body: self.encoded_body.clone(),
            timeout: self.timeout,
        }
    }
}
