//! Shared test utilities: an in-memory transport and descriptor fixtures.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use restwire::model::{OperationDescriptor, ParameterBinding, ResourceDescriptor, ReturnType};
use restwire::{ClientProxy, ClientRuntime, RawResponse, RequestDescription, Transport, TransportError};
use std::collections::VecDeque;
use std::sync::Arc;

pub const BASE_URI: &str = "http://svc.test/api";

/// Records every request and answers from a queue, `204` once it runs dry.
#[derive(Default)]
pub struct RecordingTransport {
    requests: Mutex<Vec<RequestDescription>>,
    responses: Mutex<VecDeque<Result<RawResponse, TransportError>>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, response: RawResponse) -> &Self {
        self.responses.lock().push_back(Ok(response));
        self
    }

    pub fn fail(&self, error: TransportError) -> &Self {
        self.responses.lock().push_back(Err(error));
        self
    }

    pub fn requests(&self) -> Vec<RequestDescription> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> RequestDescription {
        self.requests
            .lock()
            .last()
            .cloned()
            .expect("no request was submitted")
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn submit(&self, request: &RequestDescription) -> Result<RawResponse, TransportError> {
        self.requests.lock().push(request.clone());
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(RawResponse::new(204)))
    }
}

pub fn json_response(status: u16, body: &str) -> RawResponse {
    RawResponse::new(status)
        .with_header("Content-Type", "application/json")
        .with_body(body)
}

pub fn client_with(resource: ResourceDescriptor, runtime: ClientRuntime) -> ClientProxy {
    ClientProxy::new(BASE_URI, resource, Arc::new(runtime), &[]).expect("valid client")
}

pub fn client(resource: ResourceDescriptor, transport: &Arc<RecordingTransport>) -> ClientProxy {
    client_with(resource, ClientRuntime::new(transport.clone()))
}

/// `GET /widgets/{id}?verbose=...` returning a `Widget`.
pub fn widgets_resource() -> ResourceDescriptor {
    ResourceDescriptor::new("Widgets", "/").with_operation(
        OperationDescriptor::builder("get_widget", "GET", "/widgets/{id}")
            .param(ParameterBinding::path("id", 0))
            .param(ParameterBinding::query("verbose", 1))
            .produces("application/json")
            .returns(ReturnType::entity("Widget"))
            .build()
            .expect("valid operation"),
    )
}
