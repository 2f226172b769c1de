//! Wire-level request and response descriptions exchanged with a transport.

use crate::constants;
use crate::multimap::MultiMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// A fully assembled outbound request, ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescription {
    pub method: String,
    pub uri: String,
    pub headers: MultiMap,
    /// Encoded body bytes, written by the body-writer step of the pipeline.
    pub body: Option<Vec<u8>>,
    /// Per-request receive timeout.
    pub timeout: Option<Duration>,
}

/// A buffered response as delivered by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawResponse {
    pub status: u16,
    pub headers: MultiMap,
    pub body: Vec<u8>,
}

impl RawResponse {
    #[must_use]
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.add(name, value);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status < 300
    }

    #[must_use]
    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get_first_ignore_case(name)
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header(constants::HEADER_CONTENT_TYPE)
    }

    /// Body as text, lossily decoded.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// One multipart part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub media_type: String,
    pub value: Value,
}

/// The body source selected for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// An explicit body argument, encoded by the codec for the content type.
    Entity(Value),
    /// Form fields, or a body argument that is already a form multi-map.
    Form(MultiMap),
    Multipart(Vec<Attachment>),
}
