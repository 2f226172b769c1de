//! Mutable per-handle client state.

use crate::multimap::MultiMap;
use crate::pipeline::exchange::Exchange;
use crate::pipeline::message::RawResponse;
use crate::uri::UriBuilder;
use indexmap::IndexMap;
use std::sync::Arc;

/// State owned by exactly one client handle.
///
/// Sub-resource handles receive a state derived through
/// [`ClientState::derive`]; parent and child never share one.
#[derive(Debug, Clone)]
pub struct ClientState {
    pub base_uri: String,
    pub current_builder: UriBuilder,
    /// Pending headers sent with every call of this handle.
    pub headers: MultiMap,
    /// Template values resolved by the last call.
    pub templates: IndexMap<String, String>,
    /// Persistent class-level variable values (root handles only).
    pub root_values: IndexMap<String, String>,
    pub last_response: Option<RawResponse>,
    pub last_exchange: Option<Arc<Exchange>>,
}

impl ClientState {
    #[must_use]
    pub fn new(base_uri: &str, headers: MultiMap) -> Self {
        Self {
            base_uri: base_uri.to_string(),
            current_builder: UriBuilder::from_uri(base_uri),
            headers,
            templates: IndexMap::new(),
            root_values: IndexMap::new(),
            last_response: None,
            last_exchange: None,
        }
    }

    /// A fresh state for a sub-resource handle rooted at `uri`.
    #[must_use]
    pub fn derive(uri: &str, headers: MultiMap, templates: IndexMap<String, String>) -> Self {
        Self {
            templates,
            ..Self::new(uri, headers)
        }
    }

    /// Forgets pending headers, the last response and any path appended to
    /// the builder.
    pub fn reset(&mut self) {
        self.current_builder = UriBuilder::from_uri(&self.base_uri);
        self.headers = MultiMap::new();
        self.last_response = None;
        self.last_exchange = None;
    }
}
