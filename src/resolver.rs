//! Response resolution: status classification, exception mapping and body
//! decoding into the declared return shape.

use crate::codec::CodecRegistry;
use crate::constants;
use crate::error::{BoxError, Error};
use crate::invoker::InvocationResult;
use crate::model::operation::{OperationDescriptor, ReturnType};
use crate::multimap::MultiMap;
use crate::pipeline::message::RawResponse;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Priority given to mappers that do not declare one. Lower runs first.
pub const DEFAULT_MAPPER_PRIORITY: i32 = 5000;

/// Translates an error response into a typed failure.
pub trait ResponseExceptionMapper: Send + Sync {
    /// Whether this mapper wants to look at a response with `status`.
    fn handles(&self, _status: u16, _headers: &MultiMap) -> bool {
        true
    }

    /// The failure to raise, or `None` to let the next mapper try.
    fn from_response(&self, response: &RawResponse) -> Option<BoxError>;

    fn priority(&self) -> i32 {
        DEFAULT_MAPPER_PRIORITY
    }
}

/// Ordered mappers per failure type.
#[derive(Clone, Default)]
pub struct ExceptionMapperRegistry {
    mappers: IndexMap<String, Vec<Arc<dyn ResponseExceptionMapper>>>,
}

impl std::fmt::Debug for ExceptionMapperRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.mappers.iter().map(|(k, v)| (k, v.len())))
            .finish()
    }
}

impl ExceptionMapperRegistry {
    /// Registers `mapper` for `failure_type`. Mappers run by ascending
    /// priority, then registration order.
    #[must_use]
    pub fn with_mapper(mut self, failure_type: &str, mapper: Arc<dyn ResponseExceptionMapper>) -> Self {
        let mappers = self.mappers.entry(failure_type.to_string()).or_default();
        mappers.push(mapper);
        mappers.sort_by_key(|m| m.priority());
        self
    }

    #[must_use]
    pub fn lookup(&self, failure_type: &str) -> &[Arc<dyn ResponseExceptionMapper>] {
        self.mappers.get(failure_type).map_or(&[][..], Vec::as_slice)
    }
}

/// Turns a received response into the caller-visible result.
pub struct ResponseResolver<'a> {
    codecs: &'a CodecRegistry,
    mappers: &'a ExceptionMapperRegistry,
}

impl<'a> ResponseResolver<'a> {
    #[must_use]
    pub const fn new(codecs: &'a CodecRegistry, mappers: &'a ExceptionMapperRegistry) -> Self {
        Self { codecs, mappers }
    }

    /// Classifies `response` and decodes it for `operation`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Mapped`] when a mapper translates an error status,
    /// [`Error::RemoteInvocation`] for other error statuses, and
    /// [`Error::Codec`] when the body cannot be decoded.
    pub fn resolve(
        &self,
        response: RawResponse,
        operation: &OperationDescriptor,
    ) -> Result<InvocationResult, Error> {
        let return_type = operation.return_type.unwrapped();
        if response.status >= 300 {
            return self.resolve_failure(response, operation);
        }
        match return_type {
            ReturnType::Void => {
                debug!(target: constants::LOG_TARGET, "Void return, body not read");
                Ok(InvocationResult::Empty)
            }
            ReturnType::Response => Ok(InvocationResult::Response(response)),
            other => self
                .decode(&response, other, &operation.produces)
                .map(InvocationResult::Entity),
        }
    }

    fn resolve_failure(
        &self,
        response: RawResponse,
        operation: &OperationDescriptor,
    ) -> Result<InvocationResult, Error> {
        let status = response.status;
        let default_failure = [constants::DEFAULT_FAILURE_TYPE.to_string()];
        let failure_types = if operation.declared_failures.is_empty() {
            &default_failure[..]
        } else {
            &operation.declared_failures[..]
        };

        for failure_type in failure_types {
            for mapper in self.mappers.lookup(failure_type) {
                if !mapper.handles(status, &response.headers) {
                    continue;
                }
                if let Some(source) = mapper.from_response(&response) {
                    debug!(
                        target: constants::LOG_TARGET,
                        "HTTP {status} mapped to {failure_type}"
                    );
                    return Err(Error::Mapped {
                        failure_type: failure_type.clone(),
                        status,
                        source,
                    });
                }
            }
        }

        if operation.return_type.unwrapped() == &ReturnType::Response
            && operation.declared_failures.is_empty()
        {
            return Ok(InvocationResult::Response(response));
        }
        Err(Error::RemoteInvocation {
            status,
            response: Box::new(response),
        })
    }

    /// Decodes the body with the codec for the response content type, else
    /// the first concrete produced type, else text for primitives and JSON
    /// otherwise. An empty body decodes to null.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] when decoding fails.
    pub fn decode(
        &self,
        response: &RawResponse,
        return_type: &ReturnType,
        produces: &[String],
    ) -> Result<Value, Error> {
        if !response.has_body() {
            return Ok(Value::Null);
        }
        let media_type = response
            .content_type()
            .map(ToString::to_string)
            .or_else(|| {
                produces
                    .iter()
                    .find(|m| !constants::is_wildcard_media_type(m) && !m.contains('*'))
                    .cloned()
            })
            .unwrap_or_else(|| match return_type {
                ReturnType::Primitive(_) => constants::CONTENT_TYPE_TEXT.to_string(),
                _ => constants::CONTENT_TYPE_JSON.to_string(),
            });
        let media_type = match return_type {
            // Primitive results are read as text whatever the server labels them,
            // unless they arrive as JSON.
            ReturnType::Primitive(_) if !constants::is_json_content_type(&media_type) => {
                constants::CONTENT_TYPE_TEXT.to_string()
            }
            _ => media_type,
        };
        self.codecs.read(&response.body, return_type, &media_type)
    }
}
