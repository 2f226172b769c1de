//! Request assembly: URI construction and content negotiation defaults.

use crate::binder::BoundParameters;
use crate::codec;
use crate::constants;
use crate::error::Error;
use crate::model::operation::{OperationDescriptor, ReturnType};
use crate::multimap::MultiMap;
use crate::pipeline::message::{RequestBody, RequestDescription};
use crate::uri::UriBuilder;
use tracing::debug;

/// Appends the class template (root handles only), the operation template,
/// then matrix and query parameters to `builder`.
pub fn extend_uri(
    builder: &mut UriBuilder,
    operation: &OperationDescriptor,
    is_root: bool,
    class_template: &str,
    bound: &BoundParameters,
) {
    if is_root && class_template != "/" {
        builder.path(class_template);
    }
    if operation.uri_template != "/" {
        builder.path(&operation.uri_template);
    }
    for (name, value) in bound.matrices.pairs() {
        builder.matrix_param(name, value, true);
    }
    for (name, value) in bound.queries.pairs() {
        builder.query_param(name, value, true);
    }
}

/// Substitutes path values and normalizes the result.
///
/// # Errors
///
/// Returns [`Error::MissingPathValue`] when a variable is left without a value.
pub fn build_uri(
    builder: &UriBuilder,
    operation: &OperationDescriptor,
    path_values: &[String],
) -> Result<String, Error> {
    builder
        .build_from_encoded(path_values)
        .map_err(|variable| Error::missing_path_value(&operation.name, &variable))
}

/// Builds the wire request for one call. Only `headers` is mutated.
///
/// # Errors
///
/// Returns [`Error::MissingPathValue`] when the URI cannot be completed.
pub fn assemble(
    builder: &UriBuilder,
    operation: &OperationDescriptor,
    is_root: bool,
    class_template: &str,
    bound: &BoundParameters,
    headers: &mut MultiMap,
    body: Option<&RequestBody>,
) -> Result<RequestDescription, Error> {
    let mut builder = builder.clone();
    extend_uri(&mut builder, operation, is_root, class_template, bound);
    let uri = build_uri(&builder, operation, &bound.path_values)?;

    negotiate_content_type(operation, headers, body);
    negotiate_accept(operation, headers);

    debug!(
        target: constants::LOG_TARGET,
        "Assembled {} {} for '{}'",
        operation.http_method,
        uri,
        operation.name
    );
    Ok(RequestDescription {
        method: operation.http_method.clone(),
        uri,
        headers: headers.clone(),
        body: None,
        timeout: None,
    })
}

/// Sets `Content-Type` when the caller has not.
pub fn negotiate_content_type(
    operation: &OperationDescriptor,
    headers: &mut MultiMap,
    body: Option<&RequestBody>,
) {
    if headers.contains_key_ignore_case(constants::HEADER_CONTENT_TYPE) {
        return;
    }
    let content_type = match body {
        Some(RequestBody::Form(_)) => Some(constants::CONTENT_TYPE_FORM.to_string()),
        Some(RequestBody::Multipart(_)) => Some(codec::multipart_content_type()),
        _ => operation
            .consumes
            .first()
            .filter(|media| !constants::is_wildcard_media_type(media))
            .cloned(),
    };
    if let Some(content_type) = content_type {
        headers.put_single(constants::HEADER_CONTENT_TYPE, content_type);
    }
}

/// Sets `Accept` when the caller has not.
pub fn negotiate_accept(operation: &OperationDescriptor, headers: &mut MultiMap) {
    if headers.contains_key_ignore_case(constants::HEADER_ACCEPT) {
        return;
    }
    let declared: Vec<&str> = operation
        .produces
        .iter()
        .map(String::as_str)
        .filter(|media| !constants::is_wildcard_media_type(media))
        .collect();
    let accept = match operation.return_type.unwrapped() {
        ReturnType::Void => constants::MEDIA_TYPE_WILDCARD.to_string(),
        _ if !declared.is_empty() => declared.join(", "),
        ReturnType::Primitive(_) => constants::CONTENT_TYPE_TEXT.to_string(),
        _ => constants::CONTENT_TYPE_XML.to_string(),
    };
    headers.put_single(constants::HEADER_ACCEPT, accept);
}
