//! Header names, media types, property keys and log settings shared across
//! the crate.

// HTTP Headers
pub const HEADER_ACCEPT: &str = "Accept";
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub const HEADER_COOKIE: &str = "Cookie";
pub const HEADER_LOCATION: &str = "Location";

// Content Types
pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_XML: &str = "application/xml";
pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";
pub const CONTENT_TYPE_MULTIPART: &str = "multipart/form-data";
pub const CONTENT_TYPE_TEXT: &str = "text/plain";
pub const MEDIA_TYPE_WILDCARD: &str = "*/*";

// Content type identifiers
pub const CONTENT_TYPE_IDENTIFIER_JSON: &str = "json";
pub const CONTENT_TYPE_IDENTIFIER_YAML: &str = "yaml";

// Failure types
/// Failure type consulted when an operation declares no failure types.
pub const DEFAULT_FAILURE_TYPE: &str = "unchecked";

// Invocation properties
pub const PROP_INVOKED_OPERATION: &str = "restwire.invoked_operation";
pub const PROP_BODY_INDEX: &str = "restwire.body_index";

// Client properties
pub const PROP_CONNECTION_TIMEOUT: &str = "restwire.connection.timeout";
pub const PROP_RECEIVE_TIMEOUT: &str = "restwire.receive.timeout";
pub const PROP_INHERIT_HEADERS: &str = "restwire.inherit.headers";
pub const PROP_MAX_REDIRECTS: &str = "restwire.max.redirects";
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_RECEIVE_TIMEOUT_MS: u64 = 30_000;

// Environment Variables
pub const ENV_RESTWIRE_LOG: &str = "RESTWIRE_LOG";
pub const ENV_RESTWIRE_LOG_FORMAT: &str = "RESTWIRE_LOG_FORMAT";
pub const ENV_RESTWIRE_LOG_FILE: &str = "RESTWIRE_LOG_FILE";
pub const ENV_RESTWIRE_LOG_MAX_BODY: &str = "RESTWIRE_LOG_MAX_BODY";
pub const ENV_RESTWIRE_CONNECT_TIMEOUT_MS: &str = "RESTWIRE_CONNECT_TIMEOUT_MS";
pub const ENV_RESTWIRE_RECEIVE_TIMEOUT_MS: &str = "RESTWIRE_RECEIVE_TIMEOUT_MS";

// Logging
pub const LOG_TARGET: &str = "restwire::invoker";
pub const DEFAULT_LOG_MAX_BODY: usize = 1000;
pub const REDACTED: &str = "[REDACTED]";

// Error Context Messages
pub const ERR_API_CREDENTIALS: &str =
    "Check your API credentials and authentication configuration.";
pub const ERR_PERMISSION_DENIED: &str =
    "Your credentials may be valid but lack permission for this operation.";
pub const ERR_ENDPOINT_NOT_FOUND: &str = "Check that the API endpoint and parameters are correct.";
pub const ERR_RATE_LIMITED: &str = "You're making requests too quickly. Wait before trying again.";
pub const ERR_SERVER_ERROR: &str = "The API server is experiencing issues. Try again later.";
pub const ERR_CONNECTION: &str = "Check that the API server is running and accessible.";
pub const ERR_TIMEOUT: &str = "The API server may be slow or unresponsive. Try again later.";
pub const ERR_OPERATION_SHAPE: &str =
    "Check the operation descriptor: its bindings violate a declaration rule.";
pub const ERR_PATH_VALUE: &str =
    "Supply a value for every URI template variable through a path, bean or body binding.";
pub const ERR_TOML_SYNTAX: &str = "Check that your configuration file is valid TOML syntax.";
pub const ERR_JSON_SYNTAX: &str = "Check that your request body or response contains valid JSON.";

/// Check if a content type is JSON
#[must_use]
pub fn is_json_content_type(content_type: &str) -> bool {
    content_type
        .to_lowercase()
        .contains(CONTENT_TYPE_IDENTIFIER_JSON)
}

/// Check if a media type is the wildcard `*/*`
#[must_use]
pub fn is_wildcard_media_type(media_type: &str) -> bool {
    media_type.trim() == MEDIA_TYPE_WILDCARD
}

/// Strips parameters (`; charset=...`) from a media type and lowercases it
#[must_use]
pub fn essence(media_type: &str) -> String {
    media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}
