//! Request and response logging with header redaction and body truncation.
//!
//! Request lines and statuses log at `info`, headers at `debug` and bodies at
//! `trace`, all under the `restwire::invoker` target. Credential-bearing
//! headers are never written out.

use crate::constants;
use crate::multimap::MultiMap;
use crate::pipeline::message::{RawResponse, RequestDescription};
use std::borrow::Cow;
use tracing::{debug, info, trace};

const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "proxy-authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
    "x-access-token",
    "x-auth-token",
    "api-key",
    "api_key",
    "token",
    "secret",
    "password",
];

/// Whether values of `name` carry credentials.
#[must_use]
pub fn is_sensitive_header(name: &str) -> bool {
    SENSITIVE_HEADERS
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(name))
}

/// The value as it may appear in logs. Empty values stay empty so a missing
/// credential remains visible.
#[must_use]
pub fn loggable_header_value<'a>(name: &str, value: &'a str) -> Cow<'a, str> {
    if is_sensitive_header(name) && !value.is_empty() {
        Cow::Borrowed(constants::REDACTED)
    } else {
        Cow::Borrowed(value)
    }
}

/// Cuts `text` to at most `limit` bytes on a char boundary. Returns whether
/// anything was dropped.
#[must_use]
pub fn clip_body(text: &str, limit: usize) -> (&str, bool) {
    if text.len() <= limit {
        return (text, false);
    }
    let cut = (0..=limit)
        .rev()
        .find(|i| text.is_char_boundary(*i))
        .unwrap_or(0);
    (&text[..cut], true)
}

/// Body size limit from `RESTWIRE_LOG_MAX_BODY`.
#[must_use]
pub fn max_body_len() -> usize {
    parse_body_limit(std::env::var(constants::ENV_RESTWIRE_LOG_MAX_BODY).ok().as_deref())
}

fn parse_body_limit(raw: Option<&str>) -> usize {
    raw.and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(constants::DEFAULT_LOG_MAX_BODY)
}

fn log_headers(direction: &str, headers: &MultiMap) {
    for (name, value) in headers.pairs() {
        debug!(
            target: constants::LOG_TARGET,
            "{direction} {name}: {}",
            loggable_header_value(name, value)
        );
    }
}

fn log_body(direction: &str, body: &[u8]) {
    if body.is_empty() || !tracing::enabled!(target: constants::LOG_TARGET, tracing::Level::TRACE) {
        return;
    }
    let text = String::from_utf8_lossy(body);
    let limit = max_body_len();
    match clip_body(&text, limit) {
        (shown, true) => trace!(
            target: constants::LOG_TARGET,
            "{direction} body: {shown} (truncated at {limit} bytes)"
        ),
        (shown, false) => trace!(target: constants::LOG_TARGET, "{direction} body: {shown}"),
    }
}

/// Logs an outbound request.
pub fn log_request(request: &RequestDescription) {
    info!(
        target: constants::LOG_TARGET,
        "→ {} {}",
        request.method.to_uppercase(),
        request.uri
    );
    log_headers(">", &request.headers);
    if let Some(body) = &request.body {
        log_body(">", body);
    }
}

pub fn log_response(response: &RawResponse, duration_ms: u128) {
    info!(
        target: constants::LOG_TARGET,
        "← {} ({duration_ms}ms)",
        response.status
    );
    log_headers("<", &response.headers);
    log_body("<", &response.body);
}
