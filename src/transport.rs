//! HTTP transport backed by `reqwest`.

use crate::constants;
use crate::error::TransportError;
use crate::multimap::MultiMap;
use crate::pipeline::message::{RawResponse, RequestDescription};
use crate::pipeline::Transport;
use crate::resilience::{create_resilient_client, TimeoutConfig};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use std::str::FromStr;

/// Installs the process-wide rustls crypto provider if none is set yet.
pub fn install_crypto_provider() {
    #[cfg(not(windows))]
    let provider = rustls::crypto::ring::default_provider();
    #[cfg(windows)]
    let provider = rustls::crypto::aws_lc_rs::default_provider();
    // Err means another provider is already installed.
    let _ = provider.install_default();
}

/// Sends requests over HTTP(S). Redirects are returned to the caller as-is.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidRequest`] if the client cannot be built.
    pub fn new(timeouts: &TimeoutConfig) -> Result<Self, TransportError> {
        install_crypto_provider();
        Ok(Self {
            client: create_resilient_client(timeouts)?,
        })
    }

    #[must_use]
    pub const fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn to_header_map(headers: &MultiMap) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::new();
    for (name, values) in headers.iter() {
        let header_name = HeaderName::from_str(name)
            .map_err(|e| TransportError::InvalidRequest(format!("header name '{name}': {e}")))?;
        // Cookies travel as one header.
        let joined;
        let values: &[String] = if name.eq_ignore_ascii_case(constants::HEADER_COOKIE) {
            joined = [values.join("; ")];
            &joined
        } else {
            values
        };
        for value in values {
            let header_value = HeaderValue::from_str(value).map_err(|e| {
                TransportError::InvalidRequest(format!("header '{name}' value: {e}"))
            })?;
            map.append(header_name.clone(), header_value);
        }
    }
    Ok(map)
}

fn classify(error: reqwest::Error) -> TransportError {
    if error.is_connect() {
        TransportError::Connect(error.to_string())
    } else if error.is_timeout() {
        TransportError::Timeout(error.to_string())
    } else {
        TransportError::Http(error)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn submit(&self, request: &RequestDescription) -> Result<RawResponse, TransportError> {
        let method = Method::from_str(&request.method.to_uppercase())
            .map_err(|e| TransportError::InvalidRequest(format!("method '{}': {e}", request.method)))?;
        let mut builder = self
            .client
            .request(method, &request.uri)
            .headers(to_header_map(&request.headers)?);
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let mut headers = MultiMap::new();
        for (name, value) in response.headers() {
            headers.add(name.as_str(), String::from_utf8_lossy(value.as_bytes()).into_owned());
        }
        let body = response.bytes().await.map_err(classify)?.to_vec();
        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}
