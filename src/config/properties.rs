//! Typed client properties.
//!
//! Properties arrive as string maps (from an embedding framework or a
//! properties file) under dot-notation keys such as
//! `restwire.connection.timeout`.

use crate::constants;
use crate::error::Error;
use std::fmt;
use std::str::FromStr;

/// A recognized client property key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// Connect timeout in milliseconds (`restwire.connection.timeout`)
    ConnectionTimeout,
    /// Receive timeout in milliseconds (`restwire.receive.timeout`)
    ReceiveTimeout,
    /// Whether sub-resource handles inherit pending headers (`restwire.inherit.headers`)
    InheritHeaders,
    /// Number of redirects the invoker follows (`restwire.max.redirects`)
    MaxRedirects,
}

impl PropertyKey {
    pub const ALL: &'static [Self] = &[
        Self::ConnectionTimeout,
        Self::ReceiveTimeout,
        Self::InheritHeaders,
        Self::MaxRedirects,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionTimeout => constants::PROP_CONNECTION_TIMEOUT,
            Self::ReceiveTimeout => constants::PROP_RECEIVE_TIMEOUT,
            Self::InheritHeaders => constants::PROP_INHERIT_HEADERS,
            Self::MaxRedirects => constants::PROP_MAX_REDIRECTS,
        }
    }

    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::ConnectionTimeout | Self::ReceiveTimeout)
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| Error::Config(format!("unknown client property '{s}'")))
    }
}

/// Parsed value of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyValue {
    U64(u64),
    Bool(bool),
}

/// Timeouts above one day are almost certainly a unit mistake.
pub const MAX_TIMEOUT_MS: u64 = 24 * 60 * 60 * 1000;

/// Redirect chains longer than this are treated as loops.
pub const MAX_REDIRECTS: u64 = 20;

impl PropertyValue {
    /// Parse a string value into the appropriate type for the given key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the value cannot be parsed as the expected
    /// type or is outside the allowed range for the key.
    pub fn parse_for_key(key: PropertyKey, value: &str) -> Result<Self, Error> {
        let invalid = |reason: &str| Error::Config(format!("invalid value '{value}' for {key}: {reason}"));
        match key {
            PropertyKey::ConnectionTimeout | PropertyKey::ReceiveTimeout => {
                let parsed = value
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| invalid("expected milliseconds"))?;
                if parsed > MAX_TIMEOUT_MS {
                    return Err(invalid(&format!("timeout cannot exceed {MAX_TIMEOUT_MS} ms")));
                }
                Ok(Self::U64(parsed))
            }
            PropertyKey::MaxRedirects => {
                let parsed = value
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| invalid("expected a count"))?;
                if parsed > MAX_REDIRECTS {
                    return Err(invalid(&format!("at most {MAX_REDIRECTS} redirects")));
                }
                Ok(Self::U64(parsed))
            }
            PropertyKey::InheritHeaders => match value.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(Self::Bool(true)),
                "false" | "0" | "no" | "off" => Ok(Self::Bool(false)),
                _ => Err(invalid("expected a boolean")),
            },
        }
    }

    #[must_use]
    pub const fn as_u64(&self) -> Option<u64> {
        match self {
            Self::U64(v) => Some(*v),
            Self::Bool(_) => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            Self::U64(_) => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U64(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
        }
    }
}
