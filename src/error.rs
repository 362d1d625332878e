//! Unified error type.

use std::fmt;

/// The error type returned by baton's fallible operations.
///
/// Request-level failures (a bad JSON body, a rejected `Authorization`
/// header) never show up here: steps report them into the
/// [`Accumulator`](crate::Accumulator). This type surfaces infrastructure
/// failures: reading a body, binding a port, loading configuration.
#[derive(Debug)]
pub enum Error {
    /// A read or socket fault. End-of-input is never reported as one.
    Io(std::io::Error),
    /// The configuration file is not valid TOML for [`Config`](crate::Config).
    Config(toml::de::Error),
    /// A listen address that is not `host:port`.
    Addr(std::net::AddrParseError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Addr(e) => write!(f, "address: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::Addr(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e)
    }
}

impl From<std::net::AddrParseError> for Error {
    fn from(e: std::net::AddrParseError) -> Self {
        Self::Addr(e)
    }
}

/// A structured decode of a [`RawBody`](crate::RawBody) failed.
///
/// Decode errors travel as strings once they reach the accumulator, so the
/// only thing this type promises is a stable, human-readable message.
#[derive(Debug)]
pub struct DecodeError(serde_json::Error);

impl DecodeError {
    pub(crate) fn new(e: serde_json::Error) -> Self {
        Self(e)
    }

    /// 1-based line of the offending input, `0` when the input ended early.
    pub fn line(&self) -> usize {
        self.0.line()
    }

    /// `true` when the body ended before a complete value was read.
    pub fn is_eof(&self) -> bool {
        self.0.is_eof()
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "decode: {}", self.0)
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}
