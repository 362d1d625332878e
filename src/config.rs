//! Server configuration.
//!
//! Everything has a default, so an empty file (or no file at all) is a valid
//! configuration:
//!
//! ```toml
//! addr = "0.0.0.0:8080"
//! read_timeout_secs = 15
//! write_timeout_secs = 15
//!
//! [compression]
//! enabled = true
//! min_size = 1400
//! level = 6
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::compression::CompressionConfig;
use crate::error::Error;

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Listen address.
    pub addr: SocketAddr,
    /// Deadline for receiving a complete request body. `0` disables it.
    pub read_timeout_secs: u64,
    /// Deadline for a handler to produce its response. `0` disables it.
    pub write_timeout_secs: u64,
    pub compression: CompressionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            read_timeout_secs: 15,
            write_timeout_secs: 15,
            compression: CompressionConfig::default(),
        }
    }
}

impl Config {
    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, Error> {
        Ok(toml::from_str(text)?)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        nonzero_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        nonzero_secs(self.write_timeout_secs)
    }
}

fn nonzero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.addr.port(), 8080);
        assert_eq!(config.read_timeout(), Some(Duration::from_secs(15)));
        assert!(config.compression.enabled);
    }

    #[test]
    fn partial_tables_keep_remaining_defaults() {
        let config = Config::from_toml(
            r#"
            addr = "127.0.0.1:3000"
            write_timeout_secs = 0

            [compression]
            min_size = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.addr, "127.0.0.1:3000".parse().unwrap());
        assert_eq!(config.write_timeout(), None);
        assert_eq!(config.read_timeout_secs, 15);
        assert_eq!(config.compression.min_size, 0);
        assert_eq!(config.compression.level, 6);
    }

    #[test]
    fn bad_values_are_config_errors() {
        assert!(matches!(Config::from_toml(r#"addr = "nowhere""#), Err(Error::Config(_))));
        assert!(matches!(Config::from_toml("read_timeout = 5"), Err(Error::Config(_))));
        assert!(matches!(
            Config::from_toml("[compression]\nlvl = 3"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = Config::load("/definitely/not/here/baton.toml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
