//! On-disk configuration for `ombus` binaries: a single TOML document,
//! `serde`-derived, covering every subcommand so one file can drive
//! `serve` and `relay` together in production.

use ombus_net::{ClientConfig, ServerConfig};
use ombus_relay::RelayConfig;
use ombus_shm::{EndpointConfig, StreamConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Toml {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Everything one `ombus` process might need, loaded from a single TOML
/// file. Individual subcommands only read the sections relevant to them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub endpoint: EndpointConfigToml,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

/// [`EndpointConfig`] minus the fields the CLI always derives from
/// `--stream`/`--consumer-index` flags, kept as a distinct type so
/// `#[serde(default)]` doesn't require `EndpointConfig` itself to impl
/// `Default` (it has no meaningful default `stream_name`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointConfigToml {
    pub consumer_index: Option<u32>,
    #[serde(default = "default_zero_copy")]
    pub zero_copy: bool,
}

fn default_zero_copy() -> bool {
    true
}

impl CliConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn endpoint_config(&self, stream_name: &str, consumer_index: u32) -> EndpointConfig {
        EndpointConfig {
            stream_name: stream_name.to_string(),
            consumer_index: self.endpoint.consumer_index.unwrap_or(consumer_index),
            zero_copy: self.endpoint.zero_copy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_parses_to_defaults() {
        let config: CliConfig = toml::from_str("").expect("empty config");
        assert_eq!(config.server.max_clients, ServerConfig::default().max_clients);
    }

    #[test]
    fn round_trips_through_toml() {
        let config = CliConfig {
            stream: StreamConfig {
                stream_name: "/ombus-cli-test".to_string(),
                ..StreamConfig::default()
            },
            ..CliConfig::default()
        };
        let text = toml::to_string_pretty(&config).expect("serialize");
        let parsed: CliConfig = toml::from_str(&text).expect("parse");
        assert_eq!(parsed.stream.stream_name, "/ombus-cli-test");
    }

    #[test]
    fn missing_file_reports_io_error() {
        let result = CliConfig::from_file(Path::new("/nonexistent/ombus.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn from_file_loads_a_written_toml_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ombus.toml");
        std::fs::write(
            &path,
            "[server]\nport = 9999\nmax_clients = 10\nsend_buf_size = 65536\n",
        )
        .expect("write");

        let config = CliConfig::from_file(&path).expect("load");
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.server.max_clients, 10);
    }
}
