//! Configuration file
//!
//! ```toml
//! [log]
//! verbose = false
//!
//! [api]
//! addr = "0.0.0.0:8080"
//!
//! [ingest]
//! addr = "0.0.0.0:1935"
//! max_connections = 100
//! idle_timeout = 60
//!
//! [hub]
//! queue_capacity = 256
//! ping_interval = 30
//! write_timeout = 10
//!
//! [[streams]]
//! name = "alpha"
//! key = "secret1"
//! ```
//!
//! Every section is optional. Durations are whole seconds and must be
//! non-zero. A stream without a `key` gets a generated one, which is logged
//! at startup.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::server::ServerConfig;
use crate::store::{generate_key, StreamRecord};
use crate::transport::HubConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NexusConfig {
    pub log: LogSection,
    pub api: ApiSection,
    pub ingest: IngestSection,
    pub hub: HubConfig,
    pub streams: Vec<StreamSection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Force debug level regardless of `RUST_LOG`
    pub verbose: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    pub addr: String,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestSection {
    pub addr: String,
    pub max_connections: usize,
    pub chunk_size: Option<u32>,
    /// Seconds
    pub connection_timeout: u64,
    /// Seconds
    pub idle_timeout: u64,
    pub tcp_nodelay: bool,
}

impl Default for IngestSection {
    fn default() -> Self {
        let defaults = ServerConfig::default();
        Self {
            addr: defaults.bind_addr.to_string(),
            max_connections: defaults.max_connections,
            chunk_size: None,
            connection_timeout: defaults.connection_timeout.as_secs(),
            idle_timeout: defaults.idle_timeout.as_secs(),
            tcp_nodelay: defaults.tcp_nodelay,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamSection {
    pub name: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_public")]
    pub is_public: bool,
}

fn default_public() -> bool {
    true
}

impl NexusConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.api_addr()?;
        self.ingest_config()?;

        let durations = [
            ("ingest.connection_timeout", self.ingest.connection_timeout),
            ("ingest.idle_timeout", self.ingest.idle_timeout),
            ("hub.ping_interval", self.hub.ping_interval.as_secs()),
            ("hub.write_timeout", self.hub.write_timeout.as_secs()),
        ];
        for (field, secs) in durations {
            if secs == 0 {
                return Err(ConfigError::InvalidValue(field));
            }
        }

        let mut seen = HashSet::new();
        for stream in &self.streams {
            if !seen.insert(stream.name.as_str()) {
                return Err(ConfigError::DuplicateStream(stream.name.clone()));
            }
        }
        Ok(())
    }

    pub fn api_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_addr(&self.api.addr)
    }

    pub fn ingest_config(&self) -> Result<ServerConfig, ConfigError> {
        let ingest = &self.ingest;
        let mut config = ServerConfig::with_addr(parse_addr(&ingest.addr)?)
            .max_connections(ingest.max_connections)
            .connection_timeout(Duration::from_secs(ingest.connection_timeout))
            .idle_timeout(Duration::from_secs(ingest.idle_timeout))
            .tcp_nodelay(ingest.tcp_nodelay);

        if let Some(size) = ingest.chunk_size {
            config = config.chunk_size(size);
        }
        Ok(config)
    }

    /// Store records, generating keys where none are configured
    ///
    /// The second element lists the names whose key was generated.
    pub fn stream_records(&self) -> (Vec<StreamRecord>, Vec<String>) {
        let mut generated = Vec::new();
        let records = self
            .streams
            .iter()
            .map(|stream| {
                let key = match &stream.key {
                    Some(key) => key.clone(),
                    None => {
                        generated.push(stream.name.clone());
                        generate_key()
                    }
                };
                StreamRecord {
                    stream_name: stream.name.clone(),
                    key,
                    display_name: stream.display_name.clone(),
                    is_public: stream.is_public,
                }
            })
            .collect();
        (records, generated)
    }
}

fn parse_addr(addr: &str) -> Result<SocketAddr, ConfigError> {
    addr.parse()
        .map_err(|_| ConfigError::InvalidAddress(addr.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::KEY_LENGTH;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = NexusConfig::parse("").unwrap();

        assert!(!config.log.verbose);
        assert_eq!(config.api_addr().unwrap().port(), 8080);
        assert_eq!(config.ingest_config().unwrap().bind_addr.port(), 1935);
        assert_eq!(config.hub, HubConfig::default());
        assert!(config.streams.is_empty());
    }

    #[test]
    fn test_full_config() {
        let config = NexusConfig::parse(
            r#"
            [log]
            verbose = true

            [api]
            addr = "127.0.0.1:9000"

            [ingest]
            addr = "127.0.0.1:1936"
            max_connections = 8
            chunk_size = 8192
            idle_timeout = 5

            [hub]
            queue_capacity = 32
            ping_interval = 10

            [[streams]]
            name = "alpha"
            key = "secret1"
            display_name = "Alpha"

            [[streams]]
            name = "beta"
            is_public = false
            "#,
        )
        .unwrap();

        assert!(config.log.verbose);
        assert_eq!(config.api_addr().unwrap(), "127.0.0.1:9000".parse().unwrap());

        let ingest = config.ingest_config().unwrap();
        assert_eq!(ingest.bind_addr.port(), 1936);
        assert_eq!(ingest.max_connections, 8);
        assert_eq!(ingest.chunk_size, 8192);
        assert_eq!(ingest.idle_timeout, Duration::from_secs(5));

        assert_eq!(config.hub.queue_capacity, 32);
        assert_eq!(config.hub.ping_interval, Duration::from_secs(10));

        let (records, generated) = config.stream_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key, "secret1");
        assert_eq!(records[0].display_name.as_deref(), Some("Alpha"));
        assert_eq!(records[1].key.len(), KEY_LENGTH);
        assert!(!records[1].is_public);
        assert_eq!(generated, vec!["beta".to_string()]);
    }

    #[test]
    fn test_duplicate_stream_rejected() {
        let result = NexusConfig::parse(
            r#"
            [[streams]]
            name = "alpha"
            [[streams]]
            name = "alpha"
            "#,
        );
        assert!(matches!(result, Err(ConfigError::DuplicateStream(name)) if name == "alpha"));
    }

    #[test]
    fn test_invalid_address_rejected() {
        let result = NexusConfig::parse("[api]\naddr = \"not-an-address\"");
        assert!(matches!(result, Err(ConfigError::InvalidAddress(_))));
    }

    #[test]
    fn test_zero_ping_interval_rejected() {
        let result = NexusConfig::parse("[hub]\nping_interval = 0");
        assert!(matches!(result, Err(ConfigError::InvalidValue("hub.ping_interval"))));
    }

    #[test]
    fn test_zero_write_timeout_rejected() {
        let result = NexusConfig::parse("[hub]\nwrite_timeout = 0");
        assert!(matches!(result, Err(ConfigError::InvalidValue("hub.write_timeout"))));
    }

    #[test]
    fn test_zero_idle_timeout_rejected() {
        let result = NexusConfig::parse("[ingest]\nidle_timeout = 0");
        assert!(matches!(result, Err(ConfigError::InvalidValue("ingest.idle_timeout"))));
    }

    #[test]
    fn test_zero_connection_timeout_rejected() {
        let result = NexusConfig::parse("[ingest]\nconnection_timeout = 0");
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue("ingest.connection_timeout")));
        assert_eq!(err.to_string(), "ingest.connection_timeout must be greater than zero");
    }

    #[test]
    fn test_unknown_section_rejected() {
        assert!(matches!(
            NexusConfig::parse("[database]\nurl = \"x\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
