//! Start-up configuration.

use std::{net::SocketAddr, num::NonZeroUsize, path::Path, time::Duration};

use headerproof_merkle_tree::HashAlgorithm;
use serde::Deserialize;

use crate::Error;

/// Default number of headers per batch.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Service configuration.
///
/// Fixed for the lifetime of the process. Every field has a default, so an
/// empty TOML document is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Number of headers committed together into one tree.
    pub batch_size: usize,
    /// Hash function for leaves and internal nodes.
    pub hash_algorithm: HashAlgorithm,
    /// Address the control plane listens on.
    pub listen_addr: SocketAddr,
    /// Node to connect to at start-up, if any.
    pub node_url: Option<String>,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            hash_algorithm: HashAlgorithm::default(),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            node_url: None,
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Parse a TOML document and validate it.
    pub fn from_toml_str(source: &str) -> Result<Self, Error> {
        let config: Config = toml::from_str(source)
            .map_err(|e| Error::InvalidConfig(format!("cannot parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.batch_size()?;
        if self.connect_timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "connect_timeout_secs must be at least 1".into(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "request_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// The batch size as a non-zero count.
    pub fn batch_size(&self) -> Result<NonZeroUsize, Error> {
        NonZeroUsize::new(self.batch_size)
            .ok_or_else(|| Error::InvalidConfig("batch_size must be at least 1".into()))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = Config::from_toml_str("").expect("defaults are valid");
        assert_eq!(config, Config::default());
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.hash_algorithm, HashAlgorithm::Sha256);
        assert_eq!(config.listen_addr.port(), 3000);
    }

    #[test]
    fn full_document() {
        let config = Config::from_toml_str(
            r#"
            batch_size = 8
            hash_algorithm = "blake3"
            listen_addr = "0.0.0.0:8080"
            node_url = "ws://127.0.0.1:9944"
            connect_timeout_secs = 3
            request_timeout_secs = 5
            "#,
        )
        .expect("valid config");
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.hash_algorithm, HashAlgorithm::Blake3);
        assert_eq!(config.listen_addr, "0.0.0.0:8080".parse().expect("addr"));
        assert_eq!(config.node_url.as_deref(), Some("ws://127.0.0.1:9944"));
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn zero_batch_size_rejected() {
        assert_matches!(
            Config::from_toml_str("batch_size = 0"),
            Err(Error::InvalidConfig(_))
        );
    }

    #[test]
    fn zero_timeout_rejected() {
        assert_matches!(
            Config::from_toml_str("connect_timeout_secs = 0"),
            Err(Error::InvalidConfig(_))
        );
    }

    #[test]
    fn unknown_field_rejected() {
        assert_matches!(
            Config::from_toml_str("batchsize = 4"),
            Err(Error::InvalidConfig(_))
        );
    }

    #[test]
    fn unknown_algorithm_rejected() {
        assert_matches!(
            Config::from_toml_str(r#"hash_algorithm = "md5""#),
            Err(Error::InvalidConfig(_))
        );
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("headerproof.toml");
        std::fs::write(&path, "batch_size = 2\n").expect("write config");
        let config = Config::load(&path).expect("load");
        assert_eq!(config.batch_size, 2);

        assert_matches!(
            Config::load(dir.path().join("missing.toml")),
            Err(Error::InvalidConfig(_))
        );
    }
}
