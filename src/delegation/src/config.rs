//! Engine configuration loading and validation

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Complete engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub cache: CacheConfig,

    /// Validity window of verification proofs
    #[serde(default = "default_proof_validity")]
    pub proof_validity_secs: u64,

    /// Upper bound on parent hops while building a chain
    #[serde(default = "default_max_chain_hops")]
    pub max_chain_hops: usize,

    /// Deadline for one verify/issue/revoke operation
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_ms: u64,

    /// Longest lifetime an issued delegation may have
    #[serde(default)]
    pub max_token_ttl_secs: Option<u64>,
}

/// Chain cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Time-to-live of cached chains, both tiers
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    /// Maximum entries held by the local tier
    #[serde(default = "default_local_capacity")]
    pub local_capacity: usize,

    /// Prefix for keys written to the primary tier
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

// Default value functions
fn default_proof_validity() -> u64 { 3600 }
fn default_max_chain_hops() -> usize { 64 }
fn default_operation_timeout() -> u64 { 5000 }
fn default_cache_ttl() -> u64 { 300 }
fn default_local_capacity() -> usize { 10_000 }
fn default_key_prefix() -> String { "delegation:chain:".to_string() }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
            local_capacity: default_local_capacity(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            proof_validity_secs: default_proof_validity(),
            max_chain_hops: default_max_chain_hops(),
            operation_timeout_ms: default_operation_timeout(),
            max_token_ttl_secs: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .context("Failed to read configuration file")?;

        Self::from_toml(&contents)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(contents).context("Failed to parse configuration file")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.cache.ttl_secs == 0 {
            anyhow::bail!("cache.ttl_secs must be greater than zero");
        }

        if self.cache.local_capacity == 0 {
            anyhow::bail!("cache.local_capacity must be greater than zero");
        }

        if self.proof_validity_secs == 0 {
            anyhow::bail!("proof_validity_secs must be greater than zero");
        }

        if self.max_chain_hops == 0 {
            anyhow::bail!("max_chain_hops must be greater than zero");
        }

        if self.operation_timeout_ms == 0 {
            anyhow::bail!("operation_timeout_ms must be greater than zero");
        }

        if self.max_token_ttl_secs == Some(0) {
            anyhow::bail!("max_token_ttl_secs must be greater than zero when set");
        }

        Ok(())
    }

    pub fn proof_validity(&self) -> Duration {
        Duration::from_secs(self.proof_validity_secs)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.proof_validity(), Duration::from_secs(3600));
        assert_eq!(config.cache.key_prefix, "delegation:chain:");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = EngineConfig::from_toml(
            r#"
            max_chain_hops = 16

            [cache]
            ttl_secs = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.max_chain_hops, 16);
        assert_eq!(config.cache.ttl_secs, 30);
        assert_eq!(config.cache.local_capacity, 10_000);
        assert_eq!(config.operation_timeout_ms, 5000);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(EngineConfig::from_toml("max_chain_hops = 0").is_err());
        assert!(EngineConfig::from_toml("[cache]\nttl_secs = 0").is_err());
        assert!(EngineConfig::from_toml("max_token_ttl_secs = 0").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "proof_validity_secs = 600").unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.proof_validity_secs, 600);

        assert!(EngineConfig::load("/nonexistent/engine.toml").is_err());
    }
}
