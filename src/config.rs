//! Configuration management for Hivegate.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{RateLimitError, Result};
use crate::ratelimit::{
    RateLimiterFactory, RateLimiterOptions, RateLimiterRegistry, UnlimitedRegistry,
};

/// Prefix of environment variables overriding file settings.
const ENV_PREFIX: &str = "HIVEGATE";

/// Main configuration for Hivegate.
///
/// ```yaml
/// enabled: true
/// default:
///   tokens_per_timespan: 10
///   timespan: second
/// resources:
///   search-api:
///     tokens_per_timespan: 600
///     timespan: { unit: minute, count: 1 }
///     action_auto_release_timespan: 30000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// When false every resource gets an unlimited limiter
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Options for resources without their own entry
    #[serde(default)]
    pub default: Option<RateLimiterOptions>,

    /// Options per resource id
    #[serde(default)]
    pub resources: HashMap<String, RateLimiterOptions>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            default: None,
            resources: HashMap::new(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn scoped(scope: &str, err: RateLimitError) -> RateLimitError {
    match err {
        RateLimitError::Config(msg) => RateLimitError::Config(format!("{}: {}", scope, msg)),
        other => other,
    }
}

impl GateConfig {
    /// Load configuration from a file, with `HIVEGATE__*` environment overrides.
    ///
    /// The format follows the file extension (YAML, TOML or JSON).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limiter configuration");

        if !path.exists() {
            return Err(RateLimitError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("configuration file {} not found", path.display()),
            )));
        }

        let config: GateConfig = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| RateLimitError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: GateConfig = serde_yaml::from_str(yaml)
            .map_err(|e| RateLimitError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every options block.
    pub fn validate(&self) -> Result<()> {
        if let Some(default) = &self.default {
            default.validate().map_err(|e| scoped("default", e))?;
        }
        for (resource, options) in &self.resources {
            options
                .validate()
                .map_err(|e| scoped(&format!("resource '{}'", resource), e))?;
        }
        Ok(())
    }

    /// Options for a resource, falling back to the default block.
    pub fn options_for(&self, resource_id: &str) -> Option<&RateLimiterOptions> {
        self.resources.get(resource_id).or(self.default.as_ref())
    }

    /// Build the limiter factory this configuration asks for.
    pub fn build_factory(&self) -> Arc<dyn RateLimiterFactory> {
        if self.enabled {
            Arc::new(RateLimiterRegistry::new())
        } else {
            info!("Rate limiting disabled");
            Arc::new(UnlimitedRegistry::new())
        }
    }
}
