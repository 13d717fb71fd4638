//! Connector options and host configuration
//!
//! [`ConnectorOptions`] is the flavor's own option tree; the core only reads
//! the flavor name and the request-processing flag from it. [`HostConfig`]
//! wraps it with logging, admission and plugin-manifest settings and loads
//! from JSON or YAML files.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::coord::ConcurrencyPolicy;
use crate::core::errors::{ChainsimError, Result};

/// Flavor used when the options do not name one
pub const DEFAULT_FLAVOR: &str = "ethereum";

const ASYNC_REQUEST_PROCESSING: &str = "asyncRequestProcessing";

/// Flavor-specific options.
///
/// The structure belongs to the flavor. The core reads only the `flavor` name
/// and the `asyncRequestProcessing` flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectorOptions(Value);

impl Default for ConnectorOptions {
    fn default() -> Self {
        Self(json!({
            "flavor": DEFAULT_FLAVOR,
            "chain": { ASYNC_REQUEST_PROCESSING: true }
        }))
    }
}

impl ConnectorOptions {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Options selecting `flavor` with everything else left to the flavor
    pub fn for_flavor(flavor: impl Into<String>) -> Self {
        Self(json!({ "flavor": flavor.into() }))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Named flavor; empty strings count as absent
    pub fn flavor(&self) -> Option<&str> {
        self.0
            .get("flavor")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
    }

    /// Named flavor, falling back to [`DEFAULT_FLAVOR`]
    pub fn flavor_or_default(&self) -> &str {
        self.flavor().unwrap_or(DEFAULT_FLAVOR)
    }

    /// A nested option group such as `chain` or `wallet`
    pub fn section(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Whether requests may be processed concurrently.
    ///
    /// `chain.asyncRequestProcessing` wins over a top-level
    /// `asyncRequestProcessing`; without either the answer is `true`.
    pub fn async_request_processing(&self) -> bool {
        let nested = self
            .section("chain")
            .and_then(|chain| chain.get(ASYNC_REQUEST_PROCESSING));
        let top_level = self.0.get(ASYNC_REQUEST_PROCESSING);

        for candidate in [nested, top_level].into_iter().flatten() {
            match candidate.as_bool() {
                Some(flag) => return flag,
                None => tracing::warn!(
                    value = %candidate,
                    "Ignoring non-boolean asyncRequestProcessing option"
                ),
            }
        }
        true
    }

    pub fn concurrency_policy(&self) -> ConcurrencyPolicy {
        ConcurrencyPolicy::from_async_processing(self.async_request_processing())
    }

    /// Select `flavor`, keeping every other option
    pub fn with_flavor(mut self, flavor: impl Into<String>) -> Self {
        if !self.0.is_object() {
            self.0 = json!({});
        }
        self.0["flavor"] = Value::String(flavor.into());
        self
    }

    /// Set `chain.asyncRequestProcessing`
    pub fn with_async_request_processing(mut self, enabled: bool) -> Self {
        if !self.0.is_object() {
            self.0 = json!({});
        }
        let root = &mut self.0;
        if !root.get("chain").map_or(false, Value::is_object) {
            root["chain"] = json!({});
        }
        root["chain"][ASYNC_REQUEST_PROCESSING] = Value::Bool(enabled);
        self
    }
}

/// Configuration for hosting one flavor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Options handed to the flavor
    pub options: ConnectorOptions,
    /// Maximum tracing level (`error`, `warn`, `info`, `debug`, `trace`)
    pub log_level: String,
    /// Only log errors
    pub quiet: bool,
    /// Explicit bound on concurrent requests; `0` means unbounded.
    /// Overrides `asyncRequestProcessing` when set.
    pub request_limit: Option<usize>,
    /// Extra plugin aliases and disabled packages
    pub plugin_manifest: Option<PathBuf>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            options: ConnectorOptions::default(),
            log_level: "info".to_string(),
            quiet: false,
            request_limit: None,
            plugin_manifest: None,
        }
    }
}

impl HostConfig {
    /// Create a new builder for HostConfig
    pub fn builder() -> HostConfigBuilder {
        HostConfigBuilder::new()
    }

    /// Load from a `.json`, `.yaml` or `.yml` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ChainsimError::io(format!("read {}", path.display()), e))?;
        let config: Self = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&contents)?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&contents)?,
            other => {
                return Err(ChainsimError::configuration_field(
                    format!("unsupported config file extension: {:?}", other),
                    "path",
                ))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.options.as_value().is_object() {
            return Err(ChainsimError::configuration_field(
                "options must be an object",
                "options",
            ));
        }
        if self
            .options
            .as_value()
            .get("flavor")
            .map_or(false, |flavor| !flavor.is_string())
        {
            return Err(ChainsimError::configuration_field(
                "flavor must be a string",
                "options.flavor",
            ));
        }
        self.tracing_level()?;
        Ok(())
    }

    /// Level the tracing subscriber should be installed with
    pub fn tracing_level(&self) -> Result<tracing::Level> {
        if self.quiet {
            return Ok(tracing::Level::ERROR);
        }
        tracing::Level::from_str(&self.log_level).map_err(|_| {
            ChainsimError::configuration_field(
                format!("unknown log level: {}", self.log_level),
                "log_level",
            )
        })
    }

    /// Admission policy, honouring `request_limit` before the options
    pub fn concurrency_policy(&self) -> ConcurrencyPolicy {
        match self.request_limit {
            Some(limit) => ConcurrencyPolicy::from_limit(limit),
            None => self.options.concurrency_policy(),
        }
    }
}

/// Builder for HostConfig
pub struct HostConfigBuilder {
    config: HostConfig,
}

impl HostConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: HostConfig::default(),
        }
    }

    pub fn options(mut self, options: ConnectorOptions) -> Self {
        self.config.options = options;
        self
    }

    /// Select a flavor, keeping the other options
    pub fn flavor(mut self, flavor: impl Into<String>) -> Self {
        self.config.options = self.config.options.with_flavor(flavor);
        self
    }

    pub fn async_request_processing(mut self, enabled: bool) -> Self {
        self.config.options = self.config.options.with_async_request_processing(enabled);
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.log_level = level.into();
        self
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.config.quiet = quiet;
        self
    }

    pub fn request_limit(mut self, limit: usize) -> Self {
        self.config.request_limit = Some(limit);
        self
    }

    pub fn plugin_manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.plugin_manifest = Some(path.into());
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<HostConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for HostConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
