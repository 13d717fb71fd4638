//! Static flavor descriptions and the plugin slice

use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::config::ConnectorOptions;
use crate::core::errors::{ChainsimError, Result};
use crate::flavor::connector::Connector;

/// Builds a not-yet-connected connector from the caller's options
pub type ConnectorFactory = fn(&ConnectorOptions) -> Result<Box<dyn Connector>>;

/// Where a flavor's RPC server listens unless told otherwise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServerDefaults {
    pub rpc_endpoint: &'static str,
    pub port: u16,
}

impl ServerDefaults {
    pub const fn new(rpc_endpoint: &'static str, port: u16) -> Self {
        Self { rpc_endpoint, port }
    }
}

/// Capability-bearing description of one chain implementation
pub struct FlavorDescriptor {
    /// Canonical, process-wide unique id
    pub id: &'static str,
    /// Other names the flavor answers to
    pub aliases: &'static [&'static str],
    pub factory: ConnectorFactory,
    /// JSON schema the options must satisfy, if the flavor publishes one
    pub option_schema: Option<fn() -> Value>,
    pub server_defaults: ServerDefaults,
}

impl FlavorDescriptor {
    pub fn answers_to(&self, name: &str) -> bool {
        self.id == name || self.aliases.contains(&name)
    }

    /// Check `options` against the flavor's option schema
    pub fn validate_options(&self, options: &ConnectorOptions) -> Result<()> {
        let Some(schema_fn) = self.option_schema else {
            return Ok(());
        };
        let schema = schema_fn();
        let validator = jsonschema::validator_for(&schema).map_err(|e| {
            ChainsimError::flavor_malformed(self.id, format!("invalid option schema: {}", e))
        })?;
        let errors: Vec<String> = validator
            .iter_errors(options.as_value())
            .map(|e| e.to_string())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ChainsimError::InvalidOptions {
                flavor: self.id.to_string(),
                errors,
            })
        }
    }

    /// Validate options and build the connector
    pub fn instantiate(&self, options: &ConnectorOptions) -> Result<Box<dyn Connector>> {
        self.validate_options(options)?;
        (self.factory)(options)
    }
}

impl fmt::Debug for FlavorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlavorDescriptor")
            .field("id", &self.id)
            .field("aliases", &self.aliases)
            .field("server_defaults", &self.server_defaults)
            .finish_non_exhaustive()
    }
}

/// What an installed plugin package exports.
///
/// Plugins may export their descriptor directly or nest it under a `default`
/// module; both conventions are accepted, the nested one taking precedence.
#[derive(Debug)]
pub struct PluginModule {
    pub package: &'static str,
    pub descriptor: Option<&'static FlavorDescriptor>,
    pub default: Option<&'static PluginModule>,
}

impl PluginModule {
    pub const fn direct(package: &'static str, descriptor: &'static FlavorDescriptor) -> Self {
        Self {
            package,
            descriptor: Some(descriptor),
            default: None,
        }
    }

    pub const fn nested(package: &'static str, default: &'static PluginModule) -> Self {
        Self {
            package,
            descriptor: None,
            default: Some(default),
        }
    }

    /// The descriptor this module exports, if it exports one at all
    pub fn exported(&self) -> Option<&'static FlavorDescriptor> {
        match self.default {
            Some(inner) => inner.descriptor,
            None => self.descriptor,
        }
    }
}

// Plugin registration at link time; see `#[flavor_plugin]`.
#[linkme::distributed_slice]
pub static FLAVOR_PLUGINS: [PluginModule] = [..];
