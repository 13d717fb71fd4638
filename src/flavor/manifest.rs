//! Plugin manifest: declared alias rewrites and disabled packages

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::core::errors::{ChainsimError, Result};

/// Declarative additions to the flavor registry.
///
/// ```yaml
/// aliases:
///   tezos: chainsim-tezos
/// disabled:
///   - chainsim-filecoin
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginManifest {
    /// Short flavor name -> package name
    pub aliases: BTreeMap<String, String>,
    /// Packages that must not be resolved even when linked in
    pub disabled: Vec<String>,
}

impl PluginManifest {
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn from_json_str(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Load from a `.json`, `.yaml` or `.yml` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ChainsimError::io(format!("read {}", path.display()), e))?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&contents),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&contents),
            other => Err(ChainsimError::configuration_field(
                format!("unsupported manifest extension: {:?}", other),
                "plugin_manifest",
            )),
        }
    }
}
