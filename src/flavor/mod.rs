//! Flavor loading
//!
//! A flavor is one chain implementation. The default flavor is linked
//! statically; every other flavor is a plugin package registered at link time
//! through [`FLAVOR_PLUGINS`] and looked up by name when it is loaded.

pub mod connector;
pub mod descriptor;
pub mod diagnostic;
pub mod legacy_bridge;
pub mod loader;
pub mod manifest;
pub mod registry;

pub use connector::{Connector, LegacyConnector};
pub use descriptor::{ConnectorFactory, FlavorDescriptor, PluginModule, ServerDefaults, FLAVOR_PLUGINS};
pub use diagnostic::{exit_on_fatal, exit_on_fatal_with, fatal_diagnostic};
pub use legacy_bridge::LegacyConnectorAdapter;
pub use loader::{process_loader, FlavorLoader};
pub use manifest::PluginManifest;
pub use registry::{FlavorRegistry, Resolution};
