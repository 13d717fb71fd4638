// Lets `#[flavor_plugin]` expansions name this crate as `::chainsim` from inside it
extern crate self as chainsim;

// Core infrastructure
pub mod core {
    pub mod errors;
}

pub mod config;
pub mod coord;
pub mod executor;
pub mod flavor;  // Connector traits, registry and loader
pub mod flavors; // Bundled chain implementations
pub mod host;
pub mod rpc;

pub use crate::core::errors::{ChainsimError, ConnectorError, Result};
pub use chainsim_macros::flavor_plugin;
pub use config::{ConnectorOptions, HostConfig};
pub use coord::{AdmissionPermit, ConcurrencyPolicy, CoordinatorState, RequestCoordinator};
pub use executor::{Executor, MethodTable};
pub use flavor::{Connector, FlavorLoader, FlavorRegistry, LegacyConnector};
pub use host::{ChainHost, StartupState};

/// Load a connector through the [`process_loader`](flavor::process_loader).
///
/// At most one connector is live per process: a second call returns
/// `AlreadyLoaded`. Must be called from within a tokio runtime.
pub fn load_connector(options: &ConnectorOptions) -> Result<ChainHost> {
    flavor::process_loader().load_options(options)
}
