//! Turns connector options into a running [`ChainHost`]

use futures::FutureExt;
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::{ConnectorOptions, HostConfig};
use crate::coord::{ConcurrencyPolicy, RequestCoordinator};
use crate::core::errors::{ChainsimError, ConnectorError, Result};
use crate::executor::Executor;
use crate::flavor::registry::{FlavorRegistry, Resolution};
use crate::host::{ChainHost, StartupState};

lazy_static::lazy_static! {
    static ref PROCESS_LOADER: FlavorLoader = FlavorLoader::new(Arc::new(FlavorRegistry::new()));
}

/// The loader owning the process's single live connector.
///
/// Backed by a registry of every linked flavor; apply a manifest through
/// [`FlavorLoader::registry`] before loading.
pub fn process_loader() -> &'static FlavorLoader {
    &PROCESS_LOADER
}

/// Loads one flavor per instance.
///
/// Embedders that need isolated hosts (tests, multi-chain tooling) build their
/// own; everything else goes through [`process_loader`].
pub struct FlavorLoader {
    registry: Arc<FlavorRegistry>,
    loaded: Mutex<Option<String>>,
}

impl FlavorLoader {
    pub fn new(registry: Arc<FlavorRegistry>) -> Self {
        Self {
            registry,
            loaded: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &FlavorRegistry {
        &self.registry
    }

    /// Load the flavor named by `config`, honouring its request limit
    pub fn load(&self, config: &HostConfig) -> Result<ChainHost> {
        self.load_with_policy(&config.options, config.concurrency_policy())
    }

    /// Load the flavor named by `options`
    pub fn load_options(&self, options: &ConnectorOptions) -> Result<ChainHost> {
        self.load_with_policy(options, options.concurrency_policy())
    }

    /// Resolve, instantiate and start connecting a flavor.
    ///
    /// Returns as soon as the connector exists. Connecting runs on a spawned
    /// task; the coordinator starts blocked and opens once `connect` succeeds,
    /// so requests submitted in the meantime queue up. Must be called from
    /// within a tokio runtime.
    pub fn load_with_policy(
        &self,
        options: &ConnectorOptions,
        policy: ConcurrencyPolicy,
    ) -> Result<ChainHost> {
        let mut loaded = self.loaded.lock();
        if let Some(flavor) = loaded.as_ref() {
            return Err(ChainsimError::AlreadyLoaded {
                flavor: flavor.clone(),
            });
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ChainsimError::internal(format!("loading a flavor requires a tokio runtime: {}", e)))?;

        let flavor = options.flavor_or_default();
        let resolution = self.registry.resolve(flavor)?;
        let descriptor = resolution.descriptor();
        let package = match resolution {
            Resolution::Static(_) => None,
            Resolution::Plugin { package, .. } => Some(package),
        };
        let connector: Arc<dyn crate::flavor::Connector> = Arc::from(descriptor.instantiate(options)?);

        let coordinator = RequestCoordinator::new(policy);
        let executor = Executor::new(coordinator.clone());
        let (startup_tx, startup_rx) = watch::channel(StartupState::Connecting);

        info!(
            flavor = descriptor.id,
            package = package.unwrap_or("<static>"),
            policy = %policy,
            "Loading flavor"
        );

        let gate = coordinator.gate();
        let starting = Arc::clone(&connector);
        runtime.spawn(async move {
            // A panicking connect must still fail the waiters
            let outcome = AssertUnwindSafe(starting.connect())
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(ConnectorError::server(format!(
                        "connector panicked while connecting: {}",
                        panic_message(panic.as_ref())
                    )))
                });
            match outcome {
                Ok(()) => {
                    if let Err(e) = gate.resume() {
                        warn!(error = %e, "Connector started after the coordinator was stopped");
                    }
                    let _ = startup_tx.send(StartupState::Ready);
                }
                Err(e) => {
                    error!(flavor = starting.flavor(), error = %e, "Connector failed to start");
                    coordinator.reject_pending(e.message.clone());
                    let _ = startup_tx.send(StartupState::Failed(e.message));
                }
            }
        });

        *loaded = Some(descriptor.id.to_string());
        Ok(ChainHost::new(descriptor, package, connector, executor, startup_rx))
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
