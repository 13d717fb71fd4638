//! A loaded flavor: connector, executor and startup signal

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::coord::RequestCoordinator;
use crate::core::errors::{ChainsimError, Result};
use crate::executor::Executor;
use crate::flavor::{Connector, FlavorDescriptor, ServerDefaults};
use crate::rpc::{JsonRpcRequest, JsonRpcResponse};

/// Progress of the connector's asynchronous startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupState {
    Connecting,
    Ready,
    Failed(String),
}

/// Handle to a running flavor.
///
/// Requests may be submitted as soon as the host exists; they wait in the
/// coordinator until the connector has finished connecting.
pub struct ChainHost {
    descriptor: &'static FlavorDescriptor,
    package: Option<&'static str>,
    connector: Arc<dyn Connector>,
    executor: Executor,
    startup: watch::Receiver<StartupState>,
}

impl ChainHost {
    pub(crate) fn new(
        descriptor: &'static FlavorDescriptor,
        package: Option<&'static str>,
        connector: Arc<dyn Connector>,
        executor: Executor,
        startup: watch::Receiver<StartupState>,
    ) -> Self {
        Self {
            descriptor,
            package,
            connector,
            executor,
            startup,
        }
    }

    /// Canonical id of the hosted flavor
    pub fn flavor(&self) -> &'static str {
        self.descriptor.id
    }

    pub fn descriptor(&self) -> &'static FlavorDescriptor {
        self.descriptor
    }

    /// Plugin package the flavor came from; `None` for static flavors
    pub fn package(&self) -> Option<&'static str> {
        self.package
    }

    pub fn server_defaults(&self) -> ServerDefaults {
        self.descriptor.server_defaults
    }

    pub fn connector(&self) -> &dyn Connector {
        self.connector.as_ref()
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn coordinator(&self) -> &RequestCoordinator {
        self.executor.coordinator()
    }

    pub fn startup_state(&self) -> StartupState {
        self.startup.borrow().clone()
    }

    /// Wait until the connector has connected.
    ///
    /// Resolves with `StartupFailed` if connecting failed.
    pub async fn ready(&self) -> Result<()> {
        let mut startup = self.startup.clone();
        let state = startup
            .wait_for(|state| *state != StartupState::Connecting)
            .await
            .map_err(|_| ChainsimError::internal("startup task ended without reporting"))?
            .clone();
        match state {
            StartupState::Ready => Ok(()),
            StartupState::Failed(message) => Err(ChainsimError::startup_failed(message)),
            StartupState::Connecting => Err(ChainsimError::internal("startup still in progress")),
        }
    }

    /// Run one method through the executor
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        self.executor
            .execute(self.connector.as_ref(), method, params)
            .await
    }

    /// Run a JSON-RPC request, turning every failure into an error response
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = Arc::clone(&request.id);
        if request.jsonrpc != crate::rpc::JSONRPC_VERSION {
            return JsonRpcResponse::error(
                crate::rpc::INVALID_REQUEST_CODE,
                format!("unsupported jsonrpc version: {}", request.jsonrpc),
                id,
            );
        }
        let params = request.params_or_empty();
        match self.request(&request.method, params).await {
            Ok(result) => JsonRpcResponse::success(result, id),
            Err(err) => {
                debug!(method = %request.method, error = %err, "Request failed");
                JsonRpcResponse::from_error(&err, id)
            }
        }
    }

    /// Stop admitting requests. Queued requests fail; in-flight ones finish.
    pub fn shutdown(&self) {
        info!(flavor = self.flavor(), "Shutting down chain host");
        self.coordinator().stop();
    }
}

impl fmt::Debug for ChainHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainHost")
            .field("flavor", &self.descriptor.id)
            .field("package", &self.package)
            .field("coordinator", self.coordinator())
            .field("startup", &*self.startup.borrow())
            .finish()
    }
}
