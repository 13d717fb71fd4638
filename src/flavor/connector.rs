//! Connector traits implemented once per flavor

use async_trait::async_trait;
use serde_json::Value;

use crate::core::errors::ConnectorError;
use crate::executor::MethodTable;

/// Runtime object owning one flavor's chain state.
///
/// The core only relies on two operations: [`connect`](Connector::connect),
/// called once before any request is admitted, and
/// [`handle`](Connector::handle), called for every admitted request. Under the
/// unbounded policy `handle` may run concurrently and the connector is
/// responsible for its own consistency.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Canonical flavor id this connector serves
    fn flavor(&self) -> &str;

    /// Become ready to accept requests
    async fn connect(&self) -> Result<(), ConnectorError>;

    /// Methods this connector serves
    fn methods(&self) -> &MethodTable;

    /// Handle one request
    async fn handle(&self, method: &str, params: Value) -> Result<Value, ConnectorError>;
}

/// Older connector shape exposing `initialize` instead of `connect`.
///
/// Deprecated: kept so that plugins built against it keep loading. Wrap it in
/// [`LegacyConnectorAdapter`](crate::flavor::LegacyConnectorAdapter) to use it
/// as a [`Connector`].
#[async_trait]
pub trait LegacyConnector: Send + Sync {
    fn flavor(&self) -> &str;

    async fn initialize(&self) -> Result<(), ConnectorError>;

    fn methods(&self) -> &MethodTable;

    async fn handle(&self, method: &str, params: Value) -> Result<Value, ConnectorError>;
}
