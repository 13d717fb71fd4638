//! Bridge for running legacy `initialize`-style connectors through the
//! `Connector` trait

use async_trait::async_trait;
use serde_json::Value;

use crate::core::errors::ConnectorError;
use crate::executor::MethodTable;
use crate::flavor::connector::{Connector, LegacyConnector};

/// Wrapper to adapt a [`LegacyConnector`] to [`Connector`].
///
/// `connect` forwards to `initialize`; everything else passes straight through.
pub struct LegacyConnectorAdapter<L> {
    legacy: L,
}

impl<L: LegacyConnector> LegacyConnectorAdapter<L> {
    pub fn new(legacy: L) -> Self {
        Self { legacy }
    }

    pub fn inner(&self) -> &L {
        &self.legacy
    }
}

#[async_trait]
impl<L: LegacyConnector> Connector for LegacyConnectorAdapter<L> {
    fn flavor(&self) -> &str {
        self.legacy.flavor()
    }

    async fn connect(&self) -> Result<(), ConnectorError> {
        tracing::warn!(
            flavor = self.legacy.flavor(),
            "Connector only implements the deprecated `initialize`; starting it through the legacy bridge"
        );
        self.legacy.initialize().await
    }

    fn methods(&self) -> &MethodTable {
        self.legacy.methods()
    }

    async fn handle(&self, method: &str, params: Value) -> Result<Value, ConnectorError> {
        self.legacy.handle(method, params).await
    }
}
