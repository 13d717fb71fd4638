//! Executor - the single entry point for running a method against a connector
//!
//! Every call goes through the same three steps: the method is checked against
//! the connector's [`MethodTable`], an admission slot is taken from the
//! [`RequestCoordinator`], and the connector handles the request. The slot is
//! held by an [`AdmissionPermit`](crate::coord::AdmissionPermit) that is
//! dropped on every exit path.

use serde_json::Value;
use std::collections::BTreeSet;
use tracing::debug;

use crate::coord::RequestCoordinator;
use crate::core::errors::{ChainsimError, Result};
use crate::flavor::Connector;

/// Methods a connector is willing to serve
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodTable {
    allowed: BTreeSet<String>,
    disallowed: BTreeSet<String>,
}

impl MethodTable {
    pub fn new<I, S>(methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: methods.into_iter().map(Into::into).collect(),
            disallowed: BTreeSet::new(),
        }
    }

    /// Mark a method as known but never callable
    pub fn disallow(mut self, method: impl Into<String>) -> Self {
        let method = method.into();
        self.allowed.remove(&method);
        self.disallowed.insert(method);
        self
    }

    pub fn contains(&self, method: &str) -> bool {
        self.allowed.contains(method) && !is_internal(method)
    }

    /// Callable methods in name order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.allowed
            .iter()
            .map(String::as_str)
            .filter(|name| !is_internal(name))
    }

    pub fn len(&self) -> usize {
        self.names().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Safety check run before a request may take an admission slot
    pub fn check(&self, method: &str) -> Result<()> {
        if self.disallowed.contains(method) {
            return Err(ChainsimError::method_not_allowed(method));
        }
        if !self.contains(method) {
            return Err(ChainsimError::method_not_found(method));
        }
        Ok(())
    }
}

// Underscore-prefixed names are reserved for connector internals.
fn is_internal(method: &str) -> bool {
    method.is_empty() || method.starts_with('_')
}

/// Stateless front of the request coordinator
#[derive(Clone, Debug)]
pub struct Executor {
    coordinator: RequestCoordinator,
}

impl Executor {
    pub fn new(coordinator: RequestCoordinator) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &RequestCoordinator {
        &self.coordinator
    }

    /// Run `method` on `connector`.
    ///
    /// Unknown or disallowed methods are rejected before admission and never
    /// occupy a slot. The connector's result or error is returned unchanged;
    /// nothing is retried.
    pub async fn execute(
        &self,
        connector: &dyn Connector,
        method: &str,
        params: Value,
    ) -> Result<Value> {
        connector.methods().check(method)?;

        let permit = self.coordinator.admit().await?;
        debug!(
            flavor = connector.flavor(),
            method,
            ticket = permit.ticket(),
            "Executing request"
        );
        let outcome = connector.handle(method, params).await;
        drop(permit);

        outcome.map_err(ChainsimError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::ConcurrencyPolicy;
    use crate::core::errors::ConnectorError;
    use async_trait::async_trait;
    use serde_json::json;

    struct Echo {
        methods: MethodTable,
    }

    #[async_trait]
    impl Connector for Echo {
        fn flavor(&self) -> &str {
            "echo"
        }

        async fn connect(&self) -> std::result::Result<(), ConnectorError> {
            Ok(())
        }

        fn methods(&self) -> &MethodTable {
            &self.methods
        }

        async fn handle(
            &self,
            method: &str,
            params: Value,
        ) -> std::result::Result<Value, ConnectorError> {
            match method {
                "fail" => Err(ConnectorError::server("boom")),
                _ => Ok(params),
            }
        }
    }

    fn echo() -> Echo {
        Echo {
            methods: MethodTable::new(["echo", "fail", "_secret", "admin_wipe"])
                .disallow("admin_wipe"),
        }
    }

    #[test]
    fn test_method_table_check() {
        let table = echo().methods;
        assert!(table.check("echo").is_ok());
        assert!(matches!(
            table.check("missing"),
            Err(ChainsimError::MethodNotFound { .. })
        ));
        assert!(matches!(
            table.check("_secret"),
            Err(ChainsimError::MethodNotFound { .. })
        ));
        assert!(matches!(
            table.check("admin_wipe"),
            Err(ChainsimError::MethodNotAllowed { .. })
        ));
        assert!(matches!(table.check(""), Err(ChainsimError::MethodNotFound { .. })));
        assert_eq!(table.names().collect::<Vec<_>>(), vec!["echo", "fail"]);
        assert_eq!(table.len(), 2);
    }

    #[tokio::test]
    async fn test_execute_returns_connector_result() {
        let coordinator = RequestCoordinator::new(ConcurrencyPolicy::Serialized);
        coordinator.resume().unwrap();
        let executor = Executor::new(coordinator);

        let value = executor
            .execute(&echo(), "echo", json!([1, 2]))
            .await
            .unwrap();
        assert_eq!(value, json!([1, 2]));
    }

    #[tokio::test]
    async fn test_rejected_method_never_takes_a_slot() {
        // Still blocked: a method that passed the check would hang here
        let coordinator = RequestCoordinator::new(ConcurrencyPolicy::Serialized);
        let executor = Executor::new(coordinator.clone());

        let err = executor
            .execute(&echo(), "admin_wipe", Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, ChainsimError::MethodNotAllowed { .. }));
        assert_eq!(coordinator.pending(), 0);
        assert_eq!(coordinator.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failure_releases_slot() {
        let coordinator = RequestCoordinator::new(ConcurrencyPolicy::Serialized);
        coordinator.resume().unwrap();
        let executor = Executor::new(coordinator.clone());

        let err = executor
            .execute(&echo(), "fail", Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, ChainsimError::Connector(ref e) if e.message == "boom"));
        assert_eq!(coordinator.in_flight(), 0);

        let value = executor.execute(&echo(), "echo", json!("ok")).await.unwrap();
        assert_eq!(value, json!("ok"));
    }
}
