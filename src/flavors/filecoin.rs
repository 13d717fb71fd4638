//! Filecoin-compatible simulator.
//!
//! Shipped as the `chainsim-filecoin` plugin package, nested under a default
//! export and still written against the `initialize` connector shape, so
//! loading it goes through alias rewriting, plugin lookup and the legacy
//! bridge.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};
use tracing::info;

use crate::config::ConnectorOptions;
use crate::core::errors::{ChainsimError, ConnectorError, Result};
use crate::executor::MethodTable;
use crate::flavor::LegacyConnector;
use crate::flavor_plugin;

pub const FLAVOR: &str = "filecoin";
pub const PACKAGE: &str = "chainsim-filecoin";

const DEFAULT_TOTAL_ACCOUNTS: u64 = 10;
pub const MAX_TOTAL_ACCOUNTS: u64 = 1000;
const DEFAULT_BALANCE: &str = "500000000000000000000000";

fn option_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "flavor": { "type": "string" },
            "chain": {
                "type": "object",
                "properties": {
                    "asyncRequestProcessing": { "type": "boolean" },
                    "networkName": { "type": "string" }
                }
            },
            "wallet": {
                "type": "object",
                "properties": {
                    "totalAccounts": { "type": "integer", "minimum": 1, "maximum": MAX_TOTAL_ACCOUNTS },
                    "defaultBalance": { "type": "string", "pattern": "^[0-9]+$" }
                }
            }
        }
    })
}

#[derive(Debug, Clone)]
struct Tipset {
    height: u64,
    cids: Vec<String>,
}

impl Tipset {
    fn at(height: u64) -> Self {
        Self {
            height,
            cids: vec![format!("bafy2bzace{:050x}", height)],
        }
    }

    fn to_json(&self) -> Value {
        json!({
            "Cids": self.cids.iter().map(|cid| json!({ "/": cid })).collect::<Vec<_>>(),
            "Height": self.height,
        })
    }
}

#[flavor_plugin(
    id = "filecoin",
    package = "chainsim-filecoin",
    aliases = "fil",
    packaging = "default",
    legacy,
    rpc_endpoint = "/rpc/v0",
    port = 7777,
    schema = "option_schema"
)]
pub struct FilecoinConnector {
    network_name: String,
    accounts: Vec<String>,
    default_balance: String,
    methods: MethodTable,
    head: RwLock<Option<Tipset>>,
}

impl FilecoinConnector {
    pub fn new(options: &ConnectorOptions) -> Result<Self> {
        let network_name = options
            .section("chain")
            .and_then(|chain| chain.get("networkName"))
            .and_then(Value::as_str)
            .unwrap_or("chainsim")
            .to_string();
        let wallet = options.section("wallet");
        let total_accounts = wallet
            .and_then(|w| w.get("totalAccounts"))
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TOTAL_ACCOUNTS);
        if total_accounts > MAX_TOTAL_ACCOUNTS {
            return Err(ChainsimError::InvalidOptions {
                flavor: FLAVOR.to_string(),
                errors: vec![format!(
                    "wallet.totalAccounts must be at most {}",
                    MAX_TOTAL_ACCOUNTS
                )],
            });
        }
        let default_balance = wallet
            .and_then(|w| w.get("defaultBalance"))
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_BALANCE)
            .to_string();

        Ok(Self {
            network_name,
            accounts: (1..=total_accounts).map(|i| format!("t3{:040x}", i)).collect(),
            default_balance,
            methods: MethodTable::new([
                "Filecoin.Version",
                "Filecoin.ChainHead",
                "Filecoin.WalletList",
                "Filecoin.WalletDefaultAddress",
                "Filecoin.WalletBalance",
                "Chainsim.MineTipset",
            ]),
            head: RwLock::new(None),
        })
    }

    fn head(&self) -> std::result::Result<Tipset, ConnectorError> {
        self.head
            .read()
            .clone()
            .ok_or_else(|| ConnectorError::server("chain is not initialized"))
    }
}

#[async_trait]
impl LegacyConnector for FilecoinConnector {
    fn flavor(&self) -> &str {
        FLAVOR
    }

    async fn initialize(&self) -> std::result::Result<(), ConnectorError> {
        *self.head.write() = Some(Tipset::at(0));
        info!(
            network = %self.network_name,
            accounts = self.accounts.len(),
            "Filecoin simulator ready"
        );
        Ok(())
    }

    fn methods(&self) -> &MethodTable {
        &self.methods
    }

    async fn handle(&self, method: &str, params: Value) -> std::result::Result<Value, ConnectorError> {
        match method {
            "Filecoin.Version" => Ok(json!({
                "Version": format!("chainsim/v{}/filecoin", env!("CARGO_PKG_VERSION")),
                "APIVersion": 0,
                "BlockDelay": 0,
            })),
            "Filecoin.ChainHead" => Ok(self.head()?.to_json()),
            "Filecoin.WalletList" => Ok(json!(self.accounts)),
            "Filecoin.WalletDefaultAddress" => self
                .accounts
                .first()
                .map(|address| json!(address))
                .ok_or_else(|| ConnectorError::server("wallet has no addresses")),
            "Filecoin.WalletBalance" => {
                let address = params
                    .get(0)
                    .and_then(Value::as_str)
                    .ok_or_else(|| ConnectorError::invalid_params("missing address"))?;
                if self.accounts.iter().any(|a| a == address) {
                    Ok(json!(self.default_balance))
                } else {
                    Ok(json!("0"))
                }
            }
            "Chainsim.MineTipset" => {
                let mut head = self.head.write();
                let next = match head.as_ref() {
                    Some(tipset) => Tipset::at(tipset.height + 1),
                    None => return Err(ConnectorError::server("chain is not initialized")),
                };
                let json = next.to_json();
                *head = Some(next);
                Ok(json)
            }
            other => Err(ConnectorError::new(
                crate::core::errors::METHOD_NOT_FOUND_CODE,
                format!("The method {} does not exist/is not available", other),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flavor::{Connector, LegacyConnectorAdapter};

    #[tokio::test]
    async fn test_chain_head_advances() {
        let connector = FilecoinConnector::new(&ConnectorOptions::for_flavor(FLAVOR)).unwrap();
        assert!(connector.handle("Filecoin.ChainHead", json!([])).await.is_err());

        connector.initialize().await.unwrap();
        let head = connector.handle("Filecoin.ChainHead", json!([])).await.unwrap();
        assert_eq!(head["Height"], json!(0));

        let mined = connector.handle("Chainsim.MineTipset", json!([])).await.unwrap();
        assert_eq!(mined["Height"], json!(1));
        let head = connector.handle("Filecoin.ChainHead", json!([])).await.unwrap();
        assert_eq!(head, mined);
    }

    #[tokio::test]
    async fn test_wallet() {
        let options = ConnectorOptions::new(json!({
            "flavor": "filecoin",
            "wallet": { "totalAccounts": 2, "defaultBalance": "42" }
        }));
        let connector = LegacyConnectorAdapter::new(FilecoinConnector::new(&options).unwrap());
        connector.connect().await.unwrap();

        let list = connector.handle("Filecoin.WalletList", json!([])).await.unwrap();
        assert_eq!(list.as_array().map(Vec::len), Some(2));
        let default = connector
            .handle("Filecoin.WalletDefaultAddress", json!([]))
            .await
            .unwrap();
        assert_eq!(default, list[0]);
        let balance = connector
            .handle("Filecoin.WalletBalance", json!([default]))
            .await
            .unwrap();
        assert_eq!(balance, json!("42"));
    }

    #[test]
    fn test_registered_with_nested_packaging() {
        let module = crate::flavor::FLAVOR_PLUGINS
            .iter()
            .find(|module| module.package == PACKAGE)
            .unwrap();
        assert!(module.descriptor.is_none());
        let descriptor = module.exported().unwrap();
        assert_eq!(descriptor.id, FLAVOR);
        assert!(descriptor.answers_to("fil"));
        assert_eq!(descriptor.server_defaults.rpc_endpoint, "/rpc/v0");
        assert_eq!(descriptor.server_defaults.port, 7777);
    }

    #[test]
    fn test_total_accounts_is_capped() {
        let descriptor = crate::flavor::FLAVOR_PLUGINS
            .iter()
            .find_map(|module| module.exported().filter(|d| d.id == FLAVOR))
            .unwrap();
        let too_many = ConnectorOptions::new(json!({ "wallet": { "totalAccounts": MAX_TOTAL_ACCOUNTS + 1 } }));
        assert!(matches!(
            descriptor.validate_options(&too_many),
            Err(ChainsimError::InvalidOptions { .. })
        ));
        assert!(matches!(
            FilecoinConnector::new(&too_many),
            Err(ChainsimError::InvalidOptions { .. })
        ));
    }

    #[test]
    fn test_schema_rejects_numeric_balance() {
        let descriptor = crate::flavor::FLAVOR_PLUGINS
            .iter()
            .find_map(|module| module.exported().filter(|d| d.id == FLAVOR))
            .unwrap();
        let bad = ConnectorOptions::new(json!({ "wallet": { "defaultBalance": 5 } }));
        assert!(descriptor.validate_options(&bad).is_err());
    }
}
