// Bitcoin Core JSON-RPC client and extractor.
// Coinbase inputs carry no address; other inputs are resolved through the
// prevout that `getblock` verbosity 3 embeds.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::info;

use crate::blockchain::client::{ChainClient, ClientError, JsonRpcTransport};
use crate::blockchain::models::{BlockData, ExtractedBlock, ExtractedTransaction, TransactionData};
use crate::models::normalize_address;

/// `getblockhash`: block height out of range.
const RPC_INVALID_PARAMETER: i64 = -8;
/// `getrawtransaction`: no such mempool or blockchain transaction.
const RPC_INVALID_ADDRESS_OR_KEY: i64 = -5;

const SATOSHIS_PER_BTC: f64 = 100_000_000.0;

#[derive(Debug, Clone, Deserialize)]
pub struct BtcBlock {
    pub hash: String,
    pub height: u64,
    #[serde(default)]
    pub previousblockhash: Option<String>,
    pub time: i64,
    #[serde(default)]
    pub tx: Vec<BtcBlockTransaction>,
}

/// Verbosity 1 lists txids, 2 and 3 full transactions.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BtcBlockTransaction {
    Full(BtcTransaction),
    Id(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct BtcTransaction {
    pub txid: String,
    #[serde(default)]
    pub vin: Vec<BtcInput>,
    #[serde(default)]
    pub vout: Vec<BtcOutput>,
    #[serde(default)]
    pub blockhash: Option<String>,
    #[serde(default)]
    pub blocktime: Option<i64>,
    /// Not part of the RPC payload; filled in by the client.
    #[serde(skip)]
    pub block_height: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BtcInput {
    #[serde(default)]
    pub coinbase: Option<String>,
    #[serde(default)]
    pub prevout: Option<BtcPrevout>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BtcPrevout {
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: ScriptPubKey,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BtcOutput {
    #[serde(default)]
    pub value: f64,
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: ScriptPubKey,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScriptPubKey {
    #[serde(default)]
    pub address: Option<String>,
    /// Older nodes report a list instead of a single address.
    #[serde(default)]
    pub addresses: Vec<String>,
}

impl ScriptPubKey {
    fn primary_address(&self) -> Option<String> {
        self.address
            .clone()
            .or_else(|| self.addresses.first().cloned())
    }
}

impl BtcInput {
    fn address(&self) -> Option<String> {
        if self.coinbase.is_some() {
            return None;
        }
        self.prevout.as_ref()?.script_pub_key.primary_address()
    }
}

impl BlockData for BtcBlock {
    fn number(&self) -> u64 {
        self.height
    }

    fn timestamp(&self) -> i64 {
        self.time
    }

    fn extract(&self, blockchain: &str) -> ExtractedBlock {
        let transactions: Vec<ExtractedTransaction> = self
            .tx
            .iter()
            .filter_map(|tx| match tx {
                BtcBlockTransaction::Full(tx) => Some(tx.extract()),
                BtcBlockTransaction::Id(_) => None,
            })
            .collect();

        let addresses: BTreeSet<String> = transactions
            .iter()
            .flat_map(|tx| tx.addresses.iter().cloned())
            .collect();

        ExtractedBlock {
            blockchain: blockchain.to_string(),
            number: self.height,
            hash: normalize_address(&self.hash),
            parent_hash: self.previousblockhash.as_deref().map(normalize_address),
            timestamp: self.time,
            addresses,
            transactions,
        }
    }
}

impl TransactionData for BtcTransaction {
    fn hash(&self) -> &str {
        &self.txid
    }

    fn block_number(&self) -> Option<u64> {
        self.block_height
    }

    fn extract(&self) -> ExtractedTransaction {
        let satoshis: u64 = self
            .vout
            .iter()
            .map(|out| (out.value * SATOSHIS_PER_BTC).round() as u64)
            .sum();

        ExtractedTransaction::new(
            &self.txid,
            self.vin.iter().filter_map(BtcInput::address),
            self.vout
                .iter()
                .filter_map(|out| out.script_pub_key.primary_address()),
            Some(satoshis.to_string()),
        )
    }
}

#[derive(Deserialize)]
struct BlockHeader {
    height: u64,
}

pub struct BitcoinClient {
    rpc: JsonRpcTransport,
    blockchain: String,
}

impl BitcoinClient {
    pub fn new(
        rpc_url: &str,
        user: Option<String>,
        password: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        info!("Initializing Bitcoin client with RPC endpoint: {}", rpc_url);
        let mut rpc = JsonRpcTransport::new(rpc_url, timeout)?;
        if let Some(user) = user {
            rpc = rpc.with_basic_auth(user, password);
        }
        Ok(Self::with_transport(rpc))
    }

    pub fn with_transport(rpc: JsonRpcTransport) -> Self {
        Self {
            rpc,
            blockchain: "bitcoin".to_string(),
        }
    }
}

/// Map "does not exist" RPC errors to `None`.
fn not_found_as_none<T>(result: Result<T, ClientError>, code: i64) -> Result<Option<T>, ClientError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ClientError::Rpc { code: c, .. }) if c == code => Ok(None),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl ChainClient for BitcoinClient {
    type Block = BtcBlock;
    type Transaction = BtcTransaction;

    fn blockchain(&self) -> &str {
        &self.blockchain
    }

    async fn get_latest_block_number(&self) -> Result<u64, ClientError> {
        self.rpc.call("getblockcount", json!([])).await
    }

    async fn get_block(
        &self,
        number: u64,
        include_transactions: bool,
    ) -> Result<Option<BtcBlock>, ClientError> {
        let hash: Option<String> = not_found_as_none(
            self.rpc.call("getblockhash", json!([number])).await,
            RPC_INVALID_PARAMETER,
        )?;
        let Some(hash) = hash else {
            return Ok(None);
        };

        let verbosity = if include_transactions { 3 } else { 1 };
        let block: Option<BtcBlock> = self.rpc.call("getblock", json!([hash, verbosity])).await?;
        Ok(block.map(|mut block| {
            for tx in block.tx.iter_mut() {
                if let BtcBlockTransaction::Full(tx) = tx {
                    tx.block_height = Some(number);
                }
            }
            block
        }))
    }

    async fn get_transaction(&self, hash: &str) -> Result<Option<BtcTransaction>, ClientError> {
        let tx: Option<BtcTransaction> = not_found_as_none(
            self.rpc.call("getrawtransaction", json!([hash, true])).await,
            RPC_INVALID_ADDRESS_OR_KEY,
        )?;
        let Some(mut tx) = tx else {
            return Ok(None);
        };

        if let Some(blockhash) = tx.blockhash.clone() {
            let header: BlockHeader = self.rpc.call("getblockheader", json!([blockhash])).await?;
            tx.block_height = Some(header.height);
        }
        Ok(Some(tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coinbase_inputs_are_addressless() {
        let block: BtcBlock = serde_json::from_value(json!({
            "hash": "00000000ABC",
            "height": 800000,
            "previousblockhash": "00000000DEF",
            "time": 1690168629,
            "tx": [
                {
                    "txid": "CB01",
                    "vin": [{ "coinbase": "03ab" }],
                    "vout": [
                        { "value": 6.25, "scriptPubKey": { "address": "bc1qMINER" } }
                    ]
                },
                {
                    "txid": "TX02",
                    "vin": [
                        { "txid": "CB01", "prevout": { "scriptPubKey": { "address": "bc1qSENDER" } } }
                    ],
                    "vout": [
                        { "value": 0.5, "scriptPubKey": { "address": "bc1qRECEIVER" } },
                        { "value": 0.1, "scriptPubKey": { "addresses": ["1Change"] } }
                    ]
                }
            ]
        }))
        .unwrap();

        let extracted = block.extract("bitcoin");
        assert_eq!(extracted.number, 800000);
        assert_eq!(extracted.addresses.len(), 4);

        let coinbase = &extracted.transactions[0];
        assert_eq!(coinbase.from, None);
        assert_eq!(coinbase.to.as_deref(), Some("bc1qminer"));
        assert_eq!(coinbase.value.as_deref(), Some("625000000"));

        let spend = &extracted.transactions[1];
        assert_eq!(spend.from.as_deref(), Some("bc1qsender"));
        assert_eq!(spend.to.as_deref(), Some("bc1qreceiver"));
        assert!(spend.addresses.contains("1change"));
    }

    #[test]
    fn unknown_height_is_not_found() {
        let result: Result<String, ClientError> = Err(ClientError::Rpc {
            code: RPC_INVALID_PARAMETER,
            message: "Block height out of range".into(),
        });
        assert!(matches!(not_found_as_none(result, RPC_INVALID_PARAMETER), Ok(None)));
    }
}
