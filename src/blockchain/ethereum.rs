// Ethereum JSON-RPC client and extractor.
// Block addresses are the fee recipient plus every sender and receiver.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::info;

use crate::blockchain::client::{ChainClient, ClientError, JsonRpcTransport};
use crate::blockchain::models::{
    hex_u64, hex_u64_opt, parse_quantity, quantity_to_decimal, BlockData, ExtractedBlock, ExtractedTransaction,
    TransactionData,
};
use crate::models::normalize_address;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthBlock {
    #[serde(deserialize_with = "hex_u64")]
    pub number: u64,
    pub hash: String,
    pub parent_hash: String,
    #[serde(deserialize_with = "hex_u64")]
    pub timestamp: u64,
    #[serde(default)]
    pub miner: Option<String>,
    #[serde(default)]
    pub transactions: Vec<EthBlockTransaction>,
}

/// `eth_getBlockByNumber` returns full objects or bare hashes depending on
/// its second parameter.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EthBlockTransaction {
    Full(EthTransaction),
    Hash(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthTransaction {
    pub hash: String,
    #[serde(default, deserialize_with = "hex_u64_opt")]
    pub block_number: Option<u64>,
    pub from: String,
    /// `None` for contract creation.
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

impl BlockData for EthBlock {
    fn number(&self) -> u64 {
        self.number
    }

    fn timestamp(&self) -> i64 {
        self.timestamp as i64
    }

    fn extract(&self, blockchain: &str) -> ExtractedBlock {
        let transactions: Vec<ExtractedTransaction> = self
            .transactions
            .iter()
            .filter_map(|tx| match tx {
                EthBlockTransaction::Full(tx) => Some(tx.extract()),
                EthBlockTransaction::Hash(_) => None,
            })
            .collect();

        let mut addresses: BTreeSet<String> = transactions
            .iter()
            .flat_map(|tx| tx.addresses.iter().cloned())
            .collect();
        if let Some(miner) = self.miner.as_deref().map(normalize_address) {
            if !miner.is_empty() {
                addresses.insert(miner);
            }
        }

        ExtractedBlock {
            blockchain: blockchain.to_string(),
            number: self.number,
            hash: normalize_address(&self.hash),
            parent_hash: Some(normalize_address(&self.parent_hash)),
            timestamp: self.timestamp as i64,
            addresses,
            transactions,
        }
    }
}

impl TransactionData for EthTransaction {
    fn hash(&self) -> &str {
        &self.hash
    }

    fn block_number(&self) -> Option<u64> {
        self.block_number
    }

    fn extract(&self) -> ExtractedTransaction {
        ExtractedTransaction::new(
            &self.hash,
            Some(self.from.clone()),
            self.to.clone(),
            self.value.as_deref().map(quantity_to_decimal),
        )
    }
}

pub struct EthereumClient {
    rpc: JsonRpcTransport,
    blockchain: String,
}

impl EthereumClient {
    pub fn new(rpc_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        info!("Initializing Ethereum client with RPC endpoint: {}", rpc_url);
        Ok(Self::with_transport(JsonRpcTransport::new(rpc_url, timeout)?))
    }

    pub fn with_transport(rpc: JsonRpcTransport) -> Self {
        Self {
            rpc,
            blockchain: "ethereum".to_string(),
        }
    }
}

#[async_trait]
impl ChainClient for EthereumClient {
    type Block = EthBlock;
    type Transaction = EthTransaction;

    fn blockchain(&self) -> &str {
        &self.blockchain
    }

    async fn get_latest_block_number(&self) -> Result<u64, ClientError> {
        let raw: String = self.rpc.call("eth_blockNumber", json!([])).await?;
        let number = parse_quantity(&raw).map_err(ClientError::Decode)?;
        u64::try_from(number).map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn get_block(
        &self,
        number: u64,
        include_transactions: bool,
    ) -> Result<Option<EthBlock>, ClientError> {
        self.rpc
            .call(
                "eth_getBlockByNumber",
                json!([format!("0x{:x}", number), include_transactions]),
            )
            .await
    }

    async fn get_transaction(&self, hash: &str) -> Result<Option<EthTransaction>, ClientError> {
        self.rpc.call("eth_getTransactionByHash", json!([hash])).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_miner_sender_and_receiver() {
        let block: EthBlock = serde_json::from_value(json!({
            "number": "0x10",
            "hash": "0xHASH",
            "parentHash": "0xPARENT",
            "timestamp": "0x64",
            "miner": "0xAAA",
            "transactions": [
                {
                    "hash": "0xT1",
                    "blockNumber": "0x10",
                    "from": "0xBBB",
                    "to": "0xCCC",
                    "value": "0xde0b6b3a7640000"
                },
                {
                    "hash": "0xT2",
                    "blockNumber": "0x10",
                    "from": "0xBBB",
                    "to": null,
                    "value": "0x0"
                }
            ]
        }))
        .unwrap();

        let extracted = block.extract("ethereum");
        assert_eq!(extracted.number, 16);
        assert_eq!(extracted.timestamp, 100);
        assert_eq!(
            extracted.addresses.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["0xaaa", "0xbbb", "0xccc"]
        );
        assert_eq!(extracted.transactions.len(), 2);
        assert_eq!(extracted.transactions[0].value.as_deref(), Some("1000000000000000000"));
        assert_eq!(extracted.transactions[1].to, None);
    }

    #[test]
    fn hash_only_blocks_extract_just_the_miner() {
        let block: EthBlock = serde_json::from_value(json!({
            "number": "0x1",
            "hash": "0x01",
            "parentHash": "0x00",
            "timestamp": "0x1",
            "miner": "0xAAA",
            "transactions": ["0xT1", "0xT2"]
        }))
        .unwrap();

        let extracted = block.extract("ethereum");
        assert!(extracted.transactions.is_empty());
        assert_eq!(extracted.addresses.len(), 1);
    }
}
