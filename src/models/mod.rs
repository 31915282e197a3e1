// Global index rows, search results and query options.
// Timestamps are unix seconds throughout.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Row of `global_address_index`, keyed by (address, blockchain).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct GlobalAddressEntry {
    pub address: String,
    pub blockchain: String,
    pub first_seen: Option<i64>,
    pub last_seen: i64,
    pub tx_count: i64,
}

/// Row of `address_fragments`; the key is the whole row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AddressFragment {
    pub fragment: String,
    pub address: String,
    pub blockchain: String,
}

/// Row of `global_transaction_index`, keyed by (tx_hash, blockchain).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct GlobalTransactionEntry {
    pub tx_hash: String,
    pub blockchain: String,
    pub block_number: i64,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub timestamp: i64,
}

pub type TransactionResult = GlobalTransactionEntry;

/// One address grouped across every chain it was seen on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressResult {
    pub address: String,
    pub blockchains: Vec<String>,
    pub first_seen: Option<i64>,
    pub last_seen: i64,
    pub tx_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossChainSearchResult {
    pub addresses: Vec<AddressResult>,
    pub transactions: Vec<TransactionResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressTransactions {
    pub address: String,
    pub address_details: AddressResult,
    pub transactions: Vec<TransactionResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrossChainOptions {
    pub limit: u32,
    pub offset: u32,
    pub entity_type: Option<String>,
    pub chains: Option<Vec<String>>,
}

impl CrossChainOptions {
    pub fn new(limit: u32, offset: u32) -> Self {
        Self {
            limit,
            offset,
            ..Default::default()
        }
    }

    pub fn with_chains(mut self, chains: Vec<String>) -> Self {
        self.chains = Some(chains);
        self
    }

    /// Chain filter in the form the store expects: lowercase, sorted, deduplicated.
    pub fn chain_filter(&self) -> Option<Vec<String>> {
        self.chains.as_ref().map(|chains| {
            let mut chains: Vec<String> = chains.iter().map(|c| c.trim().to_lowercase()).collect();
            chains.sort();
            chains.dedup();
            chains
        })
    }

    pub(crate) fn canonical(&self) -> String {
        let chains = self
            .chain_filter()
            .map(|chains| chains.join(","))
            .unwrap_or_else(|| "*".to_string());
        format!(
            "limit={};offset={};type={};chains={}",
            self.limit,
            self.offset,
            self.entity_type.as_deref().unwrap_or(""),
            chains
        )
    }
}

/// Entity kinds held in the per-chain tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Block,
    Transaction,
    Address,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Block => write!(f, "block"),
            EntityKind::Transaction => write!(f, "transaction"),
            EntityKind::Address => write!(f, "address"),
        }
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "block" => Ok(EntityKind::Block),
            "transaction" | "tx" => Ok(EntityKind::Transaction),
            "address" => Ok(EntityKind::Address),
            other => Err(format!("unknown entity type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchOptions {
    pub limit: u32,
    pub offset: u32,
    pub entity_type: Option<EntityKind>,
    pub blockchain: Option<String>,
    pub exact: bool,
}

impl SearchOptions {
    pub fn new(limit: u32, offset: u32) -> Self {
        Self {
            limit,
            offset,
            ..Default::default()
        }
    }

    pub fn includes(&self, kind: EntityKind) -> bool {
        self.entity_type.map_or(true, |wanted| wanted == kind)
    }

    pub(crate) fn canonical(&self) -> String {
        format!(
            "limit={};offset={};type={};blockchain={};exact={}",
            self.limit,
            self.offset,
            self.entity_type.map(|kind| kind.to_string()).unwrap_or_default(),
            self.blockchain.as_deref().unwrap_or(""),
            self.exact
        )
    }
}

/// Single-chain search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: String,
    pub hash: String,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub blockchain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<i64>,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Detail view of a single resolved hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum DetailResult {
    Block {
        blockchain: String,
        hash: String,
        number: i64,
        parent_hash: Option<String>,
        timestamp: i64,
    },
    Transaction {
        blockchain: String,
        hash: String,
        block_number: i64,
        from: Option<String>,
        to: Option<String>,
        value: Option<String>,
        timestamp: i64,
    },
    Address {
        blockchain: String,
        hash: String,
        address: String,
        created_at: i64,
        updated_at: i64,
    },
}

impl DetailResult {
    pub fn kind(&self) -> EntityKind {
        match self {
            DetailResult::Block { .. } => EntityKind::Block,
            DetailResult::Transaction { .. } => EntityKind::Transaction,
            DetailResult::Address { .. } => EntityKind::Address,
        }
    }
}

/// Lowercase and drop a leading `0x`, the form per-chain tables are keyed by.
pub fn normalize_hex(value: &str) -> String {
    let value = value.trim().to_lowercase();
    match value.strip_prefix("0x") {
        Some(stripped) => stripped.to_string(),
        None => value,
    }
}

/// Lowercase an address while keeping its chain-native prefix.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_hex_strips_prefix_once() {
        assert_eq!(normalize_hex("0xABcd"), "abcd");
        assert_eq!(normalize_hex("abcd"), "abcd");
        assert_eq!(normalize_hex("0X0xff"), "0xff");
    }

    #[test]
    fn canonical_options_ignore_chain_order_and_case() {
        let a = CrossChainOptions::new(10, 0)
            .with_chains(vec!["Polygon".into(), "ethereum".into()]);
        let b = CrossChainOptions::new(10, 0)
            .with_chains(vec!["ethereum".into(), "polygon".into(), "ethereum".into()]);
        assert_eq!(a.canonical(), b.canonical());
        assert_ne!(a.canonical(), CrossChainOptions::new(10, 0).canonical());
    }

    #[test]
    fn detail_result_is_tagged_by_kind() {
        let detail = DetailResult::Address {
            blockchain: "ethereum".into(),
            hash: "ab".into(),
            address: "ab".into(),
            created_at: 1,
            updated_at: 2,
        };
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["type"], "Address");
        assert_eq!(json["createdAt"], 1);
        assert_eq!(detail.kind(), EntityKind::Address);
    }
}
