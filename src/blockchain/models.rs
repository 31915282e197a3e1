// Chain-agnostic shapes produced by the per-chain extractors.

use serde::{Deserialize, Deserializer};
use std::collections::BTreeSet;

use crate::models::normalize_address;

/// Everything the index writer needs from one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedBlock {
    pub blockchain: String,
    pub number: u64,
    pub hash: String,
    pub parent_hash: Option<String>,
    pub timestamp: i64,
    /// Every address touched by the block, lowercase and deduplicated.
    pub addresses: BTreeSet<String>,
    pub transactions: Vec<ExtractedTransaction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedTransaction {
    pub hash: String,
    pub from: Option<String>,
    pub to: Option<String>,
    pub value: Option<String>,
    pub addresses: BTreeSet<String>,
}

impl ExtractedTransaction {
    /// Build from raw sender/receiver lists; the first of each becomes
    /// `from`/`to` and all of them count as touched.
    pub fn new<I, O>(hash: &str, inputs: I, outputs: O, value: Option<String>) -> Self
    where
        I: IntoIterator<Item = String>,
        O: IntoIterator<Item = String>,
    {
        let inputs: Vec<String> = inputs.into_iter().map(|a| normalize_address(&a)).collect();
        let outputs: Vec<String> = outputs.into_iter().map(|a| normalize_address(&a)).collect();

        let addresses = inputs
            .iter()
            .chain(outputs.iter())
            .filter(|a| !a.is_empty())
            .cloned()
            .collect();

        Self {
            hash: normalize_address(hash),
            from: inputs.into_iter().find(|a| !a.is_empty()),
            to: outputs.into_iter().find(|a| !a.is_empty()),
            value,
            addresses,
        }
    }
}

/// Raw block as returned by a chain client.
pub trait BlockData: Send + Sync + 'static {
    fn number(&self) -> u64;
    fn timestamp(&self) -> i64;
    fn extract(&self, blockchain: &str) -> ExtractedBlock;
}

/// Raw transaction as returned by a chain client.
pub trait TransactionData: Send + Sync + 'static {
    fn hash(&self) -> &str;
    /// Height of the including block, `None` while unconfirmed.
    fn block_number(&self) -> Option<u64>;
    fn extract(&self) -> ExtractedTransaction;
}

pub fn parse_quantity(value: &str) -> Result<u128, String> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| format!("quantity without 0x prefix: {}", value))?;
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16).map_err(|e| format!("bad quantity {}: {}", value, e))
}

/// Hex-encoded quantity (`"0x1b4"`) as u64.
pub fn hex_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let value = parse_quantity(&raw).map_err(serde::de::Error::custom)?;
    u64::try_from(value).map_err(serde::de::Error::custom)
}

pub fn hex_u64_opt<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => {
            let value = parse_quantity(&raw).map_err(serde::de::Error::custom)?;
            u64::try_from(value).map(Some).map_err(serde::de::Error::custom)
        }
        None => Ok(None),
    }
}

/// Hex quantity rendered in decimal; values past u128 are kept as given.
pub fn quantity_to_decimal(value: &str) -> String {
    parse_quantity(value)
        .map(|v| v.to_string())
        .unwrap_or_else(|_| value.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantities_parse_as_hex() {
        assert_eq!(parse_quantity("0x1b4"), Ok(436));
        assert_eq!(parse_quantity("0x"), Ok(0));
        assert!(parse_quantity("1b4").is_err());
        assert_eq!(quantity_to_decimal("0xde0b6b3a7640000"), "1000000000000000000");
    }

    #[test]
    fn first_sender_and_receiver_win() {
        let tx = ExtractedTransaction::new(
            "0xABC",
            vec!["0xBBB".to_string()],
            vec!["0xCCC".to_string(), "0xDDD".to_string()],
            None,
        );
        assert_eq!(tx.hash, "0xabc");
        assert_eq!(tx.from.as_deref(), Some("0xbbb"));
        assert_eq!(tx.to.as_deref(), Some("0xccc"));
        assert_eq!(tx.addresses.len(), 3);
    }
}
