// Query-parameter validation for the HTTP surface. Everything here runs
// before a request reaches the index store.

use thiserror::Error;

use crate::models::{normalize_hex, EntityKind};

pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 100;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("{0}")]
    InvalidParameter(String),

    #[error("Invalid fragment: {0}. Fragments must be alphanumeric")]
    InvalidFragment(String),
}

/// Absent means the default; present must be an integer in [1, 100].
pub fn validate_limit(limit: Option<&str>) -> Result<u32, ValidationError> {
    let Some(limit) = non_empty(limit) else {
        return Ok(DEFAULT_LIMIT);
    };
    match limit.parse::<u32>() {
        Ok(limit) if (1..=MAX_LIMIT).contains(&limit) => Ok(limit),
        _ => Err(ValidationError::InvalidParameter(format!(
            "limit must be an integer between 1 and {}",
            MAX_LIMIT
        ))),
    }
}

pub fn validate_offset(offset: Option<&str>) -> Result<u32, ValidationError> {
    let Some(offset) = non_empty(offset) else {
        return Ok(0);
    };
    offset.parse::<u32>().map_err(|_| {
        ValidationError::InvalidParameter("offset must be a non-negative integer".to_string())
    })
}

pub fn validate_query(query: Option<&str>) -> Result<String, ValidationError> {
    non_empty(query)
        .map(str::to_string)
        .ok_or_else(|| ValidationError::MissingParameter("q".to_string()))
}

pub fn validate_hash(hash: &str) -> Result<String, ValidationError> {
    alphanumeric(hash, "hash")
}

pub fn validate_address(address: &str) -> Result<String, ValidationError> {
    alphanumeric(address, "address")
}

/// Exact queries must be hex, with or without a `0x` prefix.
pub fn validate_hex(query: &str) -> Result<(), ValidationError> {
    let digits = normalize_hex(query);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ValidationError::InvalidParameter(
            "Search query must be a valid hexadecimal string for exact matches".to_string(),
        ));
    }
    Ok(())
}

/// Split on commas and whitespace; every fragment must be ASCII alphanumeric.
pub fn parse_fragments(fragments: Option<&str>) -> Result<Vec<String>, ValidationError> {
    let Some(fragments) = non_empty(fragments) else {
        return Err(ValidationError::MissingParameter("fragments".to_string()));
    };

    let parsed: Vec<String> = split_list(fragments)
        .map(|fragment| {
            if fragment.chars().all(|c| c.is_ascii_alphanumeric()) {
                Ok(fragment.to_lowercase())
            } else {
                Err(ValidationError::InvalidFragment(fragment.to_string()))
            }
        })
        .collect::<Result<_, _>>()?;

    if parsed.is_empty() {
        return Err(ValidationError::MissingParameter("fragments".to_string()));
    }
    Ok(parsed)
}

/// Patterns of the multi-pattern route, separated like fragments.
pub fn parse_patterns(patterns: &str) -> Result<Vec<String>, ValidationError> {
    let parsed: Vec<String> = split_list(patterns).map(str::to_string).collect();
    if parsed.is_empty() {
        return Err(ValidationError::MissingParameter("patterns".to_string()));
    }
    Ok(parsed)
}

pub fn parse_chains(chains: Option<&str>) -> Option<Vec<String>> {
    let chains: Vec<String> = split_list(non_empty(chains)?)
        .map(str::to_lowercase)
        .collect();
    (!chains.is_empty()).then_some(chains)
}

pub fn parse_entity_type(value: Option<&str>) -> Result<Option<EntityKind>, ValidationError> {
    non_empty(value)
        .map(|value| value.parse::<EntityKind>().map_err(ValidationError::InvalidParameter))
        .transpose()
}

pub fn parse_exact(value: Option<&str>) -> Result<bool, ValidationError> {
    match non_empty(value).map(str::to_lowercase).as_deref() {
        None | Some("false") | Some("0") => Ok(false),
        Some("true") | Some("1") => Ok(true),
        Some(other) => Err(ValidationError::InvalidParameter(format!(
            "exact must be true or false, got {}",
            other
        ))),
    }
}

fn alphanumeric(value: &str, param: &str) -> Result<String, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::MissingParameter(param.to_string()));
    }
    if !value.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::InvalidParameter(format!("Invalid {}: {}", param, value)));
    }
    Ok(value.to_string())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|item| !item.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_defaults_and_bounds() {
        assert_eq!(validate_limit(None), Ok(DEFAULT_LIMIT));
        assert_eq!(validate_limit(Some(" ")), Ok(DEFAULT_LIMIT));
        assert_eq!(validate_limit(Some("100")), Ok(100));
        assert!(validate_limit(Some("0")).is_err());
        assert!(validate_limit(Some("101")).is_err());
        assert!(validate_limit(Some("ten")).is_err());
    }

    #[test]
    fn offset_must_be_non_negative() {
        assert_eq!(validate_offset(None), Ok(0));
        assert_eq!(validate_offset(Some("20")), Ok(20));
        assert!(validate_offset(Some("-1")).is_err());
    }

    #[test]
    fn fragments_split_on_commas_and_whitespace() {
        assert_eq!(
            parse_fragments(Some("06E3, 13d0  beef")),
            Ok(vec!["06e3".to_string(), "13d0".to_string(), "beef".to_string()])
        );
        assert_eq!(
            parse_fragments(Some(" , ")),
            Err(ValidationError::MissingParameter("fragments".into()))
        );
        assert_eq!(
            parse_fragments(Some("06e3,1'3")),
            Err(ValidationError::InvalidFragment("1'3".into()))
        );
    }

    #[test]
    fn chains_and_flags() {
        assert_eq!(
            parse_chains(Some("Ethereum,bitcoin")),
            Some(vec!["ethereum".to_string(), "bitcoin".to_string()])
        );
        assert_eq!(parse_chains(Some("")), None);
        assert_eq!(parse_entity_type(Some("tx")), Ok(Some(EntityKind::Transaction)));
        assert!(parse_entity_type(Some("token")).is_err());
        assert_eq!(parse_exact(Some("TRUE")), Ok(true));
        assert!(parse_exact(Some("maybe")).is_err());
    }

    #[test]
    fn hashes_must_be_alphanumeric() {
        assert_eq!(validate_hash(" 0xabc "), Ok("0xabc".to_string()));
        assert!(validate_hash("ab;c").is_err());
        assert!(validate_hash("").is_err());
        assert_eq!(
            validate_address(""),
            Err(ValidationError::MissingParameter("address".into()))
        );
    }

    #[test]
    fn exact_queries_must_be_hex() {
        assert!(validate_hex("0xDEADbeef").is_ok());
        assert!(validate_hex("0x").is_err());
        assert!(validate_hex("xyz").is_err());
    }
}
