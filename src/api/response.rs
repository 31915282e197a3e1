// JSON envelopes returned by the HTTP surface.

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::models::{
    AddressResult, AddressTransactions, CrossChainSearchResult, SearchResult, TransactionResult,
};

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub count: usize,
    pub results: Vec<SearchResult>,
}

impl SearchResponse {
    pub fn new(query: impl Into<String>, results: Vec<SearchResult>) -> Self {
        Self {
            query: query.into(),
            count: results.len(),
            results,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PatternSearchResponse {
    pub patterns: Vec<String>,
    pub count: usize,
    pub results: Vec<SearchResult>,
}

impl PatternSearchResponse {
    pub fn new(patterns: Vec<String>, results: Vec<SearchResult>) -> Self {
        Self {
            patterns,
            count: results.len(),
            results,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentSearchResponse {
    pub fragments: Vec<String>,
    pub address_count: usize,
    pub transaction_count: usize,
    pub results: CrossChainSearchResult,
}

impl FragmentSearchResponse {
    pub fn new(fragments: Vec<String>, result: CrossChainSearchResult) -> Self {
        Self {
            fragments,
            address_count: result.addresses.len(),
            transaction_count: result.transactions.len(),
            results: result,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChainsResponse {
    pub count: usize,
    pub chains: Vec<String>,
}

impl From<Vec<String>> for ChainsResponse {
    fn from(chains: Vec<String>) -> Self {
        Self {
            count: chains.len(),
            chains,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressTransactionsResponse {
    pub address: String,
    pub address_details: AddressResult,
    pub transaction_count: usize,
    pub transactions: Vec<TransactionResult>,
}

impl From<AddressTransactions> for AddressTransactionsResponse {
    fn from(found: AddressTransactions) -> Self {
        Self {
            address: found.address,
            address_details: found.address_details,
            transaction_count: found.transactions.len(),
            transactions: found.transactions,
        }
    }
}

macro_rules! json_response {
    ($($ty:ty),*) => {
        $(impl IntoResponse for $ty {
            fn into_response(self) -> Response {
                Json(self).into_response()
            }
        })*
    };
}

json_response!(
    SearchResponse,
    PatternSearchResponse,
    FragmentSearchResponse,
    ChainsResponse,
    AddressTransactionsResponse
);
