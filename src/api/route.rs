use crate::{
    api::{
        error::ApiError,
        response::{
            AddressTransactionsResponse, ChainsResponse, FragmentSearchResponse,
            PatternSearchResponse, SearchResponse,
        },
    },
    models::{normalize_hex, CrossChainOptions, SearchOptions},
    state::AppState,
    validation::{
        parse_chains, parse_entity_type, parse_exact, parse_fragments, parse_patterns,
        validate_address, validate_hash, validate_hex, validate_limit, validate_offset,
        validate_query,
    },
};
use axum::{
    extract::{Path, Query, Request, State},
    http::{HeaderValue, Method},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

// GET /search query parameters
#[derive(Deserialize)]
pub struct SearchQuery {
    q: Option<String>,
    limit: Option<String>,
    offset: Option<String>,
    #[serde(rename = "type")]
    entity_type: Option<String>,
    blockchain: Option<String>,
    exact: Option<String>,
}

// GET /search/multi/{patterns} query parameters
#[derive(Deserialize)]
pub struct PatternQuery {
    limit: Option<String>,
    offset: Option<String>,
    #[serde(rename = "type")]
    entity_type: Option<String>,
    blockchain: Option<String>,
}

// GET /search/{hash} query parameters
#[derive(Deserialize)]
pub struct DetailsQuery {
    #[serde(rename = "type")]
    entity_type: Option<String>,
}

// GET /cross-chain/search query parameters
#[derive(Deserialize)]
pub struct FragmentQuery {
    fragments: Option<String>,
    limit: Option<String>,
    offset: Option<String>,
    #[serde(rename = "type")]
    entity_type: Option<String>,
    chains: Option<String>,
}

// GET /cross-chain/address/{address}/transactions query parameters
#[derive(Deserialize)]
pub struct AddressQuery {
    limit: Option<String>,
    offset: Option<String>,
    chains: Option<String>,
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = cors_layer(&app_state.config.cors_origin);

    Router::new()
        .route("/search", get(search))
        .route("/search/multi/{patterns}", get(search_patterns))
        .route("/search/{hash}", get(get_details))
        .route("/cross-chain/search", get(cross_chain_search))
        .route("/cross-chain/chains", get(supported_chains))
        .route(
            "/cross-chain/address/{address}/transactions",
            get(address_transactions),
        )
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            rate_limit,
        ))
        .route("/health", get(health))
        .layer(cors)
        .with_state(app_state)
}

fn cors_layer(origin: &str) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods([Method::GET, Method::OPTIONS]);
    if origin == "*" {
        return cors.allow_origin(Any);
    }
    match origin.parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin),
        Err(_) => {
            warn!("Invalid CORS origin {:?}, allowing any origin", origin);
            cors.allow_origin(Any)
        }
    }
}

async fn rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if state.limiter.check().is_err() {
        warn!("Rate limit exceeded for {}", request.uri().path());
        return Err(ApiError::RateLimited);
    }
    Ok(next.run(request).await)
}

/// Run a store-backed query under the configured deadline. Dropping the
/// future on timeout cancels every sibling query it started.
async fn with_deadline<T, F>(state: &AppState, query: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    tokio::time::timeout(state.config.query_timeout, query)
        .await
        .map_err(|_| ApiError::Timeout)?
        .map_err(ApiError::from)
}

async fn health() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}

// GET /search handler
async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQuery>,
) -> Result<SearchResponse, ApiError> {
    let query = validate_query(params.q.as_deref())?;
    let exact = parse_exact(params.exact.as_deref())?;
    if exact {
        validate_hex(&query)?;
    }

    let options = SearchOptions {
        limit: validate_limit(params.limit.as_deref())?,
        offset: validate_offset(params.offset.as_deref())?,
        entity_type: parse_entity_type(params.entity_type.as_deref())?,
        blockchain: params.blockchain.map(|chain| chain.trim().to_lowercase()),
        exact,
    };
    let query = if exact {
        normalize_hex(&query)
    } else {
        query.to_lowercase()
    };

    info!("Search query: {}, options: {:?}", query, options);
    let results = with_deadline(&state, state.search.search(&query, &options)).await?;
    Ok(SearchResponse::new(query, results))
}

// GET /search/multi/{patterns} handler
async fn search_patterns(
    State(state): State<Arc<AppState>>,
    Path(patterns): Path<String>,
    Query(params): Query<PatternQuery>,
) -> Result<PatternSearchResponse, ApiError> {
    let patterns: Vec<String> = parse_patterns(&patterns.to_lowercase())?;
    let options = SearchOptions {
        limit: validate_limit(params.limit.as_deref())?,
        offset: validate_offset(params.offset.as_deref())?,
        entity_type: parse_entity_type(params.entity_type.as_deref())?,
        blockchain: params.blockchain.map(|chain| chain.trim().to_lowercase()),
        exact: false,
    };

    info!("Multi-pattern search: {:?}, options: {:?}", patterns, options);
    let results = with_deadline(&state, state.search.search_patterns(&patterns, &options)).await?;
    Ok(PatternSearchResponse::new(patterns, results))
}

// GET /search/{hash} handler
async fn get_details(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
    Query(params): Query<DetailsQuery>,
) -> Result<Response, ApiError> {
    let hash = validate_hash(&hash)?;
    let kind = parse_entity_type(params.entity_type.as_deref())?;

    match with_deadline(&state, state.search.get_details(&hash, kind)).await? {
        Some(detail) => Ok(Json(detail).into_response()),
        None => Err(ApiError::NotFound("Item not found".to_string())),
    }
}

// GET /cross-chain/search handler
async fn cross_chain_search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FragmentQuery>,
) -> Result<FragmentSearchResponse, ApiError> {
    let fragments = parse_fragments(params.fragments.as_deref())?;
    let options = CrossChainOptions {
        limit: validate_limit(params.limit.as_deref())?,
        offset: validate_offset(params.offset.as_deref())?,
        entity_type: params.entity_type.filter(|t| !t.trim().is_empty()),
        chains: parse_chains(params.chains.as_deref()),
    };

    info!(
        "Cross-chain search fragments: {}, options: {:?}",
        fragments.join(", "),
        options
    );
    let result = with_deadline(
        &state,
        state.cross_chain.search_address_fragments(&fragments, &options),
    )
    .await?;
    Ok(FragmentSearchResponse::new(fragments, result))
}

// GET /cross-chain/chains handler
async fn supported_chains(State(state): State<Arc<AppState>>) -> Result<ChainsResponse, ApiError> {
    let chains = with_deadline(&state, state.cross_chain.get_supported_blockchains()).await?;
    Ok(chains.into())
}

// GET /cross-chain/address/{address}/transactions handler
async fn address_transactions(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    Query(params): Query<AddressQuery>,
) -> Result<AddressTransactionsResponse, ApiError> {
    let address = validate_address(&address)?;
    let options = CrossChainOptions {
        limit: validate_limit(params.limit.as_deref())?,
        offset: validate_offset(params.offset.as_deref())?,
        entity_type: None,
        chains: parse_chains(params.chains.as_deref()),
    };

    info!("Transactions for address {}, options: {:?}", address, options);
    with_deadline(
        &state,
        state.cross_chain.address_transactions(&address, &options),
    )
    .await?
    .map(AddressTransactionsResponse::from)
    .ok_or_else(|| ApiError::NotFound("Address not found".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::tests::common::{test_state, test_store};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn deadline_cancels_only_the_slow_request() {
        let store = test_store().await;
        let state = test_state(
            &store,
            Config {
                query_timeout: Duration::from_millis(50),
                ..Config::default()
            },
        );
        let cancelled = Arc::new(AtomicBool::new(false));

        let flag = cancelled.clone();
        let slow = async move {
            let _guard = DropFlag(flag);
            std::future::pending::<Result<u32, sqlx::Error>>().await
        };
        let fast = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, sqlx::Error>(7)
        };

        let (slow, fast) = tokio::join!(with_deadline(&state, slow), with_deadline(&state, fast));

        assert!(matches!(slow, Err(ApiError::Timeout)));
        assert!(cancelled.load(Ordering::SeqCst));
        assert_eq!(fast.unwrap(), 7);
    }
}
