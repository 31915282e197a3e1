//! Global index writer and block processor against an in-memory store.

use crate::blockchain::index_transaction_by_hash;
use crate::db::{address, chain, fragment, transaction};
use crate::models::normalize_hex;
use crate::tests::common::*;

#[tokio::test]
async fn first_seen_is_set_once_across_repeated_sightings() {
    let store = test_store().await;
    let scheme = scheme();

    for ts in 100..105 {
        address::index_address_globally(&store, &scheme, "0xABCDEF0123456789", ETHEREUM, ts)
            .await
            .unwrap();
    }

    let entries = address::get_entries(&store, &["0xabcdef0123456789".to_string()], None)
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].first_seen, Some(100));
    assert_eq!(entries[0].last_seen, 104);
    assert_eq!(entries[0].tx_count, 5);
}

#[tokio::test]
async fn last_seen_never_moves_backwards() {
    let store = test_store().await;
    let scheme = scheme();

    address::index_address_globally(&store, &scheme, "0xaaaa", ETHEREUM, 500).await.unwrap();
    address::index_address_globally(&store, &scheme, "0xaaaa", ETHEREUM, 300).await.unwrap();

    let entries = address::get_entries(&store, &["0xaaaa".to_string()], None).await.unwrap();
    assert_eq!(entries[0].first_seen, Some(500));
    assert_eq!(entries[0].last_seen, 500);
}

#[tokio::test]
async fn first_seen_compare_and_set_reports_the_winner() {
    let store = test_store().await;
    address::record_sighting(&store, "0xabc", ETHEREUM, 10, 1).await.unwrap();

    assert!(address::set_first_seen_if_null(&store, "0xabc", ETHEREUM, 10).await.unwrap());
    assert!(!address::set_first_seen_if_null(&store, "0xabc", ETHEREUM, 20).await.unwrap());
}

#[tokio::test]
async fn fragments_are_stored_once_per_address_and_chain() {
    let store = test_store().await;
    let scheme = scheme();
    let addr = "0x06e3a4f8b213d0c9";

    for ts in 0..3 {
        address::index_address_globally(&store, &scheme, addr, ETHEREUM, ts).await.unwrap();
    }

    let stored = fragment::fragments_for(&store, addr, ETHEREUM).await.unwrap();
    assert!(stored.iter().all(|row| row.address == addr && row.blockchain == ETHEREUM));
    let stored: Vec<String> = stored.into_iter().map(|row| row.fragment).collect();
    let mut expected = scheme.fragments(addr);
    expected.sort();
    expected.dedup();
    assert_eq!(stored, expected);
}

#[tokio::test]
async fn block_is_written_to_per_chain_and_global_tables() {
    let store = test_store().await;
    let block = block(
        7,
        1_700_000_007,
        Some("0xAAA"),
        vec![tx("0xBBBB01", "0xBBB", "0xCCC")],
    );

    let summary = indexer(&store).index_block(&block).await.unwrap();
    assert_eq!(summary.number, 7);
    assert_eq!(summary.transactions, 1);
    assert_eq!(summary.addresses, 3);

    let stored = chain::get_block(&store, &normalize_hex(&block.hash), None).await.unwrap().unwrap();
    assert_eq!(stored.number, 7);
    assert!(!stored.hash.starts_with("0x"));

    let stored_tx = chain::get_transaction(&store, "bbbb01", Some(ETHEREUM))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored_tx.from_address.as_deref(), Some("bbb"));

    let global = transaction::get_entry(&store, "0xbbbb01", ETHEREUM).await.unwrap().unwrap();
    assert_eq!(global.from_address.as_deref(), Some("0xbbb"));
    assert_eq!(global.to_address.as_deref(), Some("0xccc"));
    assert_eq!(global.block_number, 7);
}

#[tokio::test]
async fn tx_count_counts_each_transaction_touching_the_address() {
    let store = test_store().await;
    let block = block(
        1,
        1_000,
        Some("0xminer"),
        vec![tx("0xt1", "0xhub", "0xa1"), tx("0xt2", "0xa2", "0xhub")],
    );
    indexer(&store).index_block(&block).await.unwrap();

    let entries = address::get_entries(
        &store,
        &["0xhub".to_string(), "0xminer".to_string()],
        Some(&[ETHEREUM.to_string()][..]),
    )
    .await
    .unwrap();

    let count = |addr: &str| entries.iter().find(|e| e.address == addr).unwrap().tx_count;
    assert_eq!(count("0xhub"), 2);
    assert_eq!(count("0xminer"), 1);
}

#[tokio::test]
async fn single_transaction_is_indexed_by_hash() {
    let store = test_store().await;
    let client = MockChainClient::with_chain(3);
    client.add_transaction(tx("0xfeed", "0xsender", "0xreceiver"), Some(2));
    client.add_transaction(tx("0xpending", "0xsender", "0xreceiver"), None);

    let indexed = index_transaction_by_hash(&client, &indexer(&store), "0xFEED")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(indexed.hash, "0xfeed");

    let global = transaction::get_entry(&store, "0xfeed", ETHEREUM).await.unwrap().unwrap();
    assert_eq!(global.block_number, 2);
    assert_eq!(global.timestamp, 1_700_000_002);

    let pending = index_transaction_by_hash(&client, &indexer(&store), "0xpending").await.unwrap();
    assert!(pending.is_none());
    let unknown = index_transaction_by_hash(&client, &indexer(&store), "0xmissing").await.unwrap();
    assert!(unknown.is_none());
}
