//! Property-based invariant checks for the lease state machine.
//!
//! Random operation sequences are applied through the engines over the
//! in-memory store, and the lineage invariants are verified at the
//! quiescent point afterwards:
//!
//! - every nonce in `[0, next_nonce)` has exactly one ticket
//! - the state counts add up and match the lineage counters
//! - the leased count never exceeds the cap
//! - the released pool drains smallest-first, in ascending order

#![allow(clippy::unwrap_used, clippy::expect_used)]

use noncepool_core::{
    ExtId, LineageService, NewLineage, Nonce, TicketService, TicketState,
};
use noncepool_testing::InMemoryTicketStore;
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

const MAX_LEASED: i64 = 8;
const UNIVERSE: usize = 12;

#[derive(Clone, Debug)]
enum Op {
    Lease(usize),
    Release(usize),
    Close(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    (0..3u8, 0..UNIVERSE).prop_map(|(kind, idx)| match kind {
        0 => Op::Lease(idx),
        1 => Op::Release(idx),
        _ => Op::Close(idx),
    })
}

fn ext_id(idx: usize) -> ExtId {
    ExtId::new(format!("tx{idx}"))
}

struct Harness {
    lineages: LineageService,
    tickets: TicketService,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(InMemoryTicketStore::new());
        Self {
            lineages: LineageService::new(store.clone()),
            tickets: TicketService::new(store),
        }
    }
}

async fn run_ops(ops: Vec<Op>) {
    let h = Harness::new();
    let lineage = h
        .lineages
        .create_lineage(NewLineage {
            ext_id: "lineage-under-test".parse().unwrap(),
            max_leased_nonce_count: MAX_LEASED,
            start_leasing_from: None,
            max_nonce_value: None,
        })
        .await
        .unwrap();

    for op in ops {
        // Individual operations may legitimately fail (cap reached,
        // ticket not leased, ext id closed); only invariant breakage is
        // a bug.
        match op {
            Op::Lease(idx) => {
                let _ = h.tickets.lease_tickets(lineage.id, vec![ext_id(idx)]).await;
            }
            Op::Release(idx) => {
                let _ = h.tickets.release_ticket(lineage.id, ext_id(idx)).await;
            }
            Op::Close(idx) => {
                let _ = h.tickets.close_ticket(lineage.id, ext_id(idx)).await;
            }
        }
    }

    let row = h
        .lineages
        .lineage("lineage-under-test".parse().unwrap())
        .await
        .unwrap();

    let records = match h
        .tickets
        .tickets(lineage.id, (0..UNIVERSE).map(ext_id).collect())
        .await
    {
        Ok(records) => records,
        // No operation ever committed.
        Err(_) => Vec::new(),
    };

    // (a) gap-free coverage: the nonces of all tickets are exactly
    // [0, next_nonce), each exactly once.
    let nonces: BTreeSet<i64> = records.iter().map(|r| r.nonce.value()).collect();
    assert_eq!(
        nonces.len(),
        records.len(),
        "two tickets share a nonce: {records:?}"
    );
    let expected: BTreeSet<i64> = (0..row.next_nonce.value()).collect();
    assert_eq!(
        nonces, expected,
        "ticket nonces are not gap-free up to next_nonce={}",
        row.next_nonce
    );

    // (b) counter accounting.
    let leased = records.iter().filter(|r| r.state == TicketState::Leased).count() as i64;
    let released = records.iter().filter(|r| r.state == TicketState::Released).count() as i64;
    let closed = records.iter().filter(|r| r.state == TicketState::Closed).count() as i64;
    assert_eq!(row.leased_nonce_count, leased);
    assert_eq!(row.released_nonce_count, released);
    assert_eq!(leased + released + closed, records.len() as i64);

    // (c) cap observance.
    assert!(row.leased_nonce_count <= row.max_leased_nonce_count);
}

async fn run_recycling(released_count: usize, fresh_count: usize) {
    let h = Harness::new();
    let lineage = h
        .lineages
        .create_lineage(NewLineage {
            ext_id: "lineage-under-test".parse().unwrap(),
            max_leased_nonce_count: 64,
            start_leasing_from: None,
            max_nonce_value: None,
        })
        .await
        .unwrap();

    // Fill and fully release, so nonces [0, released_count) are free.
    let initial: Vec<ExtId> = (0..released_count).map(ext_id).collect();
    h.tickets.lease_tickets(lineage.id, initial.clone()).await.unwrap();
    for id in initial {
        h.tickets.release_ticket(lineage.id, id).await.unwrap();
    }

    // Fresh ids must receive the k smallest released nonces in
    // ascending order, then continue from the high-water mark.
    let fresh: Vec<ExtId> = (0..fresh_count).map(|i| ExtId::new(format!("fresh{i}"))).collect();
    let leases = h.tickets.lease_tickets(lineage.id, fresh).await.unwrap();
    let got: Vec<i64> = leases.iter().map(|l| l.nonce.value()).collect();
    let expected: Vec<i64> = (0..fresh_count as i64).collect();
    assert_eq!(got, expected);
}

async fn run_idempotency(count: usize) {
    let h = Harness::new();
    let lineage = h
        .lineages
        .create_lineage(NewLineage {
            ext_id: "lineage-under-test".parse().unwrap(),
            max_leased_nonce_count: 64,
            start_leasing_from: None,
            max_nonce_value: None,
        })
        .await
        .unwrap();

    let ids: Vec<ExtId> = (0..count).map(ext_id).collect();
    let first = h.tickets.lease_tickets(lineage.id, ids.clone()).await.unwrap();

    // Same set, reversed order: same ext_id → nonce mapping.
    let mut reversed = ids;
    reversed.reverse();
    let second = h.tickets.lease_tickets(lineage.id, reversed).await.unwrap();

    let mut first_pairs: Vec<(ExtId, Nonce)> =
        first.into_iter().map(|l| (l.ext_id, l.nonce)).collect();
    let mut second_pairs: Vec<(ExtId, Nonce)> =
        second.into_iter().map(|l| (l.ext_id, l.nonce)).collect();
    first_pairs.sort();
    second_pairs.sort();
    assert_eq!(first_pairs, second_pairs);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn operation_sequences_preserve_lineage_invariants(
        ops in proptest::collection::vec(op_strategy(), 0..48)
    ) {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap()
            .block_on(run_ops(ops));
    }

    #[test]
    fn fresh_ids_drain_the_released_pool_in_ascending_order(
        released in 1..16usize,
        extra in 0..8usize,
    ) {
        let fresh = released + extra;
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap()
            .block_on(run_recycling(released, fresh));
    }

    #[test]
    fn bulk_lease_is_idempotent_and_order_insensitive(count in 1..16usize) {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap()
            .block_on(run_idempotency(count));
    }
}
