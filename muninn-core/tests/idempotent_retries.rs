//! Idempotence: replaying any mutation with its original idempotency key
//! leaves observable state unchanged, on both store implementations.

use muninn_core::core::types::{OrderState, Side};
use muninn_core::state::MemoryKv;
use muninn_core::store::{DurableOrderStore, MemoryOrderStore, OrderStore};
use muninn_core::utils::Clock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A scripted mutation with its idempotency key.
enum Op {
    Place { symbol: &'static str, side: Side, qty: Decimal, price: Decimal, idem: &'static str },
    State { cid: &'static str, state: OrderState, idem: &'static str },
    Fill { cid: &'static str, filled: Decimal, avg: Decimal, idem: &'static str },
    CancelAll { idem: &'static str },
}

fn script() -> Vec<Op> {
    use Op::*;
    vec![
        Place { symbol: "BTCUSDT", side: Side::Buy, qty: dec!(0.01), price: dec!(50000), idem: "p1" },
        Place { symbol: "ETHUSDT", side: Side::Sell, qty: dec!(1), price: dec!(3000), idem: "p2" },
        State { cid: "CLI00000001", state: OrderState::Open, idem: "s1" },
        State { cid: "CLI00000002", state: OrderState::Open, idem: "s2" },
        Fill { cid: "CLI00000001", filled: dec!(0.004), avg: dec!(50000), idem: "f1" },
        Place { symbol: "BTCUSDT", side: Side::Sell, qty: dec!(0.02), price: dec!(50100), idem: "p3" },
        State { cid: "CLI00000003", state: OrderState::Rejected, idem: "s3" },
        Fill { cid: "CLI00000001", filled: dec!(0.01), avg: dec!(50050), idem: "f2" },
        CancelAll { idem: "c1" },
    ]
}

fn apply(store: &dyn OrderStore, op: &Op) {
    match op {
        Op::Place { symbol, side, qty, price, idem } => {
            store.place_order(symbol, *side, *qty, *price, idem, 1000);
        }
        Op::State { cid, state, idem } => {
            store.update_order_state(cid, *state, idem, 1001, None, None);
        }
        Op::Fill { cid, filled, avg, idem } => {
            store.update_fill(cid, *filled, *avg, idem, 1002);
        }
        Op::CancelAll { idem } => {
            store.cancel_all_open(idem, 1003);
        }
    }
}

/// Observable state: every order by id plus the open set.
fn observe(store: &dyn OrderStore) -> (BTreeMap<String, String>, Vec<String>, BTreeMap<String, u64>) {
    let mut orders = BTreeMap::new();
    for symbol in ["BTCUSDT", "ETHUSDT"] {
        for order in store.get_orders_by_symbol(symbol) {
            orders.insert(
                order.client_order_id.clone(),
                format!(
                    "{}|{}|{}|{}",
                    order.state, order.qty, order.filled_qty, order.avg_fill_price
                ),
            );
        }
    }
    let open = store
        .get_open_orders()
        .into_iter()
        .map(|o| o.client_order_id)
        .collect();
    (orders, open, store.count_by_state())
}

/// Run the script, optionally replaying each op immediately after itself.
fn run(store: &dyn OrderStore, with_duplicates: bool) {
    for op in script() {
        apply(store, &op);
        if with_duplicates {
            apply(store, &op);
            apply(store, &op);
        }
    }
}

#[test]
fn duplicated_ops_leave_memory_store_unchanged() {
    let clean = MemoryOrderStore::new();
    run(&clean, false);

    let noisy = MemoryOrderStore::new();
    run(&noisy, true);

    assert_eq!(observe(&clean), observe(&noisy));
}

#[test]
fn duplicated_ops_leave_durable_store_unchanged() {
    let dir_clean = tempfile::tempdir().unwrap();
    let clean = DurableOrderStore::new(
        Arc::new(MemoryKv::new(Clock::fixed(0))),
        dir_clean.path(),
        Clock::fixed(0),
    )
    .unwrap();
    run(&clean, false);

    let dir_noisy = tempfile::tempdir().unwrap();
    let noisy = DurableOrderStore::new(
        Arc::new(MemoryKv::new(Clock::fixed(0))),
        dir_noisy.path(),
        Clock::fixed(0),
    )
    .unwrap();
    run(&noisy, true);

    assert_eq!(observe(&clean), observe(&noisy));

    // Duplicates must not journal: both journals replay to the same state
    let replay_clean = DurableOrderStore::new(
        Arc::new(MemoryKv::new(Clock::fixed(0))),
        dir_clean.path(),
        Clock::fixed(0),
    )
    .unwrap();
    replay_clean.recover_from_snapshot().unwrap();

    let replay_noisy = DurableOrderStore::new(
        Arc::new(MemoryKv::new(Clock::fixed(0))),
        dir_noisy.path(),
        Clock::fixed(0),
    )
    .unwrap();
    replay_noisy.recover_from_snapshot().unwrap();

    assert_eq!(observe(&replay_clean), observe(&replay_noisy));
}

#[test]
fn scenario_idempotent_placement() {
    let store = MemoryOrderStore::new();

    let first = store.place_order("BTCUSDT", Side::Buy, dec!(0.01), dec!(50000), "place_001", 1000);
    assert!(first.success);
    assert!(!first.was_duplicate);
    assert_eq!(first.order.unwrap().client_order_id, "CLI00000001");

    let second = store.place_order("BTCUSDT", Side::Buy, dec!(0.01), dec!(50000), "place_001", 1000);
    assert!(second.success);
    assert!(second.was_duplicate);
    assert_eq!(second.order.unwrap().client_order_id, "CLI00000001");

    let total: u64 = store.count_by_state().values().sum();
    assert_eq!(total, 1);
}

#[test]
fn event_histories_follow_the_transition_table() {
    let store = MemoryOrderStore::new();
    run(&store, true);

    for symbol in ["BTCUSDT", "ETHUSDT"] {
        for order in store.get_orders_by_symbol(symbol) {
            let mut state = OrderState::Pending;
            let mut states = Vec::new();
            for event in &order.events {
                state = muninn_core::core::order_fsm::next_state(state, event.event_type)
                    .expect("event history must follow the table");
                states.push(state);
            }
            assert_eq!(state, order.state);
            // A terminal state appears at most once and only as the last entry
            for intermediate in &states[..states.len().saturating_sub(1)] {
                assert!(!intermediate.is_terminal(), "terminal state mid-history");
            }
        }
    }
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    /// A generated mutation. Parameters are small selectors expanded into
    /// concrete arguments, so shrinking stays meaningful.
    #[derive(Debug, Clone)]
    enum GenOp {
        Place { symbol_sel: u8, side_sel: u8, qty_sel: u8 },
        State { target_sel: u8, state_sel: u8 },
        Fill { target_sel: u8, qty_sel: u8 },
        CancelAll,
    }

    fn gen_op() -> impl Strategy<Value = GenOp> {
        prop_oneof![
            3 => (0u8..2, 0u8..2, 1u8..5).prop_map(|(symbol_sel, side_sel, qty_sel)| {
                GenOp::Place { symbol_sel, side_sel, qty_sel }
            }),
            3 => (0u8..6, 0u8..4).prop_map(|(target_sel, state_sel)| {
                GenOp::State { target_sel, state_sel }
            }),
            2 => (0u8..6, 0u8..6).prop_map(|(target_sel, qty_sel)| {
                GenOp::Fill { target_sel, qty_sel }
            }),
            1 => Just(GenOp::CancelAll),
        ]
    }

    /// Expand a generated op and apply it once under its index-derived
    /// idempotency key. Invalid targets and transitions are fair game:
    /// their negative results are cached and must replay identically.
    fn apply_gen(store: &dyn OrderStore, index: usize, op: &GenOp) {
        let idem = format!("gen_{index}");
        match op {
            GenOp::Place { symbol_sel, side_sel, qty_sel } => {
                let symbol = if *symbol_sel == 0 { "BTCUSDT" } else { "ETHUSDT" };
                let side = if *side_sel == 0 { Side::Buy } else { Side::Sell };
                let qty = Decimal::new(*qty_sel as i64, 2); // 0.01..0.04
                store.place_order(symbol, side, qty, dec!(50000), &idem, 1000 + index as i64);
            }
            GenOp::State { target_sel, state_sel } => {
                let cid = format!("CLI{:08}", *target_sel as u64 + 1);
                let state = [
                    OrderState::Open,
                    OrderState::Canceled,
                    OrderState::Rejected,
                    OrderState::Filled,
                ][*state_sel as usize % 4];
                store.update_order_state(&cid, state, &idem, 1000 + index as i64, None, None);
            }
            GenOp::Fill { target_sel, qty_sel } => {
                let cid = format!("CLI{:08}", *target_sel as u64 + 1);
                let filled = Decimal::new(*qty_sel as i64, 3); // 0.000..0.005
                store.update_fill(&cid, filled, dec!(50000), &idem, 1000 + index as i64);
            }
            GenOp::CancelAll => {
                store.cancel_all_open(&idem, 1000 + index as i64);
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        // Property: for any op sequence S and any duplication of entries
        // under their original idem keys, final observable state equals
        // that of S applied once.
        #[test]
        fn replayed_sequences_converge_to_the_same_state(
            ops in proptest::collection::vec(gen_op(), 1..25),
            replays in proptest::collection::vec(2u8..4, 1..25),
        ) {
            let clean = MemoryOrderStore::new();
            for (index, op) in ops.iter().enumerate() {
                apply_gen(&clean, index, op);
            }

            let noisy = MemoryOrderStore::new();
            for (index, op) in ops.iter().enumerate() {
                let times = replays.get(index % replays.len()).copied().unwrap_or(2);
                for _ in 0..times {
                    apply_gen(&noisy, index, op);
                }
            }

            prop_assert_eq!(observe(&clean), observe(&noisy));
            // Duplicates never consume ids: the next mint matches too
            prop_assert_eq!(clean.next_client_order_id(), noisy.next_client_order_id());
        }
    }
}
