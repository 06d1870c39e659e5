//! Solvency tests
//!
//! Every balance and wallet movement must be explained by the history ledger,
//! and a failed step must leave no partial writes behind.

use brokerage_core::history::{net_flows, net_qty};
use brokerage_core::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

struct Harness {
    engine: Engine,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    member: MemberId,
    asset: AssetId,
}

fn harness(settings: Settings, deposit: Decimal) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(Timestamp(1_700_000_000_000)));
    let engine = Engine::new(
        EngineConfig::default(),
        store.clone(),
        Arc::new(SharedSettings::new(settings)),
        Arc::new(RecordingNotifier::new()),
        clock.clone(),
    );
    let member = engine.create_member(Member::new(Timestamp(0))).unwrap();
    engine.deposit(member, Currency::Usd, deposit).unwrap();
    let asset = engine
        .register_asset(Asset::crypto("BTC").with_spread(dec!(0.5), dec!(0.5)))
        .unwrap();
    engine.update_rate(asset, "100").unwrap();
    Harness {
        engine,
        store,
        clock,
        member,
        asset,
    }
}

/// Ledger checks that must hold after any sequence of operations.
fn assert_books_balance(h: &Harness, deposited: Decimal) {
    let member = h.engine.member(h.member).unwrap();
    let history = h.engine.history_for_member(h.member).unwrap();
    let orders = h.engine.orders_for_member(h.member).unwrap();

    let balance = member.balance(Currency::Usd);
    let flows = net_flows(&history);
    assert_eq!(flows.get(&Currency::Usd).copied().unwrap_or_default(), balance);

    let wallet = h.engine.wallet_balance(h.member, h.asset).unwrap();
    assert_eq!(net_qty(&history, h.asset), wallet);
    let open_buys: Decimal = orders
        .iter()
        .filter(|o| o.is_open() && o.side == Side::Buy)
        .map(|o| o.qty)
        .sum();
    assert_eq!(wallet, open_buys);

    // money in = balance + money locked in live orders - realized profit
    let locked: Decimal = orders
        .iter()
        .filter(|o| o.is_open() || o.is_pending())
        .map(|o| o.total)
        .sum();
    let realized: Decimal = orders
        .iter()
        .filter(|o| o.status == OrderStatus::Closed)
        .map(|o| o.profit)
        .sum();
    assert_eq!(balance + locked - realized, deposited);

    for order in orders.iter().filter(|o| o.status == OrderStatus::Cancelled) {
        assert_eq!(order.profit, Decimal::ZERO);
    }
}

#[derive(Debug, Clone)]
enum Op {
    Market { sell: bool, qty: i64, leverage: i64 },
    Limit { sell: bool, qty: i64, offset_pct: i64 },
    Tick { rate_cents: i64 },
    Close { pick: usize },
    Bulk { filter: u8 },
    Withdraw { amount: i64 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (any::<bool>(), 1i64..20, 1i64..=10).prop_map(|(sell, qty, leverage)| Op::Market { sell, qty, leverage }),
        (any::<bool>(), 1i64..20, -30i64..=30).prop_map(|(sell, qty, offset_pct)| Op::Limit { sell, qty, offset_pct }),
        (5_000i64..20_000i64).prop_map(|rate_cents| Op::Tick { rate_cents }),
        any::<usize>().prop_map(|pick| Op::Close { pick }),
        (0u8..3).prop_map(|filter| Op::Bulk { filter }),
        (1i64..500).prop_map(|amount| Op::Withdraw { amount }),
    ]
}

fn apply(h: &Harness, op: &Op, withdrawn: &mut Decimal) {
    let side = |sell: bool| if sell { Side::Sell } else { Side::Buy };
    match *op {
        Op::Market { sell, qty, leverage } => {
            let request = OrderRequest::market(h.member, h.asset, side(sell), Decimal::from(qty))
                .with_leverage(Decimal::from(leverage));
            let _ = h.engine.place_order(&request);
        }
        Op::Limit { sell, qty, offset_pct } => {
            let rate = h.engine.asset(h.asset).unwrap().rate;
            let limit = (rate * (Decimal::ONE_HUNDRED + Decimal::from(offset_pct)) / Decimal::ONE_HUNDRED).round_dp(2);
            let request = OrderRequest::limit(h.member, h.asset, side(sell), Decimal::from(qty), limit);
            let _ = h.engine.place_order(&request);
        }
        Op::Tick { rate_cents } => {
            h.clock.advance_time(60_000);
            h.engine.update_rate(h.asset, &Decimal::new(rate_cents, 2).to_string()).unwrap();
        }
        Op::Close { pick } => {
            let orders = h.engine.orders_for_member(h.member).unwrap();
            if !orders.is_empty() {
                let order = &orders[pick % orders.len()];
                h.engine.close_order(h.member, order.id).unwrap();
            }
        }
        Op::Bulk { filter } => {
            let filter = match filter {
                0 => BulkFilter::Losing,
                1 => BulkFilter::Winning,
                _ => BulkFilter::All,
            };
            let report = h.engine.close_bulk(h.member, filter).unwrap();
            assert!(report.failed.is_empty());
        }
        Op::Withdraw { amount } => {
            let amount = Decimal::from(amount);
            if h.engine.withdraw(h.member, Currency::Usd, amount).is_ok() {
                *withdrawn += amount;
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Any mix of trades, ticks, closes and withdrawals keeps the ledger
    /// consistent with balances and wallets
    #[test]
    fn ledger_explains_every_balance(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let h = harness(Settings::protected(), dec!(5000));
        let mut withdrawn = Decimal::ZERO;
        for op in &ops {
            apply(&h, op, &mut withdrawn);
            assert_books_balance(&h, dec!(5000) - withdrawn);
        }
    }
}

mod deterministic_solvency {
    use super::*;

    #[test]
    fn collateral_returned_on_flat_close() {
        let h = harness(Settings::default(), dec!(1000));
        let order = h
            .engine
            .place_order(&OrderRequest::market(h.member, h.asset, Side::Sell, dec!(3)).with_leverage(dec!(2)))
            .unwrap();
        // sold at 99.5, buy back at the same ask
        h.engine.update_rate(h.asset, "99.0").unwrap();
        let outcome = h.engine.close_order(h.member, order.id).unwrap();
        assert_eq!(outcome.order().rate_closed, Some(dec!(99.5)));
        assert_eq!(outcome.order().profit, dec!(0));
        assert_eq!(h.engine.member(h.member).unwrap().balance(Currency::Usd), dec!(1000));
        assert_books_balance(&h, dec!(1000));
    }

    #[test]
    fn store_outage_rejects_without_side_effects() {
        let h = harness(Settings::default(), dec!(1000));
        h.store.set_unavailable(true);
        let err = h
            .engine
            .place_order(&OrderRequest::market(h.member, h.asset, Side::Buy, dec!(1)))
            .unwrap_err();
        assert_eq!(err.code(), "TRY_AGAIN");
        assert!(err.is_retryable());
        h.store.set_unavailable(false);

        assert!(h.engine.orders_for_member(h.member).unwrap().is_empty());
        assert_books_balance(&h, dec!(1000));
    }

    #[test]
    fn failed_activation_is_retried_next_tick() {
        let h = harness(Settings::default(), dec!(1000));
        let order = h
            .engine
            .place_order(&OrderRequest::limit(h.member, h.asset, Side::Buy, dec!(2), dec!(90)))
            .unwrap();

        h.store.fail_next_history_insert();
        let update = h.engine.update_rate(h.asset, "89").unwrap();
        assert!(update.activated.is_empty());
        assert_eq!(update.failures.len(), 1);
        assert_eq!(h.engine.order(order.id).unwrap().status, OrderStatus::Pending);
        assert_eq!(h.engine.wallet_balance(h.member, h.asset).unwrap(), dec!(0));
        assert_books_balance(&h, dec!(1000));

        h.clock.advance_time(60_000);
        let update = h.engine.update_rate(h.asset, "89").unwrap();
        assert_eq!(update.activated, vec![order.id]);
        assert_books_balance(&h, dec!(1000));
    }

    #[test]
    fn losses_beyond_margin_are_booked_not_hidden() {
        let h = harness(Settings::default(), dec!(100));
        let order = h
            .engine
            .place_order(&OrderRequest::market(h.member, h.asset, Side::Buy, dec!(5)).with_leverage(dec!(10)))
            .unwrap();
        assert_eq!(order.total, dec!(50.25));

        h.engine.update_rate(h.asset, "80").unwrap();
        h.engine.close_order(h.member, order.id).unwrap();
        let closed = h.engine.order(order.id).unwrap();
        assert!(closed.profit < -closed.total);
        assert_books_balance(&h, dec!(100));
    }

    #[test]
    fn double_close_pays_once() {
        let h = harness(Settings::default(), dec!(1000));
        let order = h
            .engine
            .place_order(&OrderRequest::market(h.member, h.asset, Side::Buy, dec!(1)))
            .unwrap();
        h.engine.update_rate(h.asset, "120").unwrap();

        let first = h.engine.close_order(h.member, order.id).unwrap();
        let second = h.engine.close_order(h.member, order.id).unwrap();
        assert!(first.settled());
        assert!(!second.settled());

        let closes = h
            .engine
            .history_for_member(h.member)
            .unwrap()
            .iter()
            .filter(|e| e.kind == HistoryKind::OrderClose)
            .count();
        assert_eq!(closes, 1);
        assert_books_balance(&h, dec!(1000));
    }
}
