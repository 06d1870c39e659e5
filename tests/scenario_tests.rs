//! Scenario tests
//!
//! End-to-end member flows with hand-checked numbers.

use brokerage_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

struct World {
    engine: Engine,
    settings: Arc<SharedSettings>,
    notifier: Arc<RecordingNotifier>,
    member: MemberId,
}

fn world(usd: Decimal) -> World {
    let settings = Arc::new(SharedSettings::new(Settings::default()));
    let notifier = Arc::new(RecordingNotifier::new());
    let engine = Engine::new(
        EngineConfig::default(),
        Arc::new(MemoryStore::new()),
        settings.clone(),
        notifier.clone(),
        Arc::new(ManualClock::new(Timestamp(1_700_000_000_000))),
    );
    let member = engine.create_member(Member::new(Timestamp(0))).unwrap();
    engine.deposit(member, Currency::Usd, usd).unwrap();
    World {
        engine,
        settings,
        notifier,
        member,
    }
}

impl World {
    fn usd(&self) -> Decimal {
        self.engine.member(self.member).unwrap().balance(Currency::Usd)
    }
}

#[test]
fn market_buy_without_leverage() {
    let w = world(dec!(1000));
    let btc = w.engine.register_asset(Asset::crypto("BTC").with_rate(dec!(100))).unwrap();

    let order = w
        .engine
        .place_order(&OrderRequest::market(w.member, btc, Side::Buy, dec!(2)))
        .unwrap();

    assert_eq!(order.total, dec!(200));
    assert_eq!(order.leverage, Leverage::ONE);
    assert_eq!(order.status, OrderStatus::Open);
    assert_eq!(order.balance_entry, dec!(1000));
    assert_eq!(w.usd(), dec!(800));
    assert_eq!(w.engine.wallet_balance(w.member, btc).unwrap(), dec!(2));
}

#[test]
fn limit_order_waits_then_activates() {
    let w = world(dec!(1000));
    let btc = w.engine.register_asset(Asset::crypto("BTC").with_rate(dec!(100))).unwrap();

    let order = w
        .engine
        .place_order(&OrderRequest::limit(w.member, btc, Side::Buy, dec!(2), dec!(95)))
        .unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.total, dec!(190));
    assert_eq!(w.usd(), dec!(810));
    assert_eq!(w.engine.wallet_balance(w.member, btc).unwrap(), dec!(0));

    w.engine.update_rate(btc, "94").unwrap();

    assert_eq!(w.engine.order(order.id).unwrap().status, OrderStatus::Open);
    assert_eq!(w.engine.wallet_balance(w.member, btc).unwrap(), dec!(2));
    assert_eq!(w.usd(), dec!(810));
}

#[test]
fn forex_pip_profit() {
    let w = world(dec!(200000));
    let eurusd = w
        .engine
        .register_asset(Asset::forex("EURUSD").with_rate(dec!(1.1000)))
        .unwrap();

    let order = w
        .engine
        .place_order(&OrderRequest::market(w.member, eurusd, Side::Buy, dec!(1)))
        .unwrap();
    let forex = order.forex.clone().unwrap();
    assert_eq!(forex.one_pip, dec!(0.0001));
    assert_eq!(forex.pips_entry, dec!(11000));
    assert_eq!(order.total_real, dec!(100000));
    // forex runs at the class default, never what the member asks for
    assert_eq!(order.leverage.value(), dec!(100));

    w.engine.update_rate(eurusd, "1.1010").unwrap();

    let order = w.engine.order(order.id).unwrap();
    let forex = order.forex.clone().unwrap();
    assert_eq!(forex.pip_value, dec!(10));
    assert_eq!(forex.pips_closed, Some(dec!(11010)));
    assert_eq!(order.profit, dec!(100));

    let outcome = w.engine.close_order(w.member, order.id).unwrap();
    assert_eq!(outcome.order().profit, dec!(100));
    assert_eq!(w.usd(), dec!(200100));
}

#[test]
fn jpy_pairs_use_two_decimal_pips() {
    let w = world(dec!(200000));
    let usdjpy = w
        .engine
        .register_asset(Asset::forex("USDJPY").with_scale(3).with_rate(dec!(150.000)))
        .unwrap();
    let order = w
        .engine
        .place_order(&OrderRequest::market(w.member, usdjpy, Side::Sell, dec!(1)))
        .unwrap();
    assert_eq!(order.forex.unwrap().one_pip, dec!(0.01));
}

#[test]
fn stop_loss_closes_by_system() {
    let w = world(dec!(1000));
    let btc = w.engine.register_asset(Asset::crypto("BTC").with_rate(dec!(100))).unwrap();
    let order = w
        .engine
        .place_order(&OrderRequest::market(w.member, btc, Side::Buy, dec!(1)).with_sltp(dec!(5), dec!(0)))
        .unwrap();

    let update = w.engine.update_rate(btc, "94").unwrap();

    assert_eq!(update.closed_by_system, vec![order.id]);
    let closed = w.engine.order(order.id).unwrap();
    assert_eq!(closed.gain, dec!(-6));
    assert_eq!(closed.status, OrderStatus::Closed);
    assert!(closed.closed_by_system);
    assert_eq!(w.usd(), dec!(994));
    assert_eq!(
        w.notifier.count(|n| matches!(n, Notification::OrderClosed(e) if e.closed_by_system)),
        1
    );
}

#[test]
fn unset_stop_loss_falls_back_to_protection() {
    for (protection, closes) in [(dec!(6), true), (dec!(7), false), (dec!(0), false)] {
        let w = world(dec!(1000));
        w.settings.update(|s| s.stop_loss_protection = protection).unwrap();
        let btc = w.engine.register_asset(Asset::crypto("BTC").with_rate(dec!(100))).unwrap();
        let order = w
            .engine
            .place_order(&OrderRequest::market(w.member, btc, Side::Buy, dec!(1)))
            .unwrap();

        w.engine.update_rate(btc, "94").unwrap();

        let stored = w.engine.order(order.id).unwrap();
        assert_eq!(stored.status == OrderStatus::Closed, closes, "protection {protection}");
        assert_eq!(stored.closed_by_system, closes);
    }
}

#[test]
fn leveraged_profit_scales_with_leverage_squared_over_cost() {
    let w = world(dec!(1000));
    let btc = w.engine.register_asset(Asset::crypto("BTC").with_rate(dec!(100))).unwrap();
    let order = w
        .engine
        .place_order(&OrderRequest::market(w.member, btc, Side::Buy, dec!(1)).with_leverage(dec!(5)))
        .unwrap();
    assert_eq!(order.total, dec!(20));

    w.engine.update_rate(btc, "110").unwrap();

    // (110 / 5 - 20) * 5 * 5
    let order = w.engine.order(order.id).unwrap();
    assert_eq!(order.profit, dec!(50));
    assert_eq!(order.gain, dec!(10));

    w.engine.close_order(w.member, order.id).unwrap();
    assert_eq!(w.usd(), dec!(1050));
}

#[test]
fn member_limits_are_enforced() {
    let w = world(dec!(1000));
    let btc = w
        .engine
        .register_asset(Asset::crypto("BTC").with_rate(dec!(100)).with_leverage(dec!(3)))
        .unwrap();
    w.settings
        .update(|s| {
            s.stop_loss_allowed = dec!(20);
            s.take_profit_allowed = dec!(40);
        })
        .unwrap();

    let too_much_leverage = OrderRequest::market(w.member, btc, Side::Buy, dec!(1)).with_leverage(dec!(4));
    assert_eq!(w.engine.place_order(&too_much_leverage).unwrap_err().code(), "INVALID_LEVERAGE");

    let wide_stop = OrderRequest::market(w.member, btc, Side::Buy, dec!(1)).with_sltp(dec!(25), dec!(0));
    assert_eq!(w.engine.place_order(&wide_stop).unwrap_err().code(), "INVALID_STOP_LOSS");

    let wide_take = OrderRequest::market(w.member, btc, Side::Buy, dec!(1)).with_sltp(dec!(0), dec!(45));
    assert_eq!(w.engine.place_order(&wide_take).unwrap_err().code(), "INVALID_TAKE_PROFIT");

    let fine = OrderRequest::market(w.member, btc, Side::Buy, dec!(1))
        .with_leverage(dec!(3))
        .with_sltp(dec!(20), dec!(40));
    assert!(w.engine.place_order(&fine).is_ok());
}

#[test]
fn far_limit_orders_hit_protection() {
    let w = world(dec!(10000));
    w.settings.replace(Settings::protected()).unwrap();
    let btc = w.engine.register_asset(Asset::crypto("BTC").with_rate(dec!(100))).unwrap();

    // buying 60% above the market is an instant loss past the 50% protection
    let err = w
        .engine
        .place_order(&OrderRequest::limit(w.member, btc, Side::Buy, dec!(1), dec!(160)))
        .unwrap_err();
    assert_eq!(err.code(), "MAX_STOP_LOSS");

    assert!(w
        .engine
        .place_order(&OrderRequest::limit(w.member, btc, Side::Buy, dec!(1), dec!(140)))
        .is_ok());
}

#[test]
fn notifications_follow_the_lifecycle() {
    let w = world(dec!(1000));
    let btc = w.engine.register_asset(Asset::crypto("BTC").with_rate(dec!(100))).unwrap();
    let order = w
        .engine
        .place_order(&OrderRequest::limit(w.member, btc, Side::Buy, dec!(1), dec!(95)))
        .unwrap();
    w.engine.update_rate(btc, "95").unwrap();
    w.engine.close_order(w.member, order.id).unwrap();

    let kinds: Vec<&str> = w
        .notifier
        .notifications()
        .iter()
        .filter_map(|n| match n {
            Notification::OrderOpened(_) => Some("opened"),
            Notification::OrderActivated(_) => Some("activated"),
            Notification::OrderClosed(_) => Some("closed"),
            Notification::OrderCancelled(_) => Some("cancelled"),
            _ => None,
        })
        .collect();
    assert_eq!(kinds, vec!["opened", "activated", "closed"]);

    let envelope = w.notifier.envelopes().pop().unwrap();
    assert_eq!(envelope.channel, "info");
    let json = envelope.to_json().unwrap();
    assert!(json.contains("\"event\":\"balance_changed\""));
}
