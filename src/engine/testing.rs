// shared fixtures for the engine's unit tests

use super::config::EngineConfig;
use super::core::Engine;
use crate::clock::ManualClock;
use crate::config::{Settings, SharedSettings};
use crate::events::RecordingNotifier;
use crate::member::Member;
use crate::store::MemoryStore;
use crate::types::{Currency, MemberId, Timestamp};
use rust_decimal::Decimal;
use std::sync::Arc;

pub(crate) const START: Timestamp = Timestamp(1_700_000_000_000);

pub(crate) struct TestEngine {
    pub engine: Engine,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
    pub settings: Arc<SharedSettings>,
    pub member_id: MemberId,
}

pub(crate) fn engine_with_member(usd: Decimal) -> TestEngine {
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let clock = Arc::new(ManualClock::new(START));
    let settings = Arc::new(SharedSettings::new(Settings::default()));
    let engine = Engine::new(
        EngineConfig::default(),
        store.clone(),
        settings.clone(),
        notifier.clone(),
        clock.clone(),
    );

    let member_id = engine.create_member(Member::new(START)).unwrap();
    if usd > Decimal::ZERO {
        engine.deposit(member_id, Currency::Usd, usd).unwrap();
    }

    TestEngine {
        engine,
        store,
        notifier,
        clock,
        settings,
        member_id,
    }
}
