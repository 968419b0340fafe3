//! Property tests for engine invariants.
//!
//! Uses proptest to verify:
//! 1. High-water mark monotonicity and drawdown bounds
//! 2. Hard stop latching — once tripped, blocked until a confirmed reset
//! 3. Emergency stop hysteresis — no chatter inside the release band
//! 4. Recovery bucket — never negative, losses never credited
//! 5. Adaptive sizing — multiplier and lot stay inside their bounds

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use gridguard_core::breakers::emergency::{EmergencyAction, EmergencyStop};
use gridguard_core::breakers::hard_stop::HardStop;
use gridguard_core::config::{EmergencyConfig, HardStopConfig, SizingConfig};
use gridguard_core::deescalation::RecoveryBucket;
use gridguard_core::domain::instrument::Instrument;
use gridguard_core::drawdown::DrawdownTracker;
use gridguard_core::history::RingBuffer;
use gridguard_core::sizing::AdaptiveSizingEngine;

fn t0() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap()
}

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_equity() -> impl Strategy<Value = f64> {
    (100.0..50_000.0_f64).prop_map(|e| (e * 100.0).round() / 100.0)
}

fn arb_drawdown() -> impl Strategy<Value = f64> {
    0.0..60.0_f64
}

// ── 1. High-water mark & drawdown bounds ─────────────────────────────

proptest! {
    /// For all equity sequences, the mark never decreases and every
    /// drawdown figure stays inside [0, 100].
    #[test]
    fn hwm_monotonic_and_dd_bounded(equities in prop::collection::vec(arb_equity(), 1..60)) {
        let mut tracker = DrawdownTracker::new(10_000.0, t0(), 0, 32);
        let mut last_hwm = 10_000.0;

        for (i, equity) in equities.iter().enumerate() {
            let now = t0() + chrono::Duration::minutes(i as i64);
            tracker.update(*equity, 10_000.0, now);
            let snap = tracker.snapshot();

            prop_assert!(snap.high_water_mark >= last_hwm, "mark decreased");
            prop_assert!(snap.high_water_mark >= *equity);
            for dd in [snap.dd_from_hwm, snap.dd_from_balance, snap.dd_daily] {
                prop_assert!((0.0..=100.0).contains(&dd), "dd out of range: {dd}");
            }
            prop_assert!(snap.max_dd_reached >= snap.dd_from_hwm - 1e-9);
            last_hwm = snap.high_water_mark;
        }
    }
}

// ── 2. Hard stop latching ────────────────────────────────────────────

proptest! {
    /// Once any reading reaches the trigger, every later check blocks,
    /// whatever the drawdown does afterwards.
    #[test]
    fn hard_stop_latches_for_any_subsequent_drawdown(
        later_dds in prop::collection::vec(arb_drawdown(), 1..40),
    ) {
        let mut hs = HardStop::new(&HardStopConfig {
            trigger_pct: 25.0,
            warning_pct: 22.5,
            reset_settle_minutes: 60,
        });
        let first = hs.check(25.0, t0());
        prop_assert!(first.blocked && first.just_tripped);

        for dd in later_dds {
            prop_assert!(hs.check(dd, t0()).blocked, "latch broke at dd={dd}");
        }
    }

    /// Only a confirmed reset releases the latch.
    #[test]
    fn hard_stop_ignores_unconfirmed_resets(dd in arb_drawdown()) {
        let mut hs = HardStop::new(&HardStopConfig {
            trigger_pct: 10.0,
            warning_pct: 9.0,
            reset_settle_minutes: 0,
        });
        hs.check(50.0, t0());
        prop_assert!(!hs.manual_reset(false, t0()));
        prop_assert!(hs.check(dd, t0()).blocked);
        prop_assert!(hs.manual_reset(true, t0()));
    }
}

// ── 3. Emergency stop hysteresis ─────────────────────────────────────

proptest! {
    /// After a trigger at warning=8/trigger=10, any reading in (4, 10]
    /// keeps the layer in a blocking or reduced state; it clears only
    /// below 4 (half the warning threshold).
    #[test]
    fn emergency_holds_inside_release_band(dds in prop::collection::vec(4.01..10.0_f64, 1..40)) {
        let mut es = EmergencyStop::new(&EmergencyConfig { trigger_pct: 10.0, warning_pct: 8.0 });
        prop_assert_eq!(es.check(11.0, t0()), EmergencyAction::StopNew);

        for dd in dds {
            let action = es.check(dd, t0());
            prop_assert_ne!(action, EmergencyAction::None, "cleared early at dd={}", dd);
        }
        prop_assert_eq!(es.check(3.99, t0()), EmergencyAction::None);
    }
}

// ── 4. Recovery bucket ratchet ───────────────────────────────────────

proptest! {
    /// The bucket never goes negative and losses never move it.
    #[test]
    fn bucket_never_negative(ops in prop::collection::vec((-50.0..50.0_f64, prop::bool::ANY), 1..60)) {
        let mut bucket = RecoveryBucket::new();
        for (amount, spend) in ops {
            if spend {
                // Engine precondition: only affordable costs are spent.
                let cost = amount.abs().min(bucket.accumulated());
                bucket.debit(cost);
            } else {
                let before = bucket.accumulated();
                bucket.credit(amount);
                if amount < 0.0 {
                    prop_assert_eq!(bucket.accumulated(), before, "loss credited");
                }
            }
            prop_assert!(bucket.accumulated() >= 0.0);
        }
    }
}

// ── 5. Adaptive sizing bounds ────────────────────────────────────────

proptest! {
    /// The multiplier stays within [min_multiplier, max(1, boost)] and
    /// the quantized lot respects broker bounds.
    #[test]
    fn sizing_stays_within_bounds(dds in prop::collection::vec(-5.0..60.0_f64, 1..40)) {
        let cfg = SizingConfig {
            reduction_start_pct: 5.0,
            reduction_full_pct: 15.0,
            min_multiplier: 0.25,
            recovery_boost: 1.5,
        };
        let mut sizing = AdaptiveSizingEngine::new(&cfg);
        let instrument =
            Instrument::new("EURUSD".into(), 0.00001, 0.01, 0.01, 100.0, 0.1).unwrap();

        for dd in dds {
            let m = sizing.multiplier(dd);
            prop_assert!(m >= cfg.min_multiplier - 1e-12);
            prop_assert!(m <= cfg.recovery_boost + 1e-12);

            let lot = instrument.quantize_lot(0.10 * m);
            prop_assert!(lot >= instrument.min_lot && lot <= instrument.max_lot);
            // Lot is an exact multiple of the step.
            let steps = lot / instrument.lot_step;
            prop_assert!((steps - steps.round()).abs() < 1e-6, "lot {lot} off-step");
        }
    }
}

// ── Ring buffer FIFO ─────────────────────────────────────────────────

proptest! {
    /// The buffer holds exactly the last `capacity` pushes, in order.
    #[test]
    fn ring_buffer_keeps_newest(
        capacity in 1usize..16,
        values in prop::collection::vec(any::<i64>(), 0..64),
    ) {
        let mut rb = RingBuffer::new(capacity);
        for v in &values {
            rb.push(*v);
        }
        let expected: Vec<i64> =
            values.iter().rev().take(capacity).rev().copied().collect();
        let actual: Vec<i64> = rb.iter().copied().collect();
        prop_assert_eq!(actual, expected);
        prop_assert!(rb.len() <= capacity);
    }
}
