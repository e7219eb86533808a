//! Imbalance-box retest strategy
//!
//! A box is a three-candle gap on the 3-minute series. Once a later 15-second
//! candle trades back into the box, the next three-candle expansion in the
//! box's direction produces a sized [`TradeIntent`].

use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};

use crate::domain::entities::candle::{Candle, Interval};
use crate::domain::entities::imbalance_box::ImbalanceBox;
use crate::domain::entities::order::Side;
use crate::domain::entities::signal::{BlockReason, SignalCandidate};
use crate::domain::entities::trade_intent::TradeIntent;
use crate::domain::services::position_sizer::PositionSizer;
use crate::domain::value_objects::position_sizing::RiskConfig;

const WINDOW: usize = 3;

/// Result of evaluating one closed 15-second candle
#[derive(Debug, Clone, PartialEq)]
pub enum EngineOutput {
    /// A sized entry ready for the signal ledger
    Intent(TradeIntent),
    /// The pattern fired but is not tradable; recorded as blocked
    NearMiss {
        candidate: SignalCandidate,
        reason: BlockReason,
    },
}

#[derive(Debug, Default)]
struct SymbolState {
    active_box: Option<ImbalanceBox>,
    recent_15s: VecDeque<Candle>,
    recent_3m: VecDeque<Candle>,
}

/// Keep the last `WINDOW` consecutive candles; any gap restarts the window.
fn push_window(window: &mut VecDeque<Candle>, candle: &Candle, interval: Interval) {
    if let Some(last) = window.back() {
        if candle.interval_start != last.interval_start + interval.seconds() {
            window.clear();
        }
    }
    window.push_back(candle.clone());
    while window.len() > WINDOW {
        window.pop_front();
    }
}

pub struct StrategyEngine {
    sizer: PositionSizer,
    record_direction_mismatch: bool,
    states: HashMap<String, SymbolState>,
}

impl StrategyEngine {
    pub fn new(sizer: PositionSizer, record_direction_mismatch: bool) -> Self {
        Self {
            sizer,
            record_direction_mismatch,
            states: HashMap::new(),
        }
    }

    /// Handle a closed 3-minute candle: invalidate, then detect.
    ///
    /// Returns the new box when this close formed one.
    pub fn on_3m_close(&mut self, candle: &Candle) -> Option<ImbalanceBox> {
        let state = self.states.entry(candle.symbol.clone()).or_default();
        push_window(&mut state.recent_3m, candle, Interval::ThreeMinutes);

        if let Some(active) = state.active_box.as_mut() {
            if !active.invalid
                && candle.interval_start > active.origin_time
                && active.is_broken_by(candle.close)
            {
                active.invalid = true;
                info!(
                    "{} {} box from {} invalidated by 3m close {}",
                    candle.symbol, active.side, active.origin_time, candle.close
                );
            }
        }

        if state.recent_3m.len() < WINDOW {
            return None;
        }
        let detected = ImbalanceBox::detect(&state.recent_3m[0], &state.recent_3m[2])?;
        info!(
            "{} {} box detected at {}: [{}, {}]",
            candle.symbol, detected.side, detected.origin_time, detected.bottom, detected.top
        );
        state.active_box = Some(detected.clone());
        Some(detected)
    }

    /// Handle a closed, tradable 15-second candle: retest, then entry.
    pub fn on_15s_close(&mut self, candle: &Candle, risk: &RiskConfig) -> Option<EngineOutput> {
        let state = self.states.entry(candle.symbol.clone()).or_default();
        push_window(&mut state.recent_15s, candle, Interval::FifteenSeconds);

        let active = state.active_box.as_mut()?;
        // only candles after the box-forming 3m candle count
        if candle.interval_start < active.origin_time + Interval::ThreeMinutes.seconds() {
            return None;
        }

        if !active.retested && !active.invalid && candle.overlaps(active.bottom, active.top) {
            active.retested = true;
            info!(
                "{} {} box from {} retested at {}",
                candle.symbol, active.side, active.origin_time, candle.interval_start
            );
        }

        if !active.is_tradable() || state.recent_15s.len() < WINDOW {
            return None;
        }

        let (a, b, d) = (
            &state.recent_15s[0],
            &state.recent_15s[1],
            &state.recent_15s[2],
        );
        let direction = if d.low > a.high {
            Side::Long
        } else if d.high < a.low {
            Side::Short
        } else {
            return None;
        };

        if direction != active.side {
            debug!(
                "{} {} expansion against {} box at {}",
                candle.symbol, direction, active.side, d.interval_start
            );
            if !self.record_direction_mismatch {
                return None;
            }
            return Some(EngineOutput::NearMiss {
                candidate: SignalCandidate {
                    symbol: candle.symbol.clone(),
                    side: direction,
                    entry_time: d.interval_start,
                    fvg_time: active.origin_time,
                    entry_price: d.close,
                },
                reason: BlockReason::DirectionMismatch,
            });
        }

        let entry_price = d.close;
        let stop_price = match direction {
            Side::Long => b.low,
            Side::Short => b.high,
        };

        let sized = match self.sizer.size(direction, entry_price, stop_price, risk) {
            Ok(sized) => sized,
            Err(rejection) => {
                debug!(
                    "{} entry at {} not sized: {}",
                    candle.symbol, d.interval_start, rejection
                );
                return None;
            }
        };

        Some(EngineOutput::Intent(TradeIntent {
            symbol: candle.symbol.clone(),
            side: direction,
            entry_time: d.interval_start,
            fvg_time: active.origin_time,
            entry_price,
            stop_price,
            take_profit_price: sized.take_profit_price,
            stop_ticks: sized.stop_ticks,
            tp_ticks: sized.tp_ticks,
            rr: risk.reward_risk_ratio,
            contracts: sized.contracts,
            risk_usd_planned: sized.risk_usd_planned,
        }))
    }

    /// Mark the active box traded if it is still the one that produced `fvg_time`.
    pub fn mark_traded(&mut self, symbol: &str, fvg_time: i64) -> bool {
        match self
            .states
            .get_mut(symbol)
            .and_then(|s| s.active_box.as_mut())
        {
            Some(active) if active.origin_time == fvg_time => {
                active.traded = true;
                true
            }
            _ => false,
        }
    }

    pub fn active_box(&self, symbol: &str) -> Option<&ImbalanceBox> {
        self.states.get(symbol).and_then(|s| s.active_box.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::tick::TickSpec;

    const B0: i64 = 1_700_000_100; // aligned to 180s

    fn engine(record_mismatch: bool) -> StrategyEngine {
        let sizer = PositionSizer::new(TickSpec::new(0.25, 1.0).unwrap());
        StrategyEngine::new(sizer, record_mismatch)
    }

    fn bar(t: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle::new("MNQ", t, open, high, low, close)
    }

    /// Three 3m closes leaving a bullish gap between 100 and 104; origin = B0 + 360.
    fn form_long_box(engine: &mut StrategyEngine) -> ImbalanceBox {
        assert!(engine.on_3m_close(&bar(B0, 98.0, 100.0, 97.0, 99.0)).is_none());
        assert!(engine.on_3m_close(&bar(B0 + 180, 99.0, 106.0, 99.0, 105.0)).is_none());
        engine
            .on_3m_close(&bar(B0 + 360, 105.0, 108.0, 104.0, 107.0))
            .unwrap()
    }

    /// Retest into the box then a long expansion: a.high 103, b.low 101, d.low 103.5.
    fn retest_then_long(engine: &mut StrategyEngine, start: i64) -> Option<EngineOutput> {
        let risk = RiskConfig::default();
        assert!(engine
            .on_15s_close(&bar(start, 102.5, 103.0, 102.0, 102.75), &risk)
            .is_none());
        assert!(engine
            .on_15s_close(&bar(start + 15, 102.75, 103.25, 101.0, 103.0), &risk)
            .is_none());
        engine.on_15s_close(&bar(start + 30, 103.5, 104.5, 103.5, 104.0), &risk)
    }

    #[test]
    fn test_bullish_box_detection() {
        let mut engine = engine(false);
        let detected = form_long_box(&mut engine);
        assert_eq!(detected.side, Side::Long);
        assert_eq!(detected.bottom, 100.0);
        assert_eq!(detected.top, 104.0);
        assert_eq!(detected.origin_time, B0 + 360);
    }

    #[test]
    fn test_retest_then_expansion_produces_intent() {
        let mut engine = engine(false);
        let detected = form_long_box(&mut engine);
        let output = retest_then_long(&mut engine, detected.origin_time + 180).unwrap();

        let EngineOutput::Intent(intent) = output else {
            panic!("expected intent");
        };
        assert_eq!(intent.side, Side::Long);
        assert_eq!(intent.entry_price, 104.0);
        assert_eq!(intent.stop_price, 101.0);
        assert_eq!(intent.stop_ticks, 12);
        assert_eq!(intent.contracts, 20);
        assert_eq!(intent.tp_ticks, 24);
        assert_eq!(intent.take_profit_price, 110.0);
        assert_eq!(intent.fvg_time, detected.origin_time);
        assert_eq!(intent.entry_time, detected.origin_time + 210);
        assert!(intent.has_valid_bracket());
    }

    #[test]
    fn test_candles_inside_forming_bar_do_not_retest() {
        let mut engine = engine(false);
        let detected = form_long_box(&mut engine);
        // these 15s candles belong to the box-forming 3m candle
        let output = retest_then_long(&mut engine, detected.origin_time);
        assert!(output.is_none());
        assert!(!engine.active_box("MNQ").unwrap().retested);
    }

    #[test]
    fn test_entry_needs_consecutive_candles() {
        let mut engine = engine(false);
        let detected = form_long_box(&mut engine);
        let risk = RiskConfig::default();
        let start = detected.origin_time + 180;
        engine.on_15s_close(&bar(start, 102.5, 103.0, 102.0, 102.75), &risk);
        engine.on_15s_close(&bar(start + 15, 102.75, 103.25, 101.0, 103.0), &risk);
        assert!(engine.active_box("MNQ").unwrap().retested);

        // two hours of silence, then a candle that would complete the pattern
        let late = start + 15 + 7_200;
        assert!(engine
            .on_15s_close(&bar(late, 103.5, 104.5, 103.5, 104.0), &risk)
            .is_none());

        // the window rebuilds from fresh candles only
        assert!(engine
            .on_15s_close(&bar(late + 15, 104.0, 104.25, 103.75, 104.0), &risk)
            .is_none());
        let output = engine.on_15s_close(&bar(late + 30, 105.0, 105.5, 104.75, 105.25), &risk);
        let Some(EngineOutput::Intent(intent)) = output else {
            panic!("expected intent, got {:?}", output);
        };
        assert_eq!(intent.entry_time, late + 30);
        assert_eq!(intent.stop_price, 103.75);
    }

    #[test]
    fn test_no_intent_before_retest() {
        let mut engine = engine(false);
        let detected = form_long_box(&mut engine);
        let risk = RiskConfig::default();
        let start = detected.origin_time + 180;
        // all above the box top
        engine.on_15s_close(&bar(start, 105.0, 105.5, 104.5, 105.25), &risk);
        engine.on_15s_close(&bar(start + 15, 105.25, 106.0, 104.75, 105.5), &risk);
        let output = engine.on_15s_close(&bar(start + 30, 106.0, 107.0, 106.0, 106.5), &risk);
        assert!(output.is_none());
    }

    #[test]
    fn test_direction_mismatch_is_silent_by_default() {
        let mut engine = engine(false);
        let detected = form_long_box(&mut engine);
        let risk = RiskConfig::default();
        let start = detected.origin_time + 180;
        engine.on_15s_close(&bar(start, 103.0, 103.5, 102.5, 103.0), &risk);
        engine.on_15s_close(&bar(start + 15, 102.0, 102.5, 101.5, 102.0), &risk);
        // d.high < a.low: short expansion against a long box
        let output = engine.on_15s_close(&bar(start + 30, 101.0, 102.0, 100.5, 101.0), &risk);
        assert!(output.is_none());
    }

    #[test]
    fn test_direction_mismatch_recorded_when_enabled() {
        let mut engine = engine(true);
        let detected = form_long_box(&mut engine);
        let risk = RiskConfig::default();
        let start = detected.origin_time + 180;
        engine.on_15s_close(&bar(start, 103.0, 103.5, 102.5, 103.0), &risk);
        engine.on_15s_close(&bar(start + 15, 102.0, 102.5, 101.5, 102.0), &risk);
        let output = engine
            .on_15s_close(&bar(start + 30, 101.0, 102.0, 100.5, 101.0), &risk)
            .unwrap();
        match output {
            EngineOutput::NearMiss { candidate, reason } => {
                assert_eq!(candidate.side, Side::Short);
                assert_eq!(reason, BlockReason::DirectionMismatch);
            }
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[test]
    fn test_invalidation_blocks_entry() {
        let mut engine = engine(false);
        let detected = form_long_box(&mut engine);
        engine.on_3m_close(&bar(detected.origin_time + 180, 101.0, 101.0, 98.0, 99.0));
        assert!(engine.active_box("MNQ").unwrap().invalid);

        let output = retest_then_long(&mut engine, detected.origin_time + 360);
        assert!(output.is_none());
    }

    #[test]
    fn test_replaced_box_is_never_marked_traded() {
        let mut engine = engine(false);
        let first = form_long_box(&mut engine);

        // c0.low 112 > c2.high 106 forms a new long box
        let second = engine
            .on_3m_close(&bar(first.origin_time + 180, 112.0, 114.0, 112.0, 113.0))
            .unwrap();
        assert_ne!(second.origin_time, first.origin_time);

        assert!(!engine.mark_traded("MNQ", first.origin_time));
        assert!(!engine.active_box("MNQ").unwrap().traded);
        assert!(engine.mark_traded("MNQ", second.origin_time));
        assert!(engine.active_box("MNQ").unwrap().traded);
    }

    #[test]
    fn test_traded_box_yields_no_further_intents() {
        let mut engine = engine(false);
        let detected = form_long_box(&mut engine);
        assert!(retest_then_long(&mut engine, detected.origin_time + 180).is_some());
        assert!(engine.mark_traded("MNQ", detected.origin_time));

        let risk = RiskConfig::default();
        let output = engine.on_15s_close(
            &bar(detected.origin_time + 225, 104.5, 106.0, 104.5, 105.5),
            &risk,
        );
        assert!(output.is_none());
    }
}
