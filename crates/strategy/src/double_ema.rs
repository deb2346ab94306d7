use tracing::{debug, warn};

use common::{Error, ExitReason, OpenTrade, Result};
use performance::{Ledger, StrategyMetrics};

use crate::position::Position;
use crate::signals;
use crate::{CandleContext, Strategy, StrategyEvent};

/// Parameters of one double EMA breakout instance.
#[derive(Debug, Clone, PartialEq)]
pub struct DoubleEmaParams {
    pub short_span: usize,
    pub long_span: usize,
    /// Closed candles before the entry whose lowest low becomes the stop-loss.
    pub stop_candles: usize,
    /// Reward-to-risk ratio for the stop-gain.
    pub ratio: f64,
    /// Percentage charged on entry and on exit.
    pub trading_tax: f64,
}

impl Default for DoubleEmaParams {
    fn default() -> Self {
        Self {
            short_span: 9,
            long_span: 21,
            stop_candles: 14,
            ratio: 3.5,
            trading_tax: 0.0,
        }
    }
}

impl DoubleEmaParams {
    pub fn validate(&self) -> Result<()> {
        if self.short_span == 0 || self.long_span == 0 {
            return Err(Error::Config("EMA spans must be at least 1".into()));
        }
        if self.stop_candles == 0 {
            return Err(Error::Config("stop_candles must be at least 1".into()));
        }
        if !self.ratio.is_finite() || self.ratio <= 0.0 {
            return Err(Error::Config(format!("ratio must be positive, got {}", self.ratio)));
        }
        if !self.trading_tax.is_finite() || !(0.0..100.0).contains(&self.trading_tax) {
            return Err(Error::Config(format!(
                "trading_tax must be a percentage in [0, 100), got {}",
                self.trading_tax
            )));
        }
        Ok(())
    }
}

/// Buys the breakout of the previous high once the previous candle closed
/// above both EMAs. Exits at the stop-loss (lowest low of the lookback) or at
/// the stop-gain placed `ratio` times the risk above the entry.
#[derive(Debug, Clone)]
pub struct DoubleEmaBreakout {
    id: String,
    params: DoubleEmaParams,
    position: Position,
    ledger: Ledger,
}

impl DoubleEmaBreakout {
    pub fn new(id: impl Into<String>, params: DoubleEmaParams, starting_balance: f64) -> Result<Self> {
        params.validate()?;
        if !starting_balance.is_finite() || starting_balance <= 0.0 {
            return Err(Error::Config(format!(
                "starting_balance must be positive, got {starting_balance}"
            )));
        }
        Ok(Self {
            id: id.into(),
            ledger: Ledger::new(starting_balance, params.trading_tax),
            params,
            position: Position::Flat,
        })
    }

    /// Pick up a position that was left open by an earlier run. No entry tax
    /// is charged again.
    pub fn resume(&mut self, trade: OpenTrade) -> Result<()> {
        self.position.open(trade)
    }

    pub fn params(&self) -> &DoubleEmaParams {
        &self.params
    }

    fn try_enter(&mut self, ctx: &CandleContext<'_>) -> Result<Option<StrategyEvent>> {
        let Some(prev_index) = ctx.index.checked_sub(1) else {
            return Ok(None);
        };
        let short = ctx.series.ema(self.params.short_span)?;
        let long = ctx.series.ema(self.params.long_span)?;
        let (Some(&short_ema), Some(&long_ema)) = (short.get(prev_index), long.get(prev_index)) else {
            return Ok(None);
        };

        if !signals::double_ema_breakout(ctx.previous, ctx.current, short_ema, long_ema) {
            return Ok(None);
        }
        let Some(lookback) = ctx.series.window(ctx.index, self.params.stop_candles) else {
            return Ok(None);
        };
        let Some(stop_loss) = signals::stop_loss_from_lows(lookback) else {
            return Ok(None);
        };

        let entry_price = ctx.previous.high;
        if stop_loss >= entry_price {
            warn!(
                strategy = %self.id,
                at = %ctx.current.open_time,
                entry = entry_price,
                stop_loss = stop_loss,
                "Skipping entry: stop-loss is not below the entry price"
            );
            return Ok(None);
        }
        let stop_gain = signals::stop_gain_from_ratio(entry_price, stop_loss, self.params.ratio);

        let trade = OpenTrade {
            entry_time: ctx.current.open_time,
            entry_price,
            stop_loss,
            stop_gain,
        };
        self.position.open(trade)?;
        self.ledger.record_entry(trade.entry_time);

        debug!(
            strategy = %self.id,
            at = %trade.entry_time,
            entry = entry_price,
            stop_loss = stop_loss,
            stop_gain = stop_gain,
            potential_loss_pct = trade.potential_loss_pct(),
            potential_gain_pct = trade.potential_gain_pct(),
            "Entered position"
        );
        Ok(Some(StrategyEvent::Entered(trade)))
    }

    fn try_exit(&mut self, ctx: &CandleContext<'_>, held: OpenTrade) -> Result<Option<StrategyEvent>> {
        let Some(reason) = signals::exit_signal(ctx.current, held.stop_loss, held.stop_gain) else {
            return Ok(None);
        };
        let exit_price = match reason {
            ExitReason::StopLoss => held.stop_loss,
            ExitReason::StopGain => held.stop_gain,
        };
        let held = self.position.close()?;
        let record = self
            .ledger
            .record_exit(&held, ctx.current.open_time, exit_price, reason);
        Ok(Some(StrategyEvent::Exited(record)))
    }
}

impl Strategy for DoubleEmaBreakout {
    fn id(&self) -> &str {
        &self.id
    }

    fn indicator_spans(&self) -> Vec<usize> {
        vec![self.params.short_span, self.params.long_span]
    }

    fn warmup(&self) -> usize {
        self.params
            .short_span
            .max(self.params.long_span)
            .max(self.params.stop_candles)
    }

    fn process_candle(&mut self, ctx: &CandleContext<'_>) -> Result<Option<StrategyEvent>> {
        self.ledger.observe_candle(ctx.current.open_time);
        match self.position {
            Position::Holding(held) => self.try_exit(ctx, held),
            Position::Flat => self.try_enter(ctx),
        }
    }

    fn current_balance(&self) -> f64 {
        self.ledger.balance()
    }

    fn position(&self) -> Position {
        self.position
    }

    fn metrics(&self) -> StrategyMetrics {
        self.ledger.metrics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CandleSeries;
    use chrono::{Duration, TimeZone, Utc};
    use common::Candle;

    fn bar(i: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            open_time: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::minutes(15 * i),
            open,
            high,
            low,
            close,
            volume: 1.0,
            close_time: None,
        }
    }

    fn params() -> DoubleEmaParams {
        DoubleEmaParams {
            short_span: 3,
            long_span: 5,
            stop_candles: 3,
            ratio: 2.0,
            trading_tax: 0.0,
        }
    }

    /// Flat at 100 for `n` bars, then a close at 103 with a high of 105.
    fn setup_bars(n: i64) -> Vec<Candle> {
        let mut bars: Vec<Candle> = (0..n).map(|i| bar(i, 100.0, 100.5, 99.0, 100.0)).collect();
        bars.push(bar(n, 100.0, 105.0, 99.5, 103.0));
        bars
    }

    fn walk(strategy: &mut DoubleEmaBreakout, series: &CandleSeries, from: usize) -> Vec<StrategyEvent> {
        let mut events = Vec::new();
        for i in from..series.len() {
            let ctx = CandleContext {
                index: i,
                current: &series.candles()[i],
                previous: &series.candles()[i - 1],
                series,
            };
            if let Some(ev) = strategy.process_candle(&ctx).unwrap() {
                events.push(ev);
            }
        }
        events
    }

    #[test]
    fn rejects_bad_params() {
        let mut p = params();
        p.ratio = 0.0;
        assert!(DoubleEmaBreakout::new("x", p, 1000.0).is_err());
        assert!(DoubleEmaBreakout::new("x", params(), 0.0).is_err());
    }

    #[test]
    fn enters_at_previous_high_and_exits_at_stop_gain() {
        let mut bars = setup_bars(10);
        bars.push(bar(11, 104.0, 106.0, 103.0, 105.5));
        // stop_loss = 99.0, stop_gain = 105 + 6 * 2 = 117
        bars.push(bar(12, 106.0, 118.0, 105.0, 117.0));
        let series = CandleSeries::from_candles(bars).unwrap().with_emas([3, 5]).unwrap();

        let mut strategy = DoubleEmaBreakout::new("s", params(), 1000.0).unwrap();
        let events = walk(&mut strategy, &series, 5);

        assert_eq!(events.len(), 2);
        let StrategyEvent::Entered(open) = &events[0] else {
            panic!("expected entry, got {:?}", events[0]);
        };
        assert_eq!(open.entry_price, 105.0);
        assert_eq!(open.stop_loss, 99.0);
        assert!((open.stop_gain - 117.0).abs() < 1e-9);

        let StrategyEvent::Exited(record) = &events[1] else {
            panic!("expected exit, got {:?}", events[1]);
        };
        assert_eq!(record.exit_reason, ExitReason::StopGain);
        assert_eq!(record.exit_price, record.stop_gain);
        assert!(strategy.current_balance() > 1000.0);
        assert!(strategy.position().is_flat());
    }

    #[test]
    fn missing_ema_is_an_error() {
        let series = CandleSeries::from_candles(setup_bars(10)).unwrap().with_ema(3).unwrap();
        let mut strategy = DoubleEmaBreakout::new("s", params(), 1000.0).unwrap();
        let ctx = CandleContext {
            index: 5,
            current: &series.candles()[5],
            previous: &series.candles()[4],
            series: &series,
        };
        assert!(matches!(strategy.process_candle(&ctx), Err(Error::MissingIndicator(5))));
    }

    #[test]
    fn resumed_position_can_exit() {
        let bars: Vec<Candle> = (0..8).map(|i| bar(i, 100.0, 100.5, 99.0, 100.0)).collect();
        let series = CandleSeries::from_candles(bars).unwrap().with_emas([3, 5]).unwrap();
        let mut strategy = DoubleEmaBreakout::new("s", params(), 1000.0).unwrap();
        strategy
            .resume(OpenTrade {
                entry_time: series.candles()[0].open_time,
                entry_price: 101.0,
                stop_loss: 99.5,
                stop_gain: 110.0,
            })
            .unwrap();

        let events = walk(&mut strategy, &series, 5);
        assert!(matches!(
            &events[0],
            StrategyEvent::Exited(r) if r.exit_reason == ExitReason::StopLoss
        ));
        assert!(strategy.current_balance() < 1000.0);
    }

    #[test]
    fn warmup_covers_spans_and_lookback() {
        let mut p = params();
        p.stop_candles = 30;
        let strategy = DoubleEmaBreakout::new("s", p, 1000.0).unwrap();
        assert_eq!(strategy.warmup(), 30);
        assert_eq!(strategy.indicator_spans(), vec![3, 5]);
    }
}
