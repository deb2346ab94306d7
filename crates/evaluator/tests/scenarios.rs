use chrono::{Duration, TimeZone, Utc};
use common::{Candle, ExitReason};
use evaluator::{evaluate_parallel, Evaluator, StepEvent};
use strategy::{CandleSeries, DoubleEmaBreakout, DoubleEmaParams, Strategy, StrategyEvent};

fn bar(i: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
    Candle {
        open_time: Utc.with_ymd_and_hms(2023, 8, 1, 0, 0, 0).unwrap() + Duration::minutes(15 * i),
        open,
        high,
        low,
        close,
        volume: 10.0,
        close_time: None,
    }
}

fn params(trading_tax: f64) -> DoubleEmaParams {
    DoubleEmaParams {
        short_span: 9,
        long_span: 21,
        stop_candles: 14,
        ratio: 3.5,
        trading_tax,
    }
}

fn one(id: &str, trading_tax: f64) -> Vec<Box<dyn Strategy>> {
    vec![Box::new(DoubleEmaBreakout::new(id, params(trading_tax), 1000.0).unwrap())]
}

fn series(bars: Vec<Candle>) -> CandleSeries {
    CandleSeries::from_candles(bars).unwrap().with_emas([9, 21]).unwrap()
}

fn balance(s: &dyn Strategy) -> f64 {
    s.current_balance()
}

fn collect(evaluator: &mut Evaluator<'_, fn(&dyn Strategy) -> f64>) -> Vec<StepEvent> {
    let mut events = Vec::new();
    while !evaluator.is_done() {
        events.extend(evaluator.step().unwrap());
    }
    events
}

/// 30 flat bars at 100, a breakout setup bar closing at 103 with a high of
/// 105, then a bar trading through 105.
fn breakout_bars() -> Vec<Candle> {
    let mut bars: Vec<Candle> = (0..30).map(|i| bar(i, 100.0, 100.5, 99.5, 100.0)).collect();
    bars.push(bar(30, 100.0, 105.0, 99.8, 103.0));
    bars.push(bar(31, 104.0, 110.0, 103.0, 109.0));
    bars
}

#[test]
fn breakout_enters_at_previous_high() {
    let series = series(breakout_bars());
    let mut ev = Evaluator::new(&series, one("a", 0.0), balance as fn(&dyn Strategy) -> f64, 21).unwrap();
    let events = collect(&mut ev);

    assert_eq!(events.len(), 1);
    let StrategyEvent::Entered(open) = &events[0].event else {
        panic!("expected an entry, got {:?}", events[0]);
    };
    assert_eq!(open.entry_price, 105.0);
    assert_eq!(open.entry_time, series.candles()[31].open_time);
    assert_eq!(open.stop_loss, 99.5);
    assert!((open.stop_gain - (105.0 + 5.5 * 3.5)).abs() < 1e-9);
}

#[test]
fn nothing_trades_before_start_cursor() {
    let mut bars = breakout_bars();
    // Stays under the high of bar 31, so no new breakout from the cursor on
    bars.push(bar(32, 109.0, 109.8, 108.0, 109.0));
    let series = series(bars);
    let mut ev = Evaluator::new(&series, one("a", 0.0), balance as fn(&dyn Strategy) -> f64, 32).unwrap();
    let events = collect(&mut ev);

    assert!(events.is_empty(), "unexpected events: {events:?}");
    let metrics = ev.strategies()[0].metrics();
    assert!(metrics.trades.is_empty());
    assert_eq!(metrics.balance, 1000.0);
    assert!(ev.strategies()[0].position().is_flat());
}

#[test]
fn both_stops_on_one_candle_exit_at_stop_loss() {
    let mut bars = breakout_bars();
    bars.push(bar(32, 109.0, 130.0, 99.0, 100.0));
    let series = series(bars);
    let mut ev = Evaluator::new(&series, one("a", 0.0), balance as fn(&dyn Strategy) -> f64, 21).unwrap();
    let events = collect(&mut ev);

    let StrategyEvent::Exited(record) = &events[1].event else {
        panic!("expected an exit, got {:?}", events[1]);
    };
    assert_eq!(record.exit_reason, ExitReason::StopLoss);
    assert_eq!(record.exit_price, 99.5);
    assert!(ev.strategies()[0].current_balance() < 1000.0);
}

#[test]
fn stop_gain_uses_reward_ratio() {
    let mut bars: Vec<Candle> = (0..30).map(|i| bar(i, 96.0, 96.5, 95.0, 96.0)).collect();
    bars.push(bar(30, 96.0, 100.0, 95.5, 99.0));
    bars.push(bar(31, 99.5, 101.0, 99.0, 100.5));
    bars.push(bar(32, 101.0, 118.0, 100.0, 117.0));
    let series = series(bars);

    let mut ev = Evaluator::new(&series, one("a", 0.0), balance as fn(&dyn Strategy) -> f64, 21).unwrap();
    let events = collect(&mut ev);

    let StrategyEvent::Entered(open) = &events[0].event else {
        panic!("expected an entry");
    };
    assert_eq!(open.entry_price, 100.0);
    assert_eq!(open.stop_loss, 95.0);
    assert!((open.stop_gain - 117.5).abs() < 1e-12);

    let StrategyEvent::Exited(record) = &events[1].event else {
        panic!("expected an exit");
    };
    assert_eq!(record.exit_reason, ExitReason::StopGain);
    assert!((record.outcome_pct - 17.5).abs() < 1e-9);
    assert!((ev.strategies()[0].current_balance() - 1175.0).abs() < 1e-9);
}

fn wavy_bars() -> Vec<Candle> {
    (0..400)
        .map(|i| {
            let x = i as f64;
            let close = 100.0 + (x / 7.0).sin() * 8.0 + (x / 23.0).cos() * 5.0;
            let open = close - (x / 3.0).sin();
            let high = close.max(open) + 1.0 + (x / 5.0).sin().abs();
            let low = close.min(open) - 1.0 - (x / 11.0).cos().abs();
            bar(i, open, high, low, close)
        })
        .collect()
}

#[test]
fn replay_is_deterministic() {
    let series = series(wavy_bars());
    let run = || {
        let mut ev = Evaluator::new(&series, one("a", 0.05), balance as fn(&dyn Strategy) -> f64, 21).unwrap();
        ev.run().unwrap();
        ev.into_strategies().remove(0).metrics()
    };
    let first = run();
    let second = run();
    assert!(!first.trades.is_empty());
    assert_eq!(first.trades, second.trades);
    assert_eq!(first.balance, second.balance);
}

#[test]
fn parallel_matches_sequential() {
    let series = series(wavy_bars());
    let build = || -> Vec<Box<dyn Strategy>> {
        [1.5, 2.0, 3.5]
            .into_iter()
            .map(|ratio| {
                let p = DoubleEmaParams { ratio, ..params(0.05) };
                Box::new(DoubleEmaBreakout::new(format!("r{ratio}"), p, 1000.0).unwrap()) as Box<dyn Strategy>
            })
            .collect()
    };

    let mut ev = Evaluator::new(&series, build(), balance as fn(&dyn Strategy) -> f64, 21).unwrap();
    ev.run().unwrap();
    let sequential = ev.results().unwrap();

    let (parallel, strategies) = evaluate_parallel(&series, build(), balance, 21).unwrap();
    let parallel = parallel.unwrap();

    assert_eq!(parallel.identifier, sequential.identifier);
    assert_eq!(parallel.metrics, sequential.metrics);
    for (a, b) in strategies.iter().zip(ev.strategies()) {
        assert_eq!(a.current_balance(), b.current_balance());
    }
}
