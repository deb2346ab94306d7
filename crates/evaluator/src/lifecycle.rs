use serde::Serialize;
use tracing::{debug, info};

use common::{Error, Result};
use performance::StrategyMetrics;
use strategy::{CandleContext, CandleSeries, Strategy, StrategyEvent};

/// The best strategy of a walk, as chosen by the performance function.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationResult {
    pub identifier: String,
    pub score: f64,
    pub metrics: StrategyMetrics,
}

/// One state change emitted during [`Evaluator::step`].
#[derive(Debug, Clone, PartialEq)]
pub struct StepEvent {
    /// Index into the evaluator's strategy list.
    pub strategy: usize,
    pub event: StrategyEvent,
}

/// Walks a candle series one cursor position at a time and feeds each candle
/// to every strategy.
///
/// Nothing is traded before `start_cursor`. The performance function scores a
/// strategy when the best one is picked in [`Evaluator::results`].
pub struct Evaluator<'a, F>
where
    F: Fn(&dyn Strategy) -> f64,
{
    series: &'a CandleSeries,
    strategies: Vec<Box<dyn Strategy>>,
    performance: F,
    start_cursor: usize,
    cursor: usize,
}

impl<'a, F> Evaluator<'a, F>
where
    F: Fn(&dyn Strategy) -> f64,
{
    pub fn new(
        series: &'a CandleSeries,
        strategies: Vec<Box<dyn Strategy>>,
        performance: F,
        start_cursor: usize,
    ) -> Result<Self> {
        check_start(series, &strategies, start_cursor)?;
        info!(
            strategies = strategies.len(),
            candles = series.len(),
            start_cursor,
            "Evaluator ready"
        );
        Ok(Self {
            series,
            strategies,
            performance,
            start_cursor,
            cursor: 0,
        })
    }

    pub fn is_done(&self) -> bool {
        self.cursor >= self.series.len() || self.strategies.is_empty()
    }

    /// Share of the series already walked, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.series.is_empty() {
            return 1.0;
        }
        self.cursor.min(self.series.len()) as f64 / self.series.len() as f64
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Advance one candle. The cursor moves even when a strategy fails, so a
    /// retried step never feeds the same candle twice. Events from strategies
    /// that ran before the failing one are dropped with the error.
    pub fn step(&mut self) -> Result<Vec<StepEvent>> {
        if self.is_done() {
            return Ok(Vec::new());
        }
        let index = self.cursor;
        self.cursor += 1;
        if index < self.start_cursor {
            return Ok(Vec::new());
        }

        let series = self.series;
        let candles = series.candles();
        let ctx = CandleContext {
            index,
            current: &candles[index],
            previous: &candles[index - 1],
            series,
        };
        let mut events = Vec::new();
        for (i, strategy) in self.strategies.iter_mut().enumerate() {
            if let Some(event) = strategy.process_candle(&ctx)? {
                debug!(strategy = %strategy.id(), index, ?event, "Strategy event");
                events.push(StepEvent { strategy: i, event });
            }
        }
        Ok(events)
    }

    /// Step until the series is exhausted.
    pub fn run(&mut self) -> Result<()> {
        info!(candles = self.series.len(), "Evaluation started");
        let mut events = 0usize;
        while !self.is_done() {
            events += self.step()?.len();
        }
        info!(events, "Evaluation finished");
        Ok(())
    }

    /// The highest-scoring strategy. Ties keep the earlier strategy.
    pub fn results(&self) -> Option<EvaluationResult> {
        best_by(&self.strategies, &self.performance)
    }

    pub fn strategies(&self) -> &[Box<dyn Strategy>] {
        &self.strategies
    }

    pub fn into_strategies(self) -> Vec<Box<dyn Strategy>> {
        self.strategies
    }
}

/// `start_cursor` must leave a previous candle, cover every strategy's
/// warm-up, and stay inside the series. Every EMA a strategy reads must be
/// attached.
pub(crate) fn check_start(
    series: &CandleSeries,
    strategies: &[Box<dyn Strategy>],
    start_cursor: usize,
) -> Result<()> {
    let required = strategies
        .iter()
        .map(|s| s.warmup())
        .max()
        .unwrap_or(0)
        .max(1);
    if start_cursor < required {
        return Err(Error::WarmupTooShort {
            start_cursor,
            required,
        });
    }
    if series.len() <= start_cursor {
        return Err(Error::InsufficientHistory {
            required: start_cursor + 1,
            available: series.len(),
        });
    }
    for strategy in strategies {
        for span in strategy.indicator_spans() {
            series.ema(span)?;
        }
    }
    Ok(())
}

pub(crate) fn best_by<F>(strategies: &[Box<dyn Strategy>], performance: F) -> Option<EvaluationResult>
where
    F: Fn(&dyn Strategy) -> f64,
{
    let mut best: Option<(&dyn Strategy, f64)> = None;
    for strategy in strategies {
        let score = performance(strategy.as_ref());
        match best {
            Some((_, top)) if score.total_cmp(&top).is_le() => {}
            _ => best = Some((strategy.as_ref(), score)),
        }
    }
    best.map(|(strategy, score)| {
        info!(strategy = %strategy.id(), score, "Best strategy");
        EvaluationResult {
            identifier: strategy.id().to_string(),
            score,
            metrics: strategy.metrics(),
        }
    })
}
