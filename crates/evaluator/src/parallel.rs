use rayon::prelude::*;
use tracing::info;

use common::Result;
use strategy::{CandleContext, CandleSeries, Strategy};

use crate::lifecycle::{best_by, check_start, EvaluationResult};

/// Walk every strategy over `series` on the rayon pool. Each strategy runs
/// its own walk; the series is only read. Ranking is the same as
/// [`crate::Evaluator::results`].
pub fn evaluate_parallel<F>(
    series: &CandleSeries,
    mut strategies: Vec<Box<dyn Strategy>>,
    performance: F,
    start_cursor: usize,
) -> Result<(Option<EvaluationResult>, Vec<Box<dyn Strategy>>)>
where
    F: Fn(&dyn Strategy) -> f64,
{
    check_start(series, &strategies, start_cursor)?;
    info!(
        strategies = strategies.len(),
        candles = series.len(),
        threads = rayon::current_num_threads(),
        "Parallel evaluation started"
    );

    strategies
        .par_iter_mut()
        .try_for_each(|strategy| walk(series, strategy.as_mut(), start_cursor))?;

    info!("Parallel evaluation finished");
    let best = best_by(&strategies, performance);
    Ok((best, strategies))
}

fn walk(series: &CandleSeries, strategy: &mut dyn Strategy, start_cursor: usize) -> Result<()> {
    let candles = series.candles();
    for index in start_cursor..candles.len() {
        let ctx = CandleContext {
            index,
            current: &candles[index],
            previous: &candles[index - 1],
            series,
        };
        strategy.process_candle(&ctx)?;
    }
    Ok(())
}
