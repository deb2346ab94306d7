//! Pure signal functions. None of them look past the candles they are given.

use common::{Candle, ExitReason};

/// Double EMA breakout: the previous closed candle finished above both EMAs
/// and the current candle trades above the previous high.
///
/// `short_ema` and `long_ema` are the EMA values at the previous candle.
pub fn double_ema_breakout(previous: &Candle, current: &Candle, short_ema: f64, long_ema: f64) -> bool {
    previous.close > long_ema && previous.close > short_ema && current.high > previous.high
}

pub fn stop_loss_hit(current: &Candle, stop_loss: f64) -> bool {
    current.low <= stop_loss
}

pub fn stop_gain_hit(current: &Candle, stop_gain: f64) -> bool {
    current.high >= stop_gain
}

/// Lowest low of `lookback`. `None` for an empty window.
pub fn stop_loss_from_lows(lookback: &[Candle]) -> Option<f64> {
    lookback.iter().map(|c| c.low).reduce(f64::min)
}

/// Target placed `ratio` times the risk above the entry.
pub fn stop_gain_from_ratio(entry: f64, stop_loss: f64, ratio: f64) -> f64 {
    entry + (entry - stop_loss) * ratio
}

/// Which stop, if any, `current` touches. Stop-loss wins when both do.
pub fn exit_signal(current: &Candle, stop_loss: f64, stop_gain: f64) -> Option<ExitReason> {
    if stop_loss_hit(current, stop_loss) {
        Some(ExitReason::StopLoss)
    } else if stop_gain_hit(current, stop_gain) {
        Some(ExitReason::StopGain)
    } else {
        None
    }
}
