use common::{Error, Result};

/// EMA (Exponential Moving Average) indicator.
///
/// Uses the recursive form without bias adjustment:
/// `ema[0] = close[0]`, `ema[i] = close[i]·α + ema[i−1]·(1−α)` with
/// `α = 2 / (span + 1)`. Each value depends only on closes up to and
/// including its own index.
#[derive(Debug, Clone)]
pub struct EmaIndicator {
    pub span: usize,
    alpha: f64,
    last: Option<f64>,
}

impl EmaIndicator {
    pub fn new(span: usize) -> Result<Self> {
        if span == 0 {
            return Err(Error::Config("EMA span must be at least 1".into()));
        }
        Ok(Self {
            span,
            alpha: smoothing(span),
            last: None,
        })
    }

    /// Feed the next close and return the updated EMA.
    pub fn next(&mut self, close: f64) -> f64 {
        let value = match self.last {
            None => close,
            Some(prev) => close * self.alpha + prev * (1.0 - self.alpha),
        };
        self.last = Some(value);
        value
    }

    pub fn value(&self) -> Option<f64> {
        self.last
    }
}

/// Smoothing factor for `span`.
pub fn smoothing(span: usize) -> f64 {
    2.0 / (span as f64 + 1.0)
}

/// EMA over the whole close series, aligned 1:1 with `closes`.
pub fn ema_series(closes: &[f64], span: usize) -> Result<Vec<f64>> {
    let mut ema = EmaIndicator::new(span)?;
    Ok(closes.iter().map(|&c| ema.next(c)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_value_is_first_close() {
        let series = ema_series(&[42.0, 43.0], 9).unwrap();
        assert_eq!(series[0], 42.0);
    }

    #[test]
    fn constant_series_stays_constant() {
        let series = ema_series(&[10.0; 50], 21).unwrap();
        assert!(series.iter().all(|v| (v - 10.0).abs() < 1e-12));
    }

    #[test]
    fn known_values_span_3() {
        // alpha = 0.5
        let series = ema_series(&[1.0, 2.0, 3.0, 4.0], 3).unwrap();
        assert_eq!(series, vec![1.0, 1.5, 2.25, 3.125]);
    }

    #[test]
    fn span_1_tracks_close() {
        let closes = [5.0, 7.0, 3.0];
        assert_eq!(ema_series(&closes, 1).unwrap(), closes.to_vec());
    }

    #[test]
    fn no_lookahead() {
        let a = ema_series(&[1.0, 2.0, 3.0, 4.0, 5.0], 4).unwrap();
        let b = ema_series(&[1.0, 2.0, 3.0, 400.0, -5.0], 4).unwrap();
        assert_eq!(a[..3], b[..3]);
    }

    #[test]
    fn incremental_matches_batch() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + (i as f64).sin() * 5.0).collect();
        let mut ema = EmaIndicator::new(9).unwrap();
        let incremental: Vec<f64> = closes.iter().map(|&c| ema.next(c)).collect();
        assert_eq!(incremental, ema_series(&closes, 9).unwrap());
        assert_eq!(ema.value(), incremental.last().copied());
    }

    #[test]
    fn zero_span_is_rejected() {
        assert!(matches!(EmaIndicator::new(0), Err(Error::Config(_))));
        assert!(ema_series(&[1.0, 2.0], 0).is_err());
    }
}
