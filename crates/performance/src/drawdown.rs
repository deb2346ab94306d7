use serde::{Deserialize, Serialize};

/// Running peak-to-trough drawdown over a balance history.
///
/// The trough is reset together with the peak whenever a new peak is
/// established, so `current_pct` is always measured against the latest high.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrawdownTracker {
    peak: f64,
    trough_since_peak: f64,
    max_pct: f64,
}

impl DrawdownTracker {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            peak: initial_balance,
            trough_since_peak: initial_balance,
            max_pct: 0.0,
        }
    }

    /// Feed the latest balance. Returns the current drawdown in percent.
    pub fn observe(&mut self, balance: f64) -> f64 {
        if balance > self.peak {
            self.peak = balance;
            self.trough_since_peak = balance;
        } else if balance < self.trough_since_peak {
            self.trough_since_peak = balance;
        }

        let current = self.current_pct();
        if current > self.max_pct {
            self.max_pct = current;
        }
        current
    }

    pub fn current_pct(&self) -> f64 {
        if self.peak <= 0.0 {
            return 0.0;
        }
        (self.peak - self.trough_since_peak) / self.peak * 100.0
    }

    pub fn max_pct(&self) -> f64 {
        self.max_pct
    }

    pub fn peak(&self) -> f64 {
        self.peak
    }
}
