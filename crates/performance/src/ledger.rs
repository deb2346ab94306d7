use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use common::{ExitReason, OpenTrade, TradeRecord};

use crate::bucket::{MonthKey, MonthlyBucket};
use crate::drawdown::DrawdownTracker;

/// Balance, trade log and monthly buckets owned by one strategy instance.
///
/// Percentages compound: every fee or outcome is applied to the balance as it
/// stands at that moment.
#[derive(Debug, Clone)]
pub struct Ledger {
    starting_balance: f64,
    balance: f64,
    /// Percentage charged on entry and again on exit.
    trading_tax: f64,
    trades: Vec<TradeRecord>,
    monthly: BTreeMap<MonthKey, MonthlyBucket>,
    drawdown: DrawdownTracker,
    gains: Vec<f64>,
    losses: Vec<f64>,
}

/// Snapshot of everything a strategy accumulated during a walk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyMetrics {
    pub starting_balance: f64,
    pub balance: f64,
    pub trades: Vec<TradeRecord>,
    pub monthly: BTreeMap<MonthKey, MonthlyBucket>,
    pub max_drawdown_pct: f64,
    /// Net outcome (%) of each stop-gain exit, in order.
    pub gains: Vec<f64>,
    /// Net outcome (%) of each stop-loss exit, in order. Negative values.
    pub losses: Vec<f64>,
}

impl StrategyMetrics {
    /// Net outcome of every trade in close order.
    pub fn trade_returns(&self) -> Vec<f64> {
        self.trades.iter().map(|t| t.outcome_pct).collect()
    }
}

impl Ledger {
    pub fn new(starting_balance: f64, trading_tax: f64) -> Self {
        Self {
            starting_balance,
            balance: starting_balance,
            trading_tax,
            trades: Vec::new(),
            monthly: BTreeMap::new(),
            drawdown: DrawdownTracker::new(starting_balance),
            gains: Vec::new(),
            losses: Vec::new(),
        }
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn starting_balance(&self) -> f64 {
        self.starting_balance
    }

    pub fn trading_tax(&self) -> f64 {
        self.trading_tax
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn monthly(&self) -> &BTreeMap<MonthKey, MonthlyBucket> {
        &self.monthly
    }

    pub fn max_drawdown_pct(&self) -> f64 {
        self.drawdown.max_pct()
    }

    /// Bucket for `key`, created at the current balance on first access.
    /// Also records the current drawdown against the bucket.
    pub fn touch(&mut self, key: MonthKey) -> &mut MonthlyBucket {
        let balance = self.balance;
        let drawdown = self.drawdown.current_pct();
        let bucket = self
            .monthly
            .entry(key)
            .or_insert_with(|| MonthlyBucket::opened_at(balance));
        bucket.observe_drawdown(drawdown);
        bucket
    }

    /// Called for every candle walked, traded or not. Opens the candle's
    /// month bucket if needed and refreshes its closing balance and drawdown.
    pub fn observe_candle(&mut self, at: DateTime<Utc>) {
        let balance = self.balance;
        self.touch(MonthKey::from(at)).closing_balance = balance;
    }

    /// Charge the entry-side tax and count the opened trade.
    pub fn record_entry(&mut self, at: DateTime<Utc>) {
        let key = MonthKey::from(at);
        self.touch(key);

        if self.trading_tax != 0.0 {
            self.balance -= self.balance * self.trading_tax / 100.0;
        }
        self.drawdown.observe(self.balance);

        let balance = self.balance;
        let bucket = self.touch(key);
        bucket.opened_trades += 1;
        bucket.closing_balance = balance;
    }

    /// Close `open` at `exit_price` and compound the net outcome into the
    /// balance. Returns the appended trade record.
    pub fn record_exit(
        &mut self,
        open: &OpenTrade,
        close_time: DateTime<Utc>,
        exit_price: f64,
        exit_reason: ExitReason,
    ) -> TradeRecord {
        let key = MonthKey::from(close_time);
        self.touch(key);

        let gross_pct = (exit_price - open.entry_price) / open.entry_price * 100.0;
        let outcome_pct = gross_pct - self.trading_tax;
        self.balance += self.balance * outcome_pct / 100.0;
        self.drawdown.observe(self.balance);

        let balance = self.balance;
        let bucket = self.touch(key);
        match exit_reason {
            ExitReason::StopGain => {
                bucket.successful_trades += 1;
                bucket.gain_pct_sum += outcome_pct;
            }
            ExitReason::StopLoss => {
                bucket.failed_trades += 1;
                bucket.loss_pct_sum += -outcome_pct;
            }
        }
        bucket.closing_balance = balance;

        match exit_reason {
            ExitReason::StopGain => self.gains.push(outcome_pct),
            ExitReason::StopLoss => self.losses.push(outcome_pct),
        }

        let trade = TradeRecord {
            open_time: open.entry_time,
            close_time,
            entry_price: open.entry_price,
            exit_price,
            stop_loss: open.stop_loss,
            stop_gain: open.stop_gain,
            outcome_pct,
            exit_reason,
        };
        debug!(
            reason = %exit_reason,
            entry = trade.entry_price,
            exit = trade.exit_price,
            outcome_pct = outcome_pct,
            balance = balance,
            "Trade closed"
        );
        self.trades.push(trade.clone());
        trade
    }

    pub fn metrics(&self) -> StrategyMetrics {
        StrategyMetrics {
            starting_balance: self.starting_balance,
            balance: self.balance,
            trades: self.trades.clone(),
            monthly: self.monthly.clone(),
            max_drawdown_pct: self.drawdown.max_pct(),
            gains: self.gains.clone(),
            losses: self.losses.clone(),
        }
    }
}
