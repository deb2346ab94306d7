use common::{Error, OpenTrade, Result};

/// A strategy is either out of the market or holding one full position.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Position {
    #[default]
    Flat,
    Holding(OpenTrade),
}

impl Position {
    pub fn is_flat(&self) -> bool {
        matches!(self, Position::Flat)
    }

    pub fn open_trade(&self) -> Option<&OpenTrade> {
        match self {
            Position::Holding(trade) => Some(trade),
            Position::Flat => None,
        }
    }

    /// flat -> holding. Levels must satisfy `stop_loss < entry < stop_gain`.
    pub fn open(&mut self, trade: OpenTrade) -> Result<()> {
        if let Position::Holding(held) = self {
            return Err(Error::InvalidTransition(format!(
                "already holding a position entered at {}",
                held.entry_price
            )));
        }
        if !(trade.stop_loss < trade.entry_price && trade.entry_price < trade.stop_gain) {
            return Err(Error::InvalidTransition(format!(
                "stops out of order: stop_loss {} entry {} stop_gain {}",
                trade.stop_loss, trade.entry_price, trade.stop_gain
            )));
        }
        *self = Position::Holding(trade);
        Ok(())
    }

    /// holding -> flat. Returns the trade that was held.
    pub fn close(&mut self) -> Result<OpenTrade> {
        match std::mem::take(self) {
            Position::Holding(trade) => Ok(trade),
            Position::Flat => Err(Error::InvalidTransition(
                "cannot close: no position held".into(),
            )),
        }
    }
}
