//! Single-symbol, long-only cash portfolio.
//!
//! Buys add to the position at a quantity-weighted average entry price;
//! sells are capped at the open quantity. Commission is charged on every fill
//! as `commission × notional`. A round trip closes when the position returns
//! to flat.

use chrono::{DateTime, Utc};

use super::trade::{ClosedTrade, ExitReason};

/// Quantity below which a position counts as flat.
const FLAT_EPSILON: f64 = 1e-9;

/// Why a fill was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Cost plus commission exceeds available cash.
    InsufficientCash,
    /// Sell with no open position.
    NoPosition,
}

/// Open round trip bookkeeping.
#[derive(Debug, Clone)]
struct OpenTrade {
    entry_time: DateTime<Utc>,
    entry_bar: usize,
    bought_qty: f64,
    bought_cost: f64,
    sold_qty: f64,
    sold_proceeds: f64,
    commission: f64,
}

#[derive(Debug, Clone)]
pub struct Portfolio {
    symbol: String,
    cash: f64,
    position: f64,
    avg_entry: f64,
    commission_rate: f64,
    total_commission: f64,
    open: Option<OpenTrade>,
}

impl Portfolio {
    pub fn new(symbol: impl Into<String>, initial_capital: f64, commission_rate: f64) -> Self {
        Self {
            symbol: symbol.into(),
            cash: initial_capital,
            position: 0.0,
            avg_entry: 0.0,
            commission_rate,
            total_commission: 0.0,
            open: None,
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn is_flat(&self) -> bool {
        self.position <= FLAT_EPSILON
    }

    /// Average entry price of the open position (0 when flat).
    pub fn avg_entry(&self) -> f64 {
        self.avg_entry
    }

    /// Bar index at which the open round trip started.
    pub fn entry_bar(&self) -> Option<usize> {
        self.open.as_ref().map(|t| t.entry_bar)
    }

    pub fn total_commission(&self) -> f64 {
        self.total_commission
    }

    /// Cash plus position marked at `price`.
    pub fn equity(&self, price: f64) -> f64 {
        self.cash + self.position * price
    }

    pub fn buy(
        &mut self,
        quantity: f64,
        price: f64,
        time: DateTime<Utc>,
        bar: usize,
    ) -> Result<(), Rejection> {
        let notional = quantity * price;
        let fee = notional * self.commission_rate;
        if notional + fee > self.cash + FLAT_EPSILON {
            return Err(Rejection::InsufficientCash);
        }

        self.cash -= notional + fee;
        self.total_commission += fee;
        let new_position = self.position + quantity;
        self.avg_entry = (self.avg_entry * self.position + notional) / new_position;
        self.position = new_position;

        let open = self.open.get_or_insert_with(|| OpenTrade {
            entry_time: time,
            entry_bar: bar,
            bought_qty: 0.0,
            bought_cost: 0.0,
            sold_qty: 0.0,
            sold_proceeds: 0.0,
            commission: 0.0,
        });
        open.bought_qty += quantity;
        open.bought_cost += notional;
        open.commission += fee;
        Ok(())
    }

    /// Sell up to `quantity`. Returns the closed trade when the position goes flat.
    pub fn sell(
        &mut self,
        quantity: f64,
        price: f64,
        time: DateTime<Utc>,
        bar: usize,
        reason: ExitReason,
    ) -> Result<Option<ClosedTrade>, Rejection> {
        if self.is_flat() {
            return Err(Rejection::NoPosition);
        }
        let quantity = quantity.min(self.position);
        let notional = quantity * price;
        let fee = notional * self.commission_rate;

        self.cash += notional - fee;
        self.total_commission += fee;
        self.position -= quantity;

        let Some(open) = self.open.as_mut() else {
            return Ok(None);
        };
        open.sold_qty += quantity;
        open.sold_proceeds += notional;
        open.commission += fee;

        if !self.is_flat() {
            return Ok(None);
        }

        self.position = 0.0;
        self.avg_entry = 0.0;
        let Some(open) = self.open.take() else {
            return Ok(None);
        };
        let gross_pnl = open.sold_proceeds - open.bought_cost;
        Ok(Some(ClosedTrade {
            symbol: self.symbol.clone(),
            entry_time: open.entry_time,
            entry_bar: open.entry_bar,
            entry_price: open.bought_cost / open.bought_qty,
            exit_time: time,
            exit_bar: bar,
            exit_price: open.sold_proceeds / open.sold_qty,
            quantity: open.bought_qty,
            gross_pnl,
            commission: open.commission,
            net_pnl: gross_pnl - open.commission,
            bars_held: bar - open.entry_bar,
            exit_reason: reason,
        }))
    }

    /// Close the whole position, if any.
    pub fn liquidate(
        &mut self,
        price: f64,
        time: DateTime<Utc>,
        bar: usize,
        reason: ExitReason,
    ) -> Option<ClosedTrade> {
        if self.is_flat() {
            return None;
        }
        self.sell(self.position, price, time, bar, reason).ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn buy_then_sell_round_trip() {
        let mut p = Portfolio::new("SPY", 1_000.0, 0.01);
        p.buy(5.0, 100.0, t(1), 0).unwrap();
        assert!((p.cash() - 495.0).abs() < 1e-9);
        assert!((p.equity(100.0) - 995.0).abs() < 1e-9);

        let trade = p.sell(5.0, 110.0, t(3), 2, ExitReason::Signal).unwrap().unwrap();
        assert!((trade.gross_pnl - 50.0).abs() < 1e-9);
        assert!((trade.commission - 10.5).abs() < 1e-9);
        assert!((trade.net_pnl - 39.5).abs() < 1e-9);
        assert_eq!(trade.bars_held, 2);
        assert!(p.is_flat());
        assert!((p.cash() - 1_039.5).abs() < 1e-9);
    }

    #[test]
    fn scale_in_averages_entry() {
        let mut p = Portfolio::new("SPY", 10_000.0, 0.0);
        p.buy(1.0, 100.0, t(1), 0).unwrap();
        p.buy(3.0, 120.0, t(2), 1).unwrap();
        assert!((p.avg_entry() - 115.0).abs() < 1e-9);
        assert_eq!(p.entry_bar(), Some(0));
    }

    #[test]
    fn partial_sell_keeps_trade_open() {
        let mut p = Portfolio::new("SPY", 10_000.0, 0.0);
        p.buy(4.0, 100.0, t(1), 0).unwrap();
        assert_eq!(p.sell(1.0, 110.0, t(2), 1, ExitReason::Signal).unwrap(), None);
        let trade = p.sell(10.0, 90.0, t(3), 2, ExitReason::Signal).unwrap().unwrap();
        // Capped at the remaining 3 units: proceeds 110 + 270 = 380, cost 400
        assert!((trade.gross_pnl + 20.0).abs() < 1e-9);
        assert!((trade.exit_price - 95.0).abs() < 1e-9);
        assert_eq!(trade.quantity, 4.0);
    }

    #[test]
    fn rejections() {
        let mut p = Portfolio::new("SPY", 100.0, 0.0);
        assert_eq!(
            p.sell(1.0, 10.0, t(1), 0, ExitReason::Signal),
            Err(Rejection::NoPosition)
        );
        assert_eq!(p.buy(2.0, 60.0, t(1), 0), Err(Rejection::InsufficientCash));
        assert_eq!(p.cash(), 100.0);
    }

    #[test]
    fn liquidate_flat_is_noop() {
        let mut p = Portfolio::new("SPY", 100.0, 0.0);
        assert!(p.liquidate(10.0, t(1), 0, ExitReason::EndOfData).is_none());
    }
}
