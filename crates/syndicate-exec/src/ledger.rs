//! Pure ledger arithmetic. No I/O: the executor validates and mutates a
//! `LedgerState` here, then persists the result as one transaction.

use std::collections::BTreeMap;

use chrono::Utc;
use rust_decimal::Decimal;
use syndicate_models::{AgentLedger, Position};

use crate::error::ExecError;

/// One agent's in-memory ledger plus its open positions.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerState {
    pub ledger: AgentLedger,
    pub positions: BTreeMap<String, Position>,
}

impl LedgerState {
    pub fn new(agent: &str, initial_capital: Decimal) -> Self {
        Self {
            ledger: AgentLedger::new(agent, initial_capital),
            positions: BTreeMap::new(),
        }
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    /// Total market value of open positions at their last-known entry
    /// prices (used when no fresh quote is available).
    pub fn position_cost_basis(&self) -> Decimal {
        self.positions.values().map(|p| p.cost_basis()).sum()
    }

    /// Buy precondition: enough cash for quantity x price plus the fee.
    pub fn check_buy(
        &self,
        quantity: Decimal,
        price: Decimal,
        fee: Decimal,
    ) -> Result<(), ExecError> {
        let cost = quantity * price + fee;
        if cost > self.ledger.cash {
            return Err(ExecError::InsufficientResources(format!(
                "buy needs ${cost}, cash is ${}",
                self.ledger.cash
            )));
        }
        Ok(())
    }

    /// Sell precondition: enough open quantity in the position.
    pub fn check_sell(&self, symbol: &str, quantity: Decimal) -> Result<(), ExecError> {
        let held = self
            .positions
            .get(symbol)
            .map(|p| p.quantity)
            .unwrap_or(Decimal::ZERO);
        if quantity > held {
            return Err(ExecError::InsufficientResources(format!(
                "sell of {quantity} {symbol} exceeds held {held}"
            )));
        }
        Ok(())
    }

    /// Apply a filled buy: cash down by cost + fee, position opened or
    /// re-averaged. Preconditions must have been checked.
    pub fn apply_buy(&mut self, symbol: &str, quantity: Decimal, price: Decimal, fee: Decimal) {
        self.ledger.cash -= quantity * price + fee;
        self.ledger.total_fees += fee;
        self.ledger.trade_count += 1;

        let now = Utc::now();
        self.positions
            .entry(symbol.to_string())
            .and_modify(|pos| {
                let total_qty = pos.quantity + quantity;
                pos.avg_entry_price =
                    (pos.quantity * pos.avg_entry_price + quantity * price) / total_qty;
                pos.quantity = total_qty;
                pos.updated_at = now;
            })
            .or_insert_with(|| Position {
                agent: self.ledger.agent.clone(),
                symbol: symbol.to_string(),
                quantity,
                avg_entry_price: price,
                unrealized_pnl: Decimal::ZERO,
                updated_at: now,
            });
    }

    /// Apply a filled sell: cash up by proceeds minus fee, position reduced
    /// or closed, P&L realized against the average entry price. Returns the
    /// realized P&L. Preconditions must have been checked.
    pub fn apply_sell(
        &mut self,
        symbol: &str,
        quantity: Decimal,
        price: Decimal,
        fee: Decimal,
    ) -> Decimal {
        self.ledger.cash += quantity * price - fee;
        self.ledger.total_fees += fee;
        self.ledger.trade_count += 1;

        let mut realized = Decimal::ZERO;
        let mut close_position = false;
        if let Some(pos) = self.positions.get_mut(symbol) {
            realized = (price - pos.avg_entry_price) * quantity;
            pos.quantity -= quantity;
            pos.updated_at = Utc::now();
            close_position = pos.quantity.is_zero();
        }
        if close_position {
            self.positions.remove(symbol);
        }

        self.ledger.realized_profit += realized;
        if realized > Decimal::ZERO {
            self.ledger.winning_trades += 1;
        } else {
            self.ledger.losing_trades += 1;
        }
        realized
    }

    /// Recompute unrealized P&L against a fresh price. Returns the new
    /// value, or None when there is no open position for the symbol.
    pub fn refresh_unrealized(&mut self, symbol: &str, price: Decimal) -> Option<Decimal> {
        let pos = self.positions.get_mut(symbol)?;
        pos.unrealized_pnl = (price - pos.avg_entry_price) * pos.quantity;
        pos.updated_at = Utc::now();
        Some(pos.unrealized_pnl)
    }

    /// The ledger identity that must hold after every mutation:
    /// cash == initial + realized - fees - open cost basis.
    #[cfg(test)]
    fn identity_holds(&self) -> bool {
        self.ledger.cash
            == self.ledger.initial_capital + self.ledger.realized_profit
                - self.ledger.total_fees
                - self.position_cost_basis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn buy_scenario_from_ten_thousand() {
        // $10,000 cash, BUY 10 @ $50 with $1 fee -> $9,499.00 and 10 @ 50.
        let mut state = LedgerState::new("hawk", dec!(10000));
        state.check_buy(dec!(10), dec!(50), dec!(1)).unwrap();
        state.apply_buy("AAPL", dec!(10), dec!(50), dec!(1));

        assert_eq!(state.ledger.cash, dec!(9499.00));
        let pos = state.position("AAPL").unwrap();
        assert_eq!(pos.quantity, dec!(10));
        assert_eq!(pos.avg_entry_price, dec!(50));
        assert_eq!(state.ledger.total_fees, dec!(1));
        assert_eq!(state.ledger.trade_count, 1);
        assert!(state.identity_holds());
    }

    #[test]
    fn buy_rejected_when_cash_insufficient() {
        let state = LedgerState::new("hawk", dec!(100));
        let err = state.check_buy(dec!(10), dec!(50), dec!(1)).unwrap_err();
        assert!(matches!(err, ExecError::InsufficientResources(_)));
    }

    #[test]
    fn buy_at_exact_cash_is_allowed() {
        let mut state = LedgerState::new("hawk", dec!(501));
        state.check_buy(dec!(10), dec!(50), dec!(1)).unwrap();
        state.apply_buy("AAPL", dec!(10), dec!(50), dec!(1));
        assert_eq!(state.ledger.cash, Decimal::ZERO);
        assert!(state.identity_holds());
    }

    #[test]
    fn sell_rejected_without_position() {
        let state = LedgerState::new("hawk", dec!(10000));
        let err = state.check_sell("AAPL", dec!(1)).unwrap_err();
        assert!(matches!(err, ExecError::InsufficientResources(_)));
    }

    #[test]
    fn sell_rejected_beyond_held_quantity() {
        let mut state = LedgerState::new("hawk", dec!(10000));
        state.apply_buy("AAPL", dec!(10), dec!(50), dec!(1));
        assert!(state.check_sell("AAPL", dec!(10)).is_ok());
        assert!(state.check_sell("AAPL", dec!(11)).is_err());
    }

    #[test]
    fn winning_sell_realizes_profit() {
        let mut state = LedgerState::new("hawk", dec!(10000));
        state.apply_buy("AAPL", dec!(10), dec!(50), dec!(1));
        let realized = state.apply_sell("AAPL", dec!(10), dec!(55), dec!(1));

        assert_eq!(realized, dec!(50));
        assert_eq!(state.ledger.winning_trades, 1);
        assert_eq!(state.ledger.losing_trades, 0);
        assert_eq!(state.ledger.realized_profit, dec!(50));
        // 10000 - 501 + 549 = 10048
        assert_eq!(state.ledger.cash, dec!(10048));
        assert!(state.position("AAPL").is_none(), "full close removes row");
        assert!(state.identity_holds());
    }

    #[test]
    fn losing_sell_counts_as_loss() {
        let mut state = LedgerState::new("hawk", dec!(10000));
        state.apply_buy("AAPL", dec!(10), dec!(50), dec!(1));
        let realized = state.apply_sell("AAPL", dec!(10), dec!(45), dec!(1));

        assert_eq!(realized, dec!(-50));
        assert_eq!(state.ledger.losing_trades, 1);
        assert!(state.identity_holds());
    }

    #[test]
    fn partial_sell_keeps_average_entry() {
        let mut state = LedgerState::new("hawk", dec!(10000));
        state.apply_buy("AAPL", dec!(10), dec!(50), dec!(1));
        state.apply_sell("AAPL", dec!(4), dec!(60), dec!(1));

        let pos = state.position("AAPL").unwrap();
        assert_eq!(pos.quantity, dec!(6));
        assert_eq!(pos.avg_entry_price, dec!(50));
        assert!(state.identity_holds());
    }

    #[test]
    fn repeat_buy_reaverages_entry() {
        let mut state = LedgerState::new("hawk", dec!(10000));
        state.apply_buy("AAPL", dec!(10), dec!(50), dec!(1));
        state.apply_buy("AAPL", dec!(10), dec!(60), dec!(1));

        let pos = state.position("AAPL").unwrap();
        assert_eq!(pos.quantity, dec!(20));
        assert_eq!(pos.avg_entry_price, dec!(55));
        assert!(state.identity_holds());
    }

    #[test]
    fn cash_never_negative_across_sequences() {
        let mut state = LedgerState::new("hawk", dec!(1000));
        let fee = dec!(1);
        let trades: &[(&str, Decimal, Decimal)] = &[
            ("AAPL", dec!(5), dec!(100)),
            ("TSLA", dec!(2), dec!(200)),
            ("NVDA", dec!(50), dec!(100)), // would exceed cash
        ];
        for (symbol, qty, price) in trades {
            if state.check_buy(*qty, *price, fee).is_ok() {
                state.apply_buy(symbol, *qty, *price, fee);
            }
            assert!(state.ledger.cash >= Decimal::ZERO, "cash went negative");
            assert!(state.identity_holds());
        }
        // Only the first buy fits the $1,000 ledger.
        assert!(state.position("AAPL").is_some());
        assert!(state.position("NVDA").is_none());
    }

    #[test]
    fn refresh_unrealized_tracks_price() {
        let mut state = LedgerState::new("hawk", dec!(10000));
        state.apply_buy("AAPL", dec!(10), dec!(50), dec!(1));

        assert_eq!(state.refresh_unrealized("AAPL", dec!(53)), Some(dec!(30)));
        assert_eq!(state.refresh_unrealized("TSLA", dec!(10)), None);
    }

    #[test]
    fn counters_satisfy_invariant() {
        let mut state = LedgerState::new("hawk", dec!(10000));
        state.apply_buy("AAPL", dec!(10), dec!(50), dec!(1));
        state.apply_buy("TSLA", dec!(5), dec!(100), dec!(1));
        state.apply_sell("AAPL", dec!(10), dec!(55), dec!(1));

        let ledger = &state.ledger;
        assert_eq!(
            ledger.trade_count,
            ledger.winning_trades + ledger.losing_trades + ledger.pending_trades()
        );
    }
}
