use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Strategy temperament for an agent. A closed set: each variant selects a
/// prompt template and a default model cost tier, so the decision unit is
/// implemented once and parameterized.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RiskProfile {
    /// Risk-seeking, news-driven, contrarian entries.
    Aggressive,
    /// Systematic, indicator-driven, small position sizes.
    Methodical,
    /// Diversified, capital-preservation first.
    Balanced,
}

/// Identity of one decision-making agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentProfile {
    pub name: String,
    pub risk_profile: RiskProfile,
    /// Inference model id (e.g. "openai/gpt-4o-mini").
    pub model: String,
}

/// An open position held by one agent. Unique per (agent, symbol).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub agent: String,
    pub symbol: String,
    pub quantity: Decimal,
    pub avg_entry_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// Cost basis of the open quantity.
    pub fn cost_basis(&self) -> Decimal {
        self.quantity * self.avg_entry_price
    }

    /// Market value at the given price; also refreshes nothing (pure).
    pub fn market_value(&self, price: Decimal) -> Decimal {
        self.quantity * price
    }
}

/// Capital ledger for one agent. Mutated only by the execution manager,
/// one agent at a time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentLedger {
    pub agent: String,
    pub initial_capital: Decimal,
    pub cash: Decimal,
    /// Cumulative realized profit across closed quantity.
    pub realized_profit: Decimal,
    pub total_fees: Decimal,
    pub trade_count: u64,
    pub winning_trades: u64,
    pub losing_trades: u64,
}

impl AgentLedger {
    pub fn new(agent: &str, initial_capital: Decimal) -> Self {
        Self {
            agent: agent.to_string(),
            initial_capital,
            cash: initial_capital,
            realized_profit: Decimal::ZERO,
            total_fees: Decimal::ZERO,
            trade_count: 0,
            winning_trades: 0,
            losing_trades: 0,
        }
    }

    /// Trades that have neither won nor lost yet (still open).
    pub fn pending_trades(&self) -> u64 {
        self.trade_count - self.winning_trades - self.losing_trades
    }

    /// Fraction of closed trades that realized a gain. None until at least
    /// one trade has closed.
    pub fn win_rate(&self) -> Option<Decimal> {
        let closed = self.winning_trades + self.losing_trades;
        if closed == 0 {
            return None;
        }
        Some(Decimal::from(self.winning_trades) / Decimal::from(closed))
    }

    /// Portfolio value given the open positions' market values.
    pub fn portfolio_value(&self, position_values: Decimal) -> Decimal {
        self.cash + position_values
    }

    /// Performance relative to the initial allocation, in percent.
    pub fn performance_pct(&self, position_values: Decimal) -> Decimal {
        if self.initial_capital.is_zero() {
            return Decimal::ZERO;
        }
        (self.portfolio_value(position_values) - self.initial_capital) * Decimal::ONE_HUNDRED
            / self.initial_capital
    }
}
