use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decision::Action;

/// Outcome of submitting a decision for execution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Order accepted by the brokerage; ledger mutated.
    Filled,
    /// Ledger preconditions failed; no order submitted.
    NotExecuted,
    /// Brokerage rejected or timed out; no ledger mutation.
    Rejected,
    /// Hold decision recorded with no order.
    Held,
}

/// Append-only record of a decision plus its execution outcome. Never
/// updated after creation, except to attach the closing P&L when the
/// position it opened is later closed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeRecord {
    pub id: Uuid,
    /// The decision this record executes; unique across records, which is
    /// what makes apply() idempotent.
    pub decision_id: Uuid,
    pub agent: String,
    pub action: Action,
    pub symbol: Option<String>,
    pub quantity: Decimal,
    pub fill_price: Decimal,
    pub fee: Decimal,
    /// Realized on SELL at record time; attached later for BUY records when
    /// the position closes.
    pub realized_pnl: Option<Decimal>,
    pub status: ExecutionStatus,
    pub order_id: Option<String>,
    pub confidence: u8,
    pub created_at: DateTime<Utc>,
}

impl TradeRecord {
    pub fn executed(&self) -> bool {
        self.status == ExecutionStatus::Filled
    }
}
