//! Self-critique as a pure read over the persisted trade history. Runs every
//! N executed trades; consumes no inference budget and survives restarts
//! because the history lives in the store, not in process memory.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use syndicate_models::trade::{ExecutionStatus, TradeRecord};

/// Whether a critique pass is due: every `every_n` executed trades.
pub fn is_due(executed_trades: u64, every_n: u64) -> bool {
    every_n > 0 && executed_trades > 0 && executed_trades % every_n == 0
}

/// Summarize the agent's recent win/loss pattern from its trade history.
/// Returns None when there is nothing worth saying yet.
pub fn summarize(history: &[TradeRecord]) -> Option<String> {
    let executed: Vec<&TradeRecord> = history.iter().filter(|t| t.executed()).collect();
    if executed.is_empty() {
        return None;
    }

    let mut wins = 0u32;
    let mut losses = 0u32;
    let mut net_pnl = Decimal::ZERO;
    let mut total_fees = Decimal::ZERO;
    let mut symbol_counts: BTreeMap<&str, u32> = BTreeMap::new();
    let mut rejected = 0u32;

    for trade in history {
        match trade.status {
            ExecutionStatus::Rejected | ExecutionStatus::NotExecuted => rejected += 1,
            _ => {}
        }
    }

    for trade in &executed {
        total_fees += trade.fee;
        if let Some(symbol) = trade.symbol.as_deref() {
            *symbol_counts.entry(symbol).or_default() += 1;
        }
        if let Some(pnl) = trade.realized_pnl {
            net_pnl += pnl;
            if pnl > Decimal::ZERO {
                wins += 1;
            } else {
                losses += 1;
            }
        }
    }

    let mut lines = vec![format!(
        "Last {} executed trades: {} wins, {} losses, net realized ${}, ${} paid in fees.",
        executed.len(),
        wins,
        losses,
        net_pnl,
        total_fees
    )];

    if total_fees > Decimal::ZERO && net_pnl <= total_fees {
        lines.push(
            "Fees are eating the edge - trade less often and only on high conviction.".to_string(),
        );
    }

    if let Some((symbol, count)) = symbol_counts.iter().max_by_key(|(_, c)| **c) {
        if *count >= 3 {
            lines.push(format!(
                "{count} of these trades were in {symbol} - churn; look at other sectors."
            ));
        }
    }

    if losses > wins {
        lines.push(
            "More losers than winners - revisit entry criteria before adding new positions."
                .to_string(),
        );
    }

    if rejected > 0 {
        lines.push(format!(
            "{rejected} decisions failed preconditions or were rejected - size orders to available cash and held quantity."
        ));
    }

    Some(lines.join(" "))
}
