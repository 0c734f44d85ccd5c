//! Inference spend governor: one process-wide, day-scoped cost counter
//! shared by every decision unit.
//!
//! All mutation goes through `try_reserve` / `commit` / `refund`. Callers
//! never read-then-write; the only external read is `snapshot()`.

use std::sync::Mutex;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::inference::TokenUsage;

/// Per-1M-token (input, output) USD prices by model id.
const MODEL_COSTS: &[(&str, (Decimal, Decimal))] = &[
    ("openai/gpt-4o", (Decimal::from_parts(250, 0, 0, false, 2), Decimal::from_parts(1000, 0, 0, false, 2))),
    ("openai/gpt-4o-mini", (Decimal::from_parts(15, 0, 0, false, 2), Decimal::from_parts(60, 0, 0, false, 2))),
    ("deepseek/deepseek-chat", (Decimal::from_parts(14, 0, 0, false, 2), Decimal::from_parts(28, 0, 0, false, 2))),
    ("x-ai/grok-3-mini", (Decimal::from_parts(30, 0, 0, false, 2), Decimal::from_parts(50, 0, 0, false, 2))),
];

/// Fallback prices for models missing from the table.
const DEFAULT_COSTS: (Decimal, Decimal) = (
    Decimal::from_parts(100, 0, 0, false, 2),
    Decimal::from_parts(200, 0, 0, false, 2),
);

const TOKENS_PER_MILLION: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// Rough chars-per-token divisor for prompt estimates.
const CHARS_PER_TOKEN: usize = 4;

/// Metered cost of a call with the given token counts.
pub fn metered_cost(model: &str, prompt_tokens: u64, completion_tokens: u64) -> Decimal {
    let (input, output) = MODEL_COSTS
        .iter()
        .find(|(id, _)| *id == model)
        .map(|(_, prices)| *prices)
        .unwrap_or(DEFAULT_COSTS);
    Decimal::from(prompt_tokens) * input / TOKENS_PER_MILLION
        + Decimal::from(completion_tokens) * output / TOKENS_PER_MILLION
}

/// Pre-call estimate from the prompt text length and the response budget.
pub fn estimated_cost(model: &str, prompt_chars: usize, max_output_tokens: u32) -> Decimal {
    let prompt_tokens = (prompt_chars / CHARS_PER_TOKEN) as u64;
    metered_cost(model, prompt_tokens, u64::from(max_output_tokens))
}

/// A granted budget hold. Consumed by `commit` on success or `refund` when
/// the call fails before producing a billable response.
#[derive(Debug)]
#[must_use = "reservations must be committed or refunded"]
pub struct Reservation {
    amount: Decimal,
}

impl Reservation {
    pub fn amount(&self) -> Decimal {
        self.amount
    }
}

/// Typed denial. Expected, not exceptional: callers skip the decision, they
/// never fabricate one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denied {
    DailyCeilingExceeded {
        requested: Decimal,
        spent: Decimal,
        ceiling: Decimal,
    },
}

impl std::fmt::Display for Denied {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Denied::DailyCeilingExceeded {
                requested,
                spent,
                ceiling,
            } => write!(
                f,
                "daily ceiling exceeded: ${spent} spent + ${requested} requested > ${ceiling}"
            ),
        }
    }
}

/// Read-only usage view for monitoring.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UsageSnapshot {
    pub day: NaiveDate,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost_usd: Decimal,
    pub ceiling_usd: Decimal,
    pub percent_used: Decimal,
}

#[derive(Debug)]
struct DayState {
    day: NaiveDate,
    prompt_tokens: u64,
    completion_tokens: u64,
    cost_usd: Decimal,
}

impl DayState {
    fn fresh(day: NaiveDate) -> Self {
        Self {
            day,
            prompt_tokens: 0,
            completion_tokens: 0,
            cost_usd: Decimal::ZERO,
        }
    }

    /// Reset counters when the UTC day has rolled over.
    fn roll_if_needed(&mut self, today: NaiveDate) {
        if today != self.day {
            info!(from = %self.day, to = %today, "Budget day rollover, counters reset");
            *self = Self::fresh(today);
        }
    }
}

pub struct BudgetGovernor {
    ceiling: Decimal,
    state: Mutex<DayState>,
}

impl BudgetGovernor {
    pub fn new(ceiling: Decimal) -> Self {
        Self {
            ceiling,
            state: Mutex::new(DayState::fresh(Utc::now().date_naive())),
        }
    }

    /// Atomically admit or deny an estimated spend. On grant the estimate is
    /// added to the day's total immediately, so concurrent reservations can
    /// never jointly exceed the ceiling.
    pub fn try_reserve(&self, estimate: Decimal) -> Result<Reservation, Denied> {
        let mut state = self.state.lock().expect("governor mutex poisoned");
        state.roll_if_needed(Utc::now().date_naive());

        if state.cost_usd + estimate > self.ceiling {
            debug!(spent = %state.cost_usd, %estimate, ceiling = %self.ceiling, "Budget denied");
            return Err(Denied::DailyCeilingExceeded {
                requested: estimate,
                spent: state.cost_usd,
                ceiling: self.ceiling,
            });
        }

        state.cost_usd += estimate;
        Ok(Reservation { amount: estimate })
    }

    /// Settle a reservation against the actual metered usage. The estimate is
    /// replaced by the real cost; token counters are recorded.
    pub fn commit(&self, reservation: Reservation, usage: &TokenUsage, model: &str) {
        let actual = metered_cost(model, usage.prompt_tokens, usage.completion_tokens);
        let mut state = self.state.lock().expect("governor mutex poisoned");
        state.roll_if_needed(Utc::now().date_naive());

        state.cost_usd = (state.cost_usd - reservation.amount + actual).max(Decimal::ZERO);
        state.prompt_tokens += usage.prompt_tokens;
        state.completion_tokens += usage.completion_tokens;
        debug!(%actual, estimate = %reservation.amount, total = %state.cost_usd, "Budget committed");
    }

    /// Return a reservation whose call failed before producing a billable
    /// response.
    pub fn refund(&self, reservation: Reservation) {
        let mut state = self.state.lock().expect("governor mutex poisoned");
        state.roll_if_needed(Utc::now().date_naive());
        state.cost_usd = (state.cost_usd - reservation.amount).max(Decimal::ZERO);
        warn!(amount = %reservation.amount, total = %state.cost_usd, "Budget refunded");
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        let mut state = self.state.lock().expect("governor mutex poisoned");
        state.roll_if_needed(Utc::now().date_naive());
        let percent_used = if self.ceiling.is_zero() {
            Decimal::ONE_HUNDRED
        } else {
            state.cost_usd * Decimal::ONE_HUNDRED / self.ceiling
        };
        UsageSnapshot {
            day: state.day,
            prompt_tokens: state.prompt_tokens,
            completion_tokens: state.completion_tokens,
            cost_usd: state.cost_usd,
            ceiling_usd: self.ceiling,
            percent_used,
        }
    }

    #[cfg(test)]
    fn backdate(&self, day: NaiveDate, cost: Decimal) {
        let mut state = self.state.lock().unwrap();
        *state = DayState::fresh(day);
        state.cost_usd = cost;
    }
}
