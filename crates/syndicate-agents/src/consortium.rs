//! The consortium: a derived decision by weighted vote over the independent
//! agents' latest decisions. No inference call of its own.

use std::collections::BTreeMap;

use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use syndicate_models::decision::{Action, Decision, DecisionSource};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AggregationError {
    /// An input decision was produced in a different cycle. The consortium
    /// never aggregates partial or stale cycles.
    #[error("stale decision from {agent}: cycle {found}, expected {expected}")]
    CycleMismatch {
        agent: String,
        found: u64,
        expected: u64,
    },
}

/// One independent agent's vote: its decision plus its historical win rate
/// (None before any trade has closed).
#[derive(Debug, Clone)]
pub struct VoteInput {
    pub decision: Decision,
    pub win_rate: Option<Decimal>,
}

/// Vote bucket key: Buy/Sell votes count per symbol, Hold votes pool.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Bucket {
    Trade(Action, String),
    Hold,
}

/// Aggregate the cycle's independent decisions into one derived decision.
///
/// Each vote's weight is the agent's win rate (or the configured default
/// before sufficient history) times its confidence. The bucket with the
/// strictly highest total weight wins; any tie breaks toward Hold.
/// Deterministic: identical inputs yield the identical decision.
pub fn aggregate(
    cycle: u64,
    consortium_name: &str,
    inputs: &[VoteInput],
    default_win_rate: Decimal,
) -> Result<Decision, AggregationError> {
    for input in inputs {
        if input.decision.cycle != cycle {
            return Err(AggregationError::CycleMismatch {
                agent: input.decision.agent.clone(),
                found: input.decision.cycle,
                expected: cycle,
            });
        }
    }

    if inputs.is_empty() {
        return Ok(Decision::hold(
            cycle,
            consortium_name,
            "No agent produced a decision this cycle.",
            DecisionSource::Aggregated,
        ));
    }

    let mut buckets: BTreeMap<Bucket, Decimal> = BTreeMap::new();
    let mut contributors: BTreeMap<Bucket, Vec<(&VoteInput, Decimal)>> = BTreeMap::new();

    for input in inputs {
        let weight = input.win_rate.unwrap_or(default_win_rate)
            * Decimal::from(input.decision.confidence);
        let bucket = match (&input.decision.action, &input.decision.symbol) {
            (Action::Hold, _) | (_, None) => Bucket::Hold,
            (action, Some(symbol)) => Bucket::Trade(*action, symbol.clone()),
        };
        *buckets.entry(bucket.clone()).or_default() += weight;
        contributors.entry(bucket).or_default().push((input, weight));
    }

    // Strict maximum: any tie at the top is no consensus, which means Hold.
    let max_weight = buckets.values().copied().max().unwrap_or_default();
    let mut leaders: Vec<&Bucket> = buckets
        .iter()
        .filter(|(_, w)| **w == max_weight)
        .map(|(b, _)| b)
        .collect();
    leaders.sort();

    let winner = match leaders.as_slice() {
        [single] => (*single).clone(),
        _ => Bucket::Hold,
    };

    let tally = buckets
        .iter()
        .map(|(bucket, weight)| match bucket {
            Bucket::Trade(action, symbol) => format!("{action:?} {symbol}: {weight}"),
            Bucket::Hold => format!("Hold: {weight}"),
        })
        .collect::<Vec<_>>()
        .join(", ");

    let decision = match winner {
        Bucket::Hold => Decision::hold(
            cycle,
            consortium_name,
            &format!("No trading consensus. Weighted tally: {tally}."),
            DecisionSource::Aggregated,
        ),
        Bucket::Trade(action, symbol) => {
            let voters = &contributors[&Bucket::Trade(action, symbol.clone())];

            // Representative vote: the heaviest contributor, ties broken by
            // agent name for determinism.
            let Some(best) = voters.iter().max_by(|(a, wa), (b, wb)| {
                wa.cmp(wb)
                    .then_with(|| b.decision.agent.cmp(&a.decision.agent))
            }) else {
                return Ok(Decision::hold(
                    cycle,
                    consortium_name,
                    "Winning bucket had no voters.",
                    DecisionSource::Aggregated,
                ));
            };

            let weight_sum: Decimal = voters.iter().map(|(_, w)| *w).sum();
            let confidence = if weight_sum.is_zero() {
                0u8
            } else {
                let weighted: Decimal = voters
                    .iter()
                    .map(|(v, w)| Decimal::from(v.decision.confidence) * *w)
                    .sum();
                (weighted / weight_sum).round().to_u8().unwrap_or(0)
            };

            let mut agent_names = voters
                .iter()
                .map(|(v, _)| v.decision.agent.as_str())
                .collect::<Vec<_>>();
            agent_names.sort_unstable();
            let agents = agent_names.join(", ");

            Decision {
                id: Uuid::new_v4(),
                cycle,
                agent: consortium_name.to_string(),
                action,
                symbol: Some(symbol),
                quantity: best.0.decision.quantity,
                reasoning: format!(
                    "Weighted vote ({tally}). Agents for: {agents}. Lead reasoning: {}",
                    best.0.decision.reasoning
                ),
                confidence,
                decided_at: Utc::now(),
                source: DecisionSource::Aggregated,
            }
        }
    };

    info!(
        cycle,
        action = ?decision.action,
        symbol = decision.symbol.as_deref().unwrap_or("-"),
        confidence = decision.confidence,
        "Consortium aggregated"
    );
    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn vote(
        cycle: u64,
        agent: &str,
        action: Action,
        symbol: Option<&str>,
        confidence: u8,
        win_rate: Option<Decimal>,
    ) -> VoteInput {
        VoteInput {
            decision: Decision {
                id: Uuid::new_v4(),
                cycle,
                agent: agent.to_string(),
                action,
                symbol: symbol.map(|s| s.to_string()),
                quantity: dec!(10),
                reasoning: format!("{agent} reasoning"),
                confidence,
                decided_at: Utc::now(),
                source: DecisionSource::Inference,
            },
            win_rate,
        }
    }

    #[test]
    fn weighted_vote_scenario() {
        // BUY 80 x 0.6 = 48, SELL 90 x 0.3 = 27, HOLD 50 x 0.5 = 25 -> BUY.
        let inputs = vec![
            vote(1, "hawk", Action::Buy, Some("AAPL"), 80, Some(dec!(0.6))),
            vote(1, "quant", Action::Sell, Some("AAPL"), 90, Some(dec!(0.3))),
            vote(1, "steward", Action::Hold, None, 50, Some(dec!(0.5))),
        ];
        let decision = aggregate(1, "consortium", &inputs, dec!(0.5)).unwrap();
        assert_eq!(decision.action, Action::Buy);
        assert_eq!(decision.symbol.as_deref(), Some("AAPL"));
        assert_eq!(decision.confidence, 80);
        assert_eq!(decision.source, DecisionSource::Aggregated);
    }

    #[test]
    fn deterministic_for_identical_inputs() {
        let inputs = vec![
            vote(4, "hawk", Action::Buy, Some("TSLA"), 70, Some(dec!(0.5))),
            vote(4, "quant", Action::Sell, Some("TSLA"), 60, Some(dec!(0.4))),
            vote(4, "steward", Action::Hold, None, 40, None),
        ];
        let first = aggregate(4, "consortium", &inputs, dec!(0.5)).unwrap();
        let second = aggregate(4, "consortium", &inputs, dec!(0.5)).unwrap();
        assert_eq!(first.action, second.action);
        assert_eq!(first.symbol, second.symbol);
        assert_eq!(first.quantity, second.quantity);
        assert_eq!(first.confidence, second.confidence);
        assert_eq!(first.reasoning, second.reasoning);
    }

    #[test]
    fn tie_breaks_toward_hold() {
        // Equal weights on BUY and SELL.
        let inputs = vec![
            vote(2, "hawk", Action::Buy, Some("AAPL"), 80, Some(dec!(0.5))),
            vote(2, "quant", Action::Sell, Some("AAPL"), 80, Some(dec!(0.5))),
        ];
        let decision = aggregate(2, "consortium", &inputs, dec!(0.5)).unwrap();
        assert_eq!(decision.action, Action::Hold);
    }

    #[test]
    fn default_win_rate_applies_without_history() {
        let inputs = vec![vote(3, "hawk", Action::Buy, Some("NVDA"), 90, None)];
        let decision = aggregate(3, "consortium", &inputs, dec!(0.5)).unwrap();
        assert_eq!(decision.action, Action::Buy);
        assert!(decision.reasoning.contains("45"), "{}", decision.reasoning);
    }

    #[test]
    fn stale_cycle_is_rejected() {
        let inputs = vec![
            vote(5, "hawk", Action::Buy, Some("AAPL"), 80, Some(dec!(0.6))),
            vote(4, "quant", Action::Sell, Some("AAPL"), 90, Some(dec!(0.3))),
        ];
        let err = aggregate(5, "consortium", &inputs, dec!(0.5)).unwrap_err();
        assert_eq!(
            err,
            AggregationError::CycleMismatch {
                agent: "quant".to_string(),
                found: 4,
                expected: 5,
            }
        );
    }

    #[test]
    fn empty_inputs_hold() {
        let decision = aggregate(9, "consortium", &[], dec!(0.5)).unwrap();
        assert_eq!(decision.action, Action::Hold);
        assert_eq!(decision.cycle, 9);
    }

    #[test]
    fn same_action_different_symbols_split_the_vote() {
        // Two weak BUYs on different symbols lose to one strong SELL.
        let inputs = vec![
            vote(6, "hawk", Action::Buy, Some("AAPL"), 50, Some(dec!(0.5))),
            vote(6, "quant", Action::Buy, Some("TSLA"), 50, Some(dec!(0.5))),
            vote(6, "steward", Action::Sell, Some("NVDA"), 80, Some(dec!(0.5))),
        ];
        let decision = aggregate(6, "consortium", &inputs, dec!(0.5)).unwrap();
        assert_eq!(decision.action, Action::Sell);
        assert_eq!(decision.symbol.as_deref(), Some("NVDA"));
    }

    #[test]
    fn aggregated_confidence_is_weighted_mean() {
        let inputs = vec![
            vote(7, "hawk", Action::Buy, Some("AAPL"), 80, Some(dec!(0.5))),
            vote(7, "quant", Action::Buy, Some("AAPL"), 60, Some(dec!(0.5))),
        ];
        let decision = aggregate(7, "consortium", &inputs, dec!(0.5)).unwrap();
        // weights 40 and 30: (80*40 + 60*30) / 70 = 71.43 -> 71.
        assert_eq!(decision.confidence, 71);
    }
}
