use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

/// Where a decision came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// Produced by the agent's own governed inference call.
    Inference,
    /// Derived by the consortium's weighted vote; no inference call.
    Aggregated,
}

/// One trade decision. Immutable once produced, tagged with the cycle that
/// produced it so the aggregator can reject stale inputs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub id: Uuid,
    pub cycle: u64,
    pub agent: String,
    pub action: Action,
    /// None for Hold.
    pub symbol: Option<String>,
    pub quantity: Decimal,
    pub reasoning: String,
    /// 0-100.
    pub confidence: u8,
    pub decided_at: DateTime<Utc>,
    pub source: DecisionSource,
}

impl Decision {
    /// A Hold decision, used both as the parse-failure fallback and as the
    /// conservative aggregation default.
    pub fn hold(cycle: u64, agent: &str, reasoning: &str, source: DecisionSource) -> Self {
        Self {
            id: Uuid::new_v4(),
            cycle,
            agent: agent.to_string(),
            action: Action::Hold,
            symbol: None,
            quantity: Decimal::ZERO,
            reasoning: reasoning.to_string(),
            confidence: 0,
            decided_at: Utc::now(),
            source,
        }
    }

    /// True for Buy/Sell decisions carrying a symbol and positive quantity.
    pub fn is_actionable(&self) -> bool {
        self.action != Action::Hold && self.symbol.is_some() && self.quantity > Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn action_serialization() {
        assert_eq!(serde_json::to_string(&Action::Buy).unwrap(), "\"BUY\"");
        assert_eq!(serde_json::to_string(&Action::Sell).unwrap(), "\"SELL\"");
        assert_eq!(serde_json::to_string(&Action::Hold).unwrap(), "\"HOLD\"");
    }

    #[test]
    fn hold_constructor() {
        let d = Decision::hold(7, "vega", "no edge", DecisionSource::Inference);
        assert_eq!(d.action, Action::Hold);
        assert_eq!(d.cycle, 7);
        assert_eq!(d.confidence, 0);
        assert!(d.symbol.is_none());
        assert!(!d.is_actionable());
    }

    #[test]
    fn actionable_requires_symbol_and_quantity() {
        let mut d = Decision::hold(1, "vega", "", DecisionSource::Inference);
        d.action = Action::Buy;
        assert!(!d.is_actionable(), "no symbol");

        d.symbol = Some("AAPL".to_string());
        assert!(!d.is_actionable(), "zero quantity");

        d.quantity = dec!(10);
        assert!(d.is_actionable());
    }

    #[test]
    fn roundtrip_decision() {
        let d = Decision {
            id: Uuid::new_v4(),
            cycle: 3,
            agent: "quant".to_string(),
            action: Action::Buy,
            symbol: Some("TSLA".to_string()),
            quantity: dec!(5),
            reasoning: "Oversold bounce setup".to_string(),
            confidence: 74,
            decided_at: Utc::now(),
            source: DecisionSource::Inference,
        };
        let json = serde_json::to_string(&d).unwrap();
        let parsed: Decision = serde_json::from_str(&json).unwrap();
        assert_eq!(d, parsed);
    }
}
