use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rust_decimal::Decimal;
use syndicate_models::decision::{Action, Decision, DecisionSource};
use syndicate_models::market::MarketContext;
use syndicate_models::trade::TradeRecord;
use syndicate_models::{AgentLedger, AgentProfile, Position};
use tracing::{info, warn};
use uuid::Uuid;

use crate::critique;
use crate::error::AgentError;
use crate::governor::{self, BudgetGovernor};
use crate::inference::{InferenceProvider, InferenceRequest};
use crate::parser::parse_decision_payload;
use crate::prompts;

/// Read-only view of one agent's state, assembled by the caller from the
/// store. Units never reach into the execution manager.
#[derive(Debug, Clone)]
pub struct AgentView {
    pub profile: AgentProfile,
    pub ledger: AgentLedger,
    pub positions: Vec<Position>,
}

/// Why a unit produced no decision this cycle. Expected outcomes, not
/// errors: the cycle proceeds with whatever results are available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Governor denial. Not retried until the next day's reset.
    BudgetExceeded(String),
    /// Transport failure or timeout; the reservation was refunded.
    InferenceUnavailable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecisionOutcome {
    Decided(Decision),
    Skipped(SkipReason),
}

/// Tunables for one unit, lifted from config.
#[derive(Debug, Clone)]
pub struct UnitConfig {
    pub max_output_tokens: u32,
    pub temperature: f64,
    pub call_timeout: Duration,
    pub critique_every_trades: u64,
    pub fee_per_trade: Decimal,
}

/// One decision-making agent: turns a market context into a structured trade
/// decision via a single governed inference call.
pub struct DecisionUnit {
    profile: AgentProfile,
    provider: Arc<dyn InferenceProvider>,
    governor: Arc<BudgetGovernor>,
    config: UnitConfig,
}

impl DecisionUnit {
    pub fn new(
        profile: AgentProfile,
        provider: Arc<dyn InferenceProvider>,
        governor: Arc<BudgetGovernor>,
        config: UnitConfig,
    ) -> Self {
        Self {
            profile,
            provider,
            governor,
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.profile.name
    }

    pub fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    /// Produce a decision for this cycle, or skip.
    ///
    /// Never retries within a cycle: a denial, timeout, or malformed reply
    /// each resolve immediately so a slow or misbehaving upstream cannot
    /// stall the fan-out or burn extra budget.
    pub async fn decide(
        &self,
        view: &AgentView,
        history: &[TradeRecord],
        context: &MarketContext,
        cycle: u64,
    ) -> DecisionOutcome {
        let start = Instant::now();
        let agent = &self.profile.name;

        // 1. Self-critique: a pure read over the trade history, every N
        //    executed trades.
        let executed = history.iter().filter(|t| t.executed()).count() as u64;
        let critique_text = if critique::is_due(executed, self.config.critique_every_trades) {
            critique::summarize(history)
        } else {
            None
        };

        let system_prompt =
            prompts::system_prompt(view, critique_text.as_deref(), self.config.fee_per_trade);
        let user_prompt = prompts::market_user_prompt(context, history);

        // 2. Budget admission, sized to this profile's model tier.
        let estimate = governor::estimated_cost(
            &self.profile.model,
            system_prompt.len() + user_prompt.len(),
            self.config.max_output_tokens,
        );
        let reservation = match self.governor.try_reserve(estimate) {
            Ok(r) => r,
            Err(denied) => {
                info!(%agent, %denied, "Decision skipped");
                return DecisionOutcome::Skipped(SkipReason::BudgetExceeded(denied.to_string()));
            }
        };

        // 3. One inference call under the per-call timeout.
        let request = InferenceRequest {
            model: self.profile.model.clone(),
            system_prompt,
            user_prompt,
            max_tokens: self.config.max_output_tokens,
            temperature: self.config.temperature,
        };
        let reply = match tokio::time::timeout(
            self.config.call_timeout,
            self.provider.complete(&request),
        )
        .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                self.governor.refund(reservation);
                warn!(%agent, error = %e, "Inference call failed");
                return DecisionOutcome::Skipped(SkipReason::InferenceUnavailable(e.to_string()));
            }
            Err(_) => {
                self.governor.refund(reservation);
                let e = AgentError::Timeout(self.config.call_timeout.as_secs());
                warn!(%agent, error = %e, "Inference call timed out");
                return DecisionOutcome::Skipped(SkipReason::InferenceUnavailable(e.to_string()));
            }
        };

        self.governor
            .commit(reservation, &reply.usage, &self.profile.model);

        // 4. Defensive parse. Malformed output degrades to Hold with zero
        //    confidence; never retried in the same cycle.
        let decision = match parse_decision_payload(&reply.content) {
            Ok(payload) => self.build_decision(payload, cycle),
            Err(e) => {
                warn!(%agent, error = %e, "Inference parse failure, holding");
                Decision::hold(
                    cycle,
                    agent,
                    &format!("Unparseable model output: {e}"),
                    DecisionSource::Inference,
                )
            }
        };

        info!(
            %agent,
            action = ?decision.action,
            symbol = decision.symbol.as_deref().unwrap_or("-"),
            confidence = decision.confidence,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Decision produced"
        );
        DecisionOutcome::Decided(decision)
    }

    fn build_decision(&self, payload: crate::parser::DecisionPayload, cycle: u64) -> Decision {
        let action = match payload.decision.to_uppercase().as_str() {
            "BUY" => Action::Buy,
            "SELL" => Action::Sell,
            _ => Action::Hold,
        };
        let confidence = payload
            .confidence
            .map(|c| c.clamp(0.0, 100.0).round() as u8)
            .unwrap_or(0);

        let quantity = payload.quantity.unwrap_or(Decimal::ZERO);
        let symbol = payload.symbol.filter(|s| !s.trim().is_empty());

        // A Buy/Sell without a symbol or a positive quantity is not
        // actionable; degrade to Hold rather than guessing.
        let (action, symbol, quantity) = match action {
            Action::Hold => (Action::Hold, None, Decimal::ZERO),
            _ if symbol.is_none() || quantity <= Decimal::ZERO => {
                (Action::Hold, None, Decimal::ZERO)
            }
            _ => (action, symbol, quantity),
        };

        Decision {
            id: Uuid::new_v4(),
            cycle,
            agent: self.profile.name.clone(),
            action,
            symbol,
            quantity,
            reasoning: payload.reasoning,
            confidence,
            decided_at: Utc::now(),
            source: DecisionSource::Inference,
        }
    }
}
