use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use rust_decimal::Decimal;
use syndicate_models::decision::{Action, Decision};
use syndicate_models::market::MarketContext;
use syndicate_models::trade::{ExecutionStatus, TradeRecord};
use syndicate_models::{AgentLedger, AgentProfile, Position};
use tracing::{info, warn};
use uuid::Uuid;

use crate::broker::{Brokerage, OrderRequest, OrderSide};
use crate::error::{ExecError, StoreError};
use crate::ledger::LedgerState;
use crate::store::TradeStore;

/// Outcome of applying one decision.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub decision_id: Uuid,
    pub agent: String,
    pub status: ExecutionStatus,
    pub fill_price: Decimal,
    pub fee: Decimal,
    pub realized_pnl: Option<Decimal>,
    pub order_id: Option<String>,
    /// True when the decision id had already been applied; nothing was
    /// mutated this time.
    pub duplicate: bool,
}

/// Applies decisions to agent ledgers and submits orders.
///
/// Mutations are serialized per agent: each ledger sits behind its own async
/// mutex, held across the brokerage round trip, so two decisions for the
/// same agent can never interleave while different agents execute in
/// parallel. Exactly one execution is permitted per decision id.
pub struct ExecutionManager {
    store: Mutex<TradeStore>,
    broker: Arc<dyn Brokerage>,
    agents: Mutex<HashMap<String, Arc<tokio::sync::Mutex<LedgerState>>>>,
    fee_per_trade: Decimal,
}

impl ExecutionManager {
    pub fn new(store: TradeStore, broker: Arc<dyn Brokerage>, fee_per_trade: Decimal) -> Self {
        Self {
            store: Mutex::new(store),
            broker,
            agents: Mutex::new(HashMap::new()),
            fee_per_trade,
        }
    }

    fn store(&self) -> Result<MutexGuard<'_, TradeStore>, ExecError> {
        self.store
            .lock()
            .map_err(|e| StoreError::Corrupt(format!("store mutex poisoned: {e}")).into())
    }

    /// Register an agent, loading its persisted ledger and positions when
    /// present so a restart never resets capital.
    pub fn register_agent(
        &self,
        profile: &AgentProfile,
        initial_capital: Decimal,
    ) -> Result<(), ExecError> {
        let state = {
            let store = self.store()?;
            match store.load_ledger(&profile.name)? {
                Some(ledger) => {
                    let positions = store
                        .load_positions(&profile.name)?
                        .into_iter()
                        .map(|p| (p.symbol.clone(), p))
                        .collect();
                    info!(agent = %profile.name, cash = %ledger.cash, "Ledger loaded from store");
                    LedgerState { ledger, positions }
                }
                None => {
                    let state = LedgerState::new(&profile.name, initial_capital);
                    store.insert_agent_if_absent(profile, &state.ledger)?;
                    info!(agent = %profile.name, capital = %initial_capital, "Agent registered");
                    state
                }
            }
        };

        self.agents
            .lock()
            .expect("agents map mutex poisoned")
            .insert(profile.name.clone(), Arc::new(tokio::sync::Mutex::new(state)));
        Ok(())
    }

    fn agent_state(&self, agent: &str) -> Result<Arc<tokio::sync::Mutex<LedgerState>>, ExecError> {
        self.agents
            .lock()
            .expect("agents map mutex poisoned")
            .get(agent)
            .cloned()
            .ok_or_else(|| ExecError::UnknownAgent(agent.to_string()))
    }

    /// Read-only snapshot of an agent's ledger and open positions.
    pub async fn view(&self, agent: &str) -> Result<(AgentLedger, Vec<Position>), ExecError> {
        let state_lock = self.agent_state(agent)?;
        let state = state_lock.lock().await;
        Ok((
            state.ledger.clone(),
            state.positions.values().cloned().collect(),
        ))
    }

    /// The agent's historical win rate, None before any closed trade.
    pub async fn win_rate(&self, agent: &str) -> Result<Option<Decimal>, ExecError> {
        Ok(self.view(agent).await?.0.win_rate())
    }

    /// Recent trade history from the store (newest first).
    pub fn history(&self, agent: &str, limit: usize) -> Result<Vec<TradeRecord>, ExecError> {
        Ok(self.store()?.recent_trades(agent, limit)?)
    }

    /// Apply one decision. Hold records the decision with no ledger
    /// mutation; Buy/Sell validates, submits, then commits ledger + store as
    /// one logical unit. Idempotent by decision id.
    pub async fn apply(
        &self,
        decision: &Decision,
        market_price: Option<Decimal>,
    ) -> Result<ExecutionResult, ExecError> {
        let state_lock = self.agent_state(&decision.agent)?;
        let mut state = state_lock.lock().await;

        if self.store()?.decision_exists(decision.id)? {
            info!(agent = %decision.agent, decision = %decision.id, "Duplicate decision, no-op");
            return Ok(ExecutionResult {
                decision_id: decision.id,
                agent: decision.agent.clone(),
                status: ExecutionStatus::Held,
                fill_price: Decimal::ZERO,
                fee: Decimal::ZERO,
                realized_pnl: None,
                order_id: None,
                duplicate: true,
            });
        }

        if decision.action == Action::Hold {
            self.store()?.insert_decision(decision)?;
            info!(agent = %decision.agent, "Hold recorded");
            return Ok(ExecutionResult {
                decision_id: decision.id,
                agent: decision.agent.clone(),
                status: ExecutionStatus::Held,
                fill_price: Decimal::ZERO,
                fee: Decimal::ZERO,
                realized_pnl: None,
                order_id: None,
                duplicate: false,
            });
        }

        let symbol = decision
            .symbol
            .clone()
            .ok_or_else(|| ExecError::ExecutionFailed("trade decision without symbol".into()))?;
        let quantity = decision.quantity;
        let fee = self.fee_per_trade;

        let price = match market_price {
            Some(p) => p,
            None => {
                self.record_failure(decision, Decimal::ZERO, ExecutionStatus::NotExecuted, None)?;
                return Err(ExecError::ExecutionFailed(format!(
                    "no market price for {symbol}"
                )));
            }
        };

        // Preconditions before any order leaves the process.
        let precheck = match decision.action {
            Action::Buy => state.check_buy(quantity, price, fee),
            Action::Sell => state.check_sell(&symbol, quantity),
            Action::Hold => unreachable!("handled above"),
        };
        if let Err(e) = precheck {
            warn!(agent = %decision.agent, %symbol, error = %e, "Preconditions failed");
            self.record_failure(decision, price, ExecutionStatus::NotExecuted, None)?;
            return Err(e);
        }

        let order = OrderRequest {
            symbol: symbol.clone(),
            quantity,
            side: match decision.action {
                Action::Buy => OrderSide::Buy,
                _ => OrderSide::Sell,
            },
        };

        let ack = match self.broker.submit_order(&order).await {
            Ok(ack) if ack.accepted() => ack,
            Ok(ack) => {
                warn!(agent = %decision.agent, status = %ack.status, "Order not accepted");
                self.record_failure(
                    decision,
                    price,
                    ExecutionStatus::Rejected,
                    Some(ack.order_id.clone()),
                )?;
                return Err(ExecError::ExecutionFailed(format!(
                    "order status {}",
                    ack.status
                )));
            }
            Err(e) => {
                warn!(agent = %decision.agent, error = %e, "Order submission failed");
                self.record_failure(decision, price, ExecutionStatus::Rejected, None)?;
                return Err(e);
            }
        };

        let fill_price = ack.filled_avg_price.unwrap_or(price);

        // Fill drift can invalidate a buy that passed at the quote price.
        if decision.action == Action::Buy {
            if let Err(e) = state.check_buy(quantity, fill_price, fee) {
                warn!(agent = %decision.agent, %fill_price, "Fill exceeds cash, not applied");
                self.record_failure(
                    decision,
                    fill_price,
                    ExecutionStatus::Rejected,
                    Some(ack.order_id.clone()),
                )?;
                return Err(e);
            }
        }

        let realized_pnl = match decision.action {
            Action::Buy => {
                state.apply_buy(&symbol, quantity, fill_price, fee);
                None
            }
            Action::Sell => Some(state.apply_sell(&symbol, quantity, fill_price, fee)),
            Action::Hold => unreachable!("handled above"),
        };

        let record = TradeRecord {
            id: Uuid::new_v4(),
            decision_id: decision.id,
            agent: decision.agent.clone(),
            action: decision.action,
            symbol: Some(symbol.clone()),
            quantity,
            fill_price,
            fee,
            realized_pnl,
            status: ExecutionStatus::Filled,
            order_id: Some(ack.order_id.clone()),
            confidence: decision.confidence,
            created_at: Utc::now(),
        };

        // The brokerage side effect happened; a store failure from here on
        // is surfaced for independent retry, never undone in memory.
        self.store()?
            .commit_execution(decision, &record, &state)
            .map_err(|source| ExecError::StoreWriteFailed {
                decision_id: decision.id,
                source,
            })?;

        info!(
            agent = %decision.agent,
            action = ?decision.action,
            %symbol,
            %quantity,
            %fill_price,
            realized = %realized_pnl.unwrap_or_default(),
            "Execution applied"
        );

        Ok(ExecutionResult {
            decision_id: decision.id,
            agent: decision.agent.clone(),
            status: ExecutionStatus::Filled,
            fill_price,
            fee,
            realized_pnl,
            order_id: Some(ack.order_id),
            duplicate: false,
        })
    }

    /// Position review: refresh unrealized P&L for an agent's open positions
    /// against fresh quotes, persist the rows, and return them.
    pub async fn refresh_positions(
        &self,
        agent: &str,
        context: &MarketContext,
    ) -> Result<Vec<Position>, ExecError> {
        let state_lock = self.agent_state(agent)?;
        let mut state = state_lock.lock().await;

        let symbols: Vec<String> = state.positions.keys().cloned().collect();
        for symbol in symbols {
            if let Some(price) = context.quote_price(&symbol) {
                state.refresh_unrealized(&symbol, price);
            }
        }
        let positions: Vec<Position> = state.positions.values().cloned().collect();
        self.store()?.update_positions(&positions)?;
        Ok(positions)
    }

    fn record_failure(
        &self,
        decision: &Decision,
        price: Decimal,
        status: ExecutionStatus,
        order_id: Option<String>,
    ) -> Result<(), ExecError> {
        let record = TradeRecord {
            id: Uuid::new_v4(),
            decision_id: decision.id,
            agent: decision.agent.clone(),
            action: decision.action,
            symbol: decision.symbol.clone(),
            quantity: decision.quantity,
            fill_price: price,
            fee: Decimal::ZERO,
            realized_pnl: None,
            status,
            order_id,
            confidence: decision.confidence,
            created_at: Utc::now(),
        };
        self.store()?.record_failed_execution(decision, &record)?;
        Ok(())
    }
}
