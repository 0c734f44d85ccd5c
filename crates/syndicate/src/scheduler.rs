use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use syndicate_agents::{
    aggregate, AgentView, BudgetGovernor, DecisionOutcome, DecisionUnit, VoteInput,
};
use syndicate_exec::{ExecError, ExecutionManager};
use syndicate_market::{ContextProvider, MarketError};
use syndicate_models::decision::Decision;
use syndicate_models::SchedulerConfig;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::hours;

const HISTORY_WINDOW: usize = 20;

/// The cycle scheduler: periodic fan-out over the decision units, a
/// synchronization barrier before the consortium, and an independent
/// position-review loop.
pub struct Scheduler {
    config: SchedulerConfig,
    symbols: Vec<String>,
    provider: Arc<ContextProvider>,
    units: Vec<Arc<DecisionUnit>>,
    executor: Arc<ExecutionManager>,
    governor: Arc<BudgetGovernor>,
    consortium_name: String,
    default_win_rate: Decimal,
    enabled: AtomicBool,
    cancel: CancellationToken,
    cycle_seq: AtomicU64,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SchedulerConfig,
        symbols: Vec<String>,
        provider: Arc<ContextProvider>,
        units: Vec<Arc<DecisionUnit>>,
        executor: Arc<ExecutionManager>,
        governor: Arc<BudgetGovernor>,
        consortium_name: String,
        default_win_rate: Decimal,
    ) -> Self {
        let enabled = AtomicBool::new(config.enabled);
        Self {
            config,
            symbols,
            provider,
            units,
            executor,
            governor,
            consortium_name,
            default_win_rate,
            enabled,
            cancel: CancellationToken::new(),
            cycle_seq: AtomicU64::new(0),
        }
    }

    /// Token that stops all loops; in-flight work finishes or times out,
    /// no new cycle starts.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The operational enable/disable switch.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        info!(enabled, "Trading toggled");
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn cycles_run(&self) -> u64 {
        self.cycle_seq.load(Ordering::SeqCst)
    }

    /// Run the daemon until cancelled.
    pub async fn run(self: Arc<Self>) {
        info!("Syndicate scheduler starting");

        let mut join_set = JoinSet::new();

        {
            let scheduler = Arc::clone(&self);
            join_set.spawn(async move {
                scheduler.trading_loop().await;
            });
        }
        {
            let scheduler = Arc::clone(&self);
            join_set.spawn(async move {
                scheduler.review_loop().await;
            });
        }

        while join_set.join_next().await.is_some() {}
        info!("Syndicate scheduler stopped");
    }

    /// Trading-cycle loop: dense cadence inside market hours, sparse
    /// outside.
    async fn trading_loop(&self) {
        loop {
            let interval = if self.market_open_now() {
                Duration::from_secs(self.config.dense_interval_seconds)
            } else {
                Duration::from_secs(self.config.sparse_interval_seconds)
            };

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Trading loop shutting down");
                    break;
                }
                _ = tokio::time::sleep(interval) => {
                    if self.is_enabled() {
                        self.run_cycle().await;
                    }
                }
            }
        }
    }

    /// Position-review loop: shorter interval, market hours only.
    async fn review_loop(&self) {
        let interval = Duration::from_secs(self.config.review_interval_seconds);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Review loop shutting down");
                    break;
                }
                _ = tokio::time::sleep(interval) => {
                    if self.is_enabled() && self.market_open_now() {
                        self.run_review().await;
                    }
                }
            }
        }
    }

    fn market_open_now(&self) -> bool {
        hours::is_market_open(
            Utc::now(),
            self.config.market_open_minute_utc,
            self.config.market_close_minute_utc,
        )
    }

    /// One full cycle: context snapshot, concurrent decision fan-out, joined
    /// executions, then the consortium barrier. One agent's failure never
    /// aborts the cycle.
    pub async fn run_cycle(&self) {
        let cycle = self.cycle_seq.fetch_add(1, Ordering::SeqCst) + 1;
        info!(cycle, "Trading cycle starting");

        let context = match self.provider.get_context(&self.symbols).await {
            Ok(context) => context,
            Err(MarketError::DataUnavailable(reason)) => {
                warn!(cycle, %reason, "Market context unavailable, cycle skipped");
                return;
            }
            Err(e) => {
                warn!(cycle, error = %e, "Market context failed, cycle skipped");
                return;
            }
        };

        // Fan out: every enabled unit decides concurrently. Units block only
        // on the governor, the inference round trip, and the cache fill.
        let mut fan_out = JoinSet::new();
        for unit in &self.units {
            let unit = Arc::clone(unit);
            let executor = Arc::clone(&self.executor);
            let context = Arc::clone(&context);
            fan_out.spawn(async move {
                let name = unit.name().to_string();
                let (ledger, positions) = match executor.view(&name).await {
                    Ok(view) => view,
                    Err(e) => {
                        error!(agent = %name, error = %e, "Ledger view failed");
                        return None;
                    }
                };
                let history = executor.history(&name, HISTORY_WINDOW).unwrap_or_default();
                let view = AgentView {
                    profile: unit.profile().clone(),
                    ledger,
                    positions,
                };
                Some((name, unit.decide(&view, &history, &context, cycle).await))
            });
        }

        let mut decided: Vec<Decision> = Vec::new();
        while let Some(joined) = fan_out.join_next().await {
            match joined {
                Ok(Some((_, DecisionOutcome::Decided(decision)))) => {
                    decided.push(decision);
                }
                Ok(Some((agent, DecisionOutcome::Skipped(reason)))) => {
                    info!(%agent, ?reason, "Agent skipped this cycle");
                }
                Ok(None) => {}
                Err(e) => {
                    error!(error = %e, "Decision task panicked");
                }
            }
        }

        // Execute the independents' decisions; different agents in parallel,
        // the manager serializes per agent.
        let mut executions = JoinSet::new();
        for decision in &decided {
            let executor = Arc::clone(&self.executor);
            let decision = decision.clone();
            let price = decision
                .symbol
                .as_deref()
                .and_then(|s| context.quote_price(s));
            executions.spawn(async move {
                let agent = decision.agent.clone();
                (agent, executor.apply(&decision, price).await)
            });
        }
        while let Some(joined) = executions.join_next().await {
            match joined {
                Ok((_, Ok(result))) if result.duplicate => {}
                Ok((agent, Ok(result))) => {
                    info!(%agent, status = ?result.status, "Execution settled");
                }
                Ok((agent, Err(e))) => {
                    report_execution_error(&agent, &e);
                }
                Err(e) => {
                    error!(error = %e, "Execution task panicked");
                }
            }
        }

        // Barrier reached: every unit resolved. The consortium aggregates
        // the independents' decisions from this cycle only.
        let mut votes = Vec::with_capacity(decided.len());
        for decision in &decided {
            let win_rate = match self.executor.win_rate(&decision.agent).await {
                Ok(rate) => rate,
                Err(e) => {
                    warn!(agent = %decision.agent, error = %e, "Win rate unavailable");
                    None
                }
            };
            votes.push(VoteInput {
                decision: decision.clone(),
                win_rate,
            });
        }

        match aggregate(cycle, &self.consortium_name, &votes, self.default_win_rate) {
            Ok(consortium_decision) => {
                let price = consortium_decision
                    .symbol
                    .as_deref()
                    .and_then(|s| context.quote_price(s));
                match self.executor.apply(&consortium_decision, price).await {
                    Ok(result) => {
                        info!(status = ?result.status, "Consortium execution settled");
                    }
                    Err(e) => {
                        report_execution_error(&self.consortium_name, &e);
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "Consortium aggregation rejected inputs");
            }
        }

        let usage = self.governor.snapshot();
        info!(
            cycle,
            decisions = decided.len(),
            budget_spent = %usage.cost_usd,
            budget_pct = %usage.percent_used,
            "Trading cycle complete"
        );
    }

    /// One review pass: fresh quotes, updated unrealized P&L, drawdown
    /// warnings. No ledger mutation happens here.
    pub async fn run_review(&self) {
        let context = match self.provider.get_context(&self.symbols).await {
            Ok(context) => context,
            Err(e) => {
                warn!(error = %e, "Review skipped, no market context");
                return;
            }
        };

        let mut agents: Vec<String> = self.units.iter().map(|u| u.name().to_string()).collect();
        agents.push(self.consortium_name.clone());

        for agent in agents {
            match self.executor.refresh_positions(&agent, &context).await {
                Ok(positions) => {
                    self.warn_on_drawdowns(&agent, &positions);
                }
                Err(e) => {
                    warn!(%agent, error = %e, "Position refresh failed");
                }
            }
        }
    }

    fn warn_on_drawdowns(&self, agent: &str, positions: &[syndicate_models::Position]) {
        for pos in positions {
            let basis = pos.cost_basis();
            if basis <= Decimal::ZERO {
                continue;
            }
            let drawdown = -pos.unrealized_pnl / basis;
            if drawdown >= self.config.drawdown_warn_fraction {
                warn!(
                    %agent,
                    symbol = %pos.symbol,
                    unrealized = %pos.unrealized_pnl,
                    drawdown_pct = %(drawdown * Decimal::ONE_HUNDRED),
                    "Position drawdown beyond threshold"
                );
            }
        }
    }
}

fn report_execution_error(agent: &str, error: &ExecError) {
    match error {
        // Expected, recorded failures: the agent simply did not trade.
        ExecError::InsufficientResources(_) | ExecError::ExecutionFailed(_) => {
            warn!(%agent, %error, "Decision not executed");
        }
        // The brokerage side effect happened but persistence did not;
        // operator must retry the write.
        ExecError::StoreWriteFailed { .. } => {
            error!(%agent, %error, "Store write failed after execution");
        }
        other => {
            error!(%agent, error = %other, "Execution error");
        }
    }
}
