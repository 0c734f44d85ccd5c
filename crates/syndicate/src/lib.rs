//! Syndicate - a fleet of independently-ledgered AI trading agents behind
//! one orchestration core: a governed inference budget, per-agent ledger
//! execution, a vote-aggregating consortium, and a two-cadence cycle
//! scheduler.

pub mod hours;
pub mod scheduler;

pub use scheduler::Scheduler;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use syndicate_agents::{BudgetGovernor, DecisionUnit, HttpInference, UnitConfig};
use syndicate_exec::{ExecutionManager, HttpBrokerage, TradeStore};
use syndicate_market::{ContextProvider, HttpMarketSource};
use syndicate_models::{AgentProfile, SyndicateConfig};

/// Build the full scheduler from configuration: store, market provider,
/// governor, decision units, and the execution manager, wired the way the
/// daemon runs them.
pub fn build_scheduler(config: &SyndicateConfig) -> anyhow::Result<Arc<Scheduler>> {
    let store = TradeStore::open(&config.store.sqlite_path)
        .with_context(|| format!("open store {}", config.store.sqlite_path))?;

    let broker = Arc::new(
        HttpBrokerage::new(
            &config.brokerage.base_url,
            &env_or_empty(&config.brokerage.api_key_env),
            &env_or_empty(&config.brokerage.api_secret_env),
            Duration::from_secs(config.brokerage.timeout_seconds),
        )
        .context("build brokerage client")?,
    );

    let source = Arc::new(
        HttpMarketSource::new(
            &config.market.data_base_url,
            &config.market.news_base_url,
            Duration::from_secs(config.market.request_timeout_seconds),
        )
        .context("build market source")?,
    );
    let provider = Arc::new(ContextProvider::new(
        source,
        Duration::from_secs(config.market.context_ttl_seconds),
        config.market.bar_lookback,
    ));

    let governor = Arc::new(BudgetGovernor::new(config.budget.daily_ceiling_usd));
    let inference = Arc::new(
        HttpInference::new(
            &config.inference.base_url,
            &env_or_empty(&config.inference.api_key_env),
            Duration::from_secs(config.inference.timeout_seconds),
        )
        .map_err(|e| anyhow::anyhow!("build inference client: {e}"))?,
    );

    let executor = Arc::new(ExecutionManager::new(
        store,
        broker,
        config.brokerage.fee_per_trade,
    ));

    let unit_config = UnitConfig {
        max_output_tokens: config.inference.max_output_tokens,
        temperature: config.inference.temperature,
        call_timeout: Duration::from_secs(config.inference.timeout_seconds),
        critique_every_trades: config.agents.critique_every_trades,
        fee_per_trade: config.brokerage.fee_per_trade,
    };

    let mut units = Vec::new();
    for profile_config in config.agents.profiles.iter().filter(|p| p.enabled) {
        let profile = AgentProfile {
            name: profile_config.name.clone(),
            risk_profile: profile_config.risk_profile,
            model: profile_config.model.clone(),
        };
        executor
            .register_agent(&profile, config.agents.initial_capital)
            .with_context(|| format!("register agent {}", profile.name))?;
        units.push(Arc::new(DecisionUnit::new(
            profile,
            inference.clone(),
            governor.clone(),
            unit_config.clone(),
        )));
    }

    // The consortium owns a ledger like any agent and executes through the
    // same manager; it just has no unit of its own.
    let consortium_profile = AgentProfile {
        name: config.agents.consortium_name.clone(),
        risk_profile: syndicate_models::RiskProfile::Balanced,
        model: "aggregated".to_string(),
    };
    executor
        .register_agent(&consortium_profile, config.agents.initial_capital)
        .context("register consortium ledger")?;

    Ok(Arc::new(Scheduler::new(
        config.scheduler.clone(),
        config.market.symbols.clone(),
        provider,
        units,
        executor,
        governor,
        config.agents.consortium_name.clone(),
        config.agents.default_win_rate,
    )))
}

fn env_or_empty(var: &str) -> String {
    match std::env::var(var) {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(%var, "Environment variable not set, using empty credential");
            String::new()
        }
    }
}
