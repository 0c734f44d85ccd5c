use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::agent::RiskProfile;

/// Top-level configuration for the syndicate daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyndicateConfig {
    pub store: StoreConfig,
    pub market: MarketConfig,
    pub inference: InferenceConfig,
    pub brokerage: BrokerageConfig,
    pub budget: BudgetConfig,
    pub agents: AgentsConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite ledger/trade database.
    pub sqlite_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Base URL of the market data service (quotes and bars).
    pub data_base_url: String,
    /// Base URL of the news service. Empty disables news entirely.
    #[serde(default)]
    pub news_base_url: String,
    /// Symbol universe snapshotted each cycle.
    pub symbols: Vec<String>,
    /// Bars fetched per symbol for indicator warmup.
    #[serde(default = "default_bar_lookback")]
    pub bar_lookback: usize,
    /// Context cache TTL in seconds.
    #[serde(default = "default_context_ttl")]
    pub context_ttl_seconds: u64,
    /// Per-request timeout in seconds for market/news calls.
    #[serde(default = "default_source_timeout")]
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Base URL of the chat-completions style inference service.
    pub base_url: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_inference_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Per-call timeout in seconds.
    #[serde(default = "default_inference_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerageConfig {
    /// Base URL of the order execution service.
    pub base_url: String,
    #[serde(default = "default_broker_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_broker_secret_env")]
    pub api_secret_env: String,
    /// Per-order timeout in seconds.
    #[serde(default = "default_broker_timeout")]
    pub timeout_seconds: u64,
    /// Simulated flat fee charged to the ledger per executed trade.
    #[serde(default = "default_fee_per_trade")]
    pub fee_per_trade: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Daily inference spend ceiling in USD, shared across all agents.
    #[serde(default = "default_daily_ceiling")]
    pub daily_ceiling_usd: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    /// Capital allocated to each agent ledger on first run.
    #[serde(default = "default_initial_capital")]
    pub initial_capital: Decimal,
    /// Run a self-critique pass every N executed trades.
    #[serde(default = "default_critique_every")]
    pub critique_every_trades: u64,
    /// Win rate assumed for consortium weighting before an agent has any
    /// closed trades.
    #[serde(default = "default_win_rate")]
    pub default_win_rate: Decimal,
    pub profiles: Vec<AgentProfileConfig>,
    /// Name of the derived vote-aggregating agent's ledger.
    #[serde(default = "default_consortium_name")]
    pub consortium_name: String,
}

/// One configured strategy variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfileConfig {
    pub name: String,
    pub risk_profile: RiskProfile,
    pub model: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Whether cycles run at all. Operational control, flippable at runtime.
    #[serde(default)]
    pub enabled: bool,
    /// Trading-cycle interval during market hours, in seconds.
    #[serde(default = "default_dense_interval")]
    pub dense_interval_seconds: u64,
    /// Trading-cycle interval outside market hours, in seconds.
    #[serde(default = "default_sparse_interval")]
    pub sparse_interval_seconds: u64,
    /// Position-review interval, in seconds.
    #[serde(default = "default_review_interval")]
    pub review_interval_seconds: u64,
    /// Market open, minutes after midnight UTC.
    #[serde(default = "default_open_minute")]
    pub market_open_minute_utc: u32,
    /// Market close, minutes after midnight UTC.
    #[serde(default = "default_close_minute")]
    pub market_close_minute_utc: u32,
    /// Warn when an open position's drawdown exceeds this fraction.
    #[serde(default = "default_drawdown_warn")]
    pub drawdown_warn_fraction: Decimal,
}

fn default_bar_lookback() -> usize {
    50
}
fn default_context_ttl() -> u64 {
    120
}
fn default_source_timeout() -> u64 {
    10
}
fn default_inference_key_env() -> String {
    "INFERENCE_API_KEY".to_string()
}
fn default_max_output_tokens() -> u32 {
    1000
}
fn default_temperature() -> f64 {
    0.5
}
fn default_inference_timeout() -> u64 {
    45
}
fn default_broker_key_env() -> String {
    "BROKER_API_KEY".to_string()
}
fn default_broker_secret_env() -> String {
    "BROKER_API_SECRET".to_string()
}
fn default_broker_timeout() -> u64 {
    15
}
fn default_fee_per_trade() -> Decimal {
    Decimal::ONE
}
fn default_daily_ceiling() -> Decimal {
    Decimal::new(80, 2) // $0.80
}
fn default_initial_capital() -> Decimal {
    Decimal::from(10_000)
}
fn default_critique_every() -> u64 {
    5
}
fn default_win_rate() -> Decimal {
    Decimal::new(5, 1) // 0.5
}
fn default_consortium_name() -> String {
    "consortium".to_string()
}
fn default_true() -> bool {
    true
}
fn default_dense_interval() -> u64 {
    1800
}
fn default_sparse_interval() -> u64 {
    18_000
}
fn default_review_interval() -> u64 {
    300
}
fn default_open_minute() -> u32 {
    14 * 60 + 30
}
fn default_close_minute() -> u32 {
    21 * 60
}
fn default_drawdown_warn() -> Decimal {
    Decimal::new(5, 2) // 0.05
}
