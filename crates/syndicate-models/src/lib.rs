pub mod agent;
pub mod config;
pub mod decision;
pub mod market;
pub mod store_schema;
pub mod trade;

pub use agent::{AgentLedger, AgentProfile, Position, RiskProfile};
pub use config::{
    AgentProfileConfig, AgentsConfig, BrokerageConfig, BudgetConfig, InferenceConfig, MarketConfig,
    SchedulerConfig, StoreConfig, SyndicateConfig,
};
pub use decision::{Action, Decision, DecisionSource};
pub use market::{Bar, IndicatorSet, MarketContext, NewsDigest, Quote};
pub use trade::{ExecutionStatus, TradeRecord};
