pub mod consortium;
pub mod critique;
pub mod error;
pub mod governor;
pub mod inference;
pub mod parser;
pub mod prompts;
pub mod unit;

pub mod test_support;

pub use consortium::{aggregate, AggregationError, VoteInput};
pub use error::AgentError;
pub use governor::{BudgetGovernor, Denied, Reservation, UsageSnapshot};
pub use inference::{HttpInference, InferenceProvider, InferenceReply, InferenceRequest, TokenUsage};
pub use unit::{AgentView, DecisionOutcome, DecisionUnit, SkipReason, UnitConfig};
