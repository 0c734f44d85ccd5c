pub mod error;
pub mod indicators;
pub mod provider;
pub mod source;

pub mod test_support;

pub use error::MarketError;
pub use provider::ContextProvider;
pub use source::{HttpMarketSource, MarketSource, NewsItem};
