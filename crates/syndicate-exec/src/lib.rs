pub mod broker;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod store;

pub mod test_support;

pub use broker::{Brokerage, HttpBrokerage, OrderAck, OrderRequest, OrderSide};
pub use error::{ExecError, StoreError};
pub use executor::{ExecutionManager, ExecutionResult};
pub use ledger::LedgerState;
pub use store::TradeStore;
