//! Mock brokerage for executor and cycle tests.

use std::sync::Mutex;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::broker::{Brokerage, OrderAck, OrderRequest};
use crate::error::ExecError;

enum Mode {
    Accept,
    Reject(String),
    Fail,
}

/// Brokerage double: accepts, rejects with a status, or fails transport.
/// Records every submitted order.
pub struct MockBrokerage {
    mode: Mode,
    fill_price: Option<Decimal>,
    orders: Mutex<Vec<OrderRequest>>,
    counter: Mutex<u64>,
}

impl MockBrokerage {
    pub fn accepting() -> Self {
        Self {
            mode: Mode::Accept,
            fill_price: None,
            orders: Mutex::new(Vec::new()),
            counter: Mutex::new(0),
        }
    }

    pub fn rejecting(status: &str) -> Self {
        Self {
            mode: Mode::Reject(status.to_string()),
            fill_price: None,
            orders: Mutex::new(Vec::new()),
            counter: Mutex::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            mode: Mode::Fail,
            fill_price: None,
            orders: Mutex::new(Vec::new()),
            counter: Mutex::new(0),
        }
    }

    /// Report this fill price in acks instead of leaving it to the caller's
    /// quote.
    pub fn with_fill_price(mut self, price: Decimal) -> Self {
        self.fill_price = Some(price);
        self
    }

    pub fn orders(&self) -> Vec<OrderRequest> {
        self.orders.lock().unwrap().clone()
    }
}

#[async_trait]
impl Brokerage for MockBrokerage {
    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderAck, ExecError> {
        if matches!(self.mode, Mode::Fail) {
            return Err(ExecError::ExecutionFailed(
                "mock transport failure".to_string(),
            ));
        }

        self.orders.lock().unwrap().push(order.clone());
        let mut counter = self.counter.lock().unwrap();
        *counter += 1;

        match &self.mode {
            Mode::Accept => Ok(OrderAck {
                order_id: format!("mock-{counter}"),
                status: "accepted".to_string(),
                filled_avg_price: self.fill_price,
            }),
            Mode::Reject(status) => Ok(OrderAck {
                order_id: format!("mock-{counter}"),
                status: status.clone(),
                filled_avg_price: None,
            }),
            Mode::Fail => unreachable!("handled above"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::OrderSide;
    use rust_decimal_macros::dec;

    fn order() -> OrderRequest {
        OrderRequest {
            symbol: "AAPL".to_string(),
            quantity: dec!(10),
            side: OrderSide::Buy,
        }
    }

    #[tokio::test]
    async fn accepting_mock_issues_sequential_ids() {
        let broker = MockBrokerage::accepting();
        let first = broker.submit_order(&order()).await.unwrap();
        let second = broker.submit_order(&order()).await.unwrap();
        assert_eq!(first.order_id, "mock-1");
        assert_eq!(second.order_id, "mock-2");
        assert_eq!(broker.orders().len(), 2);
    }

    #[tokio::test]
    async fn rejecting_mock_returns_status() {
        let broker = MockBrokerage::rejecting("rejected");
        let ack = broker.submit_order(&order()).await.unwrap();
        assert!(!ack.accepted());
    }

    #[tokio::test]
    async fn failing_mock_records_nothing() {
        let broker = MockBrokerage::failing();
        assert!(broker.submit_order(&order()).await.is_err());
        assert!(broker.orders().is_empty());
    }
}
