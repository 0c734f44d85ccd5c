use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ExecError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// A market/day order, the only order shape this core submits.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub quantity: Decimal,
    pub side: OrderSide,
}

/// The brokerage's answer. Anything but an accepted status is a failed
/// execution for ledger purposes.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OrderAck {
    #[serde(rename = "id")]
    pub order_id: String,
    pub status: String,
    #[serde(default)]
    pub filled_avg_price: Option<Decimal>,
}

impl OrderAck {
    pub fn accepted(&self) -> bool {
        matches!(
            self.status.as_str(),
            "accepted" | "new" | "filled" | "partially_filled"
        )
    }
}

/// Remote order execution service. Mockable for tests.
#[async_trait]
pub trait Brokerage: Send + Sync {
    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderAck, ExecError>;
}

/// HTTP brokerage client (Alpaca-style orders endpoint).
pub struct HttpBrokerage {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

#[derive(Serialize)]
struct OrderPayload<'a> {
    symbol: &'a str,
    qty: String,
    side: OrderSide,
    #[serde(rename = "type")]
    order_type: &'static str,
    time_in_force: &'static str,
}

impl HttpBrokerage {
    pub fn new(
        base_url: &str,
        api_key: &str,
        api_secret: &str,
        timeout: Duration,
    ) -> Result<Self, ExecError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExecError::ExecutionFailed(format!("HTTP client build: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
        })
    }
}

#[async_trait]
impl Brokerage for HttpBrokerage {
    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderAck, ExecError> {
        let payload = OrderPayload {
            symbol: &order.symbol,
            qty: order.quantity.to_string(),
            side: order.side,
            order_type: "market",
            time_in_force: "day",
        };

        debug!(symbol = %order.symbol, side = ?order.side, qty = %order.quantity, "Submitting order");
        let url = format!("{}/v2/orders", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.api_secret)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ExecError::ExecutionFailed(format!("order submit: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body = %body, "Brokerage rejected order");
            return Err(ExecError::ExecutionFailed(format!(
                "brokerage status {status}: {body}"
            )));
        }

        response
            .json::<OrderAck>()
            .await
            .map_err(|e| ExecError::ExecutionFailed(format!("order ack parse: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn accepted_statuses() {
        for status in ["accepted", "new", "filled", "partially_filled"] {
            let ack = OrderAck {
                order_id: "o1".to_string(),
                status: status.to_string(),
                filled_avg_price: None,
            };
            assert!(ack.accepted(), "{status} should count as accepted");
        }
        let rejected = OrderAck {
            order_id: "o2".to_string(),
            status: "rejected".to_string(),
            filled_avg_price: None,
        };
        assert!(!rejected.accepted());
    }

    #[test]
    fn order_payload_serialization() {
        let payload = OrderPayload {
            symbol: "AAPL",
            qty: "10".to_string(),
            side: OrderSide::Buy,
            order_type: "market",
            time_in_force: "day",
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["symbol"], "AAPL");
        assert_eq!(json["side"], "buy");
        assert_eq!(json["type"], "market");
        assert_eq!(json["time_in_force"], "day");
    }

    #[test]
    fn ack_deserialization_with_fill_price() {
        let ack: OrderAck = serde_json::from_str(
            r#"{"id": "ord-1", "status": "filled", "filled_avg_price": "50.05"}"#,
        )
        .unwrap();
        assert_eq!(ack.filled_avg_price, Some(dec!(50.05)));
    }

    #[test]
    fn ack_deserialization_without_fill_price() {
        let ack: OrderAck =
            serde_json::from_str(r#"{"id": "ord-2", "status": "accepted"}"#).unwrap();
        assert!(ack.filled_avg_price.is_none());
        assert!(ack.accepted());
    }
}
