//! # Payment Gateway Collaborators
//!
//! Traits the host implements to connect a real payment provider.
//!
//! ## Payment Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  checkout()                                                             │
//! │     │  ChargeRequest { order_number, amount, customer }                 │
//! │     ▼                                                                   │
//! │  PaymentGateway::create_charge_token  ──►  ChargeToken { token, url }   │
//! │                                                  │                      │
//! │                                   customer pays on the gateway page     │
//! │                                                  │                      │
//! │  gateway webhook ──► host parses PaymentNotification                    │
//! │                          │                                              │
//! │                          ▼                                              │
//! │  SignatureVerifier::verify  ──► false ⇒ InvalidSignature, no change     │
//! │                          │                                              │
//! │                          ▼                                              │
//! │  process_payment_notification()                                         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use orderline_core::{CustomerInfo, Money};

/// What the gateway needs to open a payment page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub order_number: String,
    pub amount: Money,
    pub customer: CustomerInfo,
}

/// Gateway handle for a pending charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeToken {
    pub token: String,
    /// Hosted payment page, when the gateway provides one.
    pub redirect_url: Option<String>,
}

/// Creates charge tokens with a payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a charge for `request.amount`.
    async fn create_charge_token(&self, request: &ChargeRequest) -> Result<ChargeToken, GatewayError>;
}

/// Inbound payment status notification, as parsed by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentNotification {
    pub order_number: String,
    /// Raw gateway status (`settlement`, `capture`, `deny`, `expire`...).
    pub status: String,
    pub signature: String,
    /// Amount the gateway reports, when it reports one.
    #[serde(default)]
    pub gross_amount: Option<Money>,
}

impl PaymentNotification {
    pub fn new(
        order_number: impl Into<String>,
        status: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            order_number: order_number.into(),
            status: status.into(),
            signature: signature.into(),
            gross_amount: None,
        }
    }

    pub fn with_gross_amount(mut self, amount: Money) -> Self {
        self.gross_amount = Some(amount);
        self
    }
}

/// Authenticates inbound notifications.
pub trait SignatureVerifier: Send + Sync {
    /// Returns true when `notification.signature` was produced by the gateway.
    fn verify(&self, notification: &PaymentNotification) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_without_amount() {
        let json = r#"{"order_number":"ORD-20261018-1A2B3C4D","status":"settlement","signature":"abc"}"#;
        let notification: PaymentNotification = serde_json::from_str(json).unwrap();
        assert_eq!(notification.status, "settlement");
        assert!(notification.gross_amount.is_none());
    }

    #[test]
    fn test_notification_with_amount() {
        let json = r#"{"order_number":"ORD-1","status":"deny","signature":"abc","gross_amount":121000}"#;
        let notification: PaymentNotification = serde_json::from_str(json).unwrap();
        assert_eq!(notification.gross_amount, Some(Money::from_minor(121_000)));
    }
}
