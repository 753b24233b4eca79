use async_trait::async_trait;
use boxoffice_shared::Masked;
use serde::{Deserialize, Serialize};

use crate::event::Currency;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    RequiresAction,
    Processing,
    Succeeded,
    Canceled,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ChargeRequest {
    /// Minor currency units.
    pub amount: i64,
    pub currency: Currency,
    pub token: Masked<String>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Charge {
    pub payment_id: String,
    pub status: PaymentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Refund {
    pub refund_id: String,
    pub status: PaymentStatus,
}

/// External payment capability. Amount encoding and currency rules belong to
/// the provider behind the adapter.
#[async_trait]
pub trait PaymentAdapter: Send + Sync {
    async fn charge(&self, request: &ChargeRequest) -> Result<Charge, PaymentError>;

    /// Refund `amount` of a payment, or all of it when `amount` is `None`.
    async fn refund(&self, payment_id: &str, amount: Option<i64>) -> Result<Refund, PaymentError>;
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum PaymentError {
    #[error("Payment declined: {0}")]
    Declined(String),

    #[error("Payment not settled: {0:?}")]
    NotSettled(PaymentStatus),

    #[error("Payment provider unavailable: {0}")]
    Unavailable(String),
}
