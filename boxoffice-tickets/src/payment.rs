use async_trait::async_trait;
use boxoffice_core::{Charge, ChargeRequest, PaymentAdapter, PaymentError, PaymentStatus, Refund};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// Token prefix the mock treats as a declined card.
pub const DECLINED_TOKEN_PREFIX: &str = "tok_fail";

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRefund {
    pub payment_id: String,
    pub amount: Option<i64>,
}

/// Payment adapter for local runs and tests. Approves every charge except
/// tokens starting with `tok_fail`, and remembers what it charged and refunded.
#[derive(Default)]
pub struct MockPaymentAdapter {
    charges: Mutex<Vec<(String, i64)>>,
    refunds: Mutex<Vec<RecordedRefund>>,
    refunds_unavailable: AtomicBool,
}

impl MockPaymentAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_refunds_unavailable(&self, unavailable: bool) {
        self.refunds_unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn charges(&self) -> Vec<(String, i64)> {
        self.charges.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn refunds(&self) -> Vec<RecordedRefund> {
        self.refunds.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PaymentAdapter for MockPaymentAdapter {
    async fn charge(&self, request: &ChargeRequest) -> Result<Charge, PaymentError> {
        if request.token.expose().starts_with(DECLINED_TOKEN_PREFIX) {
            return Err(PaymentError::Declined("card declined".to_string()));
        }

        let payment_id = format!("mock_pi_{}", Uuid::new_v4().simple());
        if let Ok(mut charges) = self.charges.lock() {
            charges.push((payment_id.clone(), request.amount));
        }
        info!(%payment_id, amount = request.amount, currency = %request.currency, "Mock charge captured");

        Ok(Charge {
            payment_id,
            status: PaymentStatus::Succeeded,
        })
    }

    async fn refund(&self, payment_id: &str, amount: Option<i64>) -> Result<Refund, PaymentError> {
        if self.refunds_unavailable.load(Ordering::SeqCst) {
            return Err(PaymentError::Unavailable("refund service offline".to_string()));
        }

        if let Ok(mut refunds) = self.refunds.lock() {
            refunds.push(RecordedRefund {
                payment_id: payment_id.to_string(),
                amount,
            });
        }

        Ok(Refund {
            refund_id: format!("mock_re_{}", Uuid::new_v4().simple()),
            status: PaymentStatus::Succeeded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxoffice_core::Currency;
    use boxoffice_shared::Masked;

    fn request(token: &str) -> ChargeRequest {
        ChargeRequest {
            amount: 5000,
            currency: Currency::Eur,
            token: Masked::new(token.to_string()),
            description: "Tickets for Test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_declines_failing_tokens() {
        let adapter = MockPaymentAdapter::new();
        let err = adapter.charge(&request("tok_fail_card")).await.unwrap_err();
        assert!(matches!(err, PaymentError::Declined(_)));
        assert!(adapter.charges().is_empty());
    }

    #[tokio::test]
    async fn test_charge_and_refund_are_recorded() {
        let adapter = MockPaymentAdapter::new();
        let charge = adapter.charge(&request("tok_visa")).await.unwrap();
        assert_eq!(charge.status, PaymentStatus::Succeeded);

        adapter.refund(&charge.payment_id, Some(5000)).await.unwrap();
        assert_eq!(
            adapter.refunds(),
            vec![RecordedRefund {
                payment_id: charge.payment_id,
                amount: Some(5000)
            }]
        );

        adapter.set_refunds_unavailable(true);
        assert!(adapter.refund("mock_pi_x", None).await.is_err());
    }
}
