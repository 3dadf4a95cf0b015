//! Payment history queries.

use std::sync::Arc;

use crate::domain::foundation::UserId;
use crate::domain::payment::{Payment, PaymentStatus, SettlementError};
use crate::ports::PaymentLedger;

#[derive(Debug, Clone)]
pub struct GetPaymentHistoryQuery {
    pub user_id: UserId,

    /// Restrict to one status; all statuses when absent.
    pub status: Option<PaymentStatus>,
}

impl GetPaymentHistoryQuery {
    pub fn all(user_id: UserId) -> Self {
        Self {
            user_id,
            status: None,
        }
    }

    /// Outstanding charges the user still has to pay.
    pub fn pending(user_id: UserId) -> Self {
        Self {
            user_id,
            status: Some(PaymentStatus::Pending),
        }
    }
}

/// Handler for a user's payments, newest first.
pub struct GetPaymentHistoryHandler {
    ledger: Arc<dyn PaymentLedger>,
}

impl GetPaymentHistoryHandler {
    pub fn new(ledger: Arc<dyn PaymentLedger>) -> Self {
        Self { ledger }
    }

    pub async fn handle(&self, query: GetPaymentHistoryQuery) -> Result<Vec<Payment>, SettlementError> {
        let payments = match query.status {
            Some(status) => {
                self.ledger
                    .list_by_user_with_status(&query.user_id, status)
                    .await?
            }
            None => self.ledger.list_by_user(&query.user_id).await?,
        };
        Ok(payments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryPaymentLedger;
    use crate::domain::foundation::{Amount, Timestamp};
    use crate::domain::payment::{PaymentReference, PaymentTransition, PaymentType};

    async fn seed(ledger: &InMemoryPaymentLedger, reference: &str, user: &str) -> Payment {
        let payment = Payment::pending(
            PaymentReference::new(reference).unwrap(),
            PaymentType::ApplicationFee,
            Amount::new(5_000).unwrap(),
            "NGN",
            UserId::new(user).unwrap(),
            None,
        )
        .unwrap();
        ledger.insert(&payment).await.unwrap();
        payment
    }

    #[tokio::test]
    async fn history_is_scoped_to_user() {
        let ledger = Arc::new(InMemoryPaymentLedger::new());
        seed(&ledger, "KM_1", "user-1").await;
        seed(&ledger, "KM_2", "user-1").await;
        seed(&ledger, "KM_3", "user-2").await;
        let handler = GetPaymentHistoryHandler::new(ledger);

        let history = handler
            .handle(GetPaymentHistoryQuery::all(UserId::new("user-1").unwrap()))
            .await
            .unwrap();

        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|p| p.user_id.as_str() == "user-1"));
    }

    #[tokio::test]
    async fn pending_query_excludes_settled_payments() {
        let ledger = Arc::new(InMemoryPaymentLedger::new());
        let paid = seed(&ledger, "KM_1", "user-1").await;
        seed(&ledger, "KM_2", "user-1").await;
        ledger
            .apply_transition(&paid.id, &PaymentTransition::settle(None, Timestamp::now()))
            .await
            .unwrap();
        let handler = GetPaymentHistoryHandler::new(ledger);

        let pending = handler
            .handle(GetPaymentHistoryQuery::pending(UserId::new("user-1").unwrap()))
            .await
            .unwrap();

        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].reference.as_str(), "KM_2");
    }
}
