//! HandleGatewayWebhookHandler - Routes verified gateway webhooks.
//!
//! Webhooks are treated as hints: a `charge.success` triggers a fresh
//! verification rather than trusting the payload.

use std::sync::Arc;

use crate::application::handlers::refund::{
    CompleteRefundCommand, CompleteRefundHandler, CompleteRefundResult, FailRefundCommand,
    FailRefundHandler,
};
use crate::domain::payment::SettlementError;
use crate::domain::refund::Refund;
use crate::ports::{GatewayWebhookEvent, PaymentGateway, RefundRepository};

use super::{VerifyAndSettleCommand, VerifyAndSettleHandler, VerifyAndSettleResult};

#[derive(Debug, Clone)]
pub struct HandleGatewayWebhookCommand {
    /// Raw request body, exactly as signed.
    pub payload: Vec<u8>,
    pub signature: String,
}

/// What the webhook caused.
#[derive(Debug, Clone)]
pub enum HandleGatewayWebhookResult {
    Verified(VerifyAndSettleResult),
    RefundCompleted(CompleteRefundResult),
    RefundFailed(Refund),

    /// Acknowledged without action; carries why.
    Ignored(String),
}

pub struct HandleGatewayWebhookHandler {
    gateway: Arc<dyn PaymentGateway>,
    refunds: Arc<dyn RefundRepository>,
    verifier: Arc<VerifyAndSettleHandler>,
    complete_refund: Arc<CompleteRefundHandler>,
    fail_refund: Arc<FailRefundHandler>,
}

impl HandleGatewayWebhookHandler {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        refunds: Arc<dyn RefundRepository>,
        verifier: Arc<VerifyAndSettleHandler>,
        complete_refund: Arc<CompleteRefundHandler>,
        fail_refund: Arc<FailRefundHandler>,
    ) -> Self {
        Self {
            gateway,
            refunds,
            verifier,
            complete_refund,
            fail_refund,
        }
    }

    pub async fn handle(
        &self,
        cmd: HandleGatewayWebhookCommand,
    ) -> Result<HandleGatewayWebhookResult, SettlementError> {
        // 1. Verify signature and decode
        let event = self
            .gateway
            .parse_webhook(&cmd.payload, &cmd.signature)
            .map_err(|e| {
                tracing::warn!(error = %e, "Rejected gateway webhook");
                SettlementError::from(e)
            })?;

        // 2. Route
        match event {
            GatewayWebhookEvent::ChargeSuccess { reference } => {
                match self
                    .verifier
                    .handle(VerifyAndSettleCommand {
                        reference: reference.clone(),
                    })
                    .await
                {
                    Ok(result) => Ok(HandleGatewayWebhookResult::Verified(result)),
                    Err(SettlementError::PaymentNotFound(_)) => {
                        tracing::warn!(reference = %reference, "Webhook for unknown payment");
                        Ok(HandleGatewayWebhookResult::Ignored(format!(
                            "unknown payment {}",
                            reference
                        )))
                    }
                    Err(e) => Err(e),
                }
            }

            GatewayWebhookEvent::RefundProcessed {
                provider_refund_reference,
            } => match self.refunds.find_by_provider_reference(&provider_refund_reference).await? {
                Some(refund) => {
                    let result = self
                        .complete_refund
                        .handle(CompleteRefundCommand {
                            refund_id: refund.id,
                        })
                        .await?;
                    Ok(HandleGatewayWebhookResult::RefundCompleted(result))
                }
                None => Ok(self.unknown_refund(&provider_refund_reference)),
            },

            GatewayWebhookEvent::RefundFailed {
                provider_refund_reference,
                reason,
            } => match self.refunds.find_by_provider_reference(&provider_refund_reference).await? {
                Some(refund) => {
                    let refund = self
                        .fail_refund
                        .handle(FailRefundCommand {
                            refund_id: refund.id,
                            reason,
                        })
                        .await?;
                    Ok(HandleGatewayWebhookResult::RefundFailed(refund))
                }
                None => Ok(self.unknown_refund(&provider_refund_reference)),
            },

            GatewayWebhookEvent::Other { event } => {
                tracing::debug!(event = %event, "Ignoring gateway webhook");
                Ok(HandleGatewayWebhookResult::Ignored(event))
            }
        }
    }

    fn unknown_refund(&self, provider_refund_reference: &str) -> HandleGatewayWebhookResult {
        tracing::warn!(
            provider_refund_reference = %provider_refund_reference,
            "Refund webhook for unknown refund"
        );
        HandleGatewayWebhookResult::Ignored(format!("unknown refund {}", provider_refund_reference))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryApplicationStore, InMemoryEnrollmentStore, InMemoryPaymentLedger,
        InMemoryRefundRepository,
    };
    use crate::adapters::paystack::{MockPaymentGateway, MOCK_WEBHOOK_SIGNATURE};
    use crate::application::effects::SideEffectDispatcher;
    use crate::domain::foundation::{Amount, CourseId, Timestamp, UserId};
    use crate::domain::payment::{
        Payment, PaymentReference, PaymentStatus, PaymentTransition, PaymentType,
    };
    use crate::domain::refund::{RefundStatus, RefundTransition};
    use crate::ports::{PaymentLedger, ProviderStatus};

    // ════════════════════════════════════════════════════════════════════════════
    // Test Fixtures
    // ════════════════════════════════════════════════════════════════════════════

    struct Fixture {
        handler: HandleGatewayWebhookHandler,
        ledger: Arc<InMemoryPaymentLedger>,
        refunds: Arc<InMemoryRefundRepository>,
        gateway: MockPaymentGateway,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(InMemoryPaymentLedger::new());
        let refunds = Arc::new(InMemoryRefundRepository::new());
        let gateway = MockPaymentGateway::new();
        let dispatcher = SideEffectDispatcher::standard(
            ledger.clone(),
            Arc::new(InMemoryEnrollmentStore::new()),
            Arc::new(InMemoryApplicationStore::new()),
        );
        let handler = HandleGatewayWebhookHandler::new(
            Arc::new(gateway.clone()),
            refunds.clone(),
            Arc::new(VerifyAndSettleHandler::new(
                ledger.clone(),
                Arc::new(gateway.clone()),
                dispatcher,
            )),
            Arc::new(CompleteRefundHandler::new(ledger.clone(), refunds.clone())),
            Arc::new(FailRefundHandler::new(refunds.clone())),
        );
        Fixture {
            handler,
            ledger,
            refunds,
            gateway,
        }
    }

    async fn pending(ledger: &InMemoryPaymentLedger) -> Payment {
        let payment = Payment::pending(
            PaymentReference::new("KM_1").unwrap(),
            PaymentType::Tuition,
            Amount::new(50_000).unwrap(),
            "NGN",
            UserId::new("user-1").unwrap(),
            Some(CourseId::new("course-1").unwrap()),
        )
        .unwrap();
        ledger.insert(&payment).await.unwrap();
        payment
    }

    async fn processing_refund(f: &Fixture, provider_reference: &str) -> Refund {
        let payment = pending(&f.ledger).await;
        let payment = f
            .ledger
            .apply_transition(
                &payment.id,
                &PaymentTransition::settle(Some("tx_1".into()), Timestamp::now()),
            )
            .await
            .unwrap()
            .into_inner();
        let refund = Refund::request(&payment, "Withdrawn", None, None, None).unwrap();
        f.refunds.insert_if_no_open(&refund).await.unwrap();
        f.refunds
            .apply_transition(
                &refund.id,
                &RefundTransition::processing(Some(provider_reference.into())),
            )
            .await
            .unwrap()
            .into_inner()
    }

    fn webhook(body: &str) -> HandleGatewayWebhookCommand {
        HandleGatewayWebhookCommand {
            payload: body.as_bytes().to_vec(),
            signature: MOCK_WEBHOOK_SIGNATURE.to_string(),
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Routing
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn charge_success_reverifies_with_gateway() {
        let f = fixture();
        pending(&f.ledger).await;
        f.gateway.set_charge("KM_1", ProviderStatus::Success, 50_000);

        let result = f
            .handler
            .handle(webhook(r#"{"event":"charge.success","data":{"reference":"KM_1","amount":1}}"#))
            .await
            .unwrap();

        match result {
            HandleGatewayWebhookResult::Verified(v) => assert_eq!(v.payment_status, PaymentStatus::Paid),
            other => panic!("expected verified, got {:?}", other),
        }
        assert_eq!(f.gateway.verify_calls(), 1);
    }

    #[tokio::test]
    async fn charge_success_for_unknown_payment_is_ignored() {
        let f = fixture();
        let result = f
            .handler
            .handle(webhook(r#"{"event":"charge.success","data":{"reference":"KM_x"}}"#))
            .await
            .unwrap();
        assert!(matches!(result, HandleGatewayWebhookResult::Ignored(_)));
    }

    #[tokio::test]
    async fn refund_processed_completes_refund() {
        let f = fixture();
        processing_refund(&f, "rf_1").await;

        let result = f
            .handler
            .handle(webhook(r#"{"event":"refund.processed","data":{"reference":"rf_1"}}"#))
            .await
            .unwrap();

        match result {
            HandleGatewayWebhookResult::RefundCompleted(done) => {
                assert_eq!(done.refund.status, RefundStatus::Completed);
                assert_eq!(done.payment_status, PaymentStatus::Refunded);
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn refund_failed_fails_refund() {
        let f = fixture();
        processing_refund(&f, "rf_1").await;

        let result = f
            .handler
            .handle(webhook(
                r#"{"event":"refund.failed","data":{"reference":"rf_1","merchant_note":"Account closed"}}"#,
            ))
            .await
            .unwrap();

        match result {
            HandleGatewayWebhookResult::RefundFailed(refund) => {
                assert_eq!(refund.status, RefundStatus::Failed);
                assert_eq!(refund.failure_reason.as_deref(), Some("Account closed"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn other_events_are_ignored() {
        let f = fixture();
        let result = f
            .handler
            .handle(webhook(r#"{"event":"transfer.success","data":{}}"#))
            .await
            .unwrap();
        assert!(matches!(result, HandleGatewayWebhookResult::Ignored(ref e) if e == "transfer.success"));
    }

    #[tokio::test]
    async fn bad_signature_is_forbidden() {
        let f = fixture();
        let cmd = HandleGatewayWebhookCommand {
            signature: "forged".into(),
            ..webhook(r#"{"event":"charge.success","data":{"reference":"KM_1"}}"#)
        };

        let err = f.handler.handle(cmd).await.unwrap_err();
        assert!(matches!(err, SettlementError::Forbidden(_)));
        assert_eq!(f.gateway.verify_calls(), 0);
    }
}
