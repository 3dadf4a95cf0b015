//! VerifyAndSettleHandler - Confirms a charge with the gateway and settles it.
//!
//! Safe to call any number of times, concurrently, for the same reference:
//! only the caller whose compare-and-swap moves the payment PENDING -> PAID
//! dispatches side effects.

use std::sync::Arc;

use crate::application::effects::{DispatchStatus, SideEffectDispatcher};
use crate::domain::foundation::Timestamp;
use crate::domain::payment::{
    Payment, PaymentReference, PaymentStatus, PaymentTransition, SettlementError,
};
use crate::ports::{PaymentGateway, PaymentLedger, ProviderStatus, TransitionOutcome};

/// Command to verify a payment reference.
#[derive(Debug, Clone)]
pub struct VerifyAndSettleCommand {
    pub reference: String,
}

/// Result of verification.
///
/// `confirmed` is true iff the payment is PAID after this call, whether this
/// call settled it or an earlier one did.
#[derive(Debug, Clone)]
pub struct VerifyAndSettleResult {
    pub confirmed: bool,
    pub payment_status: PaymentStatus,
    pub payment: Payment,
    pub dispatch: DispatchStatus,
}

impl VerifyAndSettleResult {
    fn without_dispatch(payment: Payment) -> Self {
        Self {
            confirmed: payment.is_paid(),
            payment_status: payment.status,
            payment,
            dispatch: DispatchStatus::NotRun,
        }
    }
}

pub struct VerifyAndSettleHandler {
    ledger: Arc<dyn PaymentLedger>,
    gateway: Arc<dyn PaymentGateway>,
    dispatcher: SideEffectDispatcher,
}

impl VerifyAndSettleHandler {
    pub fn new(
        ledger: Arc<dyn PaymentLedger>,
        gateway: Arc<dyn PaymentGateway>,
        dispatcher: SideEffectDispatcher,
    ) -> Self {
        Self {
            ledger,
            gateway,
            dispatcher,
        }
    }

    pub async fn handle(
        &self,
        cmd: VerifyAndSettleCommand,
    ) -> Result<VerifyAndSettleResult, SettlementError> {
        // 1. Load payment
        let reference = PaymentReference::new(cmd.reference.as_str())
            .map_err(|_| SettlementError::PaymentNotFound(cmd.reference.clone()))?;
        let payment = self
            .ledger
            .find_by_reference(&reference)
            .await?
            .ok_or_else(|| SettlementError::PaymentNotFound(cmd.reference.clone()))?;

        // 2. Terminal or already settled: answer from the ledger
        if payment.status != PaymentStatus::Pending {
            tracing::debug!(
                reference = %payment.reference,
                status = %payment.status,
                "Verification short-circuited"
            );
            return Ok(VerifyAndSettleResult::without_dispatch(payment));
        }

        // 3. Ask the provider; errors leave the payment untouched
        let charge = self.gateway.verify(reference.as_str()).await.map_err(|e| {
            tracing::warn!(
                reference = %reference,
                error = %e,
                "Gateway verification failed"
            );
            SettlementError::from(e)
        })?;

        match charge.status {
            // 4. Success: check amount, then CAS PENDING -> PAID
            ProviderStatus::Success => {
                if charge.amount_paid < payment.amount.minor_units() {
                    tracing::warn!(
                        reference = %payment.reference,
                        expected = payment.amount.minor_units(),
                        paid = charge.amount_paid,
                        "Provider reported short payment; left PENDING"
                    );
                    return Err(SettlementError::AmountMismatch {
                        reference: payment.reference.to_string(),
                        expected: payment.amount.minor_units(),
                        paid: charge.amount_paid,
                    });
                }

                let transition = PaymentTransition::settle(
                    charge.provider_transaction_id,
                    charge.paid_at.unwrap_or_else(Timestamp::now),
                );
                match self.ledger.apply_transition(&payment.id, &transition).await? {
                    TransitionOutcome::Applied(settled) => {
                        tracing::info!(
                            reference = %settled.reference,
                            payment_id = %settled.id,
                            payment_type = %settled.payment_type,
                            "Payment settled"
                        );
                        // 7. Only the winner dispatches
                        let dispatch = self
                            .dispatcher
                            .dispatch_and_record(self.ledger.as_ref(), &settled)
                            .await;
                        Ok(VerifyAndSettleResult {
                            confirmed: true,
                            payment_status: settled.status,
                            payment: settled,
                            dispatch,
                        })
                    }
                    TransitionOutcome::Stale { current } => {
                        tracing::debug!(
                            reference = %current.reference,
                            status = %current.status,
                            "Settlement race lost"
                        );
                        Ok(VerifyAndSettleResult::without_dispatch(current))
                    }
                }
            }

            // 5. Failure: CAS PENDING -> FAILED
            ProviderStatus::Failed => {
                let reason = if charge.gateway_response.is_empty() {
                    "Payment failed at provider".to_string()
                } else {
                    charge.gateway_response
                };
                let outcome = self
                    .ledger
                    .apply_transition(&payment.id, &PaymentTransition::fail(reason))
                    .await?;
                if outcome.was_applied() {
                    tracing::info!(reference = %payment.reference, "Payment failed at provider");
                }
                Ok(VerifyAndSettleResult::without_dispatch(outcome.into_inner()))
            }

            // 6. Still in progress at the provider
            ProviderStatus::Pending => {
                tracing::debug!(reference = %payment.reference, "Provider still processing");
                Ok(VerifyAndSettleResult::without_dispatch(payment))
            }
        }
    }
}
