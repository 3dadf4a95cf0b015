//! ChargeInstallmentHandler - Starts (or resumes) checkout for one installment.

use std::sync::Arc;

use crate::domain::foundation::{PaymentId, UserId};
use crate::domain::payment::{
    Payment, PaymentReference, PaymentStatus, PaymentType, SettlementError,
};
use crate::ports::{PaymentGateway, PaymentLedger, UserDirectory};

use super::{authorize_charge, CheckoutSettings, InitializePaymentResult};

#[derive(Debug, Clone)]
pub struct ChargeInstallmentCommand {
    pub payment_id: PaymentId,

    /// The caller; must own the installment.
    pub user_id: UserId,
}

#[derive(Debug, Clone)]
pub struct ChargeInstallmentResult {
    pub payment: Payment,
    pub authorization_url: String,
    pub access_code: String,

    /// True when the stored checkout was re-served without a gateway call.
    pub reused_checkout: bool,

    /// The FAILED slice this charge replaces, if any.
    pub replaces: Option<PaymentReference>,
}

/// Handler for charging installment slices.
///
/// - PENDING with a stored checkout: the stored URL is returned as is
/// - PENDING without one: the gateway is asked for a checkout
/// - FAILED: the slice's replacement is charged, created on first use with a
///   fresh reference; later calls get the same replacement back
pub struct ChargeInstallmentHandler {
    ledger: Arc<dyn PaymentLedger>,
    gateway: Arc<dyn PaymentGateway>,
    users: Arc<dyn UserDirectory>,
    settings: CheckoutSettings,
}

impl ChargeInstallmentHandler {
    pub fn new(
        ledger: Arc<dyn PaymentLedger>,
        gateway: Arc<dyn PaymentGateway>,
        users: Arc<dyn UserDirectory>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            ledger,
            gateway,
            users,
            settings,
        }
    }

    pub async fn handle(
        &self,
        cmd: ChargeInstallmentCommand,
    ) -> Result<ChargeInstallmentResult, SettlementError> {
        // 1. Load and check ownership
        let slice = self
            .ledger
            .find_by_id(&cmd.payment_id)
            .await?
            .ok_or_else(|| SettlementError::PaymentNotFound(cmd.payment_id.to_string()))?;

        if slice.user_id != cmd.user_id {
            return Err(SettlementError::Forbidden(
                "Installment belongs to another user".to_string(),
            ));
        }
        if slice.payment_type != PaymentType::Installment {
            return Err(SettlementError::validation(
                "payment_id",
                format!("{} is not an installment payment", slice.reference),
            ));
        }

        // 2. Follow FAILED slices to the payment that replaces them
        let mut target = slice;
        let mut replaces = None;
        while target.status == PaymentStatus::Failed {
            let next = self.replacement_for(&target).await?;
            replaces = Some(target.reference);
            target = next;
        }
        if target.status != PaymentStatus::Pending {
            return Err(SettlementError::invalid_state(
                target.status.as_str(),
                "charge installment",
            ));
        }

        // 3. Re-serve a stored checkout
        if let (Some(url), Some(code)) = (&target.authorization_url, &target.access_code) {
            return Ok(ChargeInstallmentResult {
                authorization_url: url.clone(),
                access_code: code.clone(),
                payment: target,
                reused_checkout: true,
                replaces,
            });
        }

        // 4. Otherwise initialize at the gateway
        let email = self
            .users
            .find_email(&cmd.user_id)
            .await?
            .ok_or_else(|| SettlementError::UserNotFound(cmd.user_id.clone()))?;

        let InitializePaymentResult {
            payment,
            authorization_url,
            access_code,
        } = authorize_charge(
            self.gateway.as_ref(),
            self.ledger.as_ref(),
            &target,
            &email,
            &self.settings,
        )
        .await?;

        tracing::info!(
            reference = %payment.reference,
            replaces = ?replaces.as_ref().map(|r| r.as_str()),
            "Installment checkout initialized"
        );

        Ok(ChargeInstallmentResult {
            payment,
            authorization_url,
            access_code,
            reused_checkout: false,
            replaces,
        })
    }

    async fn replacement_for(&self, failed: &Payment) -> Result<Payment, SettlementError> {
        if let Some(existing) = self.ledger.find_replacement(&failed.id).await? {
            return Ok(existing);
        }
        let candidate = Payment::replacing(
            failed,
            PaymentReference::generate(&self.settings.reference_prefix),
        )?;
        Ok(self.ledger.insert_replacement(&candidate).await?)
    }
}
