//! InitializePaymentHandler - Command handler for starting a gateway checkout.

use std::sync::Arc;

use serde_json::json;

use crate::domain::foundation::{Amount, CourseId, UserId};
use crate::domain::payment::{
    Payment, PaymentReference, PaymentTransition, PaymentType, SettlementError,
};
use crate::ports::{InitializeChargeRequest, PaymentGateway, PaymentLedger, UserDirectory};

/// Checkout settings shared by every handler that initializes charges.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub currency: String,
    pub reference_prefix: String,
    pub callback_url: Option<String>,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            currency: "NGN".to_string(),
            reference_prefix: "KM".to_string(),
            callback_url: None,
        }
    }
}

/// Command to create a payment and its gateway checkout.
#[derive(Debug, Clone)]
pub struct InitializePaymentCommand {
    pub user_id: UserId,
    pub payment_type: PaymentType,
    pub amount: i64,
    pub course_id: Option<CourseId>,
    pub application_id: Option<String>,

    /// Caller-chosen reference; generated from the configured prefix when absent.
    pub reference: Option<String>,

    pub metadata: Option<serde_json::Value>,
}

/// Result of a successful initialization.
#[derive(Debug, Clone)]
pub struct InitializePaymentResult {
    pub payment: Payment,
    pub authorization_url: String,
    pub access_code: String,
}

/// Handler for creating PENDING payments.
///
/// The payment row is written before the gateway is called so a charge the
/// user completes always has a ledger entry to settle against.
pub struct InitializePaymentHandler {
    ledger: Arc<dyn PaymentLedger>,
    gateway: Arc<dyn PaymentGateway>,
    users: Arc<dyn UserDirectory>,
    settings: CheckoutSettings,
}

impl InitializePaymentHandler {
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
        cmd: InitializePaymentCommand,
    ) -> Result<InitializePaymentResult, SettlementError> {
        // 1. Validate amount and reference
        let amount = Amount::new(cmd.amount)?;
        let reference = match cmd.reference {
            Some(value) => PaymentReference::new(value)?,
            None => PaymentReference::generate(&self.settings.reference_prefix),
        };

        // 2. Resolve payer email
        let email = self
            .users
            .find_email(&cmd.user_id)
            .await?
            .ok_or_else(|| SettlementError::UserNotFound(cmd.user_id.clone()))?;

        // 3. Build the PENDING payment
        let mut metadata = json!({
            "payment_type": cmd.payment_type.as_str(),
            "user_id": cmd.user_id.as_str(),
        });
        if let Some(course_id) = &cmd.course_id {
            metadata["course_id"] = json!(course_id.as_str());
        }
        if let Some(serde_json::Value::Object(extra)) = cmd.metadata {
            for (key, value) in extra {
                metadata[key] = value;
            }
        }

        let mut payment = Payment::pending(
            reference,
            cmd.payment_type,
            amount,
            &self.settings.currency,
            cmd.user_id,
            cmd.course_id,
        )?
        .with_metadata(metadata);
        if let Some(application_id) = cmd.application_id {
            payment = payment.with_application_id(application_id);
        }

        // 4. Persist before any gateway call
        self.ledger.insert(&payment).await?;

        // 5. Create the gateway checkout
        match authorize_charge(
            self.gateway.as_ref(),
            self.ledger.as_ref(),
            &payment,
            &email,
            &self.settings,
        )
        .await
        {
            Ok(result) => {
                tracing::info!(
                    reference = %result.payment.reference,
                    payment_type = %result.payment.payment_type,
                    amount = result.payment.amount.minor_units(),
                    "Payment initialized"
                );
                Ok(result)
            }
            Err(err) => {
                // The payer never received a checkout URL, so nothing can settle.
                let reason = format!("Checkout initialization failed: {}", err);
                self.ledger
                    .apply_transition(&payment.id, &PaymentTransition::fail(reason))
                    .await?;
                tracing::warn!(
                    reference = %payment.reference,
                    error = %err,
                    "Gateway initialize failed"
                );
                Err(err)
            }
        }
    }
}

/// Calls gateway initialize for a PENDING payment and stores the checkout.
pub(crate) async fn authorize_charge(
    gateway: &dyn PaymentGateway,
    ledger: &dyn PaymentLedger,
    payment: &Payment,
    email: &str,
    settings: &CheckoutSettings,
) -> Result<InitializePaymentResult, SettlementError> {
    let charge = gateway
        .initialize(InitializeChargeRequest {
            email: email.to_string(),
            amount: payment.amount.minor_units(),
            currency: payment.currency.clone(),
            reference: payment.reference.as_str().to_string(),
            metadata: payment.metadata.clone(),
            callback_url: settings.callback_url.clone(),
        })
        .await?;

    ledger
        .record_checkout(&payment.id, &charge.authorization_url, &charge.access_code)
        .await?;

    let mut payment = payment.clone();
    payment.authorization_url = Some(charge.authorization_url.clone());
    payment.access_code = Some(charge.access_code.clone());

    Ok(InitializePaymentResult {
        payment,
        authorization_url: charge.authorization_url,
        access_code: charge.access_code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryPaymentLedger, InMemoryUserDirectory};
    use crate::adapters::paystack::MockPaymentGateway;
    use crate::domain::payment::PaymentStatus;
    use crate::ports::GatewayError;

    // ════════════════════════════════════════════════════════════════════════════
    // Test Fixtures
    // ════════════════════════════════════════════════════════════════════════════

    struct Fixture {
        handler: InitializePaymentHandler,
        ledger: Arc<InMemoryPaymentLedger>,
        gateway: MockPaymentGateway,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(InMemoryPaymentLedger::new());
        let gateway = MockPaymentGateway::new();
        let users = Arc::new(InMemoryUserDirectory::new());
        users.add_user(&UserId::new("user-1").unwrap(), "ada@example.com");

        let handler = InitializePaymentHandler::new(
            ledger.clone(),
            Arc::new(gateway.clone()),
            users,
            CheckoutSettings {
                callback_url: Some("https://lms.example.com/payments/callback".into()),
                ..CheckoutSettings::default()
            },
        );
        Fixture {
            handler,
            ledger,
            gateway,
        }
    }

    fn tuition_command() -> InitializePaymentCommand {
        InitializePaymentCommand {
            user_id: UserId::new("user-1").unwrap(),
            payment_type: PaymentType::Tuition,
            amount: 50_000,
            course_id: Some(CourseId::new("course-1").unwrap()),
            application_id: None,
            reference: Some("KM_1".into()),
            metadata: None,
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Success Cases
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn creates_pending_payment_with_checkout() {
        let f = fixture();

        let result = f.handler.handle(tuition_command()).await.unwrap();

        assert_eq!(result.authorization_url, "https://checkout.mock/KM_1");
        let stored = f.ledger.find_by_id(&result.payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Pending);
        assert_eq!(stored.authorization_url.as_deref(), Some("https://checkout.mock/KM_1"));
        assert_eq!(stored.currency, "NGN");
    }

    #[tokio::test]
    async fn sends_email_amount_and_callback_to_gateway() {
        let f = fixture();
        f.handler.handle(tuition_command()).await.unwrap();

        let requests = f.gateway.initialize_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].email, "ada@example.com");
        assert_eq!(requests[0].amount, 50_000);
        assert_eq!(requests[0].metadata["course_id"], "course-1");
        assert_eq!(
            requests[0].callback_url.as_deref(),
            Some("https://lms.example.com/payments/callback")
        );
    }

    #[tokio::test]
    async fn generates_reference_when_absent() {
        let f = fixture();
        let cmd = InitializePaymentCommand {
            reference: None,
            ..tuition_command()
        };

        let result = f.handler.handle(cmd).await.unwrap();
        assert!(result.payment.reference.as_str().starts_with("KM_"));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Error Cases
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn unknown_user_is_rejected_before_insert() {
        let f = fixture();
        let cmd = InitializePaymentCommand {
            user_id: UserId::new("ghost").unwrap(),
            ..tuition_command()
        };

        let err = f.handler.handle(cmd).await.unwrap_err();
        assert!(matches!(err, SettlementError::UserNotFound(_)));
        assert!(f.ledger.is_empty());
    }

    #[tokio::test]
    async fn tuition_without_course_is_invalid() {
        let f = fixture();
        let cmd = InitializePaymentCommand {
            course_id: None,
            ..tuition_command()
        };

        let err = f.handler.handle(cmd).await.unwrap_err();
        assert!(matches!(err, SettlementError::ValidationFailed { .. }));
    }

    #[tokio::test]
    async fn non_positive_amount_is_invalid() {
        let f = fixture();
        let cmd = InitializePaymentCommand {
            amount: 0,
            ..tuition_command()
        };

        assert!(f.handler.handle(cmd).await.is_err());
        assert_eq!(f.gateway.initialize_calls(), 0);
    }

    #[tokio::test]
    async fn duplicate_reference_is_invalid() {
        let f = fixture();
        f.handler.handle(tuition_command()).await.unwrap();

        let err = f.handler.handle(tuition_command()).await.unwrap_err();
        assert!(matches!(err, SettlementError::ValidationFailed { ref field, .. } if field == "reference"));
    }

    #[tokio::test]
    async fn gateway_failure_fails_the_payment() {
        let f = fixture();
        f.gateway
            .set_initialize_error(GatewayError::unavailable("connect timeout"));

        let err = f.handler.handle(tuition_command()).await.unwrap_err();
        assert!(matches!(err, SettlementError::GatewayUnavailable(_)));

        let reference = PaymentReference::new("KM_1").unwrap();
        let stored = f.ledger.find_by_reference(&reference).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Failed);
        assert!(stored.failure_reason.unwrap().contains("connect timeout"));
    }
}
