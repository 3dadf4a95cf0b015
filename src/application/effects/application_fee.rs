use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::payment::Payment;
use crate::ports::ApplicationStore;

use super::{DispatchError, EffectOutcome, SettlementEffect};

/// APPLICATION_FEE: mark the payer's application for the course as paid.
///
/// A missing application is a data-consistency warning, not a failure.
pub struct ApplicationFeeEffect {
    applications: Arc<dyn ApplicationStore>,
}

impl ApplicationFeeEffect {
    pub fn new(applications: Arc<dyn ApplicationStore>) -> Self {
        Self { applications }
    }
}

#[async_trait]
impl SettlementEffect for ApplicationFeeEffect {
    async fn apply(&self, payment: &Payment) -> Result<EffectOutcome, DispatchError> {
        let Some(course_id) = payment.course_id.as_ref() else {
            return Ok(EffectOutcome::ApplicationMissing);
        };

        if self.applications.mark_paid(&payment.user_id, course_id).await? {
            Ok(EffectOutcome::ApplicationMarkedPaid)
        } else {
            Ok(EffectOutcome::ApplicationMissing)
        }
    }
}
