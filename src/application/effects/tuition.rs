use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::payment::Payment;
use crate::ports::EnrollmentStore;

use super::{DispatchError, EffectOutcome, SettlementEffect};

/// TUITION: enroll the payer in the course.
pub struct TuitionEffect {
    enrollments: Arc<dyn EnrollmentStore>,
}

impl TuitionEffect {
    pub fn new(enrollments: Arc<dyn EnrollmentStore>) -> Self {
        Self { enrollments }
    }
}

#[async_trait]
impl SettlementEffect for TuitionEffect {
    async fn apply(&self, payment: &Payment) -> Result<EffectOutcome, DispatchError> {
        let course_id = payment
            .course_id
            .as_ref()
            .ok_or_else(|| DispatchError::MissingCourse(payment.reference.clone()))?;

        let record = self
            .enrollments
            .create_if_absent(&payment.user_id, course_id)
            .await?;

        Ok(EffectOutcome::Enrolled {
            enrollment_id: record.enrollment_id,
            created: record.created,
        })
    }
}
