//! Ports onto tables owned by other parts of the platform.
//!
//! The settlement engine writes enrollments and application status as side
//! effects, and reads payer emails. Each operation is idempotent.

use crate::domain::foundation::{CourseId, DomainError, UserId};
use async_trait::async_trait;

/// Enrollment returned by [`EnrollmentStore::create_if_absent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentRecord {
    pub enrollment_id: String,

    /// False when the enrollment already existed.
    pub created: bool,
}

/// Creates course enrollments.
#[async_trait]
pub trait EnrollmentStore: Send + Sync {
    /// Create an ACTIVE enrollment for the pair, or return the existing one.
    async fn create_if_absent(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<EnrollmentRecord, DomainError>;
}

/// Updates course applications.
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// Mark the user's application for the course as paid.
    ///
    /// Returns false when no matching application exists.
    async fn mark_paid(&self, user_id: &UserId, course_id: &CourseId) -> Result<bool, DomainError>;
}

/// Looks up payer contact details.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_email(&self, user_id: &UserId) -> Result<Option<String>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collaborator_ports_are_object_safe() {
        fn _enrollments(_store: &dyn EnrollmentStore) {}
        fn _applications(_store: &dyn ApplicationStore) {}
        fn _users(_directory: &dyn UserDirectory) {}
    }
}
