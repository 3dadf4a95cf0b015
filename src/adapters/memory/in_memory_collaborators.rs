//! In-memory enrollment, application and user stores.
//!
//! Each keeps a write counter so tests can assert a side effect ran exactly
//! once rather than merely that the end state looks right.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::domain::foundation::{CourseId, DomainError, ErrorCode, UserId};
use crate::ports::{ApplicationStore, EnrollmentRecord, EnrollmentStore, UserDirectory};

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>, DomainError> {
    mutex
        .lock()
        .map_err(|_| DomainError::new(ErrorCode::InternalError, format!("{} lock poisoned", what)))
}

type Pair = (UserId, CourseId);

/// In-memory enrollment table keyed by (user, course).
#[derive(Default)]
pub struct InMemoryEnrollmentStore {
    enrollments: Mutex<HashMap<Pair, String>>,
    created: AtomicUsize,
    fail_writes: Mutex<Option<String>>,
}

impl InMemoryEnrollmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of enrollment rows actually created.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn is_enrolled(&self, user_id: &UserId, course_id: &CourseId) -> bool {
        self.enrollments
            .lock()
            .map(|e| e.contains_key(&(user_id.clone(), course_id.clone())))
            .unwrap_or(false)
    }

    /// Make subsequent writes fail until cleared with `None`.
    pub fn set_failure(&self, message: Option<&str>) {
        if let Ok(mut slot) = self.fail_writes.lock() {
            *slot = message.map(str::to_string);
        }
    }
}

#[async_trait]
impl EnrollmentStore for InMemoryEnrollmentStore {
    async fn create_if_absent(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<EnrollmentRecord, DomainError> {
        if let Some(message) = lock(&self.fail_writes, "Enrollment failure")?.clone() {
            return Err(DomainError::database(message));
        }

        let mut enrollments = lock(&self.enrollments, "Enrollment store")?;
        let key = (user_id.clone(), course_id.clone());
        if let Some(existing) = enrollments.get(&key) {
            return Ok(EnrollmentRecord {
                enrollment_id: existing.clone(),
                created: false,
            });
        }

        let enrollment_id = Uuid::new_v4().to_string();
        enrollments.insert(key, enrollment_id.clone());
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(EnrollmentRecord {
            enrollment_id,
            created: true,
        })
    }
}

/// In-memory application table; seeded with the applications that exist.
#[derive(Default)]
pub struct InMemoryApplicationStore {
    applications: Mutex<HashMap<Pair, bool>>,
    marked: AtomicUsize,
}

impl InMemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an unpaid application.
    pub fn add_application(&self, user_id: &UserId, course_id: &CourseId) {
        if let Ok(mut applications) = self.applications.lock() {
            applications.insert((user_id.clone(), course_id.clone()), false);
        }
    }

    pub fn is_paid(&self, user_id: &UserId, course_id: &CourseId) -> bool {
        self.applications
            .lock()
            .ok()
            .and_then(|a| a.get(&(user_id.clone(), course_id.clone())).copied())
            .unwrap_or(false)
    }

    /// Number of `mark_paid` calls that found an application.
    pub fn marked_count(&self) -> usize {
        self.marked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApplicationStore for InMemoryApplicationStore {
    async fn mark_paid(&self, user_id: &UserId, course_id: &CourseId) -> Result<bool, DomainError> {
        let mut applications = lock(&self.applications, "Application store")?;
        match applications.get_mut(&(user_id.clone(), course_id.clone())) {
            Some(paid) => {
                *paid = true;
                self.marked.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// In-memory user directory.
#[derive(Default)]
pub struct InMemoryUserDirectory {
    emails: Mutex<HashMap<UserId, String>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user_id: &UserId, email: &str) {
        if let Ok(mut emails) = self.emails.lock() {
            emails.insert(user_id.clone(), email.to_string());
        }
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_email(&self, user_id: &UserId) -> Result<Option<String>, DomainError> {
        Ok(lock(&self.emails, "User directory")?.get(user_id).cloned())
    }
}
