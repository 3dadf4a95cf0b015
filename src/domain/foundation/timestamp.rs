//! UTC instants for ledger columns (`paid_at`, `due_date`, `completed_at`, ...).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    pub fn is_before(&self, other: &Timestamp) -> bool {
        self < other
    }

    /// Installment due dates step by whole days; negative values go back.
    pub fn add_days(&self, days: i64) -> Self {
        Self(self.0 + Duration::days(days))
    }

    /// Cutoff for "older than N seconds" sweeps.
    pub fn minus_secs(&self, secs: i64) -> Self {
        Self(self.0 - Duration::seconds(secs))
    }

    /// Gateway and API timestamps are RFC 3339 with any offset.
    pub fn parse_rfc3339(value: &str) -> Option<Self> {
        DateTime::parse_from_rfc3339(value)
            .ok()
            .map(|dt| Self(dt.with_timezone(&Utc)))
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn due_dates_step_by_days() {
        let first = Timestamp::parse_rfc3339("2024-09-01T09:00:00Z").unwrap();
        let second = first.add_days(30);

        assert!(first.is_before(&second));
        assert_eq!(second, Timestamp::parse_rfc3339("2024-10-01T09:00:00Z").unwrap());
        assert_eq!(second.add_days(-30), first);
    }

    #[test]
    fn sweep_cutoff_lies_in_the_past() {
        let now = Timestamp::now();
        assert!(now.minus_secs(15 * 60).is_before(&now));
    }

    #[test]
    fn offsets_are_normalised_to_utc() {
        let lagos = Timestamp::parse_rfc3339("2024-01-15T11:30:00+01:00").unwrap();
        assert_eq!(lagos.as_datetime().hour(), 10);
        assert!(Timestamp::parse_rfc3339("yesterday").is_none());
    }

    #[test]
    fn serializes_as_a_bare_string() {
        let ts = Timestamp::parse_rfc3339("2024-01-15T10:30:00Z").unwrap();
        let json = serde_json::to_string(&ts).unwrap();
        assert!(json.starts_with("\"2024-01-15T10:30:00"));
    }
}
