//! Timestamp value object for immutable points in time.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Unix seconds of 9999-12-31T23:59:59Z, the boundary of windows that never reset.
const LIFETIME_SENTINEL_SECS: i64 = 253_402_300_799;

/// Immutable point in time, always UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a timestamp for the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a timestamp from a DateTime<Utc>.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the inner DateTime.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// The far-future boundary used by windows that never reset.
    pub fn lifetime_sentinel() -> Self {
        let dt = Utc
            .timestamp_opt(LIFETIME_SENTINEL_SECS, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self(dt)
    }

    /// Returns true if this is the lifetime sentinel boundary.
    pub fn is_lifetime_sentinel(&self) -> bool {
        self.0.timestamp() >= LIFETIME_SENTINEL_SECS
    }

    /// Checks if this timestamp is before another.
    pub fn is_before(&self, other: &Timestamp) -> bool {
        self.0 < other.0
    }

    /// Checks if this timestamp is after another.
    pub fn is_after(&self, other: &Timestamp) -> bool {
        self.0 > other.0
    }

    /// Returns the duration from another timestamp to this one.
    ///
    /// Returns negative duration if other is after self.
    pub fn duration_since(&self, other: &Timestamp) -> Duration {
        self.0.signed_duration_since(other.0)
    }

    /// Returns the first instant of the next UTC calendar day.
    ///
    /// A timestamp exactly at midnight rolls to the following midnight.
    pub fn next_utc_midnight(&self) -> Self {
        let next_day = self.0.date_naive() + Duration::days(1);
        Self(next_day.and_time(NaiveTime::MIN).and_utc())
    }

    /// Formats the UTC calendar date as `YYYY-MM-DD`.
    pub fn utc_date_string(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }

    /// Formats as RFC3339 with a `Z` suffix and whole seconds.
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    }

    /// Creates a new timestamp by subtracting the specified number of days.
    pub fn minus_days(&self, days: i64) -> Self {
        Self(self.0 - Duration::days(days))
    }

    /// Creates a new timestamp by subtracting the specified number of hours.
    pub fn minus_hours(&self, hours: i64) -> Self {
        Self(self.0 - Duration::hours(hours))
    }

    /// Creates a new timestamp by adding the specified number of seconds.
    pub fn plus_secs(&self, secs: i64) -> Self {
        Self(self.0 + Duration::seconds(secs))
    }

    /// Returns the timestamp as Unix seconds.
    pub fn as_unix_secs(&self) -> i64 {
        self.0.timestamp()
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_rfc3339())
    }
}
