//! Clock abstraction and local-day arithmetic
//!
//! Schedulers and the history aggregator read time through [`Clock`] so tests
//! can drive them with a [`ManualClock`]. All stored timestamps are UTC; the
//! [`LocalZone`] only decides where "midnight" and "00:01" fall.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{
    DateTime, Duration, FixedOffset, Local, LocalResult, NaiveDate, NaiveDateTime, NaiveTime,
    Offset, TimeZone, Utc,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Source of the current time
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;

    /// Current time in milliseconds since Unix epoch
    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Wall clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and replays
#[derive(Clone, Debug)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Zone used to interpret "local day" boundaries
///
/// Configured as `"local"` (host time zone), `"UTC"`, or a fixed offset such
/// as `"+08:00"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LocalZone {
    #[default]
    System,
    Fixed(FixedOffset),
}

impl LocalZone {
    pub fn utc() -> Self {
        Self::Fixed(Utc.fix())
    }

    /// Local calendar date of `at`
    pub fn date_of(&self, at: DateTime<Utc>) -> NaiveDate {
        match self {
            Self::System => at.with_timezone(&Local).date_naive(),
            Self::Fixed(offset) => at.with_timezone(offset).date_naive(),
        }
    }

    /// UTC instant of a local wall-clock time
    ///
    /// A time skipped by a DST jump resolves to the first valid instant after it;
    /// an ambiguous time resolves to its earlier occurrence.
    pub fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        match self {
            Self::System => resolve(&Local, local),
            Self::Fixed(offset) => resolve(offset, local),
        }
    }

    /// Start of the local day containing `at`, as a UTC instant
    pub fn start_of_day(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        self.to_utc(self.date_of(at).and_time(NaiveTime::MIN))
    }

    /// Next instant strictly after `after` whose local time is `time_of_day`
    pub fn next_daily(&self, after: DateTime<Utc>, time_of_day: NaiveTime) -> DateTime<Utc> {
        let today = self.date_of(after);
        let candidate = self.to_utc(today.and_time(time_of_day));
        if candidate > after {
            return candidate;
        }
        let tomorrow = today.succ_opt().unwrap_or(today);
        self.to_utc(tomorrow.and_time(time_of_day))
    }
}

fn resolve<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            // Inside a DST gap: walk forward until the wall time exists
            let mut candidate = local;
            for _ in 0..(4 * 60) {
                candidate += Duration::minutes(1);
                if let Some(dt) = tz.from_local_datetime(&candidate).earliest() {
                    return dt.with_timezone(&Utc);
                }
            }
            Utc.from_utc_datetime(&local)
        },
    }
}

impl fmt::Display for LocalZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "local"),
            Self::Fixed(offset) => write!(f, "{}", offset),
        }
    }
}

impl FromStr for LocalZone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "local" | "system" => return Ok(Self::System),
            "utc" | "z" => return Ok(Self::utc()),
            _ => {},
        }
        trimmed
            .parse::<FixedOffset>()
            .map(Self::Fixed)
            .map_err(|_| format!("invalid time zone '{}', expected 'local', 'UTC' or '+HH:MM'", s))
    }
}

impl TryFrom<String> for LocalZone {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LocalZone> for String {
    fn from(zone: LocalZone) -> Self {
        zone.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(utc("2024-05-01T00:00:00Z"));
        clock.advance(Duration::minutes(15));
        assert_eq!(clock.now(), utc("2024-05-01T00:15:00Z"));
        clock.set(utc("2024-05-02T00:00:00Z"));
        assert_eq!(clock.now_millis(), utc("2024-05-02T00:00:00Z").timestamp_millis());
    }

    #[test]
    fn test_start_of_day_fixed_offset() {
        let zone: LocalZone = "+08:00".parse().unwrap();
        // 2024-05-01 02:00 local
        let at = utc("2024-04-30T18:00:00Z");
        assert_eq!(zone.start_of_day(at), utc("2024-04-30T16:00:00Z"));
    }

    #[test]
    fn test_next_daily() {
        let zone = LocalZone::utc();
        let at_0001 = NaiveTime::from_hms_opt(0, 1, 0).unwrap();

        assert_eq!(
            zone.next_daily(utc("2024-05-01T00:00:30Z"), at_0001),
            utc("2024-05-01T00:01:00Z")
        );
        // Exactly at the fire time: next day
        assert_eq!(
            zone.next_daily(utc("2024-05-01T00:01:00Z"), at_0001),
            utc("2024-05-02T00:01:00Z")
        );
    }

    #[test]
    fn test_parse_zone() {
        assert_eq!("local".parse::<LocalZone>().unwrap(), LocalZone::System);
        assert_eq!("UTC".parse::<LocalZone>().unwrap(), LocalZone::utc());
        assert!("Mars/Olympus".parse::<LocalZone>().is_err());

        let zone: LocalZone = serde_json::from_str("\"-05:00\"").unwrap();
        assert_eq!(zone.to_string(), "-05:00");
    }
}
