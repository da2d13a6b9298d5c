use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::errors::LadderError;

// Longest DST gap observed in the tz database is well under this.
const MAX_GAP_MINUTES: i64 = 180;

/// A local time of day in a named timezone, written `"HH:MM Area/Location"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slot {
    pub time: NaiveTime,
    pub tz: Tz,
}

impl Slot {
    pub fn new(time: NaiveTime, tz: Tz) -> Self {
        Self { time, tz }
    }

    /// Absolute instant of this slot on the given calendar date of its own
    /// timezone. The offset is looked up for that exact date.
    ///
    /// Ambiguous local times (DST fold) resolve to the earlier instant,
    /// nonexistent ones (DST gap) to the first valid instant after the gap.
    pub fn resolve_on(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        let local = date.and_time(self.time);

        self.tz
            .from_local_datetime(&local)
            .earliest()
            .or_else(|| self.first_after_gap(local))
            .map(|dt| dt.with_timezone(&Utc))
    }

    fn first_after_gap(&self, local: NaiveDateTime) -> Option<DateTime<Tz>> {
        (1..=MAX_GAP_MINUTES)
            .map(|minutes| local + Duration::minutes(minutes))
            .find_map(|candidate| self.tz.from_local_datetime(&candidate).earliest())
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.time.format("%H:%M"), self.tz.name())
    }
}

impl FromStr for Slot {
    type Err = LadderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || LadderError::InvalidSlot(s.to_string());

        let (time, zone) = s.trim().split_once(' ').ok_or_else(invalid)?;
        let time = NaiveTime::parse_from_str(time, "%H:%M").map_err(|_| invalid())?;
        let tz = zone.trim().parse::<Tz>().map_err(|_| invalid())?;

        Ok(Self { time, tz })
    }
}

impl TryFrom<String> for Slot {
    type Error = LadderError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Slot> for String {
    fn from(slot: Slot) -> Self {
        slot.to_string()
    }
}
