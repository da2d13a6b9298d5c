//! Weekly recurring race slots.
//!
//! A [`Schedule`] holds one list of [`Slot`]s per weekday. Each slot is a
//! local time in its own timezone, so the absolute instant of a slot is
//! computed per calendar date and follows that zone's DST rules.

pub mod slot;

use chrono::{DateTime, Datelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::errors::LadderError;

pub use slot::Slot;

pub const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Seven slot lists indexed by weekday, Monday first. A day without slots
/// is an empty list, never absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WeeklySlots", into = "WeeklySlots")]
pub struct Schedule {
    days: [Vec<Slot>; 7],
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_day(&self, day: Weekday) -> &[Slot] {
        &self.days[day.num_days_from_monday() as usize]
    }

    pub fn set_day(&mut self, day: Weekday, slots: Vec<Slot>) {
        self.days[day.num_days_from_monday() as usize] = slots;
    }

    /// Replaces every weekday with a copy of `slots`.
    pub fn set_all(&mut self, slots: &[Slot]) {
        self.days = std::array::from_fn(|_| slots.to_vec());
    }

    pub fn is_empty(&self) -> bool {
        self.days.iter().all(Vec::is_empty)
    }

    /// Earliest slot instant in `[from, to)`.
    ///
    /// Callers pick a window of at least a week; a window with no slot in it
    /// yields [`LadderError::NoOccurrence`].
    pub fn next_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, LadderError> {
        let mut next: Option<DateTime<Utc>> = None;

        for day in WEEKDAYS {
            for slot in self.for_day(day) {
                for instant in occurrences_on_weekday(slot, day, from, to) {
                    if next.is_none_or(|best| instant < best) {
                        next = Some(instant);
                    }
                }
            }
        }

        next.ok_or(LadderError::NoOccurrence { from, to })
    }
}

/// Instants of `slot` in `[from, to)` that fall on `day` in the slot's zone.
fn occurrences_on_weekday(
    slot: &Slot,
    day: Weekday,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    // One extra day each side: the slot zone's calendar can lag or lead UTC.
    let (Some(first), Some(last)) = (
        from.with_timezone(&slot.tz).date_naive().pred_opt(),
        to.with_timezone(&slot.tz).date_naive().succ_opt(),
    ) else {
        return Vec::new();
    };

    first
        .iter_days()
        .take_while(|date| *date <= last)
        .filter(|date| date.weekday() == day)
        .filter_map(|date| slot.resolve_on(date))
        .filter(|instant| *instant >= from && *instant < to)
        .collect()
}

#[derive(Default, Serialize, Deserialize)]
struct WeeklySlots {
    #[serde(default)]
    mon: Vec<Slot>,
    #[serde(default)]
    tue: Vec<Slot>,
    #[serde(default)]
    wed: Vec<Slot>,
    #[serde(default)]
    thu: Vec<Slot>,
    #[serde(default)]
    fri: Vec<Slot>,
    #[serde(default)]
    sat: Vec<Slot>,
    #[serde(default)]
    sun: Vec<Slot>,
}

impl From<WeeklySlots> for Schedule {
    fn from(w: WeeklySlots) -> Self {
        Self {
            days: [w.mon, w.tue, w.wed, w.thu, w.fri, w.sat, w.sun],
        }
    }
}

impl From<Schedule> for WeeklySlots {
    fn from(s: Schedule) -> Self {
        let [mon, tue, wed, thu, fri, sat, sun] = s.days;
        Self {
            mon,
            tue,
            wed,
            thu,
            fri,
            sat,
            sun,
        }
    }
}
