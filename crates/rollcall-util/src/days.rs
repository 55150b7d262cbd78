//! Day sets used by recurrence patterns
//!
//! Both sets serialize as a sorted list of numbers so they read naturally in
//! JSON and TOML: weekdays are `0..=6` with `0 = Sunday`, month days are
//! `1..=31`.

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error building a day set from raw numbers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DaySetError {
    #[error("Weekday index {0} out of range (expected 0-6, 0 = Sunday)")]
    WeekdayOutOfRange(u8),

    #[error("Day of month {0} out of range (expected 1-31)")]
    MonthDayOutOfRange(u8),
}

/// Set of weekdays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct DaysOfWeek(u8);

impl DaysOfWeek {
    pub const SUNDAY: u8 = 1 << 0;
    pub const MONDAY: u8 = 1 << 1;
    pub const TUESDAY: u8 = 1 << 2;
    pub const WEDNESDAY: u8 = 1 << 3;
    pub const THURSDAY: u8 = 1 << 4;
    pub const FRIDAY: u8 = 1 << 5;
    pub const SATURDAY: u8 = 1 << 6;

    pub const WEEKDAYS: DaysOfWeek = DaysOfWeek(
        Self::MONDAY | Self::TUESDAY | Self::WEDNESDAY | Self::THURSDAY | Self::FRIDAY,
    );
    pub const NONE: DaysOfWeek = DaysOfWeek(0);

    pub fn new(mask: u8) -> Self {
        Self(mask & 0x7F)
    }

    /// Build from `0 = Sunday` indices
    pub fn from_indices(indices: &[u8]) -> Result<Self, DaySetError> {
        let mut mask = 0u8;
        for &i in indices {
            if i > 6 {
                return Err(DaySetError::WeekdayOutOfRange(i));
            }
            mask |= 1 << i;
        }
        Ok(Self(mask))
    }

    pub fn contains(&self, weekday: Weekday) -> bool {
        (self.0 & (1 << weekday.num_days_from_sunday())) != 0
    }

    pub fn indices(&self) -> Vec<u8> {
        (0..7).filter(|i| self.0 & (1 << i) != 0).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl TryFrom<Vec<u8>> for DaysOfWeek {
    type Error = DaySetError;

    fn try_from(indices: Vec<u8>) -> Result<Self, Self::Error> {
        Self::from_indices(&indices)
    }
}

impl From<DaysOfWeek> for Vec<u8> {
    fn from(days: DaysOfWeek) -> Self {
        days.indices()
    }
}

impl std::ops::BitOr for DaysOfWeek {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Set of calendar days within a month (1-31)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct DaysOfMonth(u32);

impl DaysOfMonth {
    pub const NONE: DaysOfMonth = DaysOfMonth(0);

    pub fn from_days(days: &[u8]) -> Result<Self, DaySetError> {
        let mut mask = 0u32;
        for &d in days {
            if !(1..=31).contains(&d) {
                return Err(DaySetError::MonthDayOutOfRange(d));
            }
            mask |= 1 << d;
        }
        Ok(Self(mask))
    }

    pub fn contains(&self, day: u32) -> bool {
        (1..=31).contains(&day) && self.0 & (1 << day) != 0
    }

    /// Days in ascending order
    pub fn days(&self) -> Vec<u8> {
        (1..=31u8).filter(|d| self.0 & (1 << d) != 0).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl TryFrom<Vec<u8>> for DaysOfMonth {
    type Error = DaySetError;

    fn try_from(days: Vec<u8>) -> Result<Self, Self::Error> {
        Self::from_days(&days)
    }
}

impl From<DaysOfMonth> for Vec<u8> {
    fn from(days: DaysOfMonth) -> Self {
        days.days()
    }
}
