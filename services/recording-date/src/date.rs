//!
//! src/date.rs  Andrew Belles  Oct 19th, 2026
//!
//! Partial release dates as MusicBrainz reports them ("1977", "1977-06",
//! "1977-06-01") and the fold used to keep the oldest one
//!

use serde::{Deserialize, Serialize};

/// A date known to year, year+month or full precision. A month is only
/// ever set alongside a year, a day only alongside a month.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialDate {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>
}

impl PartialDate {
    pub fn year(year: i32) -> Self {
        Self { year: Some(year), month: None, day: None }
    }

    pub fn year_month(year: i32, month: u32) -> Self {
        Self { year: Some(year), month: Some(month), day: None }
    }

    pub fn ymd(year: i32, month: u32, day: u32) -> Self {
        Self { year: Some(year), month: Some(month), day: Some(day) }
    }

    /// No year means nothing is known about the date
    pub fn is_unknown(&self) -> bool {
        self.year.is_none()
    }

    /// Splits on '-' and reads year, month, day in order. The first
    /// component that is missing, non-numeric or out of range ends the
    /// parse; whatever prefix was read is kept.
    pub fn parse(date_str: &str) -> Self {
        let mut date = Self::default();
        let mut parts = date_str.split('-');

        let Some(year) = parts.next().and_then(|p| p.trim().parse::<i32>().ok())
            .filter(|y| *y >= 0) else {
            return date;
        };
        date.year = Some(year);

        let Some(month) = parts.next().and_then(|p| p.trim().parse::<u32>().ok())
            .filter(|m| (1..=12).contains(m)) else {
            return date;
        };
        date.month = Some(month);

        if let Some(day) = parts.next().and_then(|p| p.trim().parse::<u32>().ok())
            .filter(|d| (1..=31).contains(d)) {
            date.day = Some(day);
        }
        date
    }

    /// Folds `candidate` into `self` (the running oldest) and returns the
    /// winner. An unknown running date always loses. On equal years the
    /// candidate only wins with a strictly earlier month when both carry
    /// one; days are never compared.
    pub fn older(self, candidate: PartialDate) -> PartialDate {
        let Some(current_year) = self.year else {
            return candidate;
        };
        let Some(candidate_year) = candidate.year else {
            return self;
        };

        if current_year != candidate_year {
            return if candidate_year < current_year { candidate } else { self };
        }

        match (self.month, candidate.month) {
            (Some(current), Some(other)) if current > other => candidate,
            _ => self
        }
    }
}

impl std::fmt::Display for PartialDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.year, self.month, self.day) {
            (Some(y), Some(m), Some(d)) => write!(f, "{y:04}-{m:02}-{d:02}"),
            (Some(y), Some(m), None)    => write!(f, "{y:04}-{m:02}"),
            (Some(y), _, _)             => write!(f, "{y:04}"),
            (None, _, _)                => write!(f, "unknown")
        }
    }
}

/// Free-function form of [`PartialDate::parse`]
pub fn parse_date(date_str: &str) -> PartialDate {
    PartialDate::parse(date_str)
}

/// Free-function form of [`PartialDate::older`]
pub fn older(current: PartialDate, candidate: PartialDate) -> PartialDate {
    current.older(candidate)
}
