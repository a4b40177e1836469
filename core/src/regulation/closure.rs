//! Area and seasonal closures. A closure never touches quota: it only
//! decides whether a fisher may fish where it is, and otherwise defers
//! everything to the regulation it wraps.

use super::Regulation;
use crate::{
    clock::Calendar,
    error::{SimError, SimResult},
    types::Tick,
};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// A cell of the fishing grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridCell {
    pub x: i32,
    pub y: i32,
}

impl GridCell {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Rectangle of closed cells, bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedArea {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl ClosedArea {
    pub fn contains(&self, cell: GridCell) -> bool {
        (self.min_x..=self.max_x).contains(&cell.x) && (self.min_y..=self.max_y).contains(&cell.y)
    }
}

/// Yearly window between two month/day dates, both inclusive.
/// A window whose end precedes its start wraps over new year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureWindow {
    pub start_month: u32,
    pub start_day:   u32,
    pub end_month:   u32,
    pub end_day:     u32,
}

impl ClosureWindow {
    pub fn validate(&self) -> SimResult<()> {
        // 2000 is a leap year, so 29 February is accepted.
        for (month, day) in [(self.start_month, self.start_day), (self.end_month, self.end_day)] {
            if NaiveDate::from_ymd_opt(2000, month, day).is_none() {
                return Err(SimError::InvalidConfig(format!(
                    "closure window date {month:02}-{day:02} does not exist"
                )));
            }
        }
        Ok(())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        let today = (date.month(), date.day());
        let start = (self.start_month, self.start_day);
        let end = (self.end_month, self.end_day);
        if start <= end {
            start <= today && today <= end
        } else {
            today >= start || today <= end
        }
    }
}

pub struct AreaClosure {
    inner:    Box<Regulation>,
    areas:    Vec<ClosedArea>,
    window:   Option<ClosureWindow>,
    calendar: Calendar,
}

impl AreaClosure {
    /// An empty `areas` list closes the whole grid; no `window` means
    /// closed all year.
    pub fn new(
        inner:    Regulation,
        areas:    Vec<ClosedArea>,
        window:   Option<ClosureWindow>,
        calendar: Calendar,
    ) -> SimResult<Self> {
        if let Some(window) = &window {
            window.validate()?;
        }
        Ok(Self { inner: Box::new(inner), areas, window, calendar })
    }

    pub fn inner(&self) -> &Regulation {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut Regulation {
        &mut self.inner
    }

    /// Is `location` closed at `now`?
    pub fn closes(&self, location: GridCell, now: Tick) -> bool {
        let in_season = self
            .window
            .map_or(true, |w| w.contains(self.calendar.date(now)));
        let in_area = self.areas.is_empty() || self.areas.iter().any(|a| a.contains(location));
        in_season && in_area
    }
}
