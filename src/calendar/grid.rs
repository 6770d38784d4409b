use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::lunar::{LunarConverter, LunarDate};
use super::store::NoteIndex;
use crate::models::{DateKey, MAX_YEAR, MIN_YEAR};

/// First year offered by the month/year picker.
pub const PICKER_FIRST_YEAR: i32 = 1970;

/// A displayable month. Years are limited to those a [`DateKey`] accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawYearMonth")]
pub struct YearMonth {
    year: i32,
    month: u32,
}

#[derive(Deserialize)]
struct RawYearMonth {
    year: i32,
    month: u32,
}

impl TryFrom<RawYearMonth> for YearMonth {
    type Error = String;

    fn try_from(raw: RawYearMonth) -> Result<Self, Self::Error> {
        Self::new(raw.year, raw.month)
            .ok_or_else(|| format!("invalid month {}-{}", raw.year, raw.month))
    }
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        ((MIN_YEAR..=MAX_YEAR).contains(&year) && (1..=12).contains(&month))
            .then_some(Self { year, month })
    }

    /// Month of `date`, clamped into the supported year range.
    pub fn of(date: NaiveDate) -> Self {
        if date.year() < MIN_YEAR {
            Self { year: MIN_YEAR, month: 1 }
        } else if date.year() > MAX_YEAR {
            Self { year: MAX_YEAR, month: 12 }
        } else {
            Self {
                year: date.year(),
                month: date.month(),
            }
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).expect("YearMonth holds a valid month")
    }

    pub fn days_in_month(&self) -> u32 {
        match self.month {
            2 if is_leap_year(self.year) => 29,
            2 => 28,
            4 | 6 | 9 | 11 => 30,
            _ => 31,
        }
    }

    /// Move by `months`, crossing year boundaries as needed. `None` when the
    /// result leaves the supported year range.
    pub fn offset(&self, months: i32) -> Option<Self> {
        let index = self.year.checked_mul(12)? + (self.month as i32 - 1);
        let index = index.checked_add(months)?;
        Self::new(index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
    }
}

fn is_leap_year(year: i32) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

/// Lunar date of the selected day, with display names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LunarInfo {
    #[serde(flatten)]
    pub date: LunarDate,
    pub month_in_chinese: String,
    pub day_in_chinese: String,
}

impl From<LunarDate> for LunarInfo {
    fn from(date: LunarDate) -> Self {
        Self {
            month_in_chinese: date.month_in_chinese(),
            day_in_chinese: date.day_in_chinese(),
            date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayCell {
    pub day: u32,
    pub date_key: DateKey,
    pub has_note: bool,
    pub is_selected: bool,
    pub is_today: bool,
    /// Lunar day of month, absent when conversion fails.
    pub lunar_day: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthView {
    pub month: YearMonth,
    /// Blank cells before day 1, i.e. its weekday with Sunday = 0.
    pub leading_blanks: u32,
    pub days: Vec<DayCell>,
    pub selected: DateKey,
    pub selected_lunar: Option<LunarInfo>,
}

/// Derive the grid of `month` as seen on `today` with `selected` highlighted.
pub fn build_month_view(
    month: YearMonth,
    selected: NaiveDate,
    today: NaiveDate,
    notes: &impl NoteIndex,
    lunar: &dyn LunarConverter,
) -> MonthView {
    let first = month.first_day();
    let days = first
        .iter_days()
        .take(month.days_in_month() as usize)
        .map(|date| {
            let date_key = DateKey::from_date(date);
            DayCell {
                day: date.day(),
                has_note: notes.has_note(&date_key),
                is_selected: date == selected,
                is_today: date == today,
                lunar_day: lunar.to_lunar(date).ok().map(|l| l.day),
                date_key,
            }
        })
        .collect();

    MonthView {
        month,
        leading_blanks: first.weekday().num_days_from_sunday(),
        days,
        selected: DateKey::from_date(selected),
        selected_lunar: lunar.to_lunar(selected).ok().map(LunarInfo::from),
    }
}

/// Years offered by the month/year picker, newest first.
pub fn picker_years(today: NaiveDate) -> Vec<i32> {
    (PICKER_FIRST_YEAR..=today.year()).rev().collect()
}

/// Displayed month and selected day of the calendar screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarCursor {
    pub displayed: YearMonth,
    pub selected: NaiveDate,
}

impl CalendarCursor {
    pub fn at(today: NaiveDate) -> Self {
        Self {
            displayed: YearMonth::of(today),
            selected: today,
        }
    }

    /// Move the displayed month; stays put at the edges of the year range.
    pub fn change_month(&mut self, offset: i32) {
        if let Some(month) = self.displayed.offset(offset) {
            self.displayed = month;
        }
    }

    pub fn go_to_today(&mut self, today: NaiveDate) {
        *self = Self::at(today);
    }

    pub fn select(&mut self, date: NaiveDate) {
        self.selected = date;
    }

    pub fn select_month_year(&mut self, month: YearMonth) {
        self.displayed = month;
    }

    pub fn view(
        &self,
        today: NaiveDate,
        notes: &impl NoteIndex,
        lunar: &dyn LunarConverter,
    ) -> MonthView {
        build_month_view(self.displayed, self.selected, today, notes, lunar)
    }
}
