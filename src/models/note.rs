use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Hour of the local day at which note reminders fire.
pub const REMINDER_HOUR: u32 = 7;

/// Prefix of every calendar reminder trigger id.
pub const TRIGGER_PREFIX: &str = "calendar";

/// Supported calendar years. Four-digit years keep stored fire times sortable.
pub const MIN_YEAR: i32 = 1;
pub const MAX_YEAR: i32 = 9999;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateKeyError {
    #[error("malformed date key '{0}', expected YYYY-M-D")]
    Malformed(String),

    #[error("'{0}' is not a calendar date")]
    InvalidDate(String),

    #[error("year of '{0}' is outside 1..=9999")]
    OutOfRange(String),
}

/// Identifier of a calendar day, rendered as `"YYYY-M-D"` without padding.
///
/// Parsing accepts zero-padded components and canonicalizes them, so
/// `"2025-06-05"` and `"2025-6-5"` name the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateKey(NaiveDate);

impl DateKey {
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Result<Self, DateKeyError> {
        let raw = || format!("{}-{}-{}", year, month, day);
        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(DateKeyError::OutOfRange(raw()));
        }
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Self)
            .ok_or_else(|| DateKeyError::InvalidDate(raw()))
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// 07:00 local time on this day.
    pub fn reminder_time(&self) -> NaiveDateTime {
        let time =
            NaiveTime::from_hms_opt(REMINDER_HOUR, 0, 0).expect("reminder hour is a valid time");
        self.0.and_time(time)
    }

    /// Id of the reminder trigger for this day, e.g. `calendar-2025-6-15`.
    pub fn trigger_id(&self) -> String {
        format!("{}-{}", TRIGGER_PREFIX, self)
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.0.year(), self.0.month(), self.0.day())
    }
}

impl FromStr for DateKey {
    type Err = DateKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || DateKeyError::Malformed(s.to_string());

        let mut parts = s.trim().split('-');
        let (Some(year), Some(month), Some(day), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed());
        };

        let all_digits = |p: &str| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());
        if !(all_digits(year) && all_digits(month) && all_digits(day)) {
            return Err(malformed());
        }

        let year: i32 = year.parse().map_err(|_| malformed())?;
        let month: u32 = month.parse().map_err(|_| malformed())?;
        let day: u32 = day.parse().map_err(|_| malformed())?;

        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(DateKeyError::OutOfRange(s.to_string()));
        }
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Self)
            .ok_or_else(|| DateKeyError::InvalidDate(s.to_string()))
    }
}

impl From<NaiveDate> for DateKey {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl Serialize for DateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DateKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// The persisted value stored under a [`DateKey`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredNote {
    pub note: String,
    pub has_notification: bool,
}

/// A note attached to a calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteRecord {
    pub date_key: DateKey,
    pub note: String,
    /// Whether a 07:00 reminder trigger is registered for the day.
    pub has_notification: bool,
}

impl NoteRecord {
    pub fn new(date_key: DateKey, stored: &StoredNote) -> Self {
        Self {
            date_key,
            note: stored.note.clone(),
            has_notification: stored.has_notification,
        }
    }
}

/// Input for saving the note of a day. Blank `note` text deletes the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertNoteInput {
    pub note: String,
    #[serde(default)]
    pub has_notification: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> DateKey {
        s.parse().unwrap()
    }

    #[test]
    fn renders_without_zero_padding() {
        let k = DateKey::from_ymd(2025, 6, 5).unwrap();
        assert_eq!(k.to_string(), "2025-6-5");
    }

    #[test]
    fn parses_padded_input_into_canonical_form() {
        assert_eq!(key("2025-06-05"), key("2025-6-5"));
        assert_eq!(key("2025-06-05").to_string(), "2025-6-5");
    }

    #[test]
    fn rejects_malformed_keys() {
        for raw in ["", "2025", "2025-6", "2025-6-5-1", "2025-x-5", "2025--5", "+2025-6-5"] {
            assert!(
                matches!(raw.parse::<DateKey>(), Err(DateKeyError::Malformed(_))),
                "{raw} should be malformed"
            );
        }
    }

    #[test]
    fn rejects_impossible_dates() {
        assert!(matches!(
            "2025-2-29".parse::<DateKey>(),
            Err(DateKeyError::InvalidDate(_))
        ));
        assert!(matches!(
            "2025-13-1".parse::<DateKey>(),
            Err(DateKeyError::InvalidDate(_))
        ));
        assert!("2024-2-29".parse::<DateKey>().is_ok());
    }

    #[test]
    fn rejects_years_beyond_four_digits() {
        assert!(matches!(
            "10000-1-1".parse::<DateKey>(),
            Err(DateKeyError::OutOfRange(_))
        ));
        assert!(matches!(
            "0-1-1".parse::<DateKey>(),
            Err(DateKeyError::OutOfRange(_))
        ));
        assert!(matches!(
            DateKey::from_ymd(262142, 12, 31),
            Err(DateKeyError::OutOfRange(_))
        ));
        assert_eq!(key("9999-12-31").to_string(), "9999-12-31");
        assert_eq!(key("1-1-1").to_string(), "1-1-1");
    }

    #[test]
    fn reminder_fires_at_seven_local() {
        let k = key("2025-6-15");
        assert_eq!(
            k.reminder_time(),
            NaiveDate::from_ymd_opt(2025, 6, 15)
                .unwrap()
                .and_hms_opt(7, 0, 0)
                .unwrap()
        );
        assert_eq!(k.trigger_id(), "calendar-2025-6-15");
    }

    #[test]
    fn serializes_as_map_key() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(
            key("2025-6-15"),
            StoredNote {
                note: "Buy milk".to_string(),
                has_notification: true,
            },
        );
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(
            json,
            r#"{"2025-6-15":{"note":"Buy milk","hasNotification":true}}"#
        );

        let back: std::collections::BTreeMap<DateKey, StoredNote> =
            serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn keys_order_by_date_not_text() {
        assert!(key("2025-2-1") < key("2025-10-1"));
    }
}
