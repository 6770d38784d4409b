//! Solar to Chinese lunar date conversion.
//!
//! Uses the classic 1900-2100 month table. Each entry encodes one lunar year:
//!
//! - bits 0-3: leap month number, 0 when the year has none
//! - bits 4-15: month lengths, bit `0x8000 >> (m - 1)` set means month `m`
//!   has 30 days instead of 29
//! - bit 16: the leap month has 30 days instead of 29

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const FIRST_YEAR: i32 = 1900;
const LAST_YEAR: i32 = 2100;

#[rustfmt::skip]
const LUNAR_INFO: [u32; 201] = [
    0x04bd8, 0x04ae0, 0x0a570, 0x054d5, 0x0d260, 0x0d950, 0x16554, 0x056a0, 0x09ad0, 0x055d2, // 1900
    0x04ae0, 0x0a5b6, 0x0a4d0, 0x0d250, 0x1d255, 0x0b540, 0x0d6a0, 0x0ada2, 0x095b0, 0x14977, // 1910
    0x04970, 0x0a4b0, 0x0b4b5, 0x06a50, 0x06d40, 0x1ab54, 0x02b60, 0x09570, 0x052f2, 0x04970, // 1920
    0x06566, 0x0d4a0, 0x0ea50, 0x16a95, 0x05ad0, 0x02b60, 0x186e3, 0x092e0, 0x1c8d7, 0x0c950, // 1930
    0x0d4a0, 0x1d8a6, 0x0b550, 0x056a0, 0x1a5b4, 0x025d0, 0x092d0, 0x0d2b2, 0x0a950, 0x0b557, // 1940
    0x06ca0, 0x0b550, 0x15355, 0x04da0, 0x0a5b0, 0x14573, 0x052b0, 0x0a9a8, 0x0e950, 0x06aa0, // 1950
    0x0aea6, 0x0ab50, 0x04b60, 0x0aae4, 0x0a570, 0x05260, 0x0f263, 0x0d950, 0x05b57, 0x056a0, // 1960
    0x096d0, 0x04dd5, 0x04ad0, 0x0a4d0, 0x0d4d4, 0x0d250, 0x0d558, 0x0b540, 0x0b6a0, 0x195a6, // 1970
    0x095b0, 0x049b0, 0x0a974, 0x0a4b0, 0x0b27a, 0x06a50, 0x06d40, 0x0af46, 0x0ab60, 0x09570, // 1980
    0x04af5, 0x04970, 0x064b0, 0x074a3, 0x0ea50, 0x06b58, 0x05ac0, 0x0ab60, 0x096d5, 0x092e0, // 1990
    0x0c960, 0x0d954, 0x0d4a0, 0x0da50, 0x07552, 0x056a0, 0x0abb7, 0x025d0, 0x092d0, 0x0cab5, // 2000
    0x0a950, 0x0b4a0, 0x0baa4, 0x0ad50, 0x055d9, 0x04ba0, 0x0a5b0, 0x15176, 0x052b0, 0x0a930, // 2010
    0x07954, 0x06aa0, 0x0ad50, 0x05b52, 0x04b60, 0x0a6e6, 0x0a4e0, 0x0d260, 0x0ea65, 0x0d530, // 2020
    0x05aa0, 0x076a3, 0x096d0, 0x04afb, 0x04ad0, 0x0a4d0, 0x1d0b6, 0x0d250, 0x0d520, 0x0dd45, // 2030
    0x0b5a0, 0x056d0, 0x055b2, 0x049b0, 0x0a577, 0x0a4b0, 0x0aa50, 0x1b255, 0x06d20, 0x0ada0, // 2040
    0x14b63, 0x09370, 0x049f8, 0x04970, 0x064b0, 0x168a6, 0x0ea50, 0x06b20, 0x1a6c4, 0x0aae0, // 2050
    0x092e0, 0x0d2e3, 0x0c960, 0x0d557, 0x0d4a0, 0x0da50, 0x05d55, 0x056a0, 0x0a6d0, 0x055d4, // 2060
    0x052d0, 0x0a9b8, 0x0a950, 0x0b4a0, 0x0b6a6, 0x0ad50, 0x055a0, 0x0aba4, 0x0a5b0, 0x052b0, // 2070
    0x0b273, 0x06930, 0x07337, 0x06aa0, 0x0ad50, 0x14b55, 0x04b60, 0x0a570, 0x054e4, 0x0d160, // 2080
    0x0e968, 0x0d520, 0x0daa0, 0x16aa6, 0x056d0, 0x04ae0, 0x0a9d4, 0x0a2d0, 0x0d150, 0x0f252, // 2090
    0x0d520,                                                                                   // 2100
];

const MONTH_NAMES: [&str; 12] = [
    "正", "二", "三", "四", "五", "六", "七", "八", "九", "十", "冬", "腊",
];
const DAY_TENS: [&str; 4] = ["初", "十", "廿", "三"];
const DIGITS: [&str; 10] = ["", "一", "二", "三", "四", "五", "六", "七", "八", "九"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LunarError {
    #[error("{0} is outside the supported range 1900-01-31..=2100-12-31")]
    OutOfRange(NaiveDate),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LunarDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub is_leap_month: bool,
}

impl LunarDate {
    /// Month name such as `正`, `八` or `闰二`.
    pub fn month_in_chinese(&self) -> String {
        let name = MONTH_NAMES[(self.month as usize - 1) % 12];
        if self.is_leap_month {
            format!("闰{}", name)
        } else {
            name.to_string()
        }
    }

    /// Day name such as `初一`, `十五`, `廿九` or `三十`.
    pub fn day_in_chinese(&self) -> String {
        match self.day {
            10 => "初十".to_string(),
            20 => "二十".to_string(),
            30 => "三十".to_string(),
            d => {
                let tens = DAY_TENS[(d / 10) as usize % 4];
                format!("{}{}", tens, DIGITS[(d % 10) as usize])
            }
        }
    }
}

/// Solar to lunar date conversion capability.
pub trait LunarConverter: Send + Sync {
    fn to_lunar(&self, date: NaiveDate) -> Result<LunarDate, LunarError>;
}

/// Table-driven Chinese lunisolar calendar.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChineseLunarCalendar;

impl ChineseLunarCalendar {
    fn info(year: i32) -> u32 {
        LUNAR_INFO[(year - FIRST_YEAR) as usize]
    }

    fn leap_month(year: i32) -> u32 {
        Self::info(year) & 0xf
    }

    fn leap_month_days(year: i32) -> i64 {
        if Self::leap_month(year) == 0 {
            0
        } else if Self::info(year) & 0x10000 != 0 {
            30
        } else {
            29
        }
    }

    fn month_days(year: i32, month: u32) -> i64 {
        if Self::info(year) & (0x10000 >> month) != 0 {
            30
        } else {
            29
        }
    }

    fn year_days(year: i32) -> i64 {
        (1..=12).map(|m| Self::month_days(year, m)).sum::<i64>() + Self::leap_month_days(year)
    }

    fn epoch() -> NaiveDate {
        NaiveDate::from_ymd_opt(FIRST_YEAR, 1, 31).expect("epoch is a valid date")
    }

    fn last_supported() -> NaiveDate {
        NaiveDate::from_ymd_opt(LAST_YEAR, 12, 31).expect("range end is a valid date")
    }
}

impl LunarConverter for ChineseLunarCalendar {
    fn to_lunar(&self, date: NaiveDate) -> Result<LunarDate, LunarError> {
        if date < Self::epoch() || date > Self::last_supported() {
            return Err(LunarError::OutOfRange(date));
        }

        let mut offset = (date - Self::epoch()).num_days();

        let mut year = FIRST_YEAR;
        while year < LAST_YEAR && offset >= Self::year_days(year) {
            offset -= Self::year_days(year);
            year += 1;
        }

        let leap = Self::leap_month(year);
        let mut month = 1;
        let mut in_leap = false;
        loop {
            let length = if in_leap {
                Self::leap_month_days(year)
            } else {
                Self::month_days(year, month)
            };
            if offset < length || month > 12 {
                break;
            }
            offset -= length;

            if leap != 0 && month == leap && !in_leap {
                in_leap = true;
            } else {
                in_leap = false;
                month += 1;
            }
        }

        Ok(LunarDate {
            year,
            month,
            day: offset as u32 + 1,
            is_leap_month: in_leap,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lunar(y: i32, m: u32, d: u32) -> LunarDate {
        ChineseLunarCalendar
            .to_lunar(NaiveDate::from_ymd_opt(y, m, d).unwrap())
            .unwrap()
    }

    #[test]
    fn epoch_is_first_day_of_1900() {
        assert_eq!(
            lunar(1900, 1, 31),
            LunarDate {
                year: 1900,
                month: 1,
                day: 1,
                is_leap_month: false
            }
        );
    }

    #[test]
    fn lunar_new_year_dates() {
        for (y, m, d) in [(2000, 2, 5), (2020, 1, 25), (2023, 1, 22), (2024, 2, 10), (2025, 1, 29), (2026, 2, 17)] {
            let l = lunar(y, m, d);
            assert_eq!((l.year, l.month, l.day, l.is_leap_month), (y, 1, 1, false), "{y}-{m}-{d}");
        }
    }

    #[test]
    fn eve_of_new_year_belongs_to_previous_year() {
        let l = lunar(2025, 1, 28);
        assert_eq!(l.year, 2024);
        assert_eq!(l.month, 12);
    }

    #[test]
    fn mid_autumn_festival() {
        let l = lunar(2024, 9, 17);
        assert_eq!((l.month, l.day), (8, 15));
        assert_eq!(l.month_in_chinese(), "八");
        assert_eq!(l.day_in_chinese(), "十五");
    }

    #[test]
    fn leap_month_is_flagged() {
        let l = lunar(2023, 3, 22);
        assert_eq!((l.year, l.month, l.day, l.is_leap_month), (2023, 2, 1, true));
        assert_eq!(l.month_in_chinese(), "闰二");
        assert_eq!(l.day_in_chinese(), "初一");

        let after = lunar(2023, 4, 20);
        assert_eq!((after.month, after.day, after.is_leap_month), (3, 1, false));
    }

    #[test]
    fn day_names() {
        let name = |day| {
            LunarDate {
                year: 2025,
                month: 1,
                day,
                is_leap_month: false,
            }
            .day_in_chinese()
        };
        assert_eq!(name(10), "初十");
        assert_eq!(name(11), "十一");
        assert_eq!(name(20), "二十");
        assert_eq!(name(21), "廿一");
        assert_eq!(name(30), "三十");
    }

    #[test]
    fn out_of_range_dates_fail() {
        let early = NaiveDate::from_ymd_opt(1900, 1, 30).unwrap();
        assert_eq!(
            ChineseLunarCalendar.to_lunar(early),
            Err(LunarError::OutOfRange(early))
        );
        let late = NaiveDate::from_ymd_opt(2101, 1, 1).unwrap();
        assert!(ChineseLunarCalendar.to_lunar(late).is_err());
        assert!(ChineseLunarCalendar
            .to_lunar(NaiveDate::from_ymd_opt(2100, 12, 31).unwrap())
            .is_ok());
    }
}
