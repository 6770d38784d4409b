//! Lunar/solar calendar with per-day notes and 07:00 reminders.
//!
//! - [`store::NoteStore`]: the per-day note mapping and its reminder triggers.
//! - [`grid`]: month grid derivation for display.
//! - [`lunar`]: solar to Chinese lunar date conversion.
//! - [`render`]: terminal rendering of a month grid.

pub mod grid;
pub mod lunar;
pub mod render;
pub mod store;

pub use grid::{build_month_view, picker_years, CalendarCursor, DayCell, LunarInfo, MonthView, YearMonth};
pub use lunar::{ChineseLunarCalendar, LunarConverter, LunarDate, LunarError};
pub use render::render_month;
pub use store::{NoteIndex, NoteMap, NoteStore, NoteStoreError, ReminderOutcome, UpsertOutcome};
