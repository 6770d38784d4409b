//! Plain-text rendering of a month grid for the terminal.

use chrono::Month;

use super::grid::{DayCell, MonthView};

const WEEKDAYS: [&str; 7] = ["Su", "Mo", "Tu", "We", "Th", "Fr", "Sa"];
const NOTE_MARK: char = '•';
const CELL_WIDTH: usize = 5;

/// Render a month as a week-per-line grid.
///
/// The selected day is bracketed, today is parenthesised and days with a
/// note carry a dot:
/// ```text
/// June 2025
///  Su   Mo   Tu   We   Th   Fr   Sa
///   1    2    3    4    5    6    7
///   8    9  (10)  11   12   13   14
/// [15]  16   17   18   19  20 •  21
/// ...
/// Selected 2025-6-15, lunar 五月二十
/// ```
pub fn render_month(view: &MonthView) -> String {
    let mut output = String::new();

    let title = u8::try_from(view.month.month())
        .ok()
        .and_then(|m| Month::try_from(m).ok())
        .map(|m| m.name().to_string())
        .unwrap_or_else(|| view.month.month().to_string());
    output.push_str(&format!("{} {}\n", title, view.month.year()));

    let header: String = WEEKDAYS
        .iter()
        .map(|name| format!(" {:<width$}", name, width = CELL_WIDTH - 1))
        .collect();
    push_line(&mut output, &header);

    let mut line = " ".repeat(CELL_WIDTH * view.leading_blanks as usize);
    let mut column = view.leading_blanks as usize;
    for cell in &view.days {
        line.push_str(&render_cell(cell));
        column += 1;
        if column == WEEKDAYS.len() {
            push_line(&mut output, &line);
            line.clear();
            column = 0;
        }
    }
    if !line.is_empty() {
        push_line(&mut output, &line);
    }

    output.push_str(&format!("Selected {}", view.selected));
    if let Some(lunar) = &view.selected_lunar {
        output.push_str(&format!(
            ", lunar {}月{}",
            lunar.month_in_chinese, lunar.day_in_chinese
        ));
    }
    output.push('\n');
    output
}

fn render_cell(cell: &DayCell) -> String {
    let (open, close) = if cell.is_selected {
        ('[', ']')
    } else if cell.is_today {
        ('(', ')')
    } else {
        (' ', ' ')
    };
    let mark = if cell.has_note { NOTE_MARK } else { ' ' };
    format!("{}{:>2}{}{}", open, cell.day, close, mark)
}

fn push_line(output: &mut String, line: &str) {
    output.push_str(line.trim_end());
    output.push('\n');
}
