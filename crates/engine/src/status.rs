//! Status cell text.

use std::time::Duration;

use crate::processor::Direction;

pub fn progress_message(direction: Direction, processed: u32, total: u32, errors: u32) -> String {
    format!(
        "{} in progress: {processed}/{total} rows processed, {errors} {}",
        direction.label(),
        plural(errors, "error", "errors")
    )
}

pub fn completion_message(
    direction: Direction,
    processed: u32,
    errors: u32,
    elapsed: Duration,
) -> String {
    format!(
        "{} complete: {processed} rows processed in {}, {errors} {}",
        direction.label(),
        format_elapsed(elapsed),
        plural(errors, "error", "errors")
    )
}

/// `1h 02m 03s`, `3m 07s`, `45s`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}

fn plural<'a>(n: u32, one: &'a str, many: &'a str) -> &'a str {
    if n == 1 { one } else { many }
}
