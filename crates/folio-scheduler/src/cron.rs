//! Five-field cron expressions (`minute hour day-of-month month day-of-week`).
//!
//! Parsing and iteration are delegated to the `cron` crate, which expects a
//! leading seconds field and numbers weekdays 1-7 from Sunday. Expressions
//! are normalised to that form here: seconds are pinned to `0` and numeric
//! weekdays in the conventional 0-7 range (0 and 7 both Sunday) are
//! rewritten. Names (`MON-FRI`), `*`, `?` and steps over `*` pass through.
//!
//! When both day fields are restricted, classic cron fires on a day matching
//! *either* of them (`0 0 13 * 5` is every 13th and every Friday), while the
//! `cron` crate requires both. Such expressions are split into a
//! day-of-month schedule and a day-of-week schedule and the earlier slot
//! wins.

use std::str::FromStr;

use chrono::{DateTime, Local, TimeZone, Utc};

use crate::error::{Result, SchedulerError};

#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    inner: cron::Schedule,
    /// Day-of-week half when both day fields are restricted.
    weekday: Option<cron::Schedule>,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(SchedulerError::InvalidSchedule(format!(
                "'{expression}': expected 5 fields (minute hour day month weekday), got {}",
                fields.len()
            )));
        }
        let weekday = translate_weekday(fields[4]).map_err(|e| {
            SchedulerError::InvalidSchedule(format!("'{expression}': weekday field: {e}"))
        })?;
        let build = |day: &str, weekday: &str| {
            let normalised = format!(
                "0 {} {} {} {} {}",
                fields[0], fields[1], day, fields[3], weekday
            );
            cron::Schedule::from_str(&normalised)
                .map_err(|e| SchedulerError::InvalidSchedule(format!("'{expression}': {e}")))
        };

        let (inner, weekday) = if restricts(fields[2]) && restricts(fields[4]) {
            (build(fields[2], "*")?, Some(build("*", &weekday)?))
        } else {
            (build(fields[2], &weekday)?, None)
        };
        Ok(Self {
            expression: fields.join(" "),
            inner,
            weekday,
        })
    }

    /// The expression as written (whitespace collapsed).
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First matching instant strictly after `after`, in `after`'s zone.
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let by_day = self.inner.after(after).next();
        let Some(weekday) = &self.weekday else {
            return by_day;
        };
        match (by_day, weekday.after(after).next()) {
            (Some(a), Some(b)) => Some(if b < a { b } else { a }),
            (a, b) => a.or(b),
        }
    }

    /// Next slot after `after`, matching fields against the server's local
    /// wall clock and returning UTC for storage.
    pub fn next_run(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.next_after(&after.with_timezone(&Local))
            .map(|t| t.with_timezone(&Utc))
    }
}

/// A day field counts as restricted unless it starts with `*` or is `?`,
/// which is how classic cron decides between AND and OR.
fn restricts(field: &str) -> bool {
    !(field.starts_with('*') || field == "?")
}

/// Rewrite numeric weekdays (0-7, Sunday = 0 or 7) into the `cron` crate's
/// 1-7 numbering, expanding ranges and steps into explicit lists.
fn translate_weekday(field: &str) -> std::result::Result<String, String> {
    let mut out = Vec::new();
    for item in field.split(',') {
        out.push(translate_weekday_item(item)?);
    }
    Ok(out.join(","))
}

fn translate_weekday_item(item: &str) -> std::result::Result<String, String> {
    if item.is_empty() {
        return Err("empty list entry".into());
    }
    let (range, step) = match item.split_once('/') {
        Some((r, s)) => (r, Some(s)),
        None => (item, None),
    };
    let numeric = range
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit());
    if !numeric {
        // `*`, `?` and day names mean the same thing in both dialects.
        return Ok(item.to_string());
    }

    let (start, end) = match range.split_once('-') {
        Some((a, b)) => (parse_weekday(a)?, parse_weekday(b)?),
        // `n/step` runs from n to the end of the week.
        None if step.is_some() => (parse_weekday(range)?, 6),
        None => {
            let d = parse_weekday(range)?;
            (d, d)
        }
    };
    if start > end {
        return Err(format!("range {start}-{end} is backwards"));
    }
    let step = match step {
        Some(s) => s
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| format!("invalid step '{s}'"))?,
        None => 1,
    };

    let mut days: Vec<u8> = (start..=end).step_by(step).map(|d| d % 7 + 1).collect();
    days.sort_unstable();
    days.dedup();
    Ok(days
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(","))
}

fn parse_weekday(s: &str) -> std::result::Result<u8, String> {
    match s.parse::<u8>() {
        Ok(d) if d <= 7 => Ok(d),
        _ => Err(format!("'{s}' is not a weekday number (0-7)")),
    }
}
