use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;

use crate::error::{Result, SchedulerError};

/// A compiled trigger expression: given an instant, produce the next one.
pub trait Trigger: Send + Sync + fmt::Debug {
    /// The first fire instant strictly after `after`, or `None` when the
    /// expression has no future instants left.
    fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>>;
}

/// Turns trigger expressions into [`Trigger`]s. Swappable so the scheduler
/// does not depend on one expression dialect.
pub trait TriggerCompiler: Send + Sync {
    fn compile(&self, expression: &str) -> Result<Box<dyn Trigger>>;
}

/// Cron expression backed by the `cron` crate.
///
/// Accepted forms:
///
/// | Fields | Layout                                   |
/// |--------|------------------------------------------|
/// | 5      | `min hour dom month dow` (second = 0)    |
/// | 6      | `sec min hour dom month dow`             |
/// | 7      | `sec min hour dom month dow year`        |
/// | `@…`   | `@hourly`, `@daily`, `@weekly`, …        |
///
/// Day-of-week accepts names (`Mon`, `Tue`, …) everywhere. Numbers follow
/// crontab in the 5-field form (0-7, Sunday is 0 or 7) and the `cron` crate
/// in the longer forms (1-7, Sunday is 1).
#[derive(Debug, Clone)]
pub struct CronTrigger {
    schedule: CronSchedule,
}

impl CronTrigger {
    pub fn parse(expression: &str) -> Result<Self> {
        let normalized = normalize(expression)?;
        let schedule = CronSchedule::from_str(&normalized).map_err(|e| invalid(expression, e))?;

        if schedule.upcoming(Utc).next().is_none() {
            return Err(invalid(expression, "expression never fires"));
        }
        Ok(Self { schedule })
    }
}

impl Trigger for CronTrigger {
    fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }
}

/// Default compiler: every expression is a [`CronTrigger`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CronCompiler;

impl TriggerCompiler for CronCompiler {
    fn compile(&self, expression: &str) -> Result<Box<dyn Trigger>> {
        Ok(Box::new(CronTrigger::parse(expression)?))
    }
}

/// Bring classic 5-field crontab lines up to the 6-field seconds layout.
fn normalize(expression: &str) -> Result<String> {
    let trimmed = expression.trim();
    if trimmed.starts_with('@') {
        return Ok(trimmed.to_string());
    }
    let fields: Vec<&str> = trimmed.split_whitespace().collect();
    match fields.len() {
        5 => {
            let day_of_week = crontab_day_of_week(fields[4])
                .map_err(|reason| invalid(expression, reason))?;
            Ok(format!(
                "0 {} {} {} {} {}",
                fields[0], fields[1], fields[2], fields[3], day_of_week
            ))
        }
        6 | 7 => Ok(fields.join(" ")),
        0 => Err(invalid(expression, "empty expression")),
        n => Err(invalid(expression, format!("expected 5, 6 or 7 fields, got {n}"))),
    }
}

/// Renumber a crontab day-of-week field (0-7, Sunday is 0 and 7) into the
/// `cron` crate's 1-7 with Sunday at 1.
///
/// Numeric ranges and steps are expanded into an explicit list so that
/// wrap-arounds like `5-7` stay valid. Named days pass through unchanged.
fn crontab_day_of_week(field: &str) -> std::result::Result<String, String> {
    if field == "*" || field == "?" {
        return Ok(field.to_string());
    }

    let mut days = BTreeSet::new();
    let mut named = Vec::new();
    for item in field.split(',') {
        if item.chars().any(|c| c.is_ascii_alphabetic()) {
            named.push(item.to_string());
            continue;
        }

        let (base, step) = match item.split_once('/') {
            Some((base, step)) => (base, Some(parse_day_number(step)?)),
            None => (item, None),
        };
        let (first, last) = if base == "*" {
            (0, 6)
        } else if let Some((a, b)) = base.split_once('-') {
            (parse_day_number(a)?, parse_day_number(b)?)
        } else {
            let day = parse_day_number(base)?;
            (day, if step.is_some() { 6 } else { day })
        };

        if first > 7 || last > 7 {
            return Err(format!("day of week out of range in {item:?}"));
        }
        if first > last {
            return Err(format!("reversed day-of-week range {item:?}"));
        }
        let step = step.unwrap_or(1);
        if step == 0 {
            return Err(format!("zero step in {item:?}"));
        }

        for day in (first..=last).step_by(step as usize) {
            days.insert(day % 7 + 1);
        }
    }

    let mut parts: Vec<String> = days.iter().map(u32::to_string).collect();
    parts.extend(named);
    Ok(parts.join(","))
}

fn parse_day_number(s: &str) -> std::result::Result<u32, String> {
    s.parse()
        .map_err(|_| format!("bad day-of-week value {s:?}"))
}

fn invalid(expression: &str, reason: impl fmt::Display) -> SchedulerError {
    SchedulerError::InvalidTrigger {
        expression: expression.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, h, m, s).unwrap()
    }

    #[test]
    fn every_second_fires_on_next_second() {
        let t = CronTrigger::parse("* * * * * *").unwrap();
        assert_eq!(t.next_after(at(10, 0, 0)), Some(at(10, 0, 1)));
    }

    #[test]
    fn next_is_strictly_after_a_matching_instant() {
        let t = CronTrigger::parse("*/5 * * * * *").unwrap();
        assert_eq!(t.next_after(at(10, 0, 5)), Some(at(10, 0, 10)));
    }

    #[test]
    fn five_field_expression_fires_on_minute_boundary() {
        let t = CronTrigger::parse("30 3 * * *").unwrap();
        assert_eq!(t.next_after(at(1, 0, 0)), Some(at(3, 30, 0)));
    }

    // 2026-03-14 is a Saturday.
    fn on(day: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, h, 0, 0).unwrap()
    }

    #[test]
    fn five_field_weekdays_use_crontab_numbering() {
        let t = CronTrigger::parse("0 9 * * 1-5").unwrap();
        assert_eq!(t.next_after(at(12, 0, 0)), Some(on(16, 9)));
        assert_eq!(t.next_after(on(20, 12)), Some(on(23, 9)));
    }

    #[test]
    fn five_field_sunday_is_zero_or_seven() {
        for expr in ["0 9 * * 0", "0 9 * * 7"] {
            let t = CronTrigger::parse(expr).unwrap();
            assert_eq!(t.next_after(at(12, 0, 0)), Some(on(15, 9)), "{expr}");
        }
    }

    #[test]
    fn five_field_range_through_sunday() {
        let t = CronTrigger::parse("0 9 * * 5-7").unwrap();
        assert_eq!(t.next_after(at(12, 0, 0)), Some(on(15, 9)));
        assert_eq!(t.next_after(on(15, 12)), Some(on(20, 9)));
    }

    #[test]
    fn five_field_lists_steps_and_names() {
        assert_eq!(crontab_day_of_week("0,3").unwrap(), "1,4");
        assert_eq!(crontab_day_of_week("*/2").unwrap(), "1,3,5,7");
        assert_eq!(crontab_day_of_week("1-5/2").unwrap(), "2,4,6");
        assert_eq!(crontab_day_of_week("Mon-Fri").unwrap(), "Mon-Fri");
        assert_eq!(crontab_day_of_week("*").unwrap(), "*");

        let t = CronTrigger::parse("0 9 * * Mon-Fri").unwrap();
        assert_eq!(t.next_after(at(12, 0, 0)), Some(on(16, 9)));
    }

    #[test]
    fn five_field_bad_day_of_week_is_rejected() {
        for expr in ["0 9 * * 8", "0 9 * * 5-1", "0 9 * * 1/0", "0 9 * * 1-"] {
            assert!(CronTrigger::parse(expr).is_err(), "{expr}");
        }
    }

    #[test]
    fn six_field_keeps_cron_numbering() {
        // 1 is Sunday for the cron crate.
        let t = CronTrigger::parse("0 0 9 * * 1").unwrap();
        assert_eq!(t.next_after(at(12, 0, 0)), Some(on(15, 9)));
    }

    #[test]
    fn shorthand_is_accepted() {
        let t = CronTrigger::parse("@hourly").unwrap();
        assert_eq!(t.next_after(at(1, 15, 0)), Some(at(2, 0, 0)));
    }

    #[test]
    fn garbage_is_rejected() {
        let err = CronCompiler.compile("every tuesday-ish").unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidTrigger { .. }));
    }

    #[test]
    fn wrong_field_count_is_rejected() {
        assert!(CronTrigger::parse("* * *").is_err());
        assert!(CronTrigger::parse("   ").is_err());
    }

    #[test]
    fn past_only_expression_is_rejected() {
        let err = CronTrigger::parse("0 0 0 1 1 * 2001").unwrap_err();
        assert!(err.to_string().contains("never fires"));
    }
}
