// Cron expression engine: parses five-field cron specs and the @-macros,
// and computes the next matching instant after a reference time.
//
// Evaluation is done in the process-local time zone. Daylight-saving
// transitions are left to the calendar arithmetic: a skipped wall-clock
// hour may drop one fire that day and a repeated hour may add one. This
// is a known, accepted ambiguity.

use crate::errors::ScheduleError;
use chrono::{DateTime, Datelike, Duration, Local, Timelike};

/// Number of years the minute search covers before a spec is declared
/// unsatisfiable (e.g. `0 0 31 2 *`).
const SEARCH_YEARS: u32 = 4;

/// A parsed cron time specification.
///
/// `Reboot` and `Every` are the two forms not expressed as calendar
/// fields: `Reboot` is due exactly once, at the instant the runner
/// starts, and `Every` fires a fixed duration after the previous fire.
#[derive(Debug, Clone, PartialEq)]
pub enum CronExpression {
    Calendar(CalendarSpec),
    Every(Duration),
    Reboot,
}

/// The five positional fields of a calendar spec, plus the source text
/// for error reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarSpec {
    source: String,
    minutes: FieldSet,
    hours: FieldSet,
    days_of_month: FieldSet,
    months: FieldSet,
    days_of_week: FieldSet,
}

/// Set of allowed values for one field, stored as a bitmask.
/// `restricted` records whether the field was written as something other
/// than a bare `*`, which drives the day-of-month/day-of-week tie-break.
#[derive(Debug, Clone, Copy, PartialEq)]
struct FieldSet {
    bits: u64,
    restricted: bool,
}

impl FieldSet {
    fn contains(self, value: u32) -> bool {
        self.bits & (1u64 << value) != 0
    }
}

impl CronExpression {
    /// Parse a cron time specification: either five positional fields or
    /// a single macro token (`@hourly`, `@reboot`, `@every 5m`, ...).
    pub fn parse(spec: &str) -> Result<Self, ScheduleError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(invalid(spec, "empty specification"));
        }

        if let Some(rest) = spec.strip_prefix('@') {
            return Self::parse_macro(spec, rest);
        }

        let fields: Vec<&str> = spec.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(invalid(
                spec,
                &format!("expected 5 fields, found {}", fields.len()),
            ));
        }

        Ok(CronExpression::Calendar(CalendarSpec {
            source: spec.to_string(),
            minutes: parse_field(fields[0], "minute", 0, 59)?,
            hours: parse_field(fields[1], "hour", 0, 23)?,
            days_of_month: parse_field(fields[2], "day-of-month", 1, 31)?,
            months: parse_field(fields[3], "month", 1, 12)?,
            days_of_week: parse_field(fields[4], "day-of-week", 0, 6)?,
        }))
    }

    fn parse_macro(spec: &str, rest: &str) -> Result<Self, ScheduleError> {
        if rest == "reboot" {
            return Ok(CronExpression::Reboot);
        }
        if let Some(duration) = rest.strip_prefix("every ") {
            return Ok(CronExpression::Every(parse_duration(duration.trim())?));
        }

        let expansion = match rest {
            "yearly" | "annually" => "0 0 1 1 *",
            "monthly" => "0 0 1 * *",
            "weekly" => "0 0 * * 0",
            "daily" | "midnight" => "0 0 * * *",
            "hourly" => "0 * * * *",
            _ => return Err(invalid(spec, "unknown macro")),
        };
        Self::parse(expansion)
    }

    /// Compute the next matching instant strictly after `from`.
    ///
    /// For `Every` this is `from + duration`. For `Reboot` the result is
    /// `from` itself; the caller owns the fired-once state and must not
    /// ask again (see `runner::Job`). Calendar specs advance minute by
    /// minute and fail with `Unsatisfiable` when no match exists within
    /// the search window.
    pub fn next_after(&self, from: DateTime<Local>) -> Result<DateTime<Local>, ScheduleError> {
        match self {
            CronExpression::Every(duration) => Ok(from + *duration),
            CronExpression::Reboot => Ok(from),
            CronExpression::Calendar(calendar) => calendar.next_after(from).ok_or_else(|| {
                ScheduleError::Unsatisfiable {
                    expression: calendar.source.clone(),
                    years: SEARCH_YEARS,
                }
            }),
        }
    }
}

impl CalendarSpec {
    fn next_after(&self, from: DateTime<Local>) -> Option<DateTime<Local>> {
        // Truncate to the minute, then start at the following one so the
        // result is strictly after `from`. Subtraction keeps this pure
        // instant arithmetic, valid across DST transitions.
        let truncated = from
            - Duration::seconds(i64::from(from.second()))
            - Duration::nanoseconds(i64::from(from.nanosecond()));
        let mut t = truncated + Duration::minutes(1);
        let bound = from + Duration::days(i64::from(SEARCH_YEARS) * 366 + 1);

        while t <= bound {
            if !self.matches_day(t) {
                // Skip ahead to (approximately) the next local midnight.
                // Around a DST transition this lands an hour off, which
                // the next iteration re-checks.
                let elapsed = t.hour() * 60 + t.minute();
                t = t + Duration::minutes(i64::from(24 * 60 - elapsed));
                continue;
            }
            if !self.hours.contains(t.hour()) {
                t = t + Duration::minutes(i64::from(60 - t.minute()));
                continue;
            }
            if self.minutes.contains(t.minute()) {
                return Some(t);
            }
            t = t + Duration::minutes(1);
        }
        None
    }

    /// Month plus the day-of-month/day-of-week tie-break: when both day
    /// fields are restricted a date matches if EITHER matches; when only
    /// one is restricted that one decides; when neither is, every day
    /// matches.
    fn matches_day(&self, t: DateTime<Local>) -> bool {
        if !self.months.contains(t.month()) {
            return false;
        }
        let dom = self.days_of_month;
        let dow = self.days_of_week;
        let weekday = t.weekday().num_days_from_sunday();
        match (dom.restricted, dow.restricted) {
            (false, false) => true,
            (true, false) => dom.contains(t.day()),
            (false, true) => dow.contains(weekday),
            (true, true) => dom.contains(t.day()) || dow.contains(weekday),
        }
    }
}

/// Parse one positional field: `*`, a value, a list, a range `a-b`, or a
/// step `a-b/n` / `*/n`.
fn parse_field(
    text: &str,
    field: &'static str,
    min: u32,
    max: u32,
) -> Result<FieldSet, ScheduleError> {
    let all = |bits: &mut u64| {
        for v in min..=max {
            *bits |= 1u64 << v;
        }
    };

    if text == "*" {
        let mut bits = 0u64;
        all(&mut bits);
        return Ok(FieldSet {
            bits,
            restricted: false,
        });
    }

    let mut bits = 0u64;
    for part in text.split(',') {
        let (base, step) = match part.split_once('/') {
            Some((base, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| invalid(text, &format!("invalid step in {} field", field)))?;
                if step == 0 {
                    return Err(invalid(text, &format!("step of 0 in {} field", field)));
                }
                (base, step)
            }
            None => (part, 1),
        };

        let (lo, hi) = if base == "*" {
            (min, max)
        } else if let Some((a, b)) = base.split_once('-') {
            (
                parse_value(a, field, text, min, max)?,
                parse_value(b, field, text, min, max)?,
            )
        } else {
            let v = parse_value(base, field, text, min, max)?;
            // A bare value with a step (`5/10`) ranges up to the field
            // maximum, as in classic vixie cron.
            if part.contains('/') {
                (v, max)
            } else {
                (v, v)
            }
        };

        if lo > hi {
            return Err(invalid(
                text,
                &format!("inverted range {}-{} in {} field", lo, hi, field),
            ));
        }

        let mut v = lo;
        while v <= hi {
            bits |= 1u64 << v;
            v += step;
        }
    }

    Ok(FieldSet {
        bits,
        restricted: true,
    })
}

fn parse_value(
    text: &str,
    field: &'static str,
    whole: &str,
    min: u32,
    max: u32,
) -> Result<u32, ScheduleError> {
    let value: u32 = text
        .parse()
        .map_err(|_| invalid(whole, &format!("invalid value '{}' in {} field", text, field)))?;
    if value < min || value > max {
        return Err(ScheduleError::FieldOutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(value)
}

/// Parse a Go-style duration: one or more `<integer><unit>` groups where
/// the unit is `h`, `m`, `s`, or `ms` (e.g. `5m`, `1h30m`, `90s`).
pub fn parse_duration(input: &str) -> Result<Duration, ScheduleError> {
    let bad = |reason: &str| ScheduleError::InvalidDuration {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    if input.is_empty() {
        return Err(bad("empty duration"));
    }

    let mut total = Duration::zero();
    let mut chars = input.chars().peekable();
    while chars.peek().is_some() {
        let mut digits = String::new();
        while let Some(c) = chars.peek() {
            if c.is_ascii_digit() {
                digits.push(*c);
                chars.next();
            } else {
                break;
            }
        }
        if digits.is_empty() {
            return Err(bad("expected a number"));
        }
        let value: i64 = digits.parse().map_err(|_| bad("number too large"))?;

        let mut unit = String::new();
        while let Some(c) = chars.peek() {
            if c.is_ascii_alphabetic() {
                unit.push(*c);
                chars.next();
            } else {
                break;
            }
        }
        let part = match unit.as_str() {
            "h" => Duration::try_hours(value),
            "m" => Duration::try_minutes(value),
            "s" => Duration::try_seconds(value),
            "ms" => Duration::try_milliseconds(value),
            "" => return Err(bad("missing unit")),
            _ => return Err(bad("unknown unit")),
        };
        total = part
            .and_then(|part| total.checked_add(&part))
            .ok_or_else(|| bad("duration too large"))?;
    }

    if total <= Duration::zero() {
        return Err(bad("duration must be positive"));
    }
    Ok(total)
}

fn invalid(expression: &str, reason: &str) -> ScheduleError {
    ScheduleError::InvalidExpression {
        expression: expression.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn next(spec: &str, from: DateTime<Local>) -> DateTime<Local> {
        CronExpression::parse(spec).unwrap().next_after(from).unwrap()
    }

    #[test]
    fn every_minute_advances_by_one() {
        let from = local(2024, 3, 14, 10, 5, 30);
        assert_eq!(next("* * * * *", from), local(2024, 3, 14, 10, 6, 0));
    }

    #[test]
    fn result_is_strictly_after_reference() {
        // Reference sits exactly on a matching minute boundary.
        let from = local(2024, 3, 14, 10, 5, 0);
        assert_eq!(next("5 * * * *", from), local(2024, 3, 14, 11, 5, 0));
    }

    #[test]
    fn fixed_minute_and_hour() {
        let from = local(2024, 3, 14, 10, 0, 0);
        assert_eq!(next("30 2 * * *", from), local(2024, 3, 15, 2, 30, 0));
    }

    #[test]
    fn step_field() {
        let from = local(2024, 3, 14, 10, 1, 0);
        assert_eq!(next("*/15 * * * *", from), local(2024, 3, 14, 10, 15, 0));
        assert_eq!(
            next("*/15 * * * *", local(2024, 3, 14, 10, 46, 0)),
            local(2024, 3, 14, 11, 0, 0)
        );
    }

    #[test]
    fn range_with_step() {
        // 10-30/10 selects 10, 20, 30
        let from = local(2024, 3, 14, 10, 21, 0);
        assert_eq!(next("10-30/10 * * * *", from), local(2024, 3, 14, 10, 30, 0));
    }

    #[test]
    fn comma_list() {
        let from = local(2024, 3, 14, 10, 16, 0);
        assert_eq!(next("0,15,45 * * * *", from), local(2024, 3, 14, 10, 45, 0));
    }

    #[test]
    fn month_rollover() {
        let from = local(2024, 1, 31, 23, 59, 0);
        assert_eq!(next("0 0 1 * *", from), local(2024, 2, 1, 0, 0, 0));
    }

    #[test]
    fn day_of_week_only() {
        // 2024-03-14 is a Thursday; next Sunday is the 17th.
        let from = local(2024, 3, 14, 12, 0, 0);
        assert_eq!(next("0 9 * * 0", from), local(2024, 3, 17, 9, 0, 0));
    }

    #[test]
    fn dom_dow_or_semantics() {
        // "0 0 1 * 0": matches the 1st of the month OR any Sunday.
        // From Thu 2024-03-14 the next Sunday (Mar 17) comes before the
        // next 1st (Apr 1), so OR semantics must pick Mar 17.
        let from = local(2024, 3, 14, 12, 0, 0);
        assert_eq!(next("0 0 1 * 0", from), local(2024, 3, 17, 0, 0, 0));

        // And from Sun 2024-03-31 the 1st itself is closer.
        let from = local(2024, 3, 31, 12, 0, 0);
        assert_eq!(next("0 0 1 * 0", from), local(2024, 4, 1, 0, 0, 0));
    }

    #[test]
    fn dom_restricted_dow_wildcard_is_not_or() {
        // With day-of-week left as `*`, only the day-of-month restricts.
        let from = local(2024, 3, 14, 12, 0, 0);
        assert_eq!(next("0 0 20 * *", from), local(2024, 3, 20, 0, 0, 0));
    }

    #[test]
    fn unsatisfiable_spec_errors() {
        let expr = CronExpression::parse("0 0 31 2 *").unwrap();
        let err = expr.next_after(local(2024, 1, 1, 0, 0, 0)).unwrap_err();
        assert!(matches!(err, ScheduleError::Unsatisfiable { .. }));
    }

    #[test]
    fn leap_day_found() {
        let from = local(2023, 3, 1, 0, 0, 0);
        assert_eq!(next("0 0 29 2 *", from), local(2024, 2, 29, 0, 0, 0));
    }

    #[test]
    fn macros_expand() {
        let from = local(2024, 3, 14, 10, 30, 0);
        assert_eq!(next("@hourly", from), local(2024, 3, 14, 11, 0, 0));
        assert_eq!(next("@daily", from), local(2024, 3, 15, 0, 0, 0));
        assert_eq!(next("@midnight", from), local(2024, 3, 15, 0, 0, 0));
        assert_eq!(next("@monthly", from), local(2024, 4, 1, 0, 0, 0));
        assert_eq!(next("@yearly", from), local(2025, 1, 1, 0, 0, 0));
        // 2024-03-17 is the next Sunday after the 14th.
        assert_eq!(next("@weekly", from), local(2024, 3, 17, 0, 0, 0));
    }

    #[test]
    fn every_duration_is_reference_plus_duration() {
        let from = local(2024, 3, 14, 10, 30, 12);
        assert_eq!(next("@every 5m", from), from + Duration::minutes(5));
        assert_eq!(
            next("@every 1h30m", from),
            from + Duration::hours(1) + Duration::minutes(30)
        );
        assert_eq!(next("@every 90s", from), from + Duration::seconds(90));
    }

    #[test]
    fn reboot_parses_and_is_due_at_reference() {
        let expr = CronExpression::parse("@reboot").unwrap();
        assert_eq!(expr, CronExpression::Reboot);
        let from = local(2024, 3, 14, 10, 30, 0);
        assert_eq!(expr.next_after(from).unwrap(), from);
    }

    #[test]
    fn invalid_specs_rejected() {
        for spec in [
            "",
            "* * * *",
            "* * * * * *",
            "60 * * * *",
            "* 24 * * *",
            "* * 0 * *",
            "* * 32 * *",
            "* * * 13 *",
            "* * * * 7",
            "a * * * *",
            "1-0 * * * *",
            "*/0 * * * *",
            "@fortnightly",
            "@every",
            "@every squid",
            "@every 0s",
        ] {
            assert!(CronExpression::parse(spec).is_err(), "accepted: {:?}", spec);
        }
    }

    #[test]
    fn duration_parsing() {
        assert_eq!(parse_duration("5m").unwrap(), Duration::minutes(5));
        assert_eq!(
            parse_duration("1h30m").unwrap(),
            Duration::minutes(90)
        );
        assert_eq!(parse_duration("250ms").unwrap(), Duration::milliseconds(250));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("5").is_err());
        assert!(parse_duration("m5").is_err());
        assert!(parse_duration("5d").is_err());
    }

    #[test]
    fn oversized_duration_is_an_error_not_a_panic() {
        // i64::MAX hours overflows the millisecond representation; a bad
        // crontab line must surface as an error, never abort the daemon.
        assert!(parse_duration("9223372036854775807h").is_err());
        assert!(parse_duration("9000000000000m5000000000000h").is_err());
        assert!(CronExpression::parse("@every 9223372036854775807h").is_err());
    }
}
