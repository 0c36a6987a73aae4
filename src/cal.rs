//! Gregorian calendar to model-time conversion.
//!
//! Model time is a fractional day count with day 1.0 falling on
//! 1899-12-31T00:00, so day 2.0 is the start of 1900. Date strings are
//! ISO-like, `yyyy-mm-dd` optionally followed by `Thh`, `Thh:mm`, or
//! `Thh:mm:ss`.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use thiserror::Error;

/// Errors from calendar conversion.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalError {
    /// The date string did not parse.
    #[error("unparseable date '{0}'")]
    BadDate(String),

    /// The model time has no calendar representation.
    #[error("model time {0} is out of calendar range")]
    BadTime(f64),
}

/// How much of the time of day `time2cal` spells out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CalFormat {
    /// `yyyy-mm-dd`
    Date,
    /// `yyyy-mm-ddThh`
    Hours,
    /// `yyyy-mm-ddThh:mm`
    #[default]
    Minutes,
    /// `yyyy-mm-ddThh:mm:ss`
    Seconds,
}

fn epoch() -> NaiveDateTime {
    // day 1.0 is 1899-12-31T00:00
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Convert a date string to model time in fractional days.
///
/// # Example
///
/// ```
/// use windtraj::cal::cal2time;
///
/// assert_eq!(cal2time("1900-01-01").unwrap(), 2.0);
/// assert_eq!(cal2time("1900-01-01T12").unwrap(), 2.5);
/// ```
pub fn cal2time(date: &str) -> Result<f64, CalError> {
    let bad = || CalError::BadDate(date.to_string());

    let (date_part, time_part) = match date.split_once('T') {
        Some((d, t)) => (d, Some(t)),
        None => (date, None),
    };

    let d = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|_| bad())?;
    let t = match time_part {
        None => NaiveTime::from_hms_opt(0, 0, 0).ok_or_else(bad)?,
        Some(tp) => {
            // pad "hh" and "hh:mm" prefixes out to full hh:mm:ss
            let full = match tp.matches(':').count() {
                0 => format!("{tp}:00:00"),
                1 => format!("{tp}:00"),
                _ => tp.to_string(),
            };
            NaiveTime::parse_from_str(&full, "%H:%M:%S").map_err(|_| bad())?
        }
    };

    let span = d.and_time(t) - epoch();
    Ok(span.num_seconds() as f64 / 86400.0)
}

/// Convert model time to a date string at the given precision.
///
/// Sub-precision parts are truncated, not rounded.
pub fn time2cal(t: f64, format: CalFormat) -> Result<String, CalError> {
    let seconds = (t * 86400.0).round();
    if !seconds.is_finite() || seconds.abs() > i64::MAX as f64 / 2.0 {
        return Err(CalError::BadTime(t));
    }
    let when = epoch()
        .checked_add_signed(Duration::seconds(seconds as i64))
        .ok_or(CalError::BadTime(t))?;

    let s = match format {
        CalFormat::Date => when.format("%Y-%m-%d").to_string(),
        CalFormat::Hours => when.format("%Y-%m-%dT%H").to_string(),
        CalFormat::Minutes => when.format("%Y-%m-%dT%H:%M").to_string(),
        CalFormat::Seconds => when.format("%Y-%m-%dT%H:%M:%S").to_string(),
    };
    Ok(s)
}
