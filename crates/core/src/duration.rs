//! ISO-8601 duration parsing (`PT1H2M3S`, `P1DT2H`, `PT0.5S`, ...).
//!
//! The video platform reports durations in this format. Calendar units are
//! approximated: a year is 365 days, a month 30 days.

use std::time::Duration;

use crate::error::{DomainError, DomainResult};

const SECS_PER_MINUTE: f64 = 60.0;
const SECS_PER_HOUR: f64 = 3_600.0;
const SECS_PER_DAY: f64 = 86_400.0;

/// Parse an ISO-8601 duration string into an elapsed `Duration`.
pub fn parse_iso8601_duration(raw: &str) -> DomainResult<Duration> {
    let input = raw.trim();
    let body = input
        .strip_prefix('P')
        .ok_or_else(|| DomainError::invalid_duration(format!("{input:?}: missing 'P' designator")))?;

    if body.is_empty() {
        return Err(DomainError::invalid_duration(format!("{input:?}: no components")));
    }

    let (date_part, time_part) = match body.split_once('T') {
        Some((date, time)) => {
            if time.is_empty() {
                return Err(DomainError::invalid_duration(format!(
                    "{input:?}: 'T' without time components"
                )));
            }
            (date, Some(time))
        }
        None => (body, None),
    };

    let mut total = 0.0_f64;
    total += sum_components(input, date_part, |unit| match unit {
        'Y' => Some(365.0 * SECS_PER_DAY),
        'M' => Some(30.0 * SECS_PER_DAY),
        'W' => Some(7.0 * SECS_PER_DAY),
        'D' => Some(SECS_PER_DAY),
        _ => None,
    })?;

    if let Some(time) = time_part {
        total += sum_components(input, time, |unit| match unit {
            'H' => Some(SECS_PER_HOUR),
            'M' => Some(SECS_PER_MINUTE),
            'S' => Some(1.0),
            _ => None,
        })?;
    }

    if !total.is_finite() || total < 0.0 {
        return Err(DomainError::invalid_duration(format!("{input:?}: out of range")));
    }
    Duration::try_from_secs_f64(total)
        .map_err(|e| DomainError::invalid_duration(format!("{input:?}: {e}")))
}

fn sum_components(
    input: &str,
    part: &str,
    unit_secs: impl Fn(char) -> Option<f64>,
) -> DomainResult<f64> {
    let mut total = 0.0;
    let mut number = String::new();

    for ch in part.chars() {
        if ch.is_ascii_digit() || ch == '.' || ch == ',' {
            number.push(if ch == ',' { '.' } else { ch });
            continue;
        }

        let factor = unit_secs(ch)
            .ok_or_else(|| DomainError::invalid_duration(format!("{input:?}: unexpected '{ch}'")))?;
        if number.is_empty() {
            return Err(DomainError::invalid_duration(format!(
                "{input:?}: '{ch}' without a value"
            )));
        }
        let value: f64 = number
            .parse()
            .map_err(|_| DomainError::invalid_duration(format!("{input:?}: bad number {number:?}")))?;
        total += value * factor;
        number.clear();
    }

    if !number.is_empty() {
        return Err(DomainError::invalid_duration(format!(
            "{input:?}: trailing value {number:?} without a unit"
        )));
    }

    Ok(total)
}
