// Value codec
//
// Turns raw registration table strings into sample values. RouterOS reports
// every field as a string; some of them pack two counters ("tx,rx") or a
// duration ("1d2h3m4s") into one value. This module is the only place that
// knows about those encodings.

use std::num::ParseFloatError;
use thiserror::Error;

/// A raw field value that could not be turned into a sample value
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("invalid numeric value {value:?}: {source}")]
    InvalidNumber {
        value: String,
        source: ParseFloatError,
    },

    #[error("expected two comma-separated counters, found {fields} field(s) in {value:?}")]
    FieldCount { value: String, fields: usize },

    #[error("invalid duration {value:?}")]
    InvalidDuration { value: String },
}

/// Parses a plain numeric field.
///
/// # Returns
/// * `Ok(Some(v))` - the parsed value
/// * `Ok(None)` - the field is empty and the metric should be skipped
/// * `Err(ParseError)` - the field is not a number
pub fn parse_scalar(raw: &str) -> Result<Option<f64>, ParseError> {
    if raw.is_empty() {
        return Ok(None);
    }

    raw.parse::<f64>()
        .map(Some)
        .map_err(|source| ParseError::InvalidNumber {
            value: raw.to_string(),
            source,
        })
}

/// Splits a combined `"tx,rx"` field into its transmit and receive counters.
///
/// Exactly two numeric fields are accepted. Anything else, including an
/// empty string, is an error carrying the whole raw value.
pub fn parse_split_counters(raw: &str) -> Result<(f64, f64), ParseError> {
    let fields: Vec<&str> = raw.split(',').collect();
    if fields.len() != 2 {
        return Err(ParseError::FieldCount {
            value: raw.to_string(),
            fields: fields.len(),
        });
    }

    let parse = |field: &str| {
        field.parse::<f64>().map_err(|source| ParseError::InvalidNumber {
            value: raw.to_string(),
            source,
        })
    };

    Ok((parse(fields[0])?, parse(fields[1])?))
}

/// Parses a RouterOS duration such as `1w2d3h4m5s` or `45s120ms` into seconds.
///
/// An empty field is a skip signal, like in [`parse_scalar`].
pub fn parse_duration(raw: &str) -> Result<Option<f64>, ParseError> {
    if raw.is_empty() {
        return Ok(None);
    }

    let invalid = || ParseError::InvalidDuration {
        value: raw.to_string(),
    };

    let mut total = 0.0;
    let mut rest = raw;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(invalid)?;
        if digits == 0 {
            return Err(invalid());
        }
        let amount: f64 = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "w" => 604_800.0,
            "d" => 86_400.0,
            "h" => 3_600.0,
            "m" => 60.0,
            "s" => 1.0,
            "ms" => 0.001,
            "us" => 0.000_001,
            _ => return Err(invalid()),
        };
        total += amount * scale;
        rest = &rest[unit_len..];
    }

    Ok(Some(total))
}
