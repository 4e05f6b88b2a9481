//! Duration strings such as `168h` or `1h30m`, as used for `Valid-Until`.
//!
//! The accepted grammar is Go's `time.ParseDuration`: an optional sign,
//! then one or more decimal numbers (fractions allowed) each followed by
//! one of `ns`, `us`/`µs`, `ms`, `s`, `m`, `h`.

use chrono::TimeDelta;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DurationError {
    #[error("invalid duration {0:?}")]
    Invalid(String),

    #[error("missing unit in duration {0:?}")]
    MissingUnit(String),

    #[error("unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit { unit: String, input: String },

    #[error("duration {0:?} is out of range")]
    Overflow(String),

    #[error("duration {0:?} must be positive")]
    NotPositive(String),
}

fn split_digits(s: &str) -> (&str, &str) {
    s.split_at(s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len()))
}

/// Parse a duration string.
///
/// # Errors
///
/// See [`DurationError`]; sign is accepted, so callers that need a
/// positive span must check.
pub fn parse_duration(input: &str) -> Result<TimeDelta, DurationError> {
    let s = input.trim();
    let invalid = || DurationError::Invalid(input.to_string());
    let overflow = || DurationError::Overflow(input.to_string());

    let (negative, mut rest) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    if rest == "0" {
        return Ok(TimeDelta::zero());
    }
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let (int_part, after) = split_digits(rest);
        let (frac_part, after) = match after.strip_prefix('.') {
            Some(after_dot) => split_digits(after_dot),
            None => ("", after),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }

        let unit_len = after
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after.len());
        let (unit, next) = after.split_at(unit_len);
        let scale: u128 = match unit {
            "" => return Err(DurationError::MissingUnit(input.to_string())),
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            _ => {
                return Err(DurationError::UnknownUnit {
                    unit: unit.to_string(),
                    input: input.to_string(),
                });
            }
        };

        let int: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| overflow())?
        };
        let mut nanos = int.checked_mul(scale).ok_or_else(overflow)?;
        if !frac_part.is_empty() {
            let digits = &frac_part[..frac_part.len().min(18)];
            let frac: u128 = digits.parse().map_err(|_| invalid())?;
            nanos = nanos
                .checked_add(frac * scale / 10u128.pow(digits.len() as u32))
                .ok_or_else(overflow)?;
        }
        total = total.checked_add(nanos).ok_or_else(overflow)?;
        rest = next;
    }

    let nanos = i64::try_from(total).map_err(|_| overflow())?;
    Ok(TimeDelta::nanoseconds(if negative { -nanos } else { nanos }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_examples() {
        let cases = [
            ("168h", TimeDelta::hours(168)),
            ("1h30m", TimeDelta::minutes(90)),
            ("1.5h", TimeDelta::minutes(90)),
            ("1.h", TimeDelta::hours(1)),
            ("250ms", TimeDelta::milliseconds(250)),
            ("2h45m30.5s", TimeDelta::milliseconds(9_930_500)),
            ("10µs", TimeDelta::microseconds(10)),
            ("+5m", TimeDelta::minutes(5)),
            ("-1h", TimeDelta::hours(-1)),
            ("0", TimeDelta::zero()),
        ];
        for (input, expected) in cases {
            assert_eq!(parse_duration(input), Ok(expected), "{input}");
        }
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_duration(""), Err(DurationError::Invalid(String::new())));
        assert_eq!(parse_duration(".h"), Err(DurationError::Invalid(".h".into())));
        assert_eq!(
            parse_duration("10"),
            Err(DurationError::MissingUnit("10".into()))
        );
        assert!(matches!(
            parse_duration("7d"),
            Err(DurationError::UnknownUnit { unit, .. }) if unit == "d"
        ));
        assert!(matches!(
            parse_duration("99999999999999999999h"),
            Err(DurationError::Overflow(_))
        ));
    }

    #[test]
    fn test_fraction_overflowing_the_integer_part() {
        // the integer part alone fits in u128 nanoseconds, the fraction tips it over
        let input = "94522879700260684295381835.9h";
        assert_eq!(parse_duration(input), Err(DurationError::Overflow(input.into())));
        assert_eq!(
            parse_duration("340282366920938463463374607431768211.999us"),
            Err(DurationError::Overflow(
                "340282366920938463463374607431768211.999us".into()
            ))
        );
    }
}
