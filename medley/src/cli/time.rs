use std::fmt;
use std::time::Duration;

/// Parse a time marker into a [`Duration`].
///
/// A bare number is taken as seconds (`10`, `2.5`). Otherwise the value is a
/// sequence of `<number><unit>` components with units `ms`, `s`, `m` and
/// `h`, e.g. `1m30s` or `1.5s 250ms`. Each unit may be used once. Precision
/// is limited to whole milliseconds.
pub fn parse_time(value: &str) -> Result<Duration, TimeParseError> {
    let input = value.trim();
    if input.is_empty() {
        return Err(TimeParseError::Empty);
    }
    if input.starts_with('-') {
        return Err(TimeParseError::Negative);
    }

    let bytes = input.as_bytes();
    let mut index = 0usize;
    let mut seen = [false; Unit::ALL.len()];
    let mut total_ms: u128 = 0;

    while index < bytes.len() {
        if bytes[index].is_ascii_whitespace() {
            index += 1;
            continue;
        }

        let (millis, consumed) = parse_number(bytes, index)?;
        index += consumed;

        let unit = if index == bytes.len() && !seen.iter().any(|used| *used) {
            Unit::Second
        } else {
            let (unit, len) = parse_unit(input, index)?;
            index += len;
            unit
        };

        if std::mem::replace(&mut seen[unit as usize], true) {
            return Err(TimeParseError::DuplicateUnit(unit));
        }

        let scaled = millis
            .checked_mul(unit.millis())
            .ok_or(TimeParseError::TooLarge)?;
        if scaled % 1_000 != 0 {
            return Err(TimeParseError::TooPrecise(unit));
        }
        total_ms = total_ms
            .checked_add(scaled / 1_000)
            .ok_or(TimeParseError::TooLarge)?;
    }

    let total_ms = u64::try_from(total_ms).map_err(|_| TimeParseError::TooLarge)?;
    Ok(Duration::from_millis(total_ms))
}

/// Like [`parse_time`], but zero is rejected.
pub fn parse_positive_time(value: &str) -> Result<Duration, TimeParseError> {
    let duration = parse_time(value)?;
    if duration.is_zero() {
        return Err(TimeParseError::Zero);
    }
    Ok(duration)
}

/// Parse `digits[.digits]` at `index`, returning thousandths of the value
/// and the number of bytes consumed.
fn parse_number(bytes: &[u8], index: usize) -> Result<(u128, usize), TimeParseError> {
    let mut end = index;
    let mut whole: u128 = 0;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        whole = whole
            .checked_mul(10)
            .and_then(|value| value.checked_add(u128::from(bytes[end] - b'0')))
            .ok_or(TimeParseError::TooLarge)?;
        end += 1;
    }
    if end == index {
        return Err(TimeParseError::ExpectedNumber { index });
    }

    let mut thousandths: u128 = 0;
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        let fraction_start = end;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            if end - fraction_start >= 3 {
                if bytes[end] != b'0' {
                    return Err(TimeParseError::TooPrecise(Unit::Second));
                }
            } else {
                let place = 2 - (end - fraction_start) as u32;
                thousandths += u128::from(bytes[end] - b'0') * 10u128.pow(place);
            }
            end += 1;
        }
        if end == fraction_start {
            return Err(TimeParseError::ExpectedNumber { index: end });
        }
    }

    let value = whole
        .checked_mul(1_000)
        .and_then(|value| value.checked_add(thousandths))
        .ok_or(TimeParseError::TooLarge)?;
    Ok((value, end - index))
}

fn parse_unit(input: &str, index: usize) -> Result<(Unit, usize), TimeParseError> {
    let rest = &input[index..];
    let len = rest
        .bytes()
        .take_while(|byte| byte.is_ascii_alphabetic())
        .count();
    if len == 0 {
        return Err(TimeParseError::ExpectedUnit { index });
    }

    let unit = match &rest[..len] {
        "ms" => Unit::Millisecond,
        "s" => Unit::Second,
        "m" => Unit::Minute,
        "h" => Unit::Hour,
        other => return Err(TimeParseError::UnknownUnit(other.to_owned())),
    };
    Ok((unit, len))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeParseError {
    Empty,
    Negative,
    Zero,
    TooLarge,
    ExpectedNumber { index: usize },
    ExpectedUnit { index: usize },
    UnknownUnit(String),
    DuplicateUnit(Unit),
    TooPrecise(Unit),
}

impl std::error::Error for TimeParseError {}

impl fmt::Display for TimeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeParseError::Empty => write!(f, "time cannot be empty"),
            TimeParseError::Negative => write!(f, "time cannot be negative"),
            TimeParseError::Zero => write!(f, "time must be greater than zero"),
            TimeParseError::TooLarge => write!(f, "time is too large"),
            TimeParseError::ExpectedNumber { index } => {
                write!(f, "expected a number at position {}", index + 1)
            }
            TimeParseError::ExpectedUnit { index } => {
                write!(f, "expected a unit at position {}", index + 1)
            }
            TimeParseError::UnknownUnit(unit) => {
                write!(f, "unknown unit '{unit}' (use ms, s, m or h)")
            }
            TimeParseError::DuplicateUnit(unit) => {
                write!(f, "unit '{}' appears more than once", unit.symbol())
            }
            TimeParseError::TooPrecise(unit) => write!(
                f,
                "'{}' component is finer than a millisecond",
                unit.symbol()
            ),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Unit {
    Millisecond,
    Second,
    Minute,
    Hour,
}

impl Unit {
    const ALL: [Unit; 4] = [Unit::Millisecond, Unit::Second, Unit::Minute, Unit::Hour];

    fn millis(self) -> u128 {
        match self {
            Unit::Millisecond => 1,
            Unit::Second => 1_000,
            Unit::Minute => 60_000,
            Unit::Hour => 3_600_000,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Unit::Millisecond => "ms",
            Unit::Second => "s",
            Unit::Minute => "m",
            Unit::Hour => "h",
        }
    }
}
