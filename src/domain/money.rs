use thiserror::Error;

/// Balances are kept as signed integer cents, so 12.50 is stored as 1250.
pub type Cents = i64;

/// Example: 1250 -> "12.50", -5 -> "-0.05"
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Parse a signed decimal amount. Digits past the second decimal are dropped.
/// Example: "12.5" -> 1250, "-3" -> -300, "+0.07" -> 7
pub fn parse_cents(input: &str) -> Result<Cents, ParseCentsError> {
    let input = input.trim();
    let (negative, digits) = match input.as_bytes().first() {
        Some(b'-') => (true, &input[1..]),
        Some(b'+') => (false, &input[1..]),
        _ => (false, input),
    };

    let (units, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    if units.is_empty() && fraction.is_empty() {
        return Err(ParseCentsError::InvalidFormat(input.to_string()));
    }
    if !units.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return Err(ParseCentsError::InvalidFormat(input.to_string()));
    }

    let units: i64 = if units.is_empty() {
        0
    } else {
        units
            .parse()
            .map_err(|_| ParseCentsError::InvalidFormat(input.to_string()))?
    };
    let fraction: String = fraction.chars().chain("00".chars()).take(2).collect();
    let fraction: i64 = fraction
        .parse()
        .map_err(|_| ParseCentsError::InvalidFormat(input.to_string()))?;

    let cents = units
        .checked_mul(100)
        .and_then(|c| c.checked_add(fraction))
        .ok_or_else(|| ParseCentsError::InvalidFormat(input.to_string()))?;

    Ok(if negative { -cents } else { cents })
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseCentsError {
    #[error("invalid money format: {0}")]
    InvalidFormat(String),
}
