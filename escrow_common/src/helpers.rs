use thiserror::Error;

/// Parse a boolean flag from a string value, or return the given default value otherwise.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let value = match value {
        Some(v) => v,
        None => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid phone number: {0}")]
pub struct MsisdnError(String);

/// Normalise a Kenyan mobile number to the canonical `254XXXXXXXXX` form the payment rail expects.
///
/// Accepts `07XXXXXXXX` / `01XXXXXXXX` local forms, `+254...` and bare `254...`, with incidental spaces or dashes.
pub fn normalize_msisdn(input: &str) -> Result<String, MsisdnError> {
    let cleaned: String = input.chars().filter(|c| !matches!(c, ' ' | '-')).collect();
    let cleaned = cleaned.strip_prefix('+').unwrap_or(&cleaned);
    if !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return Err(MsisdnError(format!("{input} contains non-numeric characters")));
    }
    let canonical = if let Some(rest) = cleaned.strip_prefix("254") {
        format!("254{rest}")
    } else if let Some(rest) = cleaned.strip_prefix('0') {
        format!("254{rest}")
    } else {
        return Err(MsisdnError(format!("{input} is not a recognised Kenyan mobile number")));
    };
    if canonical.len() != 12 {
        return Err(MsisdnError(format!("{input} has the wrong number of digits")));
    }
    Ok(canonical)
}
