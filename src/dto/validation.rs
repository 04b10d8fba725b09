//! Validation helpers for DTOs.

use validator::ValidationError;

/// Length of a session join code.
pub const SESSION_CODE_LEN: usize = 6;

/// Validates a player color: a lowercase name (`blue`, `dark-green`) or `#rrggbb`.
///
/// # Examples
///
/// ```ignore
/// validate_color("blue")    // Ok
/// validate_color("#1e90ff") // Ok
/// validate_color("Blue")    // Err - uppercase
/// validate_color("#12345")  // Err - too short
/// ```
pub fn validate_color(color: &str) -> Result<(), ValidationError> {
    if let Some(hex) = color.strip_prefix('#') {
        if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Ok(());
        }
        let mut err = ValidationError::new("color_hex");
        err.message = Some("Hex colors must be written as #rrggbb".into());
        return Err(err);
    }

    let valid_name = !color.is_empty()
        && color.len() <= 32
        && color
            .chars()
            .all(|c| c.is_ascii_lowercase() || c == '-');
    if !valid_name {
        let mut err = ValidationError::new("color_name");
        err.message = Some(
            format!("Color `{color}` must be a lowercase name or a #rrggbb value").into(),
        );
        return Err(err);
    }

    Ok(())
}

/// Validates that a session code is 6 uppercase alphanumeric characters.
pub fn validate_session_code(code: &str) -> Result<(), ValidationError> {
    if code.len() != SESSION_CODE_LEN {
        let mut err = ValidationError::new("session_code_length");
        err.message = Some(
            format!(
                "Session code must be exactly {SESSION_CODE_LEN} characters (got {})",
                code.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        let mut err = ValidationError::new("session_code_format");
        err.message = Some("Session code must contain only uppercase letters and digits".into());
        return Err(err);
    }

    Ok(())
}

/// Rejects identifiers and names that are blank once trimmed.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value must not be blank".into());
        return Err(err);
    }
    Ok(())
}
