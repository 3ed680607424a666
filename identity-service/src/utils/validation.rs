//! Request validation helpers used by the handler DTOs.

use validator::ValidationError;

/// Minimum accepted password length for registration and reset.
pub const PASSWORD_MIN_LENGTH: usize = 8;

/// Password strength rule: length, one letter, one digit.
pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    if password.len() < PASSWORD_MIN_LENGTH {
        return Err(ValidationError::new("password_too_short"));
    }
    if !password.chars().any(|c| c.is_ascii_alphabetic()) {
        return Err(ValidationError::new("password_needs_letter"));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(ValidationError::new("password_needs_digit"));
    }
    Ok(())
}

/// Mobile numbers are stored in E.164 form.
pub fn validate_mobile(mobile: &str) -> Result<(), ValidationError> {
    let mut chars = mobile.chars();
    if chars.next() != Some('+') {
        return Err(ValidationError::new("mobile_not_e164"));
    }
    let digits: Vec<char> = chars.collect();
    if digits.len() < 7 || digits.len() > 15 || !digits.iter().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::new("mobile_not_e164"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strong_password_passes() {
        assert!(validate_password_strength("s3cure-enough").is_ok());
    }

    #[test]
    fn short_password_fails() {
        assert!(validate_password_strength("ab1").is_err());
    }

    #[test]
    fn all_letters_fails() {
        assert!(validate_password_strength("onlyletters").is_err());
    }

    #[test]
    fn all_digits_fails() {
        assert!(validate_password_strength("1234567890").is_err());
    }

    #[test]
    fn mobile_formats() {
        assert!(validate_mobile("+14155550123").is_ok());
        assert!(validate_mobile("14155550123").is_err());
        assert!(validate_mobile("+1-415-555").is_err());
        assert!(validate_mobile("+12").is_err());
    }
}
