use regex::Regex;

use crate::error::AppError;

pub const MIN_PASSWORD_LEN: usize = 6;

/// Boundary checks run before any store access, so a malformed submission
/// never reaches redis.
pub fn validate_email(email: &str) -> Result<(), AppError> {
    let re = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();

    if !re.is_match(email) {
        return Err(AppError::validation(
            "email",
            "Please enter a valid email address.",
        ));
    }

    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), AppError> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(
            "password",
            format!("Password should be at least {MIN_PASSWORD_LEN} characters long."),
        ));
    }

    Ok(())
}

pub fn validate_required(field: &'static str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::validation(field, "This field is required."));
    }

    Ok(())
}

/// Complaint ids are stored uppercase; lookups normalize before matching so
/// `grv-2026-001` finds `GRV-2026-001`.
pub fn normalize_complaint_id(id: &str) -> String {
    id.trim().to_uppercase()
}
