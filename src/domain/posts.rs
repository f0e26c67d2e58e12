//! Text rules shared by posts and comments.

use super::error::DomainError;

pub const EMPTY_TEXT_MESSAGE: &str = "Please fill in this field correctly.";

/// Reject empty or whitespace-only text, returning the trimmed value otherwise.
pub fn validate_text(field: &'static str, value: &str) -> Result<String, DomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(field, EMPTY_TEXT_MESSAGE));
    }
    Ok(trimmed.to_string())
}
