use crate::models::generation::ValidationResult;

pub const MAX_MESSAGE_LENGTH: usize = 4000;
pub const MIN_MESSAGE_LENGTH: usize = 1;
pub const MIN_API_KEY_LENGTH: usize = 10;

pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";

/// Lengths are counted in Unicode scalar values.
pub fn validate_message(message: &str) -> ValidationResult {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return ValidationResult::invalid("Message cannot be empty");
    }

    if message.chars().count() > MAX_MESSAGE_LENGTH {
        return ValidationResult::invalid(
            format!("Message too long. Maximum {} characters allowed.", MAX_MESSAGE_LENGTH)
        );
    }

    if trimmed.chars().count() < MIN_MESSAGE_LENGTH {
        return ValidationResult::invalid("Message too short");
    }

    ValidationResult::ok()
}

/// Format-only check; the remote endpoint is never contacted.
pub fn validate_api_key(api_key: Option<&str>) -> ValidationResult {
    let key = match api_key {
        Some(k) if !k.is_empty() => k,
        _ => {
            return ValidationResult::invalid(
                format!(
                    "API key not configured. Please set {} in your environment variables.",
                    API_KEY_ENV
                )
            );
        }
    };

    if key.chars().count() < MIN_API_KEY_LENGTH {
        return ValidationResult::invalid("Invalid API key format");
    }

    ValidationResult::ok()
}
