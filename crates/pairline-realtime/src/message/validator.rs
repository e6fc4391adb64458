//! Message validation rules.

use pairline_core::error::AppError;

/// Validates a raw inbound frame before it is parsed.
pub fn validate_inbound(raw: &str, max_bytes: usize) -> Result<(), AppError> {
    if raw.len() > max_bytes {
        return Err(AppError::validation(format!(
            "Message exceeds maximum size of {max_bytes} bytes"
        )));
    }

    if raw.trim().is_empty() {
        return Err(AppError::validation("Empty message"));
    }

    Ok(())
}

/// Validates and normalises a chat line.
pub fn validate_chat_text(text: &str, max_chars: usize) -> Result<String, AppError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("Chat message is empty"));
    }
    if trimmed.chars().count() > max_chars {
        return Err(AppError::validation(format!(
            "Chat message exceeds {max_chars} characters"
        )));
    }
    Ok(trimmed.to_string())
}
