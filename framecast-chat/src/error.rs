//! Chat error types.

use crate::MAX_NAME_LENGTH;
use thiserror::Error;

/// Reasons a join request is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("name is {len} bytes long, the limit is {max}")]
    NameTooLong { len: usize, max: usize },

    #[error("name \"{0}\" is already taken")]
    NameTaken(String),
}

/// Checks a requested client name. Surrounding whitespace is not trimmed;
/// callers trim user input before sending it.
pub fn validate_name(name: &str) -> Result<(), ChatError> {
    if name.trim().is_empty() {
        return Err(ChatError::EmptyName);
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(ChatError::NameTooLong {
            len: name.len(),
            max: MAX_NAME_LENGTH,
        });
    }
    Ok(())
}
