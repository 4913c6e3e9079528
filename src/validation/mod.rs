//! Field constraints for note input.
//!
//! Lengths are measured on the trimmed value, in Unicode scalar values.
//! Validation never trims in place; callers trim before storing.

use std::fmt::{Display, Formatter};

pub const TITLE_MAX_CHARS: usize = 200;
pub const CONTENT_MAX_CHARS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    UserId,
    Title,
    Content,
}

impl Display for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::UserId => "userId",
            Self::Title => "title",
            Self::Content => "content",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} is required and must be a non-empty string")]
    MissingOrEmpty(Field),

    #[error("{0} must be {1} characters or less")]
    TooLong(Field, usize),
}

impl ValidationError {
    pub const fn field(&self) -> Field {
        match self {
            Self::MissingOrEmpty(field) | Self::TooLong(field, _) => *field,
        }
    }
}

/// Checks a note's fields in order: user ID, title, content.
///
/// Absent values are passed as empty strings and fail as `MissingOrEmpty`.
pub fn validate(user_id: &str, title: &str, content: &str) -> Result<(), ValidationError> {
    non_empty(Field::UserId, user_id)?;
    let title = non_empty(Field::Title, title)?;
    let content = non_empty(Field::Content, content)?;

    within_limit(Field::Title, title, TITLE_MAX_CHARS)?;
    within_limit(Field::Content, content, CONTENT_MAX_CHARS)?;

    Ok(())
}

fn non_empty(field: Field, value: &str) -> Result<&str, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingOrEmpty(field));
    }
    Ok(trimmed)
}

fn within_limit(field: Field, trimmed: &str, limit: usize) -> Result<(), ValidationError> {
    if trimmed.chars().count() > limit {
        return Err(ValidationError::TooLong(field, limit));
    }
    Ok(())
}
