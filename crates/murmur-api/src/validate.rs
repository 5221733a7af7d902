//! Input checks applied before anything reaches the store.

use crate::error::ApiError;

const USERNAME_LEN: (usize, usize) = (3, 16);
const GROUP_NAME_LEN: (usize, usize) = (3, 30);
const SEARCH_LEN: (usize, usize) = (1, 16);
const MAX_EMOJI_BYTES: usize = 16;

fn word(field: &str, value: &str, (min, max): (usize, usize)) -> Result<(), ApiError> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(ApiError::BadRequest(format!(
            "{} must be between {} and {} characters",
            field, min, max
        )));
    }
    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ApiError::BadRequest(format!(
            "{} may only contain letters, digits and underscores",
            field
        )));
    }
    Ok(())
}

pub fn username(value: &str) -> Result<(), ApiError> {
    word("username", value, USERNAME_LEN)
}

pub fn group_name(value: &str) -> Result<(), ApiError> {
    word("group name", value, GROUP_NAME_LEN)
}

pub fn search_prefix(value: &str) -> Result<(), ApiError> {
    word("search", value, SEARCH_LEN)
}

pub fn emoji(value: &str) -> Result<(), ApiError> {
    if value.is_empty() || value.len() > MAX_EMOJI_BYTES {
        return Err(ApiError::BadRequest("invalid emoji".into()));
    }
    Ok(())
}

pub fn text(value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest("message content must not be empty".into()));
    }
    Ok(())
}
