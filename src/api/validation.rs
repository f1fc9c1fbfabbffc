use super::ApiError;

const MAX_NAME_LEN: usize = 64;

pub fn validate_username(username: &str) -> Result<&str, ApiError> {
    let trimmed = username.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation("Username is required"));
    }

    if trimmed.len() > MAX_NAME_LEN {
        return Err(ApiError::validation(format!(
            "Username must be {MAX_NAME_LEN} characters or less"
        )));
    }

    if !trimmed
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(ApiError::validation(
            "Username can only contain letters, numbers, dots, hyphens, and underscores",
        ));
    }

    Ok(trimmed)
}

pub fn validate_password(password: &str) -> Result<&str, ApiError> {
    if password.is_empty() {
        return Err(ApiError::validation("Password is required"));
    }
    Ok(password)
}

/// Email is optional; a blank value counts as absent.
pub fn validate_email(email: Option<&str>) -> Result<Option<String>, ApiError> {
    let Some(email) = email.map(str::trim).filter(|e| !e.is_empty()) else {
        return Ok(None);
    };

    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid {
        return Err(ApiError::validation(format!("Invalid email address: {email}")));
    }

    Ok(Some(email.to_string()))
}

/// Group, tag and VM record names.
pub fn validate_name<'a>(kind: &str, name: &'a str) -> Result<&'a str, ApiError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation(format!("{kind} name is required")));
    }

    if trimmed.len() > MAX_NAME_LEN {
        return Err(ApiError::validation(format!(
            "{kind} name must be {MAX_NAME_LEN} characters or less"
        )));
    }

    if trimmed.chars().any(char::is_control) {
        return Err(ApiError::validation(format!(
            "{kind} name cannot contain control characters"
        )));
    }

    Ok(trimmed)
}

pub fn validate_required<'a>(field: &str, value: &'a str) -> Result<&'a str, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation(format!("{field} is required")));
    }
    Ok(trimmed)
}
