//! Validation functions for subscription path components.

use crate::error::ValidationError;
use crate::Result;

/// Project validation: a project number, or a 6-30 char project id.
pub fn validate_project(project: &str) -> Result<()> {
    if project.is_empty() {
        return Err(ValidationError::InvalidProject("Project must not be empty".to_string()).into());
    }

    if project.chars().all(|ch| ch.is_ascii_digit()) {
        return Ok(());
    }

    if project.len() < 6 || project.len() > 30 {
        return Err(ValidationError::InvalidProject(format!(
            "Project ID must be 6-30 characters, got {}",
            project.len()
        ))
        .into());
    }

    for ch in project.chars() {
        if !matches!(ch, 'a'..='z' | '0'..='9' | '-') {
            return Err(ValidationError::InvalidProject(format!(
                "Project ID contains invalid character: '{}'",
                ch
            ))
            .into());
        }
    }

    Ok(())
}

/// Zone validation: a single lowercase letter.
pub fn validate_zone(zone: &str) -> Result<char> {
    let mut chars = zone.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) if ch.is_ascii_lowercase() => Ok(ch),
        _ => Err(ValidationError::InvalidLocation(format!(
            "Zone must be a single lowercase letter, got '{}'",
            zone
        ))
        .into()),
    }
}

/// Subscription ID validation (1-255 chars, must start with a letter).
pub fn validate_subscription_id(subscription_id: &str) -> Result<()> {
    if subscription_id.is_empty() || subscription_id.len() > 255 {
        return Err(ValidationError::InvalidSubscriptionId(format!(
            "Subscription ID must be 1-255 characters, got {}",
            subscription_id.len()
        ))
        .into());
    }

    if let Some(first) = subscription_id.chars().next() {
        if !first.is_ascii_alphabetic() {
            return Err(ValidationError::InvalidSubscriptionId(
                "Subscription ID must start with a letter".to_string(),
            )
            .into());
        }
    }

    for ch in subscription_id.chars() {
        if !ch.is_ascii_alphanumeric() && !matches!(ch, '-' | '_' | '.' | '~' | '+' | '%') {
            return Err(ValidationError::InvalidSubscriptionId(format!(
                "Subscription ID contains invalid character: '{}'",
                ch
            ))
            .into());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_validation() {
        assert!(validate_project("123").is_ok());
        assert!(validate_project("my-project-1").is_ok());

        assert!(validate_project("").is_err());
        assert!(validate_project("short").is_err());
        assert!(validate_project("My_Project").is_err());
    }

    #[test]
    fn test_zone_validation() {
        assert_eq!(validate_zone("a").unwrap(), 'a');
        assert!(validate_zone("").is_err());
        assert!(validate_zone("A").is_err());
        assert!(validate_zone("ab").is_err());
        assert!(validate_zone("1").is_err());
    }

    #[test]
    fn test_subscription_id_validation() {
        assert!(validate_subscription_id("s").is_ok());
        assert!(validate_subscription_id("my_subscription").is_ok());
        assert!(validate_subscription_id("tx-events.v2").is_ok());

        assert!(validate_subscription_id("").is_err());
        assert!(validate_subscription_id(&"a".repeat(256)).is_err());
        assert!(validate_subscription_id("1sub").is_err());
        assert!(validate_subscription_id("my sub").is_err());
    }
}
