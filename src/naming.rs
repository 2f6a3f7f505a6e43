//! Repository name / tag validation (§6 "Name/tag constraints")
//!
//! Violations fail before any HTTP call, per §7 bucket 1 (client-side
//! validation, never retried).

use crate::error::{PusherError, Result};

/// `[a-z0-9]+(?:[._-][a-z0-9]+)*`, one or more components separated by `/`.
pub fn validate_repository(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(PusherError::Validation("repository name is empty".to_string()));
    }
    for component in name.split('/') {
        if !is_valid_repository_component(component) {
            return Err(PusherError::Validation(format!(
                "invalid repository name component: {:?}",
                component
            )));
        }
    }
    Ok(())
}

fn is_valid_repository_component(component: &str) -> bool {
    let mut chars = component.chars().peekable();
    let mut saw_any = false;
    loop {
        let mut run_len = 0;
        while let Some(&c) = chars.peek() {
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                run_len += 1;
                chars.next();
            } else {
                break;
            }
        }
        if run_len == 0 {
            return false;
        }
        saw_any = true;
        match chars.peek() {
            None => break,
            Some(&c) if c == '.' || c == '_' || c == '-' => {
                chars.next();
            }
            Some(_) => return false,
        }
    }
    saw_any
}

/// `[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}`.
pub fn validate_tag(tag: &str) -> Result<()> {
    if tag.is_empty() || tag.len() > 128 {
        return Err(PusherError::Validation(format!("tag length out of range: {:?}", tag)));
    }
    let mut chars = tag.chars();
    let first = chars.next().unwrap();
    if !(first.is_ascii_alphanumeric() || first == '_') {
        return Err(PusherError::Validation(format!("tag must start with alnum or '_': {:?}", tag)));
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-') {
        return Err(PusherError::Validation(format!("invalid tag: {:?}", tag)));
    }
    Ok(())
}

/// A reference is either a tag or a digest (`crate::digest::Digest::parse`
/// accepts the latter).
pub fn validate_reference(reference: &str) -> Result<()> {
    if crate::digest::Digest::parse(reference).is_ok() {
        return Ok(());
    }
    validate_tag(reference)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_simple_repository() {
        assert!(validate_repository("app").is_ok());
        assert!(validate_repository("library/nginx").is_ok());
        assert!(validate_repository("my.org/team-a/app_1").is_ok());
    }

    #[test]
    fn rejects_uppercase_and_empty_components() {
        assert!(validate_repository("App").is_err());
        assert!(validate_repository("library//nginx").is_err());
        assert!(validate_repository("").is_err());
    }

    #[test]
    fn accepts_and_rejects_tags() {
        assert!(validate_tag("latest").is_ok());
        assert!(validate_tag("v1.0.0").is_ok());
        assert!(validate_tag("_underscore_start").is_ok());
        assert!(validate_tag(".starts-with-dot").is_err());
        assert!(validate_tag(&"a".repeat(129)).is_err());
    }

    #[test]
    fn reference_accepts_digest_or_tag() {
        let digest = crate::digest::Digest::compute(b"x").to_string();
        assert!(validate_reference(&digest).is_ok());
        assert!(validate_reference("latest").is_ok());
    }
}
