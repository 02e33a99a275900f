//! Checks run before any pipeline touches the agent.

use std::path::Path;

use crate::error::{ForgeError, Result};

pub const CREDENTIAL_VARS: &[&str] = &["CLAUDE_CODE_OAUTH_TOKEN", "ANTHROPIC_API_KEY"];

/// Fails unless one of [`CREDENTIAL_VARS`] is set to a non-empty value.
/// `lookup` is usually `|k| std::env::var(k).ok()`.
pub fn check_credentials<F>(lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let found = CREDENTIAL_VARS
        .iter()
        .copied()
        .any(|var| lookup(var).is_some_and(|v| !v.trim().is_empty()));
    if found {
        Ok(())
    } else {
        Err(ForgeError::MissingCredential(CREDENTIAL_VARS.join(" or ")))
    }
}

pub fn check_project(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        Ok(())
    } else {
        Err(ForgeError::ProjectNotFound(dir.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn either_credential_is_enough() {
        assert!(check_credentials(|k| (k == "ANTHROPIC_API_KEY").then(|| "sk".to_string())).is_ok());
        assert!(
            check_credentials(|k| (k == "CLAUDE_CODE_OAUTH_TOKEN").then(|| "tok".to_string()))
                .is_ok()
        );
    }

    #[test]
    fn blank_or_missing_credentials_fail() {
        let err = check_credentials(|_| Some("  ".to_string())).unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing credential: set CLAUDE_CODE_OAUTH_TOKEN or ANTHROPIC_API_KEY"
        );
        assert!(check_credentials(|_| None).is_err());
    }

    #[test]
    fn project_must_exist() {
        assert!(check_project(Path::new("/definitely/not/here")).is_err());
        assert!(check_project(&std::env::temp_dir()).is_ok());
    }
}
