use crate::error::{Error, Result};

const MAX_NAMESPACE_NAME_LEN: usize = 64;
const MAX_TEAM_NAME_LEN: usize = 64;
const MAX_REPO_NAME_LEN: usize = 100;

fn is_valid_name_char(c: char, allow_period: bool) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || (allow_period && c == '.')
}

fn validate_name(
    name: &str,
    entity: &str,
    max_len: usize,
    allow_period: bool,
    forbid_leading_special: bool,
) -> Result<()> {
    if name.is_empty() {
        return Err(Error::BadRequest(format!("{entity} name cannot be empty")));
    }
    if name.len() > max_len {
        return Err(Error::BadRequest(format!(
            "{entity} name cannot exceed {max_len} characters"
        )));
    }
    if !name.chars().all(|c| is_valid_name_char(c, allow_period)) {
        let mut allowed = "alphanumeric characters, hyphens, and underscores".to_string();
        if allow_period {
            allowed.push_str(", and periods");
        }
        return Err(Error::BadRequest(format!(
            "{entity} name can only contain {allowed}"
        )));
    }
    if forbid_leading_special && (name.starts_with('-') || name.starts_with('_')) {
        return Err(Error::BadRequest(format!(
            "{entity} name cannot start with a hyphen or underscore"
        )));
    }
    Ok(())
}

/// User and organization names share one namespace and one rule set.
pub fn validate_namespace_name(name: &str) -> Result<()> {
    validate_name(name, "Namespace", MAX_NAMESPACE_NAME_LEN, false, true)
}

pub fn validate_team_name(name: &str) -> Result<()> {
    validate_name(name, "Team", MAX_TEAM_NAME_LEN, false, true)
}

pub fn validate_repo_name(name: &str) -> Result<()> {
    validate_name(name, "Repository", MAX_REPO_NAME_LEN, true, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_names() {
        assert!(validate_namespace_name("acme").is_ok());
        assert!(validate_namespace_name("acme-corp_2").is_ok());
        assert!(validate_namespace_name("").is_err());
        assert!(validate_namespace_name("-acme").is_err());
        assert!(validate_namespace_name("acme.io").is_err());
        assert!(validate_namespace_name(&"a".repeat(64)).is_ok());
        assert!(validate_namespace_name(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_repo_names() {
        assert!(validate_repo_name("dotfiles").is_ok());
        assert!(validate_repo_name("site.github.io").is_ok());
        assert!(validate_repo_name("_private").is_ok());
        assert!(validate_repo_name("a/b").is_err());
        assert!(validate_repo_name(&"r".repeat(101)).is_err());
    }

    #[test]
    fn test_error_kind() {
        assert!(matches!(
            validate_team_name("bad name"),
            Err(Error::BadRequest(_))
        ));
    }
}
