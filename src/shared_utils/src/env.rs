use std::path::PathBuf;

use thiserror::Error;

/// An environment variable required by the application is not set.
#[derive(Debug, Error)]
#[error("Missing environment variable: {0}")]
pub struct MissingEnvVarError(pub String);

/// Reads an environment variable, returning a structured error if it's missing.
///
/// A variable that is set but blank counts as missing, so `FOO= cmd` behaves
/// the same as leaving `FOO` unset.
///
/// # Arguments
/// * `name` - The name of the environment variable to read.
pub fn get_env_var(name: &str) -> Result<String, MissingEnvVarError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(MissingEnvVarError(name.to_string())),
    }
}

/// Reads an environment variable holding a filesystem path.
pub fn get_env_path(name: &str) -> Result<PathBuf, MissingEnvVarError> {
    get_env_var(name).map(|value| PathBuf::from(value.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_variable_is_reported_by_name() {
        let err = get_env_var("SHARED_UTILS_SURELY_UNSET_VARIABLE").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing environment variable: SHARED_UTILS_SURELY_UNSET_VARIABLE"
        );
    }

    #[test]
    fn path_lookup_shares_the_missing_error() {
        let err = get_env_path("SHARED_UTILS_SURELY_UNSET_PATH").unwrap_err();
        assert_eq!(err.0, "SHARED_UTILS_SURELY_UNSET_PATH");
    }
}
