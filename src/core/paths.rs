// src/core/paths.rs

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Could not expand path '{template}': {reason}")]
    Expansion { template: String, reason: String },
}

/// Expands `~` and environment variables (`$VAR`, `${VAR}`) in `template`.
/// Relative results are anchored at `base`.
pub fn expand_path(template: &str, base: &Path) -> Result<PathBuf, PathError> {
    let expanded = shellexpand::full(template).map_err(|e| PathError::Expansion {
        template: template.to_string(),
        reason: e.to_string(),
    })?;
    let path = PathBuf::from(expanded.into_owned());
    let absolute = if path.is_absolute() { path } else { base.join(path) };
    Ok(dunce::simplified(&absolute).to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_paths_are_anchored() {
        let base = Path::new("/work/project");
        assert_eq!(expand_path("templates", base).unwrap(), base.join("templates"));
        assert_eq!(expand_path("/abs/dir", base).unwrap(), PathBuf::from("/abs/dir"));
    }

    #[test]
    fn test_unset_variables_are_errors() {
        assert!(matches!(
            expand_path("$ADDERKIT_PATHS_UNSET_VARIABLE/x", Path::new("/")),
            Err(PathError::Expansion { .. })
        ));
    }
}
