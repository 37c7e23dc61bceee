use crate::error::{Result, UnsharedFsError};

/// Validate a `--fallback` value. The name becomes a single child of the
/// backing root; anything that could resolve outside it is rejected.
pub fn validate_fallback_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(UnsharedFsError::Config(
            "Fallback directory name cannot be empty".to_string(),
        ));
    }

    if name.contains('/') {
        return Err(UnsharedFsError::Config(format!(
            "Fallback directory name cannot contain '/': {}",
            name
        )));
    }

    if name.contains('\0') {
        return Err(UnsharedFsError::Config(
            "Fallback directory name contains a NUL byte".to_string(),
        ));
    }

    if name == "." || name == ".." {
        return Err(UnsharedFsError::Config(format!(
            "Fallback directory name cannot be '{}'",
            name
        )));
    }

    Ok(())
}
