//! Path helpers shared by configuration consumers.

use std::path::{Path, PathBuf};

/// Resolve a directory path against the current working directory.
///
/// Relative paths stay relative in meaning; the result is just absolute.
/// Falls back to the input when the working directory is unavailable.
pub fn normalize_dir_path(path: &str) -> String {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        return path.to_string();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd
            .join(candidate.strip_prefix("./").unwrap_or(candidate))
            .to_string_lossy()
            .into_owned(),
        Err(_) => path.to_string(),
    }
}

/// Create a directory (and parents) if it does not exist.
pub fn ensure_dir(path: &str) -> std::io::Result<PathBuf> {
    let dir = PathBuf::from(path);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
