//! Fine-tuned checkpoint discovery.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::info;

use crate::error::{RagError, Result};

static CHECKPOINT_DIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^checkpoint-(\d+)$").expect("valid checkpoint regex"));

fn checkpoint_error(message: String) -> RagError {
    RagError::GenerationError { backend: "checkpoint".to_string(), message }
}

/// Return the `checkpoint-<N>` sub-directory of `base` with the largest `N`.
///
/// Entries that are not directories or whose suffix is not a number are
/// ignored.
///
/// # Errors
///
/// Returns [`RagError::GenerationError`] when `base` cannot be read or holds
/// no numbered checkpoint directory.
pub fn find_latest_checkpoint(base: &Path) -> Result<PathBuf> {
    let entries = std::fs::read_dir(base)
        .map_err(|e| checkpoint_error(format!("cannot read '{}': {e}", base.display())))?;

    let mut latest: Option<(u64, PathBuf)> = None;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(step) = CHECKPOINT_DIR
            .captures(name)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
        else {
            continue;
        };
        if latest.as_ref().is_none_or(|(best, _)| step > *best) {
            latest = Some((step, path));
        }
    }

    let (step, path) = latest.ok_or_else(|| {
        checkpoint_error(format!("no checkpoint directories found in '{}'", base.display()))
    })?;
    info!(step, path = %path.display(), "found latest checkpoint");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_highest_numeric_suffix() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["checkpoint-500", "checkpoint-1200", "checkpoint-90", "checkpoint-final"] {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }
        std::fs::write(dir.path().join("checkpoint-9999"), b"not a dir").unwrap();

        let latest = find_latest_checkpoint(dir.path()).unwrap();
        assert_eq!(latest.file_name().unwrap(), "checkpoint-1200");
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("logs")).unwrap();
        let err = find_latest_checkpoint(dir.path()).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn missing_directory_is_an_error() {
        assert!(find_latest_checkpoint(Path::new("/no/such/lora_model")).is_err());
    }
}
