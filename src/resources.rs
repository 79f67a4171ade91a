//! Discovery of the versioned resource directory shipped next to the binary.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Descriptor file expected in every resource directory.
const INFO_FILE: &str = "info.json";

#[derive(Debug, Error)]
pub enum ResourceError {
  #[error("not a directory")]
  NotADirectory,

  #[error("wrong version: {0}")]
  WrongVersion(String),

  #[error("not a resource directory")]
  NotAResourceDirectory,

  #[error("{0}")]
  Io(#[from] std::io::Error),

  #[error("invalid info.json: {0}")]
  InvalidInfo(#[from] serde_json::Error),

  #[error("resource directory not found")]
  NotFoundInSearchPath,
}

#[derive(Debug, Deserialize)]
struct ResourceInfo {
  #[serde(default)]
  info: String,
  #[serde(default)]
  version: String,
}

/// Check that `dir` holds the resources called `name` in exactly `version`.
pub fn check_resource_dir(dir: &Path, name: &str, version: &str) -> Result<(), ResourceError> {
  let metadata = std::fs::metadata(dir)?;
  if !metadata.is_dir() {
    return Err(ResourceError::NotADirectory);
  }

  let contents = std::fs::read(dir.join(INFO_FILE))?;
  let info: ResourceInfo = serde_json::from_slice(&contents)?;

  if info.version != version {
    return Err(ResourceError::WrongVersion(info.version));
  }
  if info.info != format!("{} resource files", name) {
    return Err(ResourceError::NotAResourceDirectory);
  }

  Ok(())
}

/// Directories searched for resources, relative to the executable's directory.
pub fn candidate_dirs(exe_dir: &Path, name: &str) -> Vec<PathBuf> {
  vec![
    exe_dir.join("share").join(name),
    exe_dir.join("..").join("share").join(name),
    exe_dir.join("rsc"),
    exe_dir.join("resources"),
    exe_dir.to_path_buf(),
  ]
}

/// Return the first of `candidates` that passes [`check_resource_dir`].
///
/// When none does, the reason each candidate was rejected is logged.
pub fn find_resource_dir_in(
  candidates: &[PathBuf],
  name: &str,
  version: &str,
) -> Result<PathBuf, ResourceError> {
  let mut rejected = Vec::with_capacity(candidates.len());

  for dir in candidates {
    match check_resource_dir(dir, name, version) {
      Ok(()) => {
        debug!(dir = %dir.display(), name, version, "found resource directory");
        return Ok(dir.clone());
      }
      Err(e) => rejected.push((dir, e)),
    }
  }

  for (dir, reason) in rejected {
    warn!(dir = %dir.display(), reason = %reason, "no resource directory at location");
  }
  Err(ResourceError::NotFoundInSearchPath)
}

/// Locate the resource directory for `name` and `version` next to the
/// running executable.
pub fn find_resource_dir(name: &str, version: &str) -> Result<PathBuf, ResourceError> {
  let exe = std::env::current_exe()?;
  let exe_dir = exe.parent().ok_or(ResourceError::NotFoundInSearchPath)?;
  find_resource_dir_in(&candidate_dirs(exe_dir, name), name, version)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn write_info(dir: &Path, info: &str, version: &str) {
    std::fs::create_dir_all(dir).unwrap();
    let body = serde_json::json!({ "info": info, "version": version });
    std::fs::write(dir.join(INFO_FILE), body.to_string()).unwrap();
  }

  #[test]
  fn test_accepts_matching_directory() {
    let tmp = tempfile::tempdir().unwrap();
    write_info(tmp.path(), "ledger resource files", "1.2");

    assert!(check_resource_dir(tmp.path(), "ledger", "1.2").is_ok());
  }

  #[test]
  fn test_rejects_wrong_version() {
    let tmp = tempfile::tempdir().unwrap();
    write_info(tmp.path(), "ledger resource files", "1.1");

    let err = check_resource_dir(tmp.path(), "ledger", "1.2").unwrap_err();
    assert!(matches!(err, ResourceError::WrongVersion(v) if v == "1.1"));
  }

  #[test]
  fn test_rejects_other_resource_name() {
    let tmp = tempfile::tempdir().unwrap();
    write_info(tmp.path(), "blender resource files", "1.2");

    let err = check_resource_dir(tmp.path(), "ledger", "1.2").unwrap_err();
    assert!(matches!(err, ResourceError::NotAResourceDirectory));
  }

  #[test]
  fn test_rejects_file_and_missing_info() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("plain");
    std::fs::write(&file, "x").unwrap();

    assert!(matches!(
      check_resource_dir(&file, "ledger", "1"),
      Err(ResourceError::NotADirectory)
    ));
    assert!(matches!(
      check_resource_dir(tmp.path(), "ledger", "1"),
      Err(ResourceError::Io(_))
    ));
  }

  #[test]
  fn test_rejects_malformed_info() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join(INFO_FILE), "{not json").unwrap();

    assert!(matches!(
      check_resource_dir(tmp.path(), "ledger", "1"),
      Err(ResourceError::InvalidInfo(_))
    ));
  }

  #[test]
  fn test_first_match_wins() {
    let tmp = tempfile::tempdir().unwrap();
    let candidates = candidate_dirs(tmp.path(), "ledger");
    write_info(&candidates[2], "ledger resource files", "2");
    write_info(&candidates[3], "ledger resource files", "2");

    let found = find_resource_dir_in(&candidates, "ledger", "2").unwrap();
    assert_eq!(found, tmp.path().join("rsc"));
  }

  #[test]
  fn test_not_found_in_search_path() {
    let tmp = tempfile::tempdir().unwrap();
    let candidates = candidate_dirs(tmp.path(), "ledger");

    assert!(matches!(
      find_resource_dir_in(&candidates, "ledger", "2"),
      Err(ResourceError::NotFoundInSearchPath)
    ));
  }
}
