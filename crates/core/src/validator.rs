//! Canonicalizes a candidate working directory and checks it against an
//! allowlist of absolute paths.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::ValidatorError;

pub struct WorkingDirValidator {
    allowed: RwLock<Vec<PathBuf>>,
}

impl WorkingDirValidator {
    pub fn new(allowed: Vec<String>) -> Self {
        Self {
            allowed: RwLock::new(allowed.into_iter().map(PathBuf::from).collect()),
        }
    }

    /// Hot-swap the allowlist. Safe to call concurrently with `validate`.
    pub fn set_allowed_dirs(&self, dirs: Vec<String>) {
        let mut guard = self.allowed.write().expect("allowlist lock poisoned");
        *guard = dirs.into_iter().map(PathBuf::from).collect();
    }

    pub fn allowed_dirs(&self) -> Vec<PathBuf> {
        self.allowed.read().expect("allowlist lock poisoned").clone()
    }

    /// Canonicalize `candidate` and verify it is the allowlist itself, or a
    /// descendant of one of its entries.
    pub fn validate(&self, candidate: &str) -> Result<PathBuf, ValidatorError> {
        if candidate.trim().is_empty() {
            return Err(ValidatorError::EmptyPath);
        }

        let allowed = self.allowed_dirs();
        if allowed.is_empty() {
            return Err(ValidatorError::EmptyAllowlist);
        }

        let canonical_candidate = canonicalize_longest_existing_prefix(Path::new(candidate))?;

        for entry in &allowed {
            let Ok(canonical_entry) = canonicalize_longest_existing_prefix(entry) else {
                continue;
            };
            // `Path::starts_with` compares whole components, so `/tmp-evil`
            // never starts_with `/tmp` — this is the component-safe check
            // the validator requires.
            if canonical_candidate.starts_with(&canonical_entry) {
                return Ok(canonical_candidate);
            }
        }

        Err(ValidatorError::NotAllowed {
            path: candidate.to_string(),
        })
    }
}

/// Resolve symlinks for the longest prefix of `path` that exists on disk,
/// then re-append any trailing components that do not yet exist (so the
/// agent may create them).
fn canonicalize_longest_existing_prefix(path: &Path) -> Result<PathBuf, ValidatorError> {
    let mut trailing: Vec<std::ffi::OsString> = Vec::new();
    let mut existing = path;

    loop {
        if existing.as_os_str().is_empty() {
            return Err(ValidatorError::Unresolvable {
                path: path.display().to_string(),
                reason: "no existing prefix".into(),
            });
        }
        if existing.exists() {
            break;
        }
        match existing.file_name() {
            Some(name) => {
                trailing.push(name.to_os_string());
                existing = existing.parent().unwrap_or(Path::new(""));
            }
            None => {
                return Err(ValidatorError::Unresolvable {
                    path: path.display().to_string(),
                    reason: "no existing prefix".into(),
                })
            }
        }
    }

    let mut canonical = std::fs::canonicalize(existing).map_err(|e| ValidatorError::Unresolvable {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    for part in trailing.into_iter().rev() {
        canonical.push(part);
    }
    Ok(canonical)
}
