// Copyright (c) 2026 SC3 Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Path Sanitizer Domain Service
//!
//! Keeps paths declared by agents (diff references in completion artifacts)
//! inside the mission worktree. Lexical checks run before any filesystem
//! access so an escaping path is rejected without probing for its existence.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Worktree containment for agent-declared paths

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathSanitizerError {
    #[error("Path traversal attempt detected: {0}")]
    PathTraversal(String),

    #[error("Absolute path not allowed: {0}")]
    AbsolutePath(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Path outside worktree boundary: {0}")]
    OutsideBoundary(String),

    #[error("Path too long: {0}")]
    PathTooLong(String),
}

/// Validates agent-declared relative paths against a root directory.
///
/// # Guarantees
/// - Rejects absolute paths and `..` components
/// - Rejects empty paths and null bytes
/// - Drops `.` components
/// - After resolution, a canonicalized path must stay under the canonical root
///   (catches symlinks pointing outside)
pub struct PathSanitizer {
    /// Maximum allowed path length (default: 4096)
    max_path_len: usize,
}

impl PathSanitizer {
    pub fn new() -> Self {
        Self { max_path_len: 4096 }
    }

    pub fn with_max_length(max_path_len: usize) -> Self {
        Self { max_path_len }
    }

    /// Lexically normalizes `path` as a location relative to a root.
    ///
    /// # Examples
    /// ```
    /// use sc3_core::domain::path_sanitizer::PathSanitizer;
    /// use std::path::PathBuf;
    ///
    /// let sanitizer = PathSanitizer::new();
    /// assert_eq!(sanitizer.normalize_relative("./src/lib.rs").unwrap(), PathBuf::from("src/lib.rs"));
    /// assert!(sanitizer.normalize_relative("../../etc/passwd").is_err());
    /// ```
    pub fn normalize_relative(&self, path: &str) -> Result<PathBuf, PathSanitizerError> {
        if path.len() > self.max_path_len {
            return Err(PathSanitizerError::PathTooLong(path.to_string()));
        }
        if path.contains('\0') {
            tracing::warn!(path = %path, "Path contains null byte");
            return Err(PathSanitizerError::InvalidPath(path.to_string()));
        }

        let raw = Path::new(path);
        if raw.is_absolute() || path.starts_with('/') || path.starts_with('\\') {
            return Err(PathSanitizerError::AbsolutePath(path.to_string()));
        }

        let mut normalized = PathBuf::new();
        for component in raw.components() {
            match component {
                Component::Normal(part) => normalized.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    tracing::warn!(path = %path, "Path traversal attempt detected: contains '..' component");
                    return Err(PathSanitizerError::PathTraversal(path.to_string()));
                }
                Component::Prefix(_) | Component::RootDir => {
                    return Err(PathSanitizerError::AbsolutePath(path.to_string()));
                }
            }
        }

        if normalized.as_os_str().is_empty() {
            return Err(PathSanitizerError::InvalidPath(path.to_string()));
        }
        Ok(normalized)
    }

    /// Joins a sanitized relative path onto `root` without touching the filesystem.
    pub fn join_within(&self, root: &Path, path: &str) -> Result<PathBuf, PathSanitizerError> {
        Ok(root.join(self.normalize_relative(path)?))
    }

    /// Confirms an existing path resolves strictly inside `root` once symlinks
    /// are followed. Both paths must exist.
    pub fn ensure_contained(&self, root: &Path, candidate: &Path) -> Result<PathBuf, PathSanitizerError> {
        let shown = candidate.display().to_string();
        let canonical_root = root
            .canonicalize()
            .map_err(|_| PathSanitizerError::InvalidPath(root.display().to_string()))?;
        let canonical = candidate
            .canonicalize()
            .map_err(|_| PathSanitizerError::InvalidPath(shown.clone()))?;

        if canonical == canonical_root || !canonical.starts_with(&canonical_root) {
            tracing::warn!(path = %shown, root = %canonical_root.display(), "Path outside worktree boundary detected");
            return Err(PathSanitizerError::OutsideBoundary(shown));
        }
        Ok(canonical)
    }
}

impl Default for PathSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_relative_path() {
        let sanitizer = PathSanitizer::new();
        let result = sanitizer.normalize_relative("src/./lib.rs").unwrap();
        assert_eq!(result, PathBuf::from("src/lib.rs"));
    }

    #[test]
    fn test_reject_parent_dir() {
        let sanitizer = PathSanitizer::new();
        assert!(matches!(
            sanitizer.normalize_relative("../../etc/passwd"),
            Err(PathSanitizerError::PathTraversal(_))
        ));
        assert!(matches!(
            sanitizer.normalize_relative("src/../../x"),
            Err(PathSanitizerError::PathTraversal(_))
        ));
    }

    #[test]
    fn test_reject_absolute() {
        let sanitizer = PathSanitizer::new();
        assert!(matches!(
            sanitizer.normalize_relative("/etc/passwd"),
            Err(PathSanitizerError::AbsolutePath(_))
        ));
    }

    #[test]
    fn test_reject_empty_and_null() {
        let sanitizer = PathSanitizer::new();
        assert!(sanitizer.normalize_relative(".").is_err());
        assert!(sanitizer.normalize_relative("a\0b").is_err());
    }

    #[test]
    fn test_path_too_long() {
        let sanitizer = PathSanitizer::with_max_length(10);
        assert!(matches!(
            sanitizer.normalize_relative("very/long/path/that/exceeds"),
            Err(PathSanitizerError::PathTooLong(_))
        ));
    }

    #[test]
    fn test_ensure_contained() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, "x").unwrap();

        let sanitizer = PathSanitizer::new();
        assert!(sanitizer.ensure_contained(dir.path(), &file).is_ok());
        assert!(matches!(
            sanitizer.ensure_contained(dir.path(), dir.path()),
            Err(PathSanitizerError::OutsideBoundary(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_rejected() {
        let outside = tempfile::tempdir().unwrap();
        let target = outside.path().join("secret.txt");
        std::fs::write(&target, "x").unwrap();

        let root = tempfile::tempdir().unwrap();
        let link = root.path().join("link.txt");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let sanitizer = PathSanitizer::new();
        assert!(matches!(
            sanitizer.ensure_contained(root.path(), &link),
            Err(PathSanitizerError::OutsideBoundary(_))
        ));
    }
}
