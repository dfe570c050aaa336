// SPDX-License-Identifier: MIT OR Apache-2.0

//! Utility functions for docqa

use std::path::{Path, PathBuf};

/// The name of the index directory
pub const INDEX_DIR: &str = ".docqa";

/// Uploaded files are staged here (inside the index directory) while ingested.
pub const UPLOADS_DIR: &str = "uploads";

/// Result of finding an index root
#[derive(Debug)]
pub struct IndexRoot {
    /// The directory containing the .docqa folder
    pub root: PathBuf,
    /// The full path to the .docqa folder
    pub index_path: PathBuf,
    /// Whether this is the current directory or a parent
    pub is_parent: bool,
}

/// Find the nearest .docqa index directory by walking up from the given path.
/// Returns None if no .docqa directory is found.
pub fn find_index_root(start: impl AsRef<Path>) -> Option<IndexRoot> {
    let mut current = start.as_ref().to_path_buf();

    if let Ok(canonical) = current.canonicalize() {
        current = canonical;
    }

    let original = current.clone();

    loop {
        let index_path = current.join(INDEX_DIR);
        if index_path.is_dir() {
            return Some(IndexRoot {
                root: current.clone(),
                index_path,
                is_parent: current != original,
            });
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Get the index path for the given directory, walking up to find parent indexes.
/// Falls back to `<path>/.docqa` if no index is found anywhere.
pub fn get_index_path(path: impl AsRef<Path>) -> PathBuf {
    match find_index_root(&path) {
        Some(root) => root.index_path,
        None => path.as_ref().join(INDEX_DIR),
    }
}

/// Picks the index directory: explicit flag, then config, then discovery from `cwd`.
pub fn resolve_index_dir(explicit: Option<&Path>, configured: Option<&Path>, cwd: &Path) -> PathBuf {
    if let Some(dir) = explicit.or(configured) {
        if dir.is_absolute() {
            return dir.to_path_buf();
        }
        return cwd.join(dir);
    }
    get_index_path(cwd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn find_index_root_in_current_dir() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(INDEX_DIR)).unwrap();

        let result = find_index_root(dir.path()).unwrap();
        assert_eq!(result.root, dir.path().canonicalize().unwrap());
        assert!(!result.is_parent);
    }

    #[test]
    fn find_index_root_in_parent() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(INDEX_DIR)).unwrap();

        let subdir = dir.path().join("subdir");
        fs::create_dir(&subdir).unwrap();

        let result = find_index_root(&subdir).unwrap();
        assert_eq!(result.root, dir.path().canonicalize().unwrap());
        assert!(result.is_parent);
    }

    #[test]
    fn get_index_path_fallback() {
        let dir = TempDir::new().unwrap();
        let path = get_index_path(dir.path());
        assert_eq!(path, dir.path().join(INDEX_DIR));
    }

    #[test]
    fn resolve_index_dir_precedence() {
        let dir = TempDir::new().unwrap();
        let cwd = dir.path();

        assert_eq!(
            resolve_index_dir(Some(Path::new("flag")), Some(Path::new("conf")), cwd),
            cwd.join("flag")
        );
        assert_eq!(
            resolve_index_dir(None, Some(Path::new("/abs/conf")), cwd),
            PathBuf::from("/abs/conf")
        );
        assert_eq!(resolve_index_dir(None, None, cwd), cwd.join(INDEX_DIR));
    }
}
