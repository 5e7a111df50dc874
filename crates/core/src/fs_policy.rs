//! Filesystem containment policy.
//!
//! Every caller-supplied path is interpreted relative to a fixed workspace
//! root. [`WorkspaceRoot`] normalizes such paths lexically and rejects any
//! input that is absolute or that would climb out of the root, before any
//! filesystem or container operation sees it.

use crate::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// The containment boundary for all path arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceRoot {
    root: PathBuf,
}

impl WorkspaceRoot {
    /// Create a containment root. The path must be absolute.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_absolute() {
            return Err(Error::internal(format!(
                "Workspace root must be absolute: {}",
                root.display()
            )));
        }
        Ok(Self {
            root: lexical_clean(&root),
        })
    }

    /// The absolute root path.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Normalize `input` into a path relative to the root.
    ///
    /// The result may be empty when `input` names the root itself.
    pub fn relative(&self, input: &str) -> Result<PathBuf> {
        if input.contains('\0') {
            return Err(Error::path_escape(format!(
                "NUL byte in path: {:?}",
                input
            )));
        }

        // Reject Windows-style absolute paths on any OS
        let bytes = input.as_bytes();
        if (bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic())
            || input.starts_with("\\\\")
        {
            return Err(Error::path_escape(format!(
                "Absolute paths are not allowed: {}",
                input
            )));
        }

        let mut normalized = PathBuf::new();
        for component in Path::new(input).components() {
            match component {
                Component::Normal(c) => normalized.push(c),
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(Error::path_escape(format!(
                            "Path traversal detected: {}",
                            input
                        )));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(Error::path_escape(format!(
                        "Absolute paths are not allowed: {}",
                        input
                    )));
                }
                Component::CurDir => {}
            }
        }

        Ok(normalized)
    }

    /// Resolve `input` to an absolute path that is a proper descendant of the root.
    pub fn resolve(&self, input: &str) -> Result<PathBuf> {
        let relative = self.relative(input)?;
        if relative.as_os_str().is_empty() {
            return Err(Error::path_escape(format!(
                "Path does not name an entry inside the workspace: {:?}",
                input
            )));
        }
        self.join_checked(input, &relative)
    }

    /// Resolve `input` to an absolute directory path, allowing the root itself.
    pub fn resolve_dir(&self, input: &str) -> Result<PathBuf> {
        let relative = self.relative(input)?;
        self.join_checked(input, &relative)
    }

    /// Render a normalized relative path with `/` separators, as seen from
    /// inside a Linux container.
    pub fn to_container_path(&self, input: &str) -> Result<String> {
        let relative = self.relative(input)?;
        if relative.as_os_str().is_empty() {
            return Err(Error::path_escape(format!(
                "Path does not name an entry inside the workspace: {:?}",
                input
            )));
        }
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Ok(parts.join("/"))
    }

    fn join_checked(&self, input: &str, relative: &Path) -> Result<PathBuf> {
        let full_path = self.root.join(relative);
        if !full_path.starts_with(&self.root) {
            return Err(Error::path_escape(format!(
                "Access denied: path {} is outside of root {}",
                input,
                self.root.display()
            )));
        }
        Ok(full_path)
    }
}

/// Drop `.` and resolve `..` lexically for an absolute path.
fn lexical_clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> WorkspaceRoot {
        WorkspaceRoot::new("/tmp/vibebolt/workspace").unwrap()
    }

    #[test]
    fn test_valid_paths() {
        let root = root();
        assert_eq!(
            root.resolve("main.rs").unwrap(),
            PathBuf::from("/tmp/vibebolt/workspace/main.rs")
        );
        assert_eq!(
            root.resolve("src/lib.rs").unwrap(),
            PathBuf::from("/tmp/vibebolt/workspace/src/lib.rs")
        );
        assert_eq!(
            root.resolve("./local.txt").unwrap(),
            PathBuf::from("/tmp/vibebolt/workspace/local.txt")
        );
        assert_eq!(
            root.resolve("src/../main.rs").unwrap(),
            PathBuf::from("/tmp/vibebolt/workspace/main.rs")
        );
    }

    #[test]
    fn test_traversal_rejection() {
        let root = root();
        assert!(matches!(
            root.resolve("../../etc/passwd"),
            Err(Error::PathEscape(_))
        ));
        assert!(matches!(
            root.resolve("src/../../etc/passwd"),
            Err(Error::PathEscape(_))
        ));
        assert!(matches!(root.resolve_dir(".."), Err(Error::PathEscape(_))));
    }

    #[test]
    fn test_absolute_path_rejection() {
        let root = root();
        assert!(matches!(root.resolve("/etc/passwd"), Err(Error::PathEscape(_))));
        assert!(matches!(
            root.resolve("/tmp/vibebolt/workspace/main.rs"),
            Err(Error::PathEscape(_))
        ));
        assert!(matches!(
            root.resolve("C:\\Windows\\System32"),
            Err(Error::PathEscape(_))
        ));
        assert!(matches!(
            root.resolve("\\\\server\\share"),
            Err(Error::PathEscape(_))
        ));
    }

    #[test]
    fn test_root_is_not_a_proper_descendant() {
        let root = root();
        assert!(matches!(root.resolve(""), Err(Error::PathEscape(_))));
        assert!(matches!(root.resolve("src/.."), Err(Error::PathEscape(_))));
        assert_eq!(
            root.resolve_dir("").unwrap(),
            PathBuf::from("/tmp/vibebolt/workspace")
        );
        assert_eq!(
            root.resolve_dir(".").unwrap(),
            PathBuf::from("/tmp/vibebolt/workspace")
        );
    }

    #[test]
    fn test_prefix_sibling_is_rejected() {
        // "/tmp/vibebolt/workspace2" shares a string prefix with the root
        let root = root();
        assert!(root.resolve("../workspace2/x").is_err());
    }

    #[test]
    fn test_nul_byte_rejected() {
        assert!(matches!(root().resolve("a\0b"), Err(Error::PathEscape(_))));
    }

    #[test]
    fn test_container_path() {
        let root = root();
        assert_eq!(root.to_container_path("./src//main.rs").unwrap(), "src/main.rs");
        assert!(root.to_container_path(".").is_err());
    }

    #[test]
    fn test_root_must_be_absolute() {
        assert!(WorkspaceRoot::new("relative/root").is_err());
        assert_eq!(
            WorkspaceRoot::new("/tmp/./a/../b").unwrap().path(),
            Path::new("/tmp/b")
        );
    }
}
