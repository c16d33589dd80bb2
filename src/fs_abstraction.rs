//! Filesystem abstraction layer for testability
//!
//! Output writing and list loading go through the [`FileSystem`] trait so the
//! pipeline can be exercised without touching the real filesystem. Uses
//! mockall for automatic mock generation in test builds.

use std::io::{self, Write};
use std::path::Path;

#[cfg(test)]
use mockall::automock;

/// Trait abstracting filesystem operations for dependency injection.
///
/// # Example (testing)
/// ```ignore
/// use vpnsieve::fs_abstraction::MockFileSystem;
///
/// let mut mock_fs = MockFileSystem::new();
/// mock_fs.expect_read_to_string()
///     .returning(|_| Ok("example.com".to_string()));
/// ```
#[cfg_attr(test, automock)]
pub trait FileSystem: Send + Sync {
    /// Read file contents as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Replace a file's contents so readers never observe a partial write.
    fn write_atomic(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Check if a path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Create a directory and all parent directories.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
}

/// Real filesystem implementation using std::fs.
#[derive(Default, Clone, Copy)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    /// Uses tempfile + rename in the target directory.
    fn write_atomic(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let parent_dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)?;
        temp_file.write_all(contents)?;
        temp_file.as_file().sync_all()?;
        temp_file.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }
}

static REAL_FS: RealFileSystem = RealFileSystem;

/// Get a reference to the global real filesystem instance.
pub fn real_fs() -> &'static RealFileSystem {
    &REAL_FS
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;
    use tempfile::TempDir;

    #[test]
    fn test_real_fs_write_atomic_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("all.txt");
        let fs = RealFileSystem;

        fs.write_atomic(&file_path, b"vless://a@h:1").unwrap();
        assert_eq!(fs.read_to_string(&file_path).unwrap(), "vless://a@h:1");

        fs.write_atomic(&file_path, b"trojan://b@h:2").unwrap();
        assert_eq!(fs.read_to_string(&file_path).unwrap(), "trojan://b@h:2");
    }

    #[test]
    fn test_real_fs_write_atomic_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let fs = RealFileSystem;
        fs.write_atomic(&temp_dir.path().join("1.txt"), b"x").unwrap();

        let entries: Vec<_> = std::fs::read_dir(temp_dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_real_fs_exists_and_create_dir_all() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("bypass-unsecure/nested");
        let fs = RealFileSystem;

        assert!(!fs.exists(&nested));
        fs.create_dir_all(&nested).unwrap();
        assert!(fs.exists(&nested));
    }

    #[test]
    fn test_real_fs_read_nonexistent() {
        let fs = RealFileSystem;
        let result = fs.read_to_string(Path::new("/nonexistent/path/file.txt"));
        assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_real_fs_write_to_nonexistent_dir() {
        let fs = RealFileSystem;
        let result = fs.write_atomic(Path::new("/nonexistent/path/file.txt"), b"test");
        assert!(result.is_err());
    }

    #[test]
    fn test_mock_fs_expectations() {
        let mut mock_fs = MockFileSystem::new();
        mock_fs
            .expect_read_to_string()
            .returning(|_| Ok("example.com".to_string()));
        mock_fs.expect_exists().returning(|_| true);

        assert!(mock_fs.exists(Path::new("whitelist-all.txt")));
        assert_eq!(
            mock_fs.read_to_string(Path::new("whitelist-all.txt")).unwrap(),
            "example.com"
        );
    }

    #[test]
    fn test_real_fs_global_instance() {
        let fs = real_fs();
        assert!(!fs.exists(Path::new("/nonexistent/vpnsieve/marker")));
    }
}
