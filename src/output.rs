//! Local artifact writer.
//!
//! Artifacts are written atomically and only when their content changed, so
//! an unchanged file is never re-uploaded.

use std::path::{Path, PathBuf};

use crate::error::SieveError;
use crate::fs_abstraction::FileSystem;
use crate::logger::RunLog;

/// One output file: a path relative to the output directory and its lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// `/`-separated path, e.g. `bypass/bypass-all.txt`
    pub path: String,
    pub lines: Vec<String>,
}

impl Artifact {
    pub fn new(path: impl Into<String>, lines: Vec<String>) -> Self {
        Self {
            path: path.into(),
            lines,
        }
    }

    /// Lines joined by `\n`, without a trailing newline.
    pub fn contents(&self) -> String {
        self.lines.join("\n")
    }
}

/// Outcome of writing one artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    pub relative: String,
    pub local: PathBuf,
    /// False when the file already held identical content
    pub changed: bool,
}

/// Writes artifacts under a root directory
pub struct OutputWriter<'a> {
    fs: &'a dyn FileSystem,
    root: PathBuf,
}

impl<'a> OutputWriter<'a> {
    pub fn new(fs: &'a dyn FileSystem, root: impl AsRef<Path>) -> Self {
        Self {
            fs,
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn local_path(&self, relative: &str) -> PathBuf {
        relative
            .split('/')
            .filter(|part| !part.is_empty())
            .fold(self.root.clone(), |path, part| path.join(part))
    }

    /// Write one artifact, skipping the write when content is byte-identical.
    pub fn write(&self, artifact: &Artifact) -> Result<WrittenFile, SieveError> {
        let local = self.local_path(&artifact.path);
        let contents = artifact.contents();

        let unchanged = self.fs.exists(&local)
            && self
                .fs
                .read_to_string(&local)
                .map(|existing| existing == contents)
                .unwrap_or(false);
        if unchanged {
            return Ok(WrittenFile {
                relative: artifact.path.clone(),
                local,
                changed: false,
            });
        }

        if let Some(parent) = local.parent() {
            self.fs.create_dir_all(parent).map_err(|e| {
                SieveError::Persistence(format!("create {}: {}", parent.display(), e))
            })?;
        }
        self.fs
            .write_atomic(&local, contents.as_bytes())
            .map_err(|e| SieveError::Persistence(format!("write {}: {}", local.display(), e)))?;

        Ok(WrittenFile {
            relative: artifact.path.clone(),
            local,
            changed: true,
        })
    }

    /// Write every artifact. A failed file is logged and does not stop the others.
    pub fn write_all(&self, artifacts: &[Artifact], log: &RunLog) -> Vec<WrittenFile> {
        let mut written = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            match self.write(artifact) {
                Ok(file) => {
                    if file.changed {
                        log.info(&artifact.path, format!("{} lines written", artifact.lines.len()));
                    }
                    written.push(file);
                }
                Err(e) => log.warn(&artifact.path, e.to_string()),
            }
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_abstraction::{MockFileSystem, RealFileSystem};
    use std::io;
    use tempfile::TempDir;

    fn artifact(path: &str, lines: &[&str]) -> Artifact {
        Artifact::new(path, lines.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_contents_no_trailing_newline() {
        assert_eq!(artifact("a.txt", &["x", "y"]).contents(), "x\ny");
        assert_eq!(artifact("a.txt", &[]).contents(), "");
    }

    #[test]
    fn test_write_then_skip_unchanged() {
        let dir = TempDir::new().unwrap();
        let fs = RealFileSystem;
        let writer = OutputWriter::new(&fs, dir.path());
        let art = artifact("default/1.txt", &["vless://a@h:1", "trojan://b@h:2"]);

        let first = writer.write(&art).unwrap();
        assert!(first.changed);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("default/1.txt")).unwrap(),
            "vless://a@h:1\ntrojan://b@h:2"
        );

        let second = writer.write(&art).unwrap();
        assert!(!second.changed);

        let third = writer.write(&artifact("default/1.txt", &["vless://a@h:1"])).unwrap();
        assert!(third.changed);
    }

    #[test]
    fn test_write_all_isolates_failures() {
        let mut fs = MockFileSystem::new();
        fs.expect_exists().returning(|_| false);
        fs.expect_create_dir_all().returning(|_| Ok(()));
        fs.expect_write_atomic().returning(|path, _| {
            if path.ends_with("bad.txt") {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
            } else {
                Ok(())
            }
        });

        let log = RunLog::new();
        let writer = OutputWriter::new(&fs, "out");
        let written = writer.write_all(
            &[
                artifact("default/bad.txt", &["x"]),
                artifact("default/good.txt", &["y"]),
            ],
            &log,
        );

        assert_eq!(written.len(), 1);
        assert_eq!(written[0].relative, "default/good.txt");
        assert_eq!(log.count("default/bad.txt"), 1);
        assert!(log.flush().contains("Persistence error"));
    }

    #[test]
    fn test_local_path_joins_segments() {
        let fs = MockFileSystem::new();
        let writer = OutputWriter::new(&fs, "githubmirror");
        assert_eq!(
            writer.local_path("split-by-protocols/vless.txt"),
            Path::new("githubmirror").join("split-by-protocols").join("vless.txt")
        );
    }
}
