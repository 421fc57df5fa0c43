// src/fs/mod.rs

//! Filesystem seam used by the watcher, the test-file finder and the cache.
//!
//! Everything that touches the disk goes through [`FileSystem`] so the event
//! loop and change analysis can run against [`mock::MockFileSystem`] in tests.

use std::fmt::Debug;
use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};

pub mod mock;

/// What a path points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// Abstract filesystem interface.
pub trait FileSystem: Send + Sync + Debug {
    /// Stat a path. Fails when the path does not exist or cannot be read.
    fn metadata(&self, path: &Path) -> Result<EntryKind>;

    /// Return a list of entries in a directory.
    /// Returns full paths.
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Resolve `path` to an absolute, lexically clean path.
    fn absolute(&self, path: &Path) -> Result<PathBuf>;

    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>>;

    fn exists(&self, path: &Path) -> bool {
        self.metadata(path).is_ok()
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.metadata(path), Ok(EntryKind::Dir))
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(self.metadata(path), Ok(EntryKind::File))
    }
}

/// Implementation that uses `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn metadata(&self, path: &Path) -> Result<EntryKind> {
        let meta = fs::metadata(path).with_context(|| format!("stat {:?}", path))?;
        Ok(if meta.is_dir() {
            EntryKind::Dir
        } else {
            EntryKind::File
        })
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path).with_context(|| format!("reading dir {:?}", path))? {
            let entry = entry.with_context(|| format!("reading entry of {:?}", path))?;
            entries.push(entry.path());
        }
        entries.sort();
        Ok(entries)
    }

    fn absolute(&self, path: &Path) -> Result<PathBuf> {
        let abs = std::path::absolute(path)
            .with_context(|| format!("resolving absolute path of {:?}", path))?;
        Ok(clean_path(&abs))
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("reading file {:?}", path))
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        let file = fs::File::open(path).with_context(|| format!("opening file {:?}", path))?;
        Ok(Box::new(file))
    }
}

/// Lexically normalise a path: drop `.` components and resolve `..` against
/// the preceding component. Never touches the disk.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(out.components().next_back(), Some(Component::Normal(_)));
                if popped {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        out
    }
}

/// Collect `root` and every directory below it, in depth-first order.
///
/// `skip` is consulted for each subdirectory; a skipped directory is neither
/// returned nor descended into. The root itself is never skipped.
pub fn walk_dirs<F>(fs: &dyn FileSystem, root: &Path, mut skip: F) -> Result<Vec<PathBuf>>
where
    F: FnMut(&Path) -> bool,
{
    let mut dirs = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let mut children = Vec::new();
        for path in fs.read_dir(&dir)? {
            if fs.is_dir(&path) && !skip(&path) {
                children.push(path);
            }
        }
        dirs.push(dir);
        // Reverse so the stack pops children in listing order.
        children.reverse();
        stack.extend(children);
    }

    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_path_resolves_dots() {
        assert_eq!(clean_path(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(clean_path(Path::new("a//b/")), PathBuf::from("a/b"));
        assert_eq!(clean_path(Path::new("./")), PathBuf::from("."));
        assert_eq!(clean_path(Path::new("../x")), PathBuf::from("../x"));
        assert_eq!(clean_path(Path::new("/..")), PathBuf::from("/"));
    }

    #[test]
    fn real_fs_walk_skips_matching_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("a/b")).unwrap();
        std::fs::create_dir_all(tmp.path().join("vendor/x")).unwrap();
        std::fs::write(tmp.path().join("a/file.go"), "package a").unwrap();

        let fs = RealFileSystem;
        let dirs = walk_dirs(&fs, tmp.path(), |p| p.ends_with("vendor")).unwrap();

        assert!(dirs.contains(&tmp.path().to_path_buf()));
        assert!(dirs.contains(&tmp.path().join("a")));
        assert!(dirs.contains(&tmp.path().join("a/b")));
        assert!(!dirs.iter().any(|d| d.starts_with(tmp.path().join("vendor"))));
    }
}
