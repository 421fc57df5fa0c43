// src/fs/mock.rs

use super::{EntryKind, FileSystem, clean_path};
use anyhow::{Result, anyhow};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File(Vec<u8>),
    Dir,
}

#[derive(Debug, Default)]
struct MockState {
    entries: BTreeMap<PathBuf, MockEntry>,
    /// Paths whose stat fails as if permission were denied.
    denied: BTreeSet<PathBuf>,
}

/// In-memory filesystem. Clones share the same tree, so a test can keep a
/// handle and mutate files while the watcher is running.
#[derive(Debug, Clone)]
pub struct MockFileSystem {
    state: Arc<Mutex<MockState>>,
    cwd: PathBuf,
}

impl Default for MockFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::with_cwd("/")
    }

    /// Relative paths are resolved against `cwd`.
    pub fn with_cwd(cwd: impl AsRef<Path>) -> Self {
        let cwd = clean_path(cwd.as_ref());
        let fs = Self {
            state: Arc::new(Mutex::new(MockState::default())),
            cwd,
        };
        fs.add_dir(fs.cwd.clone());
        fs
    }

    fn key(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            clean_path(path)
        } else {
            clean_path(&self.cwd.join(path))
        }
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let key = self.key(path.as_ref());
        let mut state = self.state.lock().unwrap();
        if let Some(parent) = key.parent() {
            Self::ensure_dirs(&mut state, parent);
        }
        state.entries.insert(key, MockEntry::File(content.into()));
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let key = self.key(path.as_ref());
        let mut state = self.state.lock().unwrap();
        Self::ensure_dirs(&mut state, &key);
    }

    /// Remove a path and everything below it.
    pub fn remove(&self, path: impl AsRef<Path>) {
        let key = self.key(path.as_ref());
        let mut state = self.state.lock().unwrap();
        state.entries.retain(|p, _| !p.starts_with(&key));
    }

    /// Make every stat of `path` fail.
    pub fn deny(&self, path: impl AsRef<Path>) {
        let key = self.key(path.as_ref());
        self.state.lock().unwrap().denied.insert(key);
    }

    fn ensure_dirs(state: &mut MockState, dir: &Path) {
        for ancestor in dir.ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            state
                .entries
                .entry(ancestor.to_path_buf())
                .or_insert(MockEntry::Dir);
        }
    }
}

impl FileSystem for MockFileSystem {
    fn metadata(&self, path: &Path) -> Result<EntryKind> {
        let key = self.key(path);
        let state = self.state.lock().unwrap();
        if state.denied.contains(&key) {
            return Err(anyhow!("permission denied: {:?}", key));
        }
        match state.entries.get(&key) {
            Some(MockEntry::File(_)) => Ok(EntryKind::File),
            Some(MockEntry::Dir) => Ok(EntryKind::Dir),
            None => Err(anyhow!("no such file or directory: {:?}", key)),
        }
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let key = self.key(path);
        let state = self.state.lock().unwrap();
        match state.entries.get(&key) {
            Some(MockEntry::Dir) => Ok(state
                .entries
                .keys()
                .filter(|p| p.parent() == Some(key.as_path()))
                .cloned()
                .collect()),
            _ => Err(anyhow!("Not a directory or not found: {:?}", key)),
        }
    }

    fn absolute(&self, path: &Path) -> Result<PathBuf> {
        Ok(self.key(path))
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        let key = self.key(path);
        let state = self.state.lock().unwrap();
        match state.entries.get(&key) {
            Some(MockEntry::File(content)) => {
                String::from_utf8(content.clone()).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            Some(MockEntry::Dir) => Err(anyhow!("Is a directory: {:?}", key)),
            None => Err(anyhow!("File not found: {:?}", key)),
        }
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        let key = self.key(path);
        let state = self.state.lock().unwrap();
        match state.entries.get(&key) {
            Some(MockEntry::File(content)) => Ok(Box::new(Cursor::new(content.clone()))),
            Some(MockEntry::Dir) => Err(anyhow!("Is a directory: {:?}", key)),
            None => Err(anyhow!("File not found: {:?}", key)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::walk_dirs;

    #[test]
    fn files_create_parent_dirs() {
        let fs = MockFileSystem::with_cwd("/proj");
        fs.add_file("pkg/a.go", "package pkg");

        assert_eq!(fs.metadata(Path::new("/proj/pkg")).unwrap(), EntryKind::Dir);
        assert_eq!(fs.metadata(Path::new("pkg/a.go")).unwrap(), EntryKind::File);
        assert_eq!(
            fs.read_dir(Path::new("/proj")).unwrap(),
            vec![PathBuf::from("/proj/pkg")]
        );
    }

    #[test]
    fn remove_and_deny() {
        let fs = MockFileSystem::new();
        fs.add_file("/p/x/y.go", "");
        fs.remove("/p/x");
        assert!(!fs.exists(Path::new("/p/x/y.go")));
        assert!(fs.is_dir(Path::new("/p")));

        fs.deny("/p");
        assert!(fs.metadata(Path::new("/p")).is_err());
    }

    #[test]
    fn walk_over_mock_tree() {
        let fs = MockFileSystem::new();
        fs.add_file("/r/a/1.go", "");
        fs.add_file("/r/a/b/2.go", "");
        fs.add_file("/r/node_modules/m/i.js", "");

        let dirs = walk_dirs(&fs, Path::new("/r"), |p| p.ends_with("node_modules")).unwrap();
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/r"),
                PathBuf::from("/r/a"),
                PathBuf::from("/r/a/b"),
            ]
        );
    }
}
