// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Which tests a settled batch of changes should re-run.
///
/// - `All`: every package under the watched roots.
/// - `Changed`: only the package of each changed file.
/// - `Related`: the changed package plus its paired test/implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchMode {
    All,
    Changed,
    Related,
}

impl Default for WatchMode {
    fn default() -> Self {
        WatchMode::Changed
    }
}

impl FromStr for WatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(WatchMode::All),
            "changed" => Ok(WatchMode::Changed),
            "related" => Ok(WatchMode::Related),
            other => Err(format!(
                "invalid watch mode: {other} (expected \"all\", \"changed\" or \"related\")"
            )),
        }
    }
}

impl fmt::Display for WatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WatchMode::All => "all",
            WatchMode::Changed => "changed",
            WatchMode::Related => "related",
        };
        f.write_str(s)
    }
}

/// Normalized kind of a file-system mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileEventKind {
    Create,
    Write,
    Remove,
    Rename,
    Chmod,
    Unknown,
}

impl FileEventKind {
    /// Only creations and content writes can change test outcomes.
    pub fn is_content_change(self) -> bool {
        matches!(self, FileEventKind::Create | FileEventKind::Write)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileEventKind::Create => "create",
            FileEventKind::Write => "write",
            FileEventKind::Remove => "remove",
            FileEventKind::Rename => "rename",
            FileEventKind::Chmod => "chmod",
            FileEventKind::Unknown => "unknown",
        }
    }
}

impl From<&notify::EventKind> for FileEventKind {
    fn from(kind: &notify::EventKind) -> Self {
        use notify::event::{ModifyKind, RenameMode};
        use notify::EventKind;

        match kind {
            EventKind::Create(_) => FileEventKind::Create,
            // The destination of a move is a new file at that path.
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => FileEventKind::Create,
            EventKind::Modify(ModifyKind::Name(RenameMode::From | RenameMode::Both)) => {
                FileEventKind::Rename
            }
            EventKind::Modify(ModifyKind::Name(_)) => FileEventKind::Write,
            EventKind::Modify(ModifyKind::Metadata(_)) => FileEventKind::Chmod,
            EventKind::Modify(_) => FileEventKind::Write,
            EventKind::Remove(_) => FileEventKind::Remove,
            _ => FileEventKind::Unknown,
        }
    }
}

impl fmt::Display for FileEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
