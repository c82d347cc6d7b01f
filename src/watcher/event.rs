use std::fmt;
use std::path::{Path, PathBuf};

use notify::EventKind;
use notify::event::ModifyKind;

/// Kind of filesystem change, collapsed from the notify event taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Create,
    Write,
    Remove,
    Rename,
    Other,
}

impl From<&EventKind> for ChangeKind {
    fn from(kind: &EventKind) -> Self {
        match kind {
            EventKind::Create(_) => Self::Create,
            EventKind::Modify(ModifyKind::Name(_)) => Self::Rename,
            EventKind::Modify(_) => Self::Write,
            EventKind::Remove(_) => Self::Remove,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let word = match self {
            Self::Create => "create",
            Self::Write => "write",
            Self::Remove => "remove",
            Self::Rename => "rename",
            Self::Other => "other",
        };
        f.write_str(word)
    }
}

/// One filesystem change observed under the watch root.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, path: PathBuf) -> Self {
        Self { path, kind }
    }

    /// Synthetic trigger injected after registration so the command runs
    /// once before any real change.
    pub fn startup(root: &Path) -> Self {
        Self::new(ChangeKind::Other, root.to_path_buf())
    }
}
