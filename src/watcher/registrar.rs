use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};

/// Registers directories with the OS watcher, bounded by recursion depth.
///
/// Every directory gets its own non-recursive watch so the depth limit is
/// enforced identically across notify backends. The watch set only grows:
/// directories are never unregistered, even when deleted.
pub struct TreeRegistrar {
    watcher: RecommendedWatcher,
    root: PathBuf,
    max_depth: usize,
    watched: HashSet<PathBuf>,
    verbose: bool,
}

impl TreeRegistrar {
    pub fn new(
        watcher: RecommendedWatcher,
        root: PathBuf,
        max_depth: usize,
        verbose: bool,
    ) -> Self {
        Self {
            watcher,
            root,
            max_depth,
            watched: HashSet::new(),
            verbose,
        }
    }

    /// Register the root and every directory within `max_depth` of it.
    ///
    /// Unreadable entries are reported and skipped, but a registration
    /// failure aborts the walk: a partially watched tree at startup is an
    /// error, not a degraded mode.
    pub fn register_tree(&mut self) -> Result<()> {
        let root = self.root.clone();
        self.watch_dir(&root)
            .with_context(|| format!("failed to watch {}", root.display()))?;

        let walker = ignore::WalkBuilder::new(&root)
            .standard_filters(false)
            .follow_links(false)
            .max_depth(Some(self.max_depth))
            .build();

        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    eprintln!("warning: {err}");
                    continue;
                }
            };

            if !entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false) {
                continue;
            }
            let path = entry.path();
            if self.watched.contains(path) {
                continue;
            }
            self.watch_dir(path)
                .with_context(|| format!("failed to watch {}", path.display()))?;
        }

        Ok(())
    }

    /// Register a single directory discovered after startup.
    ///
    /// Depth is computed against the configured root, not the directory's
    /// parent, so deeply nested new directories stay bounded. Returns false
    /// when the path is already watched or out of depth.
    pub fn register_one(&mut self, path: &Path) -> Result<bool> {
        if self.watched.contains(path) {
            return Ok(false);
        }
        match self.depth_of(path) {
            Some(depth) if depth <= self.max_depth => {
                self.watch_dir(path)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// The set of currently registered directories.
    pub fn watched(&self) -> &HashSet<PathBuf> {
        &self.watched
    }

    /// Depth of `path` below the configured root (the root itself is 0).
    /// None for paths outside the root.
    fn depth_of(&self, path: &Path) -> Option<usize> {
        path.strip_prefix(&self.root)
            .ok()
            .map(|rel| rel.components().count())
    }

    fn watch_dir(&mut self, path: &Path) -> Result<()> {
        self.watcher.watch(path, RecursiveMode::NonRecursive)?;
        self.watched.insert(path.to_path_buf());
        if self.verbose {
            eprintln!("[watcher] watching {}", path.display());
        }
        Ok(())
    }
}
