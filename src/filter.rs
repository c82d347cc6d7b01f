use std::path::{Path, PathBuf};

use glob::Pattern;

/// Decides whether a changed path is dropped before it can trigger a run.
///
/// Patterns are matched in order against the path's base name and its form
/// relative to the watch root; the first match wins. The filter fails open:
/// a path that cannot be made relative is never ignored.
pub struct IgnoreFilter {
    root: PathBuf,
    patterns: Vec<Pattern>,
}

impl IgnoreFilter {
    /// Compile the configured glob patterns. A malformed pattern is
    /// reported and skipped; it never aborts the pipeline.
    pub fn new(root: PathBuf, patterns: &[String]) -> Self {
        let patterns = patterns
            .iter()
            .filter_map(|raw| match Pattern::new(raw) {
                Ok(pattern) => Some(pattern),
                Err(err) => {
                    eprintln!("warning: bad ignore pattern {raw:?}: {err}");
                    None
                }
            })
            .collect();

        Self { root, patterns }
    }

    /// True if `path` matches any configured ignore pattern.
    pub fn should_ignore(&self, path: &Path) -> bool {
        if self.patterns.is_empty() {
            return false;
        }

        let Some(rel) = self.relative(path) else {
            eprintln!(
                "warning: cannot resolve {} against the watch root; not ignoring it",
                path.display()
            );
            return false;
        };

        let name = rel
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let rel = rel.to_string_lossy();

        self.patterns
            .iter()
            .any(|pattern| pattern.matches(&name) || pattern.matches(&rel))
    }

    /// Compute `path` relative to the watch root, falling back to the
    /// process working directory.
    fn relative(&self, path: &Path) -> Option<PathBuf> {
        if let Ok(rel) = path.strip_prefix(&self.root) {
            return Some(rel.to_path_buf());
        }
        if let Ok(cwd) = std::env::current_dir()
            && let Ok(rel) = path.strip_prefix(&cwd)
        {
            return Some(rel.to_path_buf());
        }
        if path.is_relative() {
            return Some(path.to_path_buf());
        }
        None
    }
}
