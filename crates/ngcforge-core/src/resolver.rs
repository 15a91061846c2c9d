//! File resolution service
//!
//! Template sources, `<import>` targets, library includes and the tool table are
//! all named relative to a base directory with a fixed set of sub-directories.

use std::path::{Path, PathBuf};

/// Resolves a file name to an existing path.
pub trait FileResolver {
    /// Find `name`, trying `hint_dirs` (joined in order below the base) first.
    fn search_path(&self, name: &str, hint_dirs: &[&str]) -> Option<PathBuf>;
}

/// Sub-directories searched after the hint, in order
pub const STANDARD_DIRS: [&str; 5] = ["graphics", "cfg", "catalogs", "lib", "projects"];

/// Directory-based resolver rooted at the installation's base directory.
#[derive(Debug, Clone)]
pub struct SearchPath {
    base: PathBuf,
    extra: Vec<PathBuf>,
    use_cwd: bool,
}

impl SearchPath {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            extra: Vec::new(),
            use_cwd: true,
        }
    }

    /// Additional directories searched after the standard ones
    pub fn with_extra_dirs(mut self, dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        self.extra.extend(dirs);
        self
    }

    /// Disable the final lookup in the working directory
    pub fn without_cwd(mut self) -> Self {
        self.use_cwd = false;
        self
    }

    pub fn base(&self) -> &Path {
        &self.base
    }
}

impl FileResolver for SearchPath {
    fn search_path(&self, name: &str, hint_dirs: &[&str]) -> Option<PathBuf> {
        if name.is_empty() {
            return None;
        }
        let direct = Path::new(name);
        if direct.is_absolute() && direct.is_file() {
            return Some(direct.to_path_buf());
        }

        let mut hinted = self.base.clone();
        for dir in hint_dirs {
            hinted.push(dir);
        }
        let mut candidates = vec![hinted.join(name)];
        candidates.extend(STANDARD_DIRS.iter().map(|d| self.base.join(d).join(name)));
        candidates.extend(self.extra.iter().map(|d| d.join(name)));
        if self.use_cwd {
            if let Ok(cwd) = std::env::current_dir() {
                candidates.push(cwd.join(name));
            }
        }

        let found = candidates.into_iter().find(|p| p.is_file());
        if found.is_none() {
            tracing::warn!("Can not find file {}", name);
        }
        found
    }
}
