//! Source file discovery and skip rules.
//!
//! Each configured root is walked in order and every eligible source file is
//! routed to exactly one of two lists: files to instrument, and files that
//! are copied to their shadow path unchanged.
//!
//! Hidden files and directories are never eligible. That keeps generated
//! shadow copies (`.Foo.cover.sol`) out of later runs.

use crate::errors::{ConfigError, SelectError};
use glob::{MatchOptions, Pattern};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Extensions considered source files when none are configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &["sol"];

/// A single exclusion entry, relative to its root.
///
/// An entry excludes a file when it names the file itself, a directory
/// containing it, or (if it contains glob metacharacters) matches it as a
/// glob pattern.
#[derive(Debug, Clone)]
pub struct SkipPattern {
    raw: String,
    prefix: PathBuf,
    glob: Option<Pattern>,
}

impl SkipPattern {
    pub fn parse(root: &Path, raw: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidSkipEntry {
            root: root.to_path_buf(),
            entry: raw.to_string(),
        };

        let mut prefix = PathBuf::new();
        for component in Path::new(raw).components() {
            match component {
                Component::CurDir => {}
                Component::Normal(part) => prefix.push(part),
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(invalid());
                }
            }
        }
        if prefix.as_os_str().is_empty() {
            return Err(invalid());
        }

        let glob = if raw.contains(['*', '?', '[']) {
            let pattern = prefix.to_string_lossy().replace('\\', "/");
            Some(
                Pattern::new(&pattern).map_err(|source| ConfigError::InvalidSkipGlob {
                    root: root.to_path_buf(),
                    entry: raw.to_string(),
                    source,
                })?,
            )
        } else {
            None
        };

        Ok(Self {
            raw: raw.to_string(),
            prefix,
            glob,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, relative: &Path) -> bool {
        match &self.glob {
            Some(glob) => {
                let options = MatchOptions {
                    require_literal_separator: true,
                    ..MatchOptions::new()
                };
                glob.matches_path_with(relative, options)
                    || relative
                        .ancestors()
                        .skip(1)
                        .any(|dir| glob.matches_path_with(dir, options))
            }
            None => relative.starts_with(&self.prefix),
        }
    }
}

/// A root directory and the files under it that must not be instrumented.
#[derive(Debug, Clone)]
pub struct SkipRule {
    root: PathBuf,
    exclusions: Vec<SkipPattern>,
}

impl SkipRule {
    pub fn new<S: AsRef<str>>(root: impl Into<PathBuf>, skip: &[S]) -> Result<Self, ConfigError> {
        let root = root.into();
        let exclusions = skip
            .iter()
            .map(|entry| SkipPattern::parse(&root, entry.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { root, exclusions })
    }

    /// A rule that excludes nothing.
    pub fn include_all(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            exclusions: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exclusions(&self) -> &[SkipPattern] {
        &self.exclusions
    }

    pub fn is_excluded(&self, relative: &Path) -> bool {
        self.exclusions.iter().any(|p| p.matches(relative))
    }
}

/// A source file read from one of the roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    root: PathBuf,
    relative_path: PathBuf,
    source: String,
}

impl SourceFile {
    pub fn new(
        root: impl Into<PathBuf>,
        relative_path: impl Into<PathBuf>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            relative_path: relative_path.into(),
            source: source.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }

    /// Root-joined path of the file.
    pub fn path(&self) -> PathBuf {
        self.root.join(&self.relative_path)
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// The two halves of a selection. Order is root order, then path order.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub instrument: Vec<SourceFile>,
    pub pass_through: Vec<SourceFile>,
}

impl Selection {
    pub fn total(&self) -> usize {
        self.instrument.len() + self.pass_through.len()
    }
}

/// Walks the configured roots and applies their skip rules.
#[derive(Debug, Clone)]
pub struct FileSelector {
    rules: Vec<SkipRule>,
    extensions: Vec<String>,
}

impl FileSelector {
    pub fn new(rules: Vec<SkipRule>) -> Self {
        Self {
            rules,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    /// Discover and partition every root. Any unreadable root or file aborts
    /// the whole selection.
    pub fn select(&self) -> Result<Selection, SelectError> {
        let mut selection = Selection::default();

        for rule in &self.rules {
            for file in self.discover(rule.root())? {
                if rule.is_excluded(file.relative_path()) {
                    selection.pass_through.push(file);
                } else {
                    selection.instrument.push(file);
                }
            }
            tracing::debug!(
                root = %rule.root().display(),
                instrument = selection.instrument.len(),
                pass_through = selection.pass_through.len(),
                "Scanned source root"
            );
        }

        Ok(selection)
    }

    /// Read every eligible source file under `root`, sorted by path.
    pub fn discover(&self, root: &Path) -> Result<Vec<SourceFile>, SelectError> {
        if !root.is_dir() {
            return Err(SelectError::RootMissing {
                path: root.to_path_buf(),
            });
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));

        for entry in walker {
            let entry = entry.map_err(|source| SelectError::Walk {
                root: root.to_path_buf(),
                source,
            })?;
            if !entry.file_type().is_file() || !self.is_eligible(entry.path()) {
                continue;
            }

            let path = entry.path();
            let relative = path
                .strip_prefix(root)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| path.to_path_buf());
            let source = std::fs::read_to_string(path).map_err(|source| SelectError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            files.push(SourceFile::new(root, relative, source));
        }

        Ok(files)
    }

    fn is_eligible(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e == ext))
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|s| s.starts_with('.'))
}
