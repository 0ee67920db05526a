//! Build-context discovery.
//!
//! A build context is a local directory whose files, minus the excluded
//! ones, form the packaged image. Exclusion patterns follow a small glob
//! dialect:
//!
//! - a pattern containing `/` is anchored at the context root
//!   (`infra/cdk.out` only matches that directory);
//! - a pattern without `/` matches any path component (`node_modules`
//!   matches at every depth);
//! - `*` and `?` match within a single component.
//!
//! Excluded directories are not descended into.

use std::path::{Path, PathBuf};

use stackline_common::error::{Result, StacklineError};

/// A compiled exclusion pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludePattern {
    segments: Vec<String>,
    anchored: bool,
}

impl ExcludePattern {
    /// Compiles a pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is empty or escapes the context.
    pub fn parse(pattern: &str) -> Result<Self> {
        let trimmed = pattern.trim().trim_start_matches("./").trim_end_matches('/');
        let anchored = trimmed.starts_with('/') || trimmed.contains('/');
        let segments: Vec<String> = trimmed
            .split('/')
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect();
        if segments.is_empty() {
            return Err(StacklineError::config(format!(
                "empty exclude pattern: \"{pattern}\""
            )));
        }
        if segments.iter().any(|s| s == "..") {
            return Err(StacklineError::config(format!(
                "exclude pattern escapes the build context: \"{pattern}\""
            )));
        }
        Ok(Self { segments, anchored })
    }

    /// Returns whether the context-relative `components` are excluded.
    #[must_use]
    pub fn matches(&self, components: &[&str]) -> bool {
        if self.anchored {
            components.len() >= self.segments.len()
                && self
                    .segments
                    .iter()
                    .zip(components)
                    .all(|(pat, comp)| glob_match(pat, comp))
        } else {
            components.iter().any(|comp| glob_match(&self.segments[0], comp))
        }
    }
}

/// Matches a single path component against a `*`/`?` pattern.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if let Some((star_p, star_t)) = backtrack {
            pi = star_p + 1;
            ti = star_t + 1;
            backtrack = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

/// A file included in the build context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextFile {
    /// Path relative to the context root, `/`-separated.
    pub relative: String,
    /// Absolute path on disk.
    pub absolute: PathBuf,
    /// Whether any execute bit is set.
    pub executable: bool,
}

/// A local source tree plus its exclusion patterns.
#[derive(Debug, Clone)]
pub struct BuildContext {
    root: PathBuf,
    excludes: Vec<ExcludePattern>,
}

impl BuildContext {
    /// Opens a build context rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the path does not exist, is not a
    /// directory, or an exclusion pattern is malformed.
    pub fn open(root: &Path, excludes: &[String]) -> Result<Self> {
        if !root.exists() {
            return Err(StacklineError::config(format!(
                "build context does not exist: {}",
                root.display()
            )));
        }
        if !root.is_dir() {
            return Err(StacklineError::config(format!(
                "build context is not a directory: {}",
                root.display()
            )));
        }
        let excludes = excludes
            .iter()
            .map(|p| ExcludePattern::parse(p))
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(root = %root.display(), excludes = excludes.len(), "build context opened");
        Ok(Self {
            root: root.to_path_buf(),
            excludes,
        })
    }

    /// Returns the context root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns whether a context-relative path is excluded.
    #[must_use]
    pub fn is_excluded(&self, relative: &str) -> bool {
        let components: Vec<&str> = relative.split('/').filter(|s| !s.is_empty()).collect();
        self.excludes.iter().any(|p| p.matches(&components))
    }

    /// Lists the included files, sorted by relative path.
    ///
    /// Symbolic links are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be read, or a configuration
    /// error if an entry name is not valid UTF-8.
    pub fn files(&self) -> Result<Vec<ContextFile>> {
        let mut files = Vec::new();
        self.walk(&self.root, "", &mut files)?;
        files.sort_by(|a, b| a.relative.cmp(&b.relative));
        Ok(files)
    }

    fn walk(&self, dir: &Path, prefix: &str, out: &mut Vec<ContextFile>) -> Result<()> {
        let io_err = |e| StacklineError::Io {
            path: dir.to_path_buf(),
            source: e,
        };
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            let name = entry.file_name().into_string().map_err(|raw| {
                StacklineError::config(format!(
                    "build context entry has a non UTF-8 name: {}",
                    dir.join(raw).display()
                ))
            })?;
            let relative = if prefix.is_empty() {
                name
            } else {
                format!("{prefix}/{name}")
            };
            if self.is_excluded(&relative) {
                tracing::trace!(path = %relative, "excluded");
                continue;
            }
            let file_type = entry.file_type().map_err(io_err)?;
            let path = entry.path();
            if file_type.is_dir() {
                self.walk(&path, &relative, out)?;
            } else if file_type.is_file() {
                let metadata = entry.metadata().map_err(io_err)?;
                out.push(ContextFile {
                    relative,
                    absolute: path,
                    executable: is_executable(&metadata),
                });
            } else {
                tracing::debug!(path = %relative, "skipping non-regular file");
            }
        }
        Ok(())
    }
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
const fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    false
}
