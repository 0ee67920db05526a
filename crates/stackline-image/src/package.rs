//! Deterministic packaging of a build context.
//!
//! Entries are written in sorted path order with zeroed timestamps and
//! ownership and normalized modes, so the archive bytes, and therefore the
//! digest, depend on nothing but file paths, contents and the execute bit.

use stackline_common::error::{Result, StacklineError};
use stackline_common::types::Sha256Hash;

use crate::context::BuildContext;

/// The packaged form of a build context.
#[derive(Debug, Clone)]
pub struct PackagedContext {
    /// Uncompressed tar archive.
    pub archive: Vec<u8>,
    /// SHA-256 of `archive`.
    pub digest: Sha256Hash,
    /// Number of files in the archive.
    pub file_count: usize,
}

/// Packages every included file of `context` into a tar archive.
///
/// # Errors
///
/// Returns a configuration error if no file is included, or an I/O error
/// if a file cannot be read.
pub fn package(context: &BuildContext) -> Result<PackagedContext> {
    let files = context.files()?;
    if files.is_empty() {
        return Err(StacklineError::config(format!(
            "build context {} contains no files after exclusions",
            context.root().display()
        )));
    }

    let mut builder = tar::Builder::new(Vec::new());
    for file in &files {
        let data = std::fs::read(&file.absolute).map_err(|e| StacklineError::Io {
            path: file.absolute.clone(),
            source: e,
        })?;
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(if file.executable { 0o755 } else { 0o644 });
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        header.set_entry_type(tar::EntryType::Regular);
        builder
            .append_data(&mut header, &file.relative, data.as_slice())
            .map_err(|e| StacklineError::Io {
                path: file.absolute.clone(),
                source: e,
            })?;
    }
    let archive = builder.into_inner().map_err(|e| StacklineError::Io {
        path: context.root().to_path_buf(),
        source: e,
    })?;

    let digest = crate::hash::hash_bytes(&archive);
    tracing::info!(
        context = %context.root().display(),
        files = files.len(),
        bytes = archive.len(),
        digest = %digest,
        "build context packaged"
    );
    Ok(PackagedContext {
        archive,
        digest,
        file_count: files.len(),
    })
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("mkdir");
        }
        std::fs::write(path, content).expect("write");
    }

    fn digest_of(root: &Path) -> Sha256Hash {
        let ctx = BuildContext::open(root, &[".git".to_string()]).expect("open");
        package(&ctx).expect("package").digest
    }

    #[test]
    fn unchanged_content_yields_identical_digest() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        write(dir.path(), "server.py", "print('hi')");
        write(dir.path(), "stores/companies.json", "[]");
        assert_eq!(digest_of(dir.path()), digest_of(dir.path()));
    }

    #[test]
    fn identical_trees_in_different_places_share_digest() {
        let a = tempfile::tempdir().expect("failed to create tempdir");
        let b = tempfile::tempdir().expect("failed to create tempdir");
        for root in [a.path(), b.path()] {
            write(root, "server.py", "print('hi')");
            write(root, "app.py", "app = 1");
        }
        assert_eq!(digest_of(a.path()), digest_of(b.path()));
    }

    #[test]
    fn changed_file_changes_digest() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        write(dir.path(), "server.py", "print('hi')");
        let before = digest_of(dir.path());
        write(dir.path(), "server.py", "print('bye')");
        assert_ne!(before, digest_of(dir.path()));
    }

    #[test]
    fn renamed_file_changes_digest() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        write(dir.path(), "a.py", "x");
        let before = digest_of(dir.path());
        std::fs::rename(dir.path().join("a.py"), dir.path().join("b.py")).expect("rename");
        assert_ne!(before, digest_of(dir.path()));
    }

    #[test]
    fn excluded_file_does_not_change_digest() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        write(dir.path(), "server.py", "print('hi')");
        let before = digest_of(dir.path());
        write(dir.path(), ".git/HEAD", "ref: refs/heads/main");
        assert_eq!(before, digest_of(dir.path()));
    }

    #[test]
    fn empty_context_is_config_error() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        write(dir.path(), ".git/HEAD", "ref");
        let ctx = BuildContext::open(dir.path(), &[".git".to_string()]).expect("open");
        assert!(matches!(package(&ctx), Err(StacklineError::Config { .. })));
    }

    #[test]
    fn archive_lists_files_in_order() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        write(dir.path(), "b.txt", "b");
        write(dir.path(), "a.txt", "a");
        let ctx = BuildContext::open(dir.path(), &[]).expect("open");
        let packaged = package(&ctx).expect("package");
        assert_eq!(packaged.file_count, 2);

        let mut archive = tar::Archive::new(packaged.archive.as_slice());
        let names: Vec<String> = archive
            .entries()
            .expect("entries")
            .map(|e| {
                e.expect("entry")
                    .path()
                    .expect("path")
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }
}
