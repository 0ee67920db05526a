//! Container image assets.
//!
//! An asset ties a packaged build context to the registry location it
//! will be published under. The URI tag is the archive digest, so the URI
//! is a pure function of the included content.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use flate2::Compression;
use stackline_common::config::EnvironmentConfig;
use stackline_common::error::{Result, StacklineError};
use stackline_common::types::Sha256Hash;

use crate::context::BuildContext;
use crate::package::{self, PackagedContext};

/// Placeholder left in the registry host when no account is configured.
pub const UNRESOLVED_ACCOUNT: &str = "${AWS::AccountId}";

/// A packaged, content-addressed container image.
#[derive(Debug, Clone)]
pub struct ImageAsset {
    /// Root of the packaged build context.
    pub context: PathBuf,
    /// Digest of the packaged archive.
    pub digest: Sha256Hash,
    /// Registry host receiving the image.
    pub registry: String,
    /// Repository within the registry.
    pub repository: String,
    /// Fully qualified image URI.
    pub uri: String,
    /// Number of packaged files.
    pub file_count: usize,
    archive: Vec<u8>,
}

impl ImageAsset {
    /// Packages `context` and resolves its URI for `environment`.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository name is invalid or packaging
    /// fails.
    pub fn resolve(
        context: &BuildContext,
        repository: &str,
        environment: &EnvironmentConfig,
    ) -> Result<Self> {
        validate_repository(repository)?;
        let PackagedContext {
            archive,
            digest,
            file_count,
        } = package::package(context)?;

        let account = environment
            .account
            .as_deref()
            .unwrap_or(UNRESOLVED_ACCOUNT);
        let registry = format!("{account}.dkr.ecr.{}.amazonaws.com", environment.region);
        let uri = format!("{registry}/{repository}:{}", digest.as_hex());
        tracing::info!(uri = %uri, files = file_count, "image asset resolved");

        Ok(Self {
            context: context.root().to_path_buf(),
            digest,
            registry,
            repository: repository.to_string(),
            uri,
            file_count,
            archive,
        })
    }

    /// Returns the image tag (the digest in hex).
    #[must_use]
    pub fn tag(&self) -> &str {
        self.digest.as_hex()
    }

    /// Returns whether the URI still contains an unresolved account.
    #[must_use]
    pub fn is_account_resolved(&self) -> bool {
        !self.registry.starts_with(UNRESOLVED_ACCOUNT)
    }

    /// Writes the compressed archive to `out_dir/asset.<digest>.tar.gz`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or archive cannot be written.
    pub fn stage(&self, out_dir: &Path) -> Result<PathBuf> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |e: std::io::Error| StacklineError::Io { path, source: e }
        };
        std::fs::create_dir_all(out_dir).map_err(io_err(out_dir))?;
        let path = out_dir.join(format!("asset.{}.tar.gz", self.tag()));
        let file = std::fs::File::create(&path).map_err(io_err(&path))?;
        let mut encoder = flate2::GzBuilder::new()
            .mtime(0)
            .write(file, Compression::default());
        encoder.write_all(&self.archive).map_err(io_err(&path))?;
        let _ = encoder.finish().map_err(io_err(&path))?;
        tracing::info!(path = %path.display(), "image asset staged");
        Ok(path)
    }
}

fn validate_repository(repository: &str) -> Result<()> {
    let valid = !repository.is_empty()
        && repository.len() <= 256
        && repository
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "._-/".contains(c))
        && repository
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(StacklineError::config(format!(
            "invalid image repository name: \"{repository}\""
        )))
    }
}
