//! SHA-256 content addressing.

use std::path::Path;

use sha2::{Digest, Sha256};
use stackline_common::error::{Result, StacklineError};
use stackline_common::types::Sha256Hash;

/// Computes the SHA-256 hash of an in-memory buffer.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> Sha256Hash {
    Sha256Hash::from_bytes(&Sha256::digest(bytes))
}

/// Computes the SHA-256 hash of a file.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn hash_file(path: &Path) -> Result<Sha256Hash> {
    tracing::debug!(path = %path.display(), "computing SHA-256 hash");
    let io_err = |e| StacklineError::Io {
        path: path.to_path_buf(),
        source: e,
    };
    let mut file = std::fs::File::open(path).map_err(io_err)?;
    let mut hasher = Sha256::new();
    let _ = std::io::copy(&mut file, &mut hasher).map_err(io_err)?;
    Ok(Sha256Hash::from_bytes(&hasher.finalize()))
}

/// Validates that a file matches the expected SHA-256 hash.
///
/// # Errors
///
/// Returns `StacklineError::HashMismatch` if the hashes do not match.
pub fn validate_hash(path: &Path, expected: &Sha256Hash) -> Result<()> {
    tracing::debug!(path = %path.display(), "validating SHA-256 hash");
    let actual = hash_file(path)?;
    if &actual != expected {
        return Err(StacklineError::HashMismatch {
            resource: path.display().to_string(),
            expected: expected.as_hex().to_string(),
            actual: actual.as_hex().to_string(),
        });
    }
    Ok(())
}
