//! Domain primitive types used across the Stackline workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StacklineError};

/// SHA-256 hash digest used for content addressing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Sha256Hash(String);

impl Sha256Hash {
    /// Creates a hash from a hex-encoded string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not a valid 64-character hex string.
    pub fn from_hex(hex: impl Into<String>) -> Result<Self> {
        let hex = hex.into();
        if hex.len() != crate::constants::SHA256_HEX_LENGTH
            || !hex.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(StacklineError::config(format!(
                "invalid SHA-256 hex string: {hex}"
            )));
        }
        Ok(Self(hex.to_ascii_lowercase()))
    }

    /// Builds a hash from raw digest bytes.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        use fmt::Write as _;

        let mut hex = String::with_capacity(bytes.len() * 2);
        for b in bytes {
            let _ = write!(hex, "{b:02x}");
        }
        Self(hex)
    }

    /// Returns the hex-encoded hash string.
    #[must_use]
    pub fn as_hex(&self) -> &str {
        &self.0
    }

    /// Returns the first `len` hex characters, for use in generated names.
    #[must_use]
    pub fn short(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }
}

impl fmt::Display for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sha256:{}", self.0)
    }
}

/// CPU architecture a task runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CpuArchitecture {
    /// 64-bit x86.
    X86_64,
    /// 64-bit ARM (Graviton).
    #[default]
    Arm64,
}

impl CpuArchitecture {
    /// Returns the identifier used in task definitions.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::X86_64 => "X86_64",
            Self::Arm64 => "ARM64",
        }
    }
}

impl fmt::Display for CpuArchitecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CpuArchitecture {
    type Err = StacklineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "X86_64" | "AMD64" => Ok(Self::X86_64),
            "ARM64" | "AARCH64" => Ok(Self::Arm64),
            other => Err(StacklineError::config(format!(
                "unsupported CPU architecture: {other}"
            ))),
        }
    }
}

/// Application-layer protocol of a listener or target group.
///
/// The service only speaks plain HTTP and the listener carries no
/// certificate, so TLS is not offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    /// Plain HTTP.
    #[default]
    Http,
}

impl Protocol {
    /// Returns the protocol name used in resource properties.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "HTTP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_from_hex_rejects_short_input() {
        assert!(Sha256Hash::from_hex("abc").is_err());
    }

    #[test]
    fn sha256_from_hex_normalizes_case() {
        let hex = "A".repeat(64);
        let hash = Sha256Hash::from_hex(hex).expect("valid hex");
        assert_eq!(hash.as_hex(), "a".repeat(64));
    }

    #[test]
    fn sha256_from_bytes_encodes_lowercase_hex() {
        let hash = Sha256Hash::from_bytes(&[0x00, 0xab, 0xff]);
        assert_eq!(hash.as_hex(), "00abff");
        assert_eq!(hash.short(2), "00");
        assert_eq!(hash.to_string(), "sha256:00abff");
    }

    #[test]
    fn cpu_architecture_parses_aliases() {
        assert_eq!(
            "aarch64".parse::<CpuArchitecture>().expect("parse"),
            CpuArchitecture::Arm64
        );
        assert_eq!(
            "amd64".parse::<CpuArchitecture>().expect("parse"),
            CpuArchitecture::X86_64
        );
        assert!("riscv".parse::<CpuArchitecture>().is_err());
    }

    #[test]
    fn cpu_architecture_serializes_as_task_definition_value() {
        let json = serde_json::to_string(&CpuArchitecture::Arm64).expect("serialize");
        assert_eq!(json, "\"ARM64\"");
    }
}
