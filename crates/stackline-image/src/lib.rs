//! # stackline-image
//!
//! Turns a local source tree into a content-addressed container asset.
//!
//! Handles:
//! - **Context**: Build-context discovery and exclusion patterns.
//! - **Package**: Deterministic tar archives of the included files.
//! - **Hashing**: SHA-256 digests of archives and staged files.
//! - **Asset**: Image URI resolution and on-disk staging.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod asset;
pub mod context;
pub mod hash;
pub mod package;

pub use asset::ImageAsset;
pub use context::BuildContext;
