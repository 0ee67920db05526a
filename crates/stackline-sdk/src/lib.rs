//! # stackline-sdk
//!
//! Public SDK for using Stackline as a Rust library.
//!
//! Provides three main entry points:
//! - [`App`](app::App): Explicit registry of topology modules backed by one resource graph.
//! - [`compose`](compose::compose): Builds the network, then the compute service on top of it.
//! - [`OutputSet`](outputs::OutputSet): The externally consumed results of a composition.
//!
//! # Example
//!
//! ```rust,no_run
//! use stackline_common::config::StacklineConfig;
//! use stackline_sdk::compose::compose;
//!
//! let composition = compose(&StacklineConfig::default())?;
//! let assembly = composition.app.synthesize()?;
//! # Ok::<(), stackline_common::error::StacklineError>(())
//! ```

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod app;
pub mod compose;
pub mod outputs;

pub use app::{App, ModuleRecord};
pub use compose::{Composition, compose};
pub use outputs::OutputSet;
