//! stereocast Common Library
//!
//! This crate provides shared constants and configuration loading utilities
//! for all stereocast workspace crates.
//!
//! # Module Structure
//!
//! - [`shm`] - Channel segment names, spin intervals and the write admission policy
//! - [`config`] - Configuration loading traits and types
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! Add to your `Cargo.toml` with alias for shorter imports:
//! ```toml
//! [dependencies]
//! common = { package = "stereocast_common", path = "../stereocast_common" }
//! ```
//!
//! Then import:
//! ```rust
//! use stereocast_common::shm::consts::*;
//! use stereocast_common::config::{ConfigLoader, SharedConfig};
//! ```

pub mod config;
pub mod prelude;
pub mod shm;
