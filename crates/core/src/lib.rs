//! Core domain types shared by the bundler crates.
//!
//! This crate defines the data model used across all other crates:
//! - Content hashes used as blob keys
//! - The project manifest (Siphonfile) and its validation rules
//! - Handshake tokens carried by authenticated requests
//! - File name rules for uploaded listings
//! - Process configuration

pub mod config;
pub mod error;
pub mod handshake;
pub mod hash;
pub mod manifest;
pub mod names;

pub use error::{Error, Result};
pub use handshake::{Action, Handshake, Identity};
pub use hash::ContentHash;
pub use manifest::{MANIFEST_NAME, Manifest, PlatformManifest};
pub use names::{ASSET_EXTENSIONS, validate_name};

/// Well-known per-platform artifact name prefix.
pub const BUNDLE_FOOTER_PREFIX: &str = "bundle-footer";

/// Artifact name for a platform (e.g. `bundle-footer-ios`).
pub fn bundle_footer_name(platform: &str) -> String {
    format!("{BUNDLE_FOOTER_PREFIX}-{platform}")
}
