//! File name rules for listings and asset classification.

use crate::error::{Error, Result};

/// Extensions treated as pullable assets.
pub const ASSET_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".psd", ".svg", ".webp"];

/// Check that a listing name is a relative forward-slash path that cannot
/// escape its root.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidName("empty name".to_string()));
    }
    if name.starts_with('/') || name.contains('\\') || name.contains('\0') {
        return Err(Error::InvalidName(name.to_string()));
    }
    if name.split('/').any(|segment| segment == "..") {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}
