//! Project manifest (`Siphonfile`) parsing and validation.
//!
//! Validation messages are returned to the client verbatim, so their wording
//! is part of the protocol.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// File name of the project manifest inside an app's file set.
pub const MANIFEST_NAME: &str = "Siphonfile";

const MAX_DISPLAY_NAME: usize = 32;
const MAX_FACEBOOK_APP_ID: usize = 32;
const MAX_IOS_STORE_NAME: usize = 255;
const MAX_ANDROID_STORE_NAME: usize = 30;
const MAX_LANGUAGE: usize = 7;

/// Per-platform store settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformManifest {
    pub language: String,
    pub store_name: String,
}

/// Parsed contents of a Siphonfile. Unknown keys are ignored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub base_version: String,
    pub display_name: String,
    pub facebook_app_id: String,
    pub ios: PlatformManifest,
    pub android: PlatformManifest,
}

impl Manifest {
    /// Parse and validate raw Siphonfile bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let manifest: Manifest = serde_json::from_slice(bytes).map_err(|_| {
            Error::Manifest(format!(
                "The format of your {MANIFEST_NAME} is invalid. Please check the documentation."
            ))
        })?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Check field values against the documented limits.
    pub fn validate(&self) -> Result<()> {
        if self.base_version.is_empty() {
            return Err(Error::Manifest(format!(
                r#"The "base_version" key in your {MANIFEST_NAME} is empty, it should be a string like "0.1"."#
            )));
        }
        if self.base_version.parse::<f64>().is_err() {
            return Err(Error::Manifest(format!(
                r#"The "base_version" key in your {MANIFEST_NAME} is not in the correct format, it should be a string like "0.1"."#
            )));
        }
        if char_len(&self.display_name) > MAX_DISPLAY_NAME {
            return Err(Error::Manifest(format!(
                r#"The "display_name" key in your {MANIFEST_NAME} is too long. The maximum is {MAX_DISPLAY_NAME} characters."#
            )));
        }
        if char_len(&self.facebook_app_id) > MAX_FACEBOOK_APP_ID {
            return Err(Error::Manifest(format!(
                r#"The "facebook_app_id" key in your {MANIFEST_NAME} is too long. You can find the app ID in your app's dashboard at https://developers.facebook.com"#
            )));
        }
        check_platform(&self.ios, "iOS", MAX_IOS_STORE_NAME)?;
        check_platform(&self.android, "Android", MAX_ANDROID_STORE_NAME)?;
        Ok(())
    }
}

fn check_platform(platform: &PlatformManifest, label: &str, max_store_name: usize) -> Result<()> {
    if char_len(&platform.store_name) > max_store_name {
        return Err(Error::Manifest(format!(
            r#"The {label} "store_name" key in your {MANIFEST_NAME} is too long. The maximum is {max_store_name} characters."#
        )));
    }
    if char_len(&platform.language) > MAX_LANGUAGE {
        return Err(Error::Manifest(format!(
            r#"The {label} "language" key in your {MANIFEST_NAME} is too long. The maximum is {MAX_LANGUAGE} characters."#
        )));
    }
    Ok(())
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
