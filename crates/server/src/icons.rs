//! App icon descriptors for the metadata registry.

use crate::error::{ApiError, ApiResult};
use bundler_metadata::FileMap;
use serde::Serialize;
use std::path::Path;

pub const ICON_PLATFORMS: [&str; 2] = ["android", "ios"];

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

/// One icon as reported to the registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IconData {
    /// Path under the platform's icon directory, without extension.
    pub name: String,
    pub platform: String,
    pub height: u32,
    pub width: u32,
    pub image_format: String,
}

fn unsupported(name: &str) -> ApiError {
    ApiError::User(format!(
        "Unsupported icon {name} detected. All icons must have a png extension."
    ))
}

/// Width and height from the IHDR chunk, if `bytes` is a PNG.
pub fn png_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.len() < 24 || bytes[..8] != PNG_SIGNATURE || &bytes[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes(bytes[16..20].try_into().ok()?);
    let height = u32::from_be_bytes(bytes[20..24].try_into().ok()?);
    if width == 0 || height == 0 {
        return None;
    }
    Some((width, height))
}

/// Describe every icon under `publish/{android,ios}/icons/` in `files`,
/// reading bytes from the materialized project directory.
pub fn collect_icons(project_dir: &Path, files: &FileMap) -> ApiResult<Vec<IconData>> {
    let mut icons = Vec::new();
    for name in files.keys() {
        for platform in ICON_PLATFORMS {
            let prefix = format!("publish/{platform}/icons/");
            let Some(relative) = name.strip_prefix(&prefix) else {
                continue;
            };
            let Some(icon_name) = relative.strip_suffix(".png") else {
                return Err(unsupported(name));
            };

            let bytes = std::fs::read(project_dir.join(name))?;
            let (width, height) = png_dimensions(&bytes).ok_or_else(|| unsupported(icon_name))?;
            icons.push(IconData {
                name: icon_name.to_string(),
                platform: platform.to_string(),
                height,
                width,
                image_format: "png".to_string(),
            });
        }
    }
    Ok(icons)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn png_header(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = PNG_SIGNATURE.to_vec();
        bytes.extend_from_slice(&13u32.to_be_bytes());
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&width.to_be_bytes());
        bytes.extend_from_slice(&height.to_be_bytes());
        bytes.extend_from_slice(&[8, 6, 0, 0, 0]);
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        bytes
    }

    fn project(files: &[(&str, Vec<u8>)]) -> (tempfile::TempDir, FileMap) {
        let dir = tempfile::tempdir().unwrap();
        let mut map = FileMap::new();
        for (name, bytes) in files {
            let path = dir.path().join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, bytes).unwrap();
            map.insert(name.to_string(), "hash".to_string());
        }
        (dir, map)
    }

    #[test]
    fn test_reads_ihdr_dimensions() {
        assert_eq!(png_dimensions(&png_header(120, 60)), Some((120, 60)));
        assert_eq!(png_dimensions(b"GIF89a"), None);
        assert_eq!(png_dimensions(&png_header(0, 60)), None);
    }

    #[test]
    fn test_collects_icons_for_both_platforms() {
        let (dir, files) = project(&[
            ("publish/ios/icons/AppIcon/60@2x.png", png_header(120, 120)),
            ("publish/android/icons/mdpi.png", png_header(48, 48)),
            ("index.js", b"x".to_vec()),
        ]);

        let icons = collect_icons(dir.path(), &files).unwrap();
        assert_eq!(
            icons,
            vec![
                IconData {
                    name: "mdpi".to_string(),
                    platform: "android".to_string(),
                    height: 48,
                    width: 48,
                    image_format: "png".to_string(),
                },
                IconData {
                    name: "AppIcon/60@2x".to_string(),
                    platform: "ios".to_string(),
                    height: 120,
                    width: 120,
                    image_format: "png".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_non_png_icon_rejected() {
        let (dir, files) = project(&[("publish/ios/icons/icon.jpg", b"x".to_vec())]);
        let err = collect_icons(dir.path(), &files).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unsupported icon publish/ios/icons/icon.jpg detected. All icons must have a png extension."
        );
    }

    #[test]
    fn test_undecodable_png_rejected() {
        let (dir, files) = project(&[("publish/android/icons/hdpi.png", b"nope".to_vec())]);
        let err = collect_icons(dir.path(), &files).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unsupported icon hdpi detected. All icons must have a png extension."
        );
    }

    #[test]
    fn test_icons_outside_directory_ignored() {
        let (dir, files) = project(&[
            ("publish/ios/icon.jpg", b"x".to_vec()),
            ("publish/ios/iconset/icon.jpg", b"x".to_vec()),
        ]);
        assert!(collect_icons(dir.path(), &files).unwrap().is_empty());
    }
}
