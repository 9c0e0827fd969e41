//! Upload bundles and the diff against the file directory.
//!
//! A push payload is a zip holding `listing.json` (every name the client
//! has, mapped to its content hash) and a `diffs/` directory with the bytes
//! of each name whose hash the server does not already have.

use crate::error::ApiError;
use bundler_core::{ContentHash, MANIFEST_NAME, validate_name};
use bundler_metadata::FileMap;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

pub const LISTING_FILE: &str = "listing.json";
pub const DIFFS_DIR: &str = "diffs";

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Failed to decompress the payload.")]
    Decompress,

    #[error("Bad listing name: {0}")]
    BadName(String),

    #[error("Bad listing SHA: {0}")]
    BadSha(String),

    #[error("Listing does not match diffs/ in archive.")]
    Mismatch,

    #[error("{0} is not in the listing")]
    NotInListing(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl From<ArchiveError> for ApiError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::Io(e) => ApiError::Io(e),
            ArchiveError::NotInListing(name) => {
                ApiError::Internal(format!("{name} is not in the listing"))
            }
            other => ApiError::User(other.to_string()),
        }
    }
}

/// Names classified against the directory's current rows. Each list is sorted.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub added: Vec<String>,
    pub changed: Vec<String>,
    pub removed: Vec<String>,
}

impl Comparison {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

/// An extracted push payload. The staging directory is removed on drop.
#[derive(Debug)]
pub struct UploadBundle {
    dir: TempDir,
    listing: BTreeMap<String, String>,
}

impl UploadBundle {
    /// Extract a zip payload into a fresh staging directory and parse its listing.
    ///
    /// Blocking; run it on the blocking pool.
    pub fn extract(payload: &[u8]) -> Result<Self, ArchiveError> {
        let dir = tempfile::Builder::new()
            .prefix("bundler-archive")
            .tempdir()
            .map_err(|e| {
                warn!(error = %e, "Failed to create staging directory");
                ArchiveError::Decompress
            })?;

        unzip(payload, dir.path()).map_err(|e| {
            warn!(error = %e, "Failed to extract zip archive");
            ArchiveError::Decompress
        })?;

        let listing = parse_listing(dir.path())?;
        Ok(Self { dir, listing })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Client listing, name to hash.
    pub fn listing(&self) -> &BTreeMap<String, String> {
        &self.listing
    }

    /// Declared hash for a listed name.
    pub fn hash(&self, name: &str) -> Option<&str> {
        self.listing.get(name).map(String::as_str)
    }

    fn diff_path(&self, name: &str) -> PathBuf {
        self.dir.path().join(DIFFS_DIR).join(name)
    }

    /// Whether `diffs/` holds bytes for `name`. Symlinks do not count.
    pub fn has_content(&self, name: &str) -> bool {
        fs::symlink_metadata(self.diff_path(name))
            .map(|meta| meta.file_type().is_file())
            .unwrap_or(false)
    }

    /// Uploaded bytes for a listed name.
    pub fn content(&self, name: &str) -> Result<Vec<u8>, ArchiveError> {
        if !self.listing.contains_key(name) {
            return Err(ArchiveError::NotInListing(name.to_string()));
        }
        if !self.has_content(name) {
            return Err(ArchiveError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{name} not found in {DIFFS_DIR}/"),
            )));
        }
        Ok(fs::read(self.diff_path(name))?)
    }

    /// The Siphonfile, if the client uploaded a new copy of it.
    pub fn manifest_bytes(&self) -> Result<Option<Vec<u8>>, ArchiveError> {
        if !self.has_content(MANIFEST_NAME) {
            return Ok(None);
        }
        if !self.listing.contains_key(MANIFEST_NAME) {
            return Ok(Some(fs::read(self.diff_path(MANIFEST_NAME))?));
        }
        self.content(MANIFEST_NAME).map(Some)
    }

    /// Classify the listing against the current rows of the namespace.
    ///
    /// Every added or changed name must have its bytes in `diffs/`.
    pub fn compare(&self, files: &FileMap) -> Result<Comparison, ArchiveError> {
        let mut comparison = Comparison::default();

        for (name, hash) in &self.listing {
            match files.get(name) {
                None => comparison.added.push(name.clone()),
                Some(current) if current != hash => comparison.changed.push(name.clone()),
                Some(_) => {}
            }
        }

        for name in comparison.added.iter().chain(&comparison.changed) {
            if !self.has_content(name) {
                debug!(name, "Listed name missing from diffs/");
                return Err(ArchiveError::Mismatch);
            }
        }

        comparison.removed = files
            .keys()
            .filter(|name| !self.listing.contains_key(*name))
            .cloned()
            .collect();

        Ok(comparison)
    }
}

fn parse_listing(root: &Path) -> Result<BTreeMap<String, String>, ArchiveError> {
    let raw = fs::read(root.join(LISTING_FILE)).map_err(|e| {
        warn!(error = %e, "Payload has no listing");
        ArchiveError::Decompress
    })?;
    let listing: BTreeMap<String, String> = serde_json::from_slice(&raw).map_err(|e| {
        warn!(error = %e, "Listing is not a JSON object of strings");
        ArchiveError::Decompress
    })?;

    for (name, sha) in &listing {
        if validate_name(name).is_err() {
            return Err(ArchiveError::BadName(name.clone()));
        }
        // Hashes become blob keys; only hex digests stay inside the namespace.
        if ContentHash::from_hex(sha).is_err() {
            return Err(ArchiveError::BadSha(sha.clone()));
        }
    }
    Ok(listing)
}

/// Entry name re-rooted as a relative path. Rejects any name containing `..`.
fn entry_path(name: &str) -> io::Result<PathBuf> {
    if name.contains("..") {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Bad zip listing name: {name}"),
        ));
    }
    Ok(Path::new(name)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect())
}

/// Whether any directory between `root` and `rel` is a symlink.
fn traverses_symlink(root: &Path, rel: &Path) -> bool {
    let mut current = root.to_path_buf();
    let Some(parent) = rel.parent() else {
        return false;
    };
    for part in parent.components() {
        current.push(part);
        if let Ok(meta) = fs::symlink_metadata(&current)
            && meta.file_type().is_symlink()
        {
            return true;
        }
    }
    false
}

fn unzip(payload: &[u8], dest: &Path) -> io::Result<()> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(payload)).map_err(|e| io::Error::other(e.to_string()))?;
    let mut seen = HashSet::new();

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| io::Error::other(e.to_string()))?;

        let rel = entry_path(file.name())?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        if traverses_symlink(dest, &rel) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Zip entry {} passes through a symlink", file.name()),
            ));
        }
        let target = dest.join(&rel);

        if file.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        // Equivalent names collapse to one path; a second write would follow
        // whatever the first one left there.
        if !seen.insert(rel.clone()) || fs::symlink_metadata(&target).is_ok() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("Duplicate zip entry {}", file.name()),
            ));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let is_symlink = file
            .unix_mode()
            .is_some_and(|mode| mode & S_IFMT == S_IFLNK);
        if is_symlink {
            // The link target is recorded verbatim and not validated.
            let mut link = String::new();
            file.read_to_string(&mut link)?;
            write_symlink(&link, &target)?;
            continue;
        }

        let mut out = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)?;
        io::copy(&mut file, &mut out)?;
    }
    Ok(())
}

#[cfg(unix)]
fn write_symlink(link: &str, target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(link, target)
}

#[cfg(not(unix))]
fn write_symlink(link: &str, target: &Path) -> io::Result<()> {
    fs::write(target, link)
}
