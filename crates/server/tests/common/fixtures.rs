//! Test fixtures for generating payloads and handshakes.

use bundler_core::Handshake;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;

/// A minimal valid Siphonfile.
#[allow(dead_code)]
pub const SIPHONFILE: &[u8] = br#"{"base_version": "0.1", "display_name": "Test App"}"#;

/// Compute SHA-256 hash of data as hex string.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub fn sha256_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Builder for the zip payload a client pushes: `listing.json` plus the
/// bytes of every name that changed under `diffs/`.
#[allow(dead_code)]
#[derive(Default)]
pub struct PushPayload {
    listing: BTreeMap<String, String>,
    diffs: Vec<(String, Vec<u8>)>,
}

#[allow(dead_code)]
impl PushPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// List a name and ship its bytes.
    pub fn file(mut self, name: &str, data: &[u8]) -> Self {
        self.listing.insert(name.to_string(), sha256_hash(data));
        self.diffs.push((name.to_string(), data.to_vec()));
        self
    }

    /// List a name the server already holds, without shipping bytes.
    pub fn unchanged(mut self, name: &str, data: &[u8]) -> Self {
        self.listing.insert(name.to_string(), sha256_hash(data));
        self
    }

    /// Ship bytes under a hash chosen by the caller.
    pub fn declared(mut self, name: &str, hash: &str, data: &[u8]) -> Self {
        self.listing.insert(name.to_string(), hash.to_string());
        self.diffs.push((name.to_string(), data.to_vec()));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let listing = serde_json::to_vec(&self.listing).expect("listing serializes");
        let mut zw = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();

        zw.start_file("listing.json", options).unwrap();
        zw.write_all(&listing).unwrap();
        for (name, data) in &self.diffs {
            zw.start_file(format!("diffs/{name}"), options).unwrap();
            zw.write_all(data).unwrap();
        }
        zw.finish().unwrap().into_inner()
    }
}

/// Development handshake for a signed-in user.
#[allow(dead_code)]
pub fn dev_handshake(action: &str, app_id: &str, user_id: &str) -> Handshake {
    Handshake {
        action: action.to_string(),
        app_id: app_id.to_string(),
        user_id: user_id.to_string(),
        submission_id: String::new(),
    }
}

/// Production handshake bound to a submission.
#[allow(dead_code)]
pub fn submission_handshake(action: &str, app_id: &str, submission_id: &str) -> Handshake {
    Handshake {
        action: action.to_string(),
        app_id: app_id.to_string(),
        user_id: String::new(),
        submission_id: submission_id.to_string(),
    }
}

/// `handshake_token=..&handshake_signature=..` for a handshake.
#[allow(dead_code)]
pub fn handshake_query(handshake: &Handshake) -> String {
    let token = handshake.encode().expect("handshake encodes");
    format!(
        "handshake_token={}&handshake_signature=unsigned",
        utf8_percent_encode(&token, NON_ALPHANUMERIC)
    )
}

/// Request path with the handshake query attached.
#[allow(dead_code)]
pub fn endpoint(action: &str, app_id: &str, handshake: &Handshake) -> String {
    format!("/v1/{action}/{app_id}/?{}", handshake_query(handshake))
}

/// PNG signature plus an IHDR chunk for the given dimensions.
#[allow(dead_code)]
pub fn png_header(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
    bytes.extend_from_slice(&13u32.to_be_bytes());
    bytes.extend_from_slice(b"IHDR");
    bytes.extend_from_slice(&width.to_be_bytes());
    bytes.extend_from_slice(&height.to_be_bytes());
    bytes.extend_from_slice(&[8, 6, 0, 0, 0]);
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    bytes
}
