//! Handshake tokens.
//!
//! A handshake is a standard-base64 JSON document issued by the web
//! frontend. It names the action the bearer may perform on one app, and
//! either the developer (`user_id`) or the release snapshot
//! (`submission_id`) it acts for.

use crate::error::{Error, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Endpoint family a handshake grants access to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Push,
    Pull,
    Submit,
}

impl Action {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "push" => Some(Self::Push),
            "pull" => Some(Self::Pull),
            "submit" => Some(Self::Submit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Pull => "pull",
            Self::Submit => "submit",
        }
    }

    /// Request path prefix this action is valid for.
    pub fn path_prefix(&self) -> String {
        format!("/v1/{}/", self.as_str())
    }
}

/// Who a verified handshake acts for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Identity {
    /// Development handshake for a signed-in user.
    Developer { user_id: String },
    /// Production handshake bound to a submission snapshot.
    Submission { submission_id: String },
}

/// Decoded handshake token.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Handshake {
    pub action: String,
    pub app_id: String,
    pub user_id: String,
    pub submission_id: String,
}

impl Handshake {
    /// Decode a `handshake_token` query value.
    pub fn decode(token: &str) -> Result<Self> {
        let raw = Self::raw_bytes(token)?;
        serde_json::from_slice(&raw).map_err(|e| Error::InvalidHandshake(e.to_string()))
    }

    /// Bytes covered by the handshake signature.
    pub fn raw_bytes(token: &str) -> Result<Vec<u8>> {
        base64::engine::general_purpose::STANDARD
            .decode(token)
            .map_err(|e| Error::InvalidHandshake(e.to_string()))
    }

    /// Encode as a `handshake_token` query value.
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(base64::engine::general_purpose::STANDARD.encode(json))
    }

    pub fn action(&self) -> Option<Action> {
        Action::parse(&self.action)
    }

    /// Resolve the identity, enforcing that exactly one of `user_id` and
    /// `submission_id` is set.
    pub fn identity(&self) -> Result<Identity> {
        match (self.user_id.is_empty(), self.submission_id.is_empty()) {
            (true, false) => Ok(Identity::Submission {
                submission_id: self.submission_id.clone(),
            }),
            (false, true) => Ok(Identity::Developer {
                user_id: self.user_id.clone(),
            }),
            (false, false) => Err(Error::MalformedHandshake(
                "submission handshake carries a user_id".to_string(),
            )),
            (true, true) => Err(Error::MalformedHandshake(
                "development handshake without a user_id".to_string(),
            )),
        }
    }
}

impl Identity {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Developer { user_id } => Some(user_id),
            Self::Submission { .. } => None,
        }
    }

    pub fn submission_id(&self) -> Option<&str> {
        match self {
            Self::Developer { .. } => None,
            Self::Submission { submission_id } => Some(submission_id),
        }
    }
}
