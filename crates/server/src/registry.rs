//! Client for the web frontend's app metadata endpoint.

use crate::auth::VerifiedHandshake;
use crate::error::{ApiError, ApiResult};
use crate::icons::IconData;
use async_trait::async_trait;
use bundler_core::Manifest;
use bundler_core::config::RegistryMode;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

pub const TOKEN_HEADER: &str = "X-Siphon-Handshake-Token";
pub const SIGNATURE_HEADER: &str = "X-Siphon-Handshake-Signature";

/// Characters left as-is by query escaping.
const QUERY_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const TRANSPORT_ERROR: &str = "Internal error while updating app metadata.";

/// Form body sent with every update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AppUpdate {
    pub base_version: String,
    pub display_name: String,
    pub facebook_app_id: String,
    pub app_store_name: String,
    pub play_store_name: String,
    pub app_store_language: String,
    pub play_store_language: String,
    /// JSON array of [`IconData`].
    pub icons: String,
}

impl AppUpdate {
    pub fn new(manifest: &Manifest, icons: &[IconData]) -> ApiResult<Self> {
        let icons = serde_json::to_string(icons).map_err(|e| {
            tracing::error!(error = %e, "Failed to serialize icons");
            ApiError::User(TRANSPORT_ERROR.to_string())
        })?;
        Ok(Self {
            base_version: manifest.base_version.clone(),
            display_name: manifest.display_name.clone(),
            facebook_app_id: manifest.facebook_app_id.clone(),
            app_store_name: manifest.ios.store_name.clone(),
            play_store_name: manifest.android.store_name.clone(),
            app_store_language: manifest.ios.language.clone(),
            play_store_language: manifest.android.language.clone(),
            icons,
        })
    }
}

/// Receives the manifest fields and icons after a successful build.
#[async_trait]
pub trait MetadataRegistry: Send + Sync {
    async fn put_app(
        &self,
        app_id: &str,
        update: &AppUpdate,
        handshake: &VerifiedHandshake,
    ) -> ApiResult<()>;

    fn name(&self) -> &'static str;
}

/// `PUT <base_url>/api/v1/apps/<app_id>` as a urlencoded form.
pub struct HttpRegistry {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRegistry {
    pub fn new(base_url: &str, timeout: Duration) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Config(format!("failed to build registry client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self, app_id: &str) -> String {
        format!(
            "{}/api/v1/apps/{}",
            self.base_url,
            utf8_percent_encode(app_id, QUERY_ESCAPE)
        )
    }
}

fn header_value(raw: &str) -> String {
    utf8_percent_encode(raw, QUERY_ESCAPE).to_string()
}

#[async_trait]
impl MetadataRegistry for HttpRegistry {
    async fn put_app(
        &self,
        app_id: &str,
        update: &AppUpdate,
        handshake: &VerifiedHandshake,
    ) -> ApiResult<()> {
        let response = self
            .client
            .put(self.endpoint(app_id))
            .header(TOKEN_HEADER, header_value(&handshake.token))
            .header(SIGNATURE_HEADER, header_value(&handshake.signature))
            .form(update)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(app_id, error = %e, "App metadata PUT failed");
                ApiError::User(TRANSPORT_ERROR.to_string())
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.map_err(|e| {
                tracing::warn!(app_id, status = %status, error = %e, "Unreadable registry response");
                ApiError::User(TRANSPORT_ERROR.to_string())
            })?;
            return Err(ApiError::User(format!(
                "Problem updating metadata: {body} [{}]",
                status.as_u16()
            )));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Logs the update and succeeds. Testing only.
pub struct LogRegistry;

#[async_trait]
impl MetadataRegistry for LogRegistry {
    async fn put_app(
        &self,
        app_id: &str,
        update: &AppUpdate,
        _handshake: &VerifiedHandshake,
    ) -> ApiResult<()> {
        tracing::info!(app_id, icons = %update.icons, update = ?update, "App metadata update");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Build the configured registry client.
pub fn registry_from_config(mode: &RegistryMode) -> ApiResult<Arc<dyn MetadataRegistry>> {
    match mode {
        RegistryMode::Http {
            base_url,
            timeout_secs,
        } => Ok(Arc::new(HttpRegistry::new(
            base_url,
            Duration::from_secs(*timeout_secs),
        )?)),
        RegistryMode::Log => Ok(Arc::new(LogRegistry)),
    }
}
