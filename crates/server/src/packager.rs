//! Bundle footer builder.
//!
//! The footer is produced by an external packager run against a scratch
//! project directory. It prints a JSON object naming one footer file per
//! platform, written inside a `siphon-packager-tmp-*` directory that the
//! caller removes once the footers are stored.

use crate::error::ApiError;
use crate::metrics::FOOTER_BUILD_DURATION;
use async_trait::async_trait;
use bundler_core::config::PackagerMode;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;
use tokio::process::Command;

/// Marker carried by every packager output directory.
pub const PACKAGER_TMP_PREFIX: &str = "siphon-packager-tmp-";

pub const DUMMY_FOOTER: &[u8] = b"Dummy bundle footer for testing.";

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Packager diagnostic, shown to the client.
    #[error("{0}")]
    Diagnostic(String),

    #[error("unexpected packager output: {0}")]
    Output(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<BuildError> for ApiError {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::Diagnostic(message) => ApiError::User(message),
            BuildError::Output(message) => ApiError::Internal(message),
            BuildError::Io(e) => ApiError::Io(e),
        }
    }
}

/// Footer files produced by one build. The packager directory is removed on drop.
#[derive(Debug, Default)]
pub struct FooterPaths {
    pub ios: Option<PathBuf>,
    pub android: Option<PathBuf>,
}

#[derive(Deserialize)]
struct PackagerOutput {
    #[serde(default)]
    ios: String,
    #[serde(default)]
    android: String,
}

fn non_empty(path: String) -> Option<PathBuf> {
    (!path.is_empty()).then(|| PathBuf::from(path))
}

impl FooterPaths {
    /// Parse the packager's stdout.
    pub fn from_json(stdout: &[u8]) -> Result<Self, BuildError> {
        let output: PackagerOutput =
            serde_json::from_slice(stdout).map_err(|e| BuildError::Output(e.to_string()))?;
        Ok(Self {
            ios: non_empty(output.ios),
            android: non_empty(output.android),
        })
    }

    /// Path for `ios` or `android`.
    pub fn for_platform(&self, platform: &str) -> Option<&Path> {
        match platform {
            "ios" => self.ios.as_deref(),
            "android" => self.android.as_deref(),
            _ => None,
        }
    }

    /// `(platform, path)` for every footer produced.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Path)> {
        [("ios", self.ios.as_deref()), ("android", self.android.as_deref())]
            .into_iter()
            .filter_map(|(platform, path)| path.map(|p| (platform, p)))
    }

    /// Remove the packager directory. Errors are logged and ignored.
    ///
    /// Only a parent directory named with [`PACKAGER_TMP_PREFIX`] is removed.
    pub fn cleanup(&mut self) {
        let ios = self.ios.take();
        let android = self.android.take();
        let Some(path) = ios.or(android) else {
            return;
        };

        let Some(dir) = path.parent() else {
            return;
        };
        let is_packager_dir = dir
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.contains(PACKAGER_TMP_PREFIX));
        if !is_packager_dir {
            tracing::warn!(dir = %dir.display(), "(Ignored) footer cleanup failed: invalid directory");
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(dir) {
            tracing::warn!(dir = %dir.display(), error = %e, "(Ignored) footer cleanup failed");
        }
    }
}

impl Drop for FooterPaths {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Turns a project directory and a base version into per-platform footers.
#[async_trait]
pub trait FooterBuilder: Send + Sync {
    async fn build(&self, project_dir: &Path, base_version: &str)
    -> Result<FooterPaths, BuildError>;

    fn name(&self) -> &'static str;
}

/// Runs the packager through `bash -c`, optionally sourcing nvm first.
pub struct CommandBuilder {
    program: String,
    nvm_dir: Option<PathBuf>,
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

impl CommandBuilder {
    pub fn new(program: impl Into<String>, nvm_dir: Option<PathBuf>) -> Self {
        Self {
            program: program.into(),
            nvm_dir,
        }
    }

    /// Script handed to `bash -c`.
    pub fn script(&self, project_dir: &Path, base_version: &str) -> String {
        let prefix = match &self.nvm_dir {
            Some(dir) => format!(
                "source {} && ",
                shell_quote(&dir.join("nvm.sh").to_string_lossy())
            ),
            None => String::new(),
        };
        format!(
            "{prefix}{} --footer --project-path {} --base-version {} --minify",
            self.program,
            shell_quote(&project_dir.to_string_lossy()),
            shell_quote(base_version),
        )
    }
}

#[async_trait]
impl FooterBuilder for CommandBuilder {
    async fn build(
        &self,
        project_dir: &Path,
        base_version: &str,
    ) -> Result<FooterPaths, BuildError> {
        let script = self.script(project_dir, base_version);
        tracing::info!(script = %script, "Running packager");

        let started = Instant::now();
        let output = Command::new("bash")
            .arg("-c")
            .arg(&script)
            .stdin(Stdio::null())
            .output()
            .await?;
        FOOTER_BUILD_DURATION.observe(started.elapsed().as_secs_f64());

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::warn!(status = %output.status, stderr = %stderr, "Packager failed");
            return Err(BuildError::Diagnostic(stderr));
        }
        FooterPaths::from_json(&output.stdout)
    }

    fn name(&self) -> &'static str {
        "command"
    }
}

/// Writes placeholder footers for both platforms. Testing only.
pub struct DummyBuilder;

#[async_trait]
impl FooterBuilder for DummyBuilder {
    async fn build(
        &self,
        _project_dir: &Path,
        _base_version: &str,
    ) -> Result<FooterPaths, BuildError> {
        let dir = tempfile::Builder::new()
            .prefix(PACKAGER_TMP_PREFIX)
            .tempdir()?
            .keep();
        let paths = FooterPaths {
            ios: Some(dir.join("bundle-footer-ios")),
            android: Some(dir.join("bundle-footer-android")),
        };
        for (_, path) in paths.iter() {
            tokio::fs::write(path, DUMMY_FOOTER).await?;
        }
        Ok(paths)
    }

    fn name(&self) -> &'static str {
        "dummy"
    }
}

/// Build the configured footer builder.
pub fn builder_from_config(mode: &PackagerMode) -> Arc<dyn FooterBuilder> {
    match mode {
        PackagerMode::Command { program, nvm_dir } => {
            Arc::new(CommandBuilder::new(program.clone(), nvm_dir.clone()))
        }
        PackagerMode::Dummy => Arc::new(DummyBuilder),
    }
}
