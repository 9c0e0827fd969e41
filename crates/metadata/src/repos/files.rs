//! File directory repository trait.

use crate::error::MetadataResult;
use crate::models::FileMap;
use async_trait::async_trait;

/// Directory of `(app, submission, name) -> hash` records.
///
/// Every operation is scoped to one namespace: `submission_id = None` (or an
/// empty string) addresses the development namespace, anything else an
/// immutable submission snapshot.
#[async_trait]
pub trait FileRepo: Send + Sync {
    /// Insert a record. Fails with `AlreadyExists` if the name is already
    /// present in the namespace.
    async fn add_file(
        &self,
        app_id: &str,
        submission_id: Option<&str>,
        name: &str,
        hash: &str,
    ) -> MetadataResult<()>;

    /// Change the hash of an existing record. Matching no row is not an error.
    async fn update_file(
        &self,
        app_id: &str,
        submission_id: Option<&str>,
        name: &str,
        hash: &str,
    ) -> MetadataResult<()>;

    /// Remove a record. Matching no row is not an error.
    async fn delete_file(
        &self,
        app_id: &str,
        submission_id: Option<&str>,
        name: &str,
    ) -> MetadataResult<()>;

    /// Hash recorded for one name.
    async fn get_file(
        &self,
        app_id: &str,
        submission_id: Option<&str>,
        name: &str,
    ) -> MetadataResult<String>;

    /// Every record in the namespace.
    async fn get_files(&self, app_id: &str, submission_id: Option<&str>)
    -> MetadataResult<FileMap>;

    /// Records whose name matches an SQL LIKE pattern. An empty pattern matches everything.
    async fn get_filtered_files(
        &self,
        app_id: &str,
        submission_id: Option<&str>,
        pattern: &str,
    ) -> MetadataResult<FileMap>;

    /// Records whose name has an asset extension.
    async fn get_asset_files(
        &self,
        app_id: &str,
        submission_id: Option<&str>,
    ) -> MetadataResult<FileMap>;

    /// Records for the given names; names with no record are absent from the map.
    async fn get_files_by_names(
        &self,
        app_id: &str,
        submission_id: Option<&str>,
        names: &[String],
    ) -> MetadataResult<FileMap>;

    /// Whether any record (in any namespace) exists for the app.
    async fn app_exists(&self, app_id: &str) -> MetadataResult<bool>;

    /// Whether any record exists for the submission id, across all apps.
    async fn submission_exists(&self, submission_id: &str) -> MetadataResult<bool>;

    /// Copy every development record of the app into `submission_id`.
    ///
    /// Runs as a single statement: either every row is copied or none is.
    /// Returns the number of copied rows.
    async fn snapshot(&self, app_id: &str, submission_id: &str) -> MetadataResult<u64>;
}
