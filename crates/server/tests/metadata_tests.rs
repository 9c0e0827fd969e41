//! File directory tests, run against every metadata backend.

mod common;

use bundler_metadata::MetadataError;
use common::{TestMetadata, run_metadata_test_both};

#[tokio::test]
async fn test_sqlite_store_reports_backend() {
    let metadata = TestMetadata::new().await.unwrap();
    let store = metadata.store();

    store.health_check().await.unwrap();
    assert_eq!(store.backend_name(), "sqlite");
}

#[tokio::test]
async fn test_namespaces_are_isolated() {
    run_metadata_test_both(|store| async move {
        store.add_file("app", None, "index.js", "h-dev").await.unwrap();
        store
            .add_file("app", Some("sub-1"), "index.js", "h-sub")
            .await
            .unwrap();
        store.add_file("other", None, "index.js", "h-other").await.unwrap();

        assert_eq!(store.get_file("app", None, "index.js").await.unwrap(), "h-dev");
        assert_eq!(
            store.get_file("app", Some("sub-1"), "index.js").await.unwrap(),
            "h-sub"
        );
        // An empty submission id addresses the development namespace.
        assert_eq!(
            store.get_file("app", Some(""), "index.js").await.unwrap(),
            "h-dev"
        );
        assert_eq!(store.get_files("other", None).await.unwrap().len(), 1);
    })
    .await;
}

#[tokio::test]
async fn test_duplicate_name_is_rejected() {
    run_metadata_test_both(|store| async move {
        store.add_file("app", None, "a.js", "h1").await.unwrap();

        let err = store.add_file("app", None, "a.js", "h2").await.unwrap_err();
        assert!(matches!(err, MetadataError::AlreadyExists(_)));
        assert_eq!(store.get_file("app", None, "a.js").await.unwrap(), "h1");
    })
    .await;
}

#[tokio::test]
async fn test_update_and_delete_are_scoped() {
    run_metadata_test_both(|store| async move {
        store.add_file("app", None, "a.js", "h1").await.unwrap();
        store.add_file("app", Some("s1"), "a.js", "h1").await.unwrap();

        store.update_file("app", None, "a.js", "h2").await.unwrap();
        assert_eq!(store.get_file("app", None, "a.js").await.unwrap(), "h2");
        assert_eq!(store.get_file("app", Some("s1"), "a.js").await.unwrap(), "h1");

        store.delete_file("app", None, "a.js").await.unwrap();
        assert!(store.get_file("app", None, "a.js").await.unwrap_err().is_not_found());
        assert!(store.get_file("app", Some("s1"), "a.js").await.is_ok());

        // Matching nothing is not an error.
        store.update_file("app", None, "missing.js", "h").await.unwrap();
        store.delete_file("app", None, "missing.js").await.unwrap();
    })
    .await;
}

#[tokio::test]
async fn test_asset_and_filtered_lookups() {
    run_metadata_test_both(|store| async move {
        for (name, hash) in [
            ("index.js", "h1"),
            ("images/logo.png", "h2"),
            ("images/raw.psdx", "h3"),
            ("icons/app.svg", "h4"),
            ("notes.pngx", "h5"),
            ("images/photo.PNG", "h6"),
        ] {
            store.add_file("app", None, name, hash).await.unwrap();
        }

        let assets = store.get_asset_files("app", None).await.unwrap();
        let names: Vec<&str> = assets.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["icons/app.svg", "images/logo.png"]);

        let images = store
            .get_filtered_files("app", None, "images/%")
            .await
            .unwrap();
        assert_eq!(images.len(), 3);
        assert_eq!(
            store.get_filtered_files("app", None, "").await.unwrap().len(),
            6
        );
    })
    .await;
}

#[tokio::test]
async fn test_lookup_by_names_skips_unknown() {
    run_metadata_test_both(|store| async move {
        for i in 0..150 {
            store
                .add_file("app", None, &format!("f{i}.js"), &format!("h{i}"))
                .await
                .unwrap();
        }
        let mut names: Vec<String> = (0..150).map(|i| format!("f{i}.js")).collect();
        names.push("missing.js".to_string());

        let found = store.get_files_by_names("app", None, &names).await.unwrap();
        assert_eq!(found.len(), 150);
        assert_eq!(found["f149.js"], "h149");
        assert!(
            store
                .get_files_by_names("app", None, &[])
                .await
                .unwrap()
                .is_empty()
        );
    })
    .await;
}

#[tokio::test]
async fn test_existence_checks() {
    run_metadata_test_both(|store| async move {
        assert!(!store.app_exists("app").await.unwrap());
        store.add_file("app", Some("s1"), "a.js", "h").await.unwrap();

        assert!(store.app_exists("app").await.unwrap());
        assert!(store.submission_exists("s1").await.unwrap());
        assert!(!store.submission_exists("s2").await.unwrap());
    })
    .await;
}

#[tokio::test]
async fn test_snapshot_copies_every_dev_row_once() {
    run_metadata_test_both(|store| async move {
        store.add_file("app", None, "a.js", "h1").await.unwrap();
        store.add_file("app", None, "b.png", "h2").await.unwrap();
        store.add_file("other", None, "c.js", "h3").await.unwrap();

        assert_eq!(store.snapshot("app", "s1").await.unwrap(), 2);
        assert_eq!(
            store.get_files("app", Some("s1")).await.unwrap(),
            store.get_files("app", None).await.unwrap()
        );

        let err = store.snapshot("app", "s1").await.unwrap_err();
        assert!(matches!(err, MetadataError::AlreadyExists(_)));
        assert_eq!(store.get_files("app", Some("s1")).await.unwrap().len(), 2);
    })
    .await;
}
