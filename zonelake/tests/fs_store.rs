use std::fs::{read_to_string, write};
use std::time::Duration;
use tempfile::tempdir;

use zonelake::store::FsObjectStore;
use zonelake_core::config::LakeConfig;
use zonelake_core::contract::{BucketStatus, Metadata, MetadataDirective, ObjectStore, StoreError};
use zonelake_core::pipeline::{Pipeline, PipelineStep};
use zonelake_core::DataLake;

fn md(pairs: &[(&str, &str)]) -> Metadata {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn objects_and_sidecars_survive_reopening_the_store() {
    let root = tempdir().unwrap();
    let store = FsObjectStore::new(root.path(), "bucket");

    assert_eq!(
        store.ensure_bucket("us-east-1").await.unwrap(),
        BucketStatus::Created
    );
    assert_eq!(
        store.ensure_bucket("us-east-1").await.unwrap(),
        BucketStatus::Existing
    );
    store
        .put("raw/a/b.csv", b"id\n1\n".to_vec(), md(&[("owner", "ops")]))
        .await
        .unwrap();
    store.put("raw/", Vec::new(), Metadata::new()).await.unwrap();

    let reopened = FsObjectStore::new(root.path(), "bucket");
    assert_eq!(reopened.get("raw/a/b.csv").await.unwrap(), b"id\n1\n");
    let head = reopened.head("raw/a/b.csv").await.unwrap();
    assert_eq!(head.size, 5);
    assert_eq!(head.metadata["owner"], "ops");
    assert_eq!(head.content_type.as_deref(), Some("text/csv"));
    assert_eq!(head.etag.map(|e| e.len()), Some(64));

    let listing = reopened.list("raw/").await.unwrap();
    let keys: Vec<&str> = listing.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, ["raw/", "raw/a/b.csv"]);
}

#[tokio::test]
async fn copy_delete_and_not_found() {
    let root = tempdir().unwrap();
    let store = FsObjectStore::new(root.path(), "bucket");
    store
        .put("raw/a.txt", b"a".to_vec(), md(&[("k", "v")]))
        .await
        .unwrap();

    store
        .copy("raw/a.txt", "curated/a.txt", MetadataDirective::Copy)
        .await
        .unwrap();
    store
        .copy(
            "raw/a.txt",
            "raw/a.txt",
            MetadataDirective::Replace(md(&[("k", "new")])),
        )
        .await
        .unwrap();
    assert_eq!(store.head("curated/a.txt").await.unwrap().metadata["k"], "v");
    assert_eq!(store.head("raw/a.txt").await.unwrap().metadata["k"], "new");

    store.delete("raw/a.txt").await.unwrap();
    store.delete("raw/a.txt").await.unwrap();
    assert!(matches!(
        store.get("raw/a.txt").await,
        Err(StoreError::NotFound(_))
    ));
    assert!(matches!(
        store.head("raw/a.txt").await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn presign_points_at_the_object_file() {
    let root = tempdir().unwrap();
    let store = FsObjectStore::new(root.path(), "bucket");
    store.put("raw/a.txt", b"a".to_vec(), Metadata::new()).await.unwrap();

    let url = store
        .presign("raw/a.txt", Duration::from_secs(60))
        .await
        .unwrap();
    assert!(url.starts_with("file://"));
    assert!(url.contains("raw%2Fa.txt?expires="));
    assert!(store
        .presign("raw/none.txt", Duration::from_secs(60))
        .await
        .is_err());
}

#[tokio::test]
async fn lake_layout_and_pipeline_on_disk() {
    let root = tempdir().unwrap();
    let store = FsObjectStore::new(root.path(), "lake");
    let lake = DataLake::from_config(store.clone(), &LakeConfig::default()).unwrap();
    lake.ensure_layout().await.unwrap();

    let lifecycle = read_to_string(store.bucket_dir().join("lifecycle.json")).unwrap();
    assert!(lifecycle.contains("STANDARD_IA"));
    assert!(lifecycle.contains("GLACIER"));

    let inputs_dir = tempdir().unwrap();
    let input = inputs_dir.path().join("notes.txt");
    write(&input, "b\na\nb\n").unwrap();

    let steps = [
        zonelake::steps::builtin("dedupe").unwrap(),
        PipelineStep::new("shout", |c| match c {
            zonelake_core::codec::Content::Text(t) => {
                Ok(zonelake_core::codec::Content::Text(t.to_uppercase()))
            }
            other => Ok(other),
        }),
    ];
    let results = Pipeline::new(&lake)
        .run(&[input.to_string_lossy().to_string()], &steps)
        .await;

    assert_eq!(results.len(), 1);
    let key = results[0].to_string();
    assert!(key.starts_with("curated/notes_2_"));
    assert_eq!(store.get(&key).await.unwrap(), b"B\nA");

    let files = lake.list_files(None, None).await.unwrap();
    assert_eq!(files.len(), 3);
}
