use std::sync::Arc;
use std::thread;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use cms_dataset_sync::error::SyncError;
use cms_dataset_sync::metadata::MetadataStore;

fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

#[test]
fn missing_file_is_an_empty_record() {
    let (_temp, root) = temp_root();
    let store = MetadataStore::load(&root.join("last_run_metadata.json")).unwrap();
    assert!(store.is_empty());
}

#[test]
fn persist_writes_flat_json_object() {
    let (_temp, root) = temp_root();
    let path = root.join("nested").join("last_run_metadata.json");
    let store = MetadataStore::load(&path).unwrap();
    store.record_processed("Hospital X", "2024-01-01");
    store.record_processed("Hospital A", "2023-05-05");
    store.persist().unwrap();

    let raw = std::fs::read_to_string(path.as_std_path()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(
        value,
        serde_json::json!({"Hospital A": "2023-05-05", "Hospital X": "2024-01-01"})
    );

    let reloaded = MetadataStore::load(&path).unwrap();
    assert_eq!(reloaded.get("Hospital X").as_deref(), Some("2024-01-01"));
    assert_eq!(reloaded.len(), 2);
}

#[test]
fn persist_overwrites_previous_content() {
    let (_temp, root) = temp_root();
    let path = root.join("meta.json");
    std::fs::write(path.as_std_path(), r#"{"Old": "1", "Hospital X": "0"}"#).unwrap();

    let store = MetadataStore::load(&path).unwrap();
    store.record_processed("Hospital X", "2");
    store.persist().unwrap();

    let reloaded = MetadataStore::load(&path).unwrap();
    assert_eq!(reloaded.get("Hospital X").as_deref(), Some("2"));
    assert_eq!(reloaded.get("Old").as_deref(), Some("1"));
}

#[test]
fn corrupt_file_is_reported() {
    let (_temp, root) = temp_root();
    let path = root.join("meta.json");
    std::fs::write(path.as_std_path(), "[1, 2").unwrap();
    assert_matches!(
        MetadataStore::load(&path),
        Err(SyncError::MetadataParse { .. })
    );
}

#[test]
fn concurrent_updates_are_all_kept() {
    let (_temp, root) = temp_root();
    let store = Arc::new(MetadataStore::load(&root.join("meta.json")).unwrap());
    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for n in 0..250 {
                    store.record_processed(&format!("Hospital {worker}-{n}"), "v1");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(store.len(), 2000);
}
