use super::*;
use crate::{
    hash::hash64,
    storage::{IndexWrite, Storage},
    value::Value,
};
use std::sync::atomic::{AtomicU64, Ordering};

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_storage() -> Storage {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("pentastore-idxtest-{}-{}", std::process::id(), n));
    Storage::new(dir, 1000)
}

#[test]
fn test_put_get_delegates_to_root() {
    let idx = Index::new("idx0".to_string(), true, KeyStructure::PutKey);
    let outcome = idx.put("alpha", hash64(b"alpha"), 1);
    assert!(!outcome.existed);
    assert!(idx.get("alpha", hash64(b"alpha")).is_some());
}

#[test]
fn test_recover_missing_file_errors() {
    let storage = temp_storage();
    let idx = Index::new("idx0".to_string(), true, KeyStructure::PutKey);
    let err = idx.recover(&storage, "db1", "form1");
    assert!(err.is_err());
}

#[test]
fn test_recover_rebuilds_tree_from_written_records() {
    let storage = temp_storage();
    let idx = Index::new("idx0".to_string(), true, KeyStructure::PutKey);

    for i in 0..5u64 {
        let key = format!("key-{}", i);
        let hash_key = hash64(key.as_bytes());
        let outcome = idx.put(&key, hash_key, 1);
        let writes = vec![IndexWrite {
            index_id: "idx0".to_string(),
            hash_key,
            link: outcome.link,
        }];
        storage
            .store("db1", "form1", &Value::Int(i as i64), &writes)
            .unwrap();
    }

    let fresh = Index::new("idx0".to_string(), true, KeyStructure::PutKey);
    let accepted = fresh.recover(&storage, "db1", "form1").unwrap();
    assert_eq!(accepted, 5);

    for i in 0..5u64 {
        let key = format!("key-{}", i);
        let hash_key = hash64(key.as_bytes());
        assert!(fresh.get(&key, hash_key).is_some());
    }
}

#[test]
fn test_recover_later_version_wins() {
    let storage = temp_storage();
    let idx = Index::new("idx0".to_string(), true, KeyStructure::PutKey);
    let key = "alpha";
    let hash_key = hash64(key.as_bytes());

    let outcome1 = idx.put(key, hash_key, 1);
    let writes1 = vec![IndexWrite {
        index_id: "idx0".to_string(),
        hash_key,
        link: Arc::clone(&outcome1.link),
    }];
    storage.store("db1", "form1", &Value::Int(1), &writes1).unwrap();

    outcome1.link.try_bump_version(2);
    let writes2 = vec![IndexWrite {
        index_id: "idx0".to_string(),
        hash_key,
        link: Arc::clone(&outcome1.link),
    }];
    storage.store("db1", "form1", &Value::Int(2), &writes2).unwrap();

    let fresh = Index::new("idx0".to_string(), true, KeyStructure::PutKey);
    fresh.recover(&storage, "db1", "form1").unwrap();
    let link = fresh.get(key, hash_key).unwrap();
    assert_eq!(link.version(), 2);
    let extent = link.extent();
    let got = storage.take("db1", "form1", extent.seek_start, extent.seek_last).unwrap();
    assert_eq!(got, Value::Int(2));
}
