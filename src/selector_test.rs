use super::*;
use crate::{
    hash::hash64,
    index::KeyStructure,
    storage::IndexWrite,
};
use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicU64, Ordering},
};

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_storage() -> Storage {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("pentastore-seltest-{}-{}", std::process::id(), n));
    Storage::new(dir, 1000)
}

fn record(age: i64) -> Value {
    let mut map = BTreeMap::new();
    map.insert("Name".to_string(), Value::Str(format!("n{}", age)));
    map.insert("Age".to_string(), Value::Int(age));
    Value::Object(map)
}

fn setup() -> (Storage, Vec<Arc<Index>>) {
    let storage = temp_storage();
    let primary = Arc::new(Index::new("idx-primary".to_string(), true, KeyStructure::PutKey));
    let secondary = Arc::new(Index::new("idx-age".to_string(), false, KeyStructure::Path("Age".to_string())));

    for i in 0..10i64 {
        let key = i.to_string();
        let primary_hash = hash64(key.as_bytes());
        let primary_outcome = primary.put(&key, primary_hash, 1);

        let (age_key, age_hash) = hash::type_to_index(&Value::Int(i)).unwrap();
        let secondary_outcome = secondary.put(&age_key, age_hash, 1);

        let writes = vec![
            IndexWrite {
                index_id: primary.id().to_string(),
                hash_key: primary_hash,
                link: primary_outcome.link,
            },
            IndexWrite {
                index_id: secondary.id().to_string(),
                hash_key: age_hash,
                link: secondary_outcome.link,
            },
        ];
        storage.store("db1", "form1", &record(i), &writes).unwrap();
    }

    (storage, vec![primary, secondary])
}

#[test]
fn test_select_gt_sort_desc_skip_limit() {
    let (storage, indexes) = setup();
    let selector = Selector {
        conditions: vec![Condition {
            param: "Age".to_string(),
            op: Op::Gt,
            value: Value::Int(3),
        }],
        skip: 1,
        limit: 3,
        sort: Some(SortSpec {
            param: "Age".to_string(),
            ascending: false,
        }),
        delete_mode: false,
    };

    let (count, values) = selector.run(&indexes, &storage, "db1", "form1").unwrap();
    assert_eq!(count, 3);
    let ages: Vec<i64> = values
        .iter()
        .map(|v| match v.get_path("Age") {
            Some(Value::Int(i)) => *i,
            _ => panic!("missing Age"),
        })
        .collect();
    assert_eq!(ages, vec![8, 7, 6]);
}

#[test]
fn test_select_eq() {
    let (storage, indexes) = setup();
    let selector = Selector {
        conditions: vec![Condition {
            param: "Age".to_string(),
            op: Op::Eq,
            value: Value::Int(5),
        }],
        skip: 0,
        limit: 0,
        sort: None,
        delete_mode: false,
    };
    let (count, values) = selector.run(&indexes, &storage, "db1", "form1").unwrap();
    assert_eq!(count, 1);
    assert_eq!(values[0].get_path("Age"), Some(&Value::Int(5)));
}

#[test]
fn test_delete_mode_removes_matches() {
    let (storage, indexes) = setup();
    let first = Selector {
        conditions: vec![Condition {
            param: "Age".to_string(),
            op: Op::Gt,
            value: Value::Int(3),
        }],
        skip: 1,
        limit: 3,
        sort: Some(SortSpec {
            param: "Age".to_string(),
            ascending: false,
        }),
        delete_mode: true,
    };
    let (count1, _) = first.run(&indexes, &storage, "db1", "form1").unwrap();
    assert_eq!(count1, 3);

    let second = Selector {
        conditions: vec![Condition {
            param: "Age".to_string(),
            op: Op::Gt,
            value: Value::Int(3),
        }],
        skip: 1,
        limit: 3,
        sort: Some(SortSpec {
            param: "Age".to_string(),
            ascending: false,
        }),
        delete_mode: false,
    };
    let (count2, values2) = second.run(&indexes, &storage, "db1", "form1").unwrap();
    assert_eq!(count2, 2);
    let ages: Vec<i64> = values2
        .iter()
        .map(|v| match v.get_path("Age") {
            Some(Value::Int(i)) => *i,
            _ => panic!("missing Age"),
        })
        .collect();
    assert_eq!(ages, vec![5, 4]);
}

#[test]
fn test_residual_condition_on_non_index_field() {
    let (storage, indexes) = setup();
    let selector = Selector {
        conditions: vec![Condition {
            param: "Name".to_string(),
            op: Op::Eq,
            value: Value::Str("n7".to_string()),
        }],
        skip: 0,
        limit: 0,
        sort: None,
        delete_mode: false,
    };
    let (count, values) = selector.run(&indexes, &storage, "db1", "form1").unwrap();
    assert_eq!(count, 1);
    assert_eq!(values[0].get_path("Age"), Some(&Value::Int(7)));
}
