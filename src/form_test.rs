use super::*;
use crate::{
    selector::{Condition, Op},
    value::Value,
};
use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicU64, Ordering},
};

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_storage() -> Storage {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("pentastore-formtest-{}-{}", std::process::id(), n));
    Storage::new(dir, 1000)
}

fn obj(pairs: Vec<(&str, Value)>) -> Value {
    let mut map = BTreeMap::new();
    for (k, v) in pairs {
        map.insert(k.to_string(), v);
    }
    Value::Object(map)
}

#[test]
fn test_kv_put_get() {
    let storage = temp_storage();
    let form = Form::new("f1".to_string(), "users".to_string(), "".to_string(), FormType::Kv);
    form.put(&storage, "db1", "alpha", Value::Int(1)).unwrap();
    let got = form.get(&storage, "db1", "alpha").unwrap();
    assert_eq!(got, Value::Int(1));
}

#[test]
fn test_put_duplicate_rejected_set_overwrites() {
    let storage = temp_storage();
    let form = Form::new("f1".to_string(), "users".to_string(), "".to_string(), FormType::Kv);
    form.put(&storage, "db1", "alpha", Value::Int(1)).unwrap();
    let err = form.put(&storage, "db1", "alpha", Value::Int(2));
    assert!(err.is_err());

    form.set(&storage, "db1", "alpha", Value::Int(2)).unwrap();
    let got = form.get(&storage, "db1", "alpha").unwrap();
    assert_eq!(got, Value::Int(2));
}

#[test]
fn test_get_missing_key() {
    let storage = temp_storage();
    let form = Form::new("f1".to_string(), "users".to_string(), "".to_string(), FormType::Kv);
    assert!(form.get(&storage, "db1", "nope").is_err());
}

#[test]
fn test_del_removes_from_primary_only() {
    let storage = temp_storage();
    let form = Form::new("f1".to_string(), "users".to_string(), "".to_string(), FormType::Kv);
    form.new_index("Age".to_string()).unwrap();
    form.put(&storage, "db1", "alpha", obj(vec![("Age", Value::Int(9))])).unwrap();
    form.del("alpha").unwrap();
    assert!(form.get(&storage, "db1", "alpha").is_err());

    // secondary index still has a (now stale) link: select by Age still finds it.
    let selector = Selector {
        conditions: vec![Condition {
            param: "Age".to_string(),
            op: Op::Eq,
            value: Value::Int(9),
        }],
        ..Default::default()
    };
    let (count, _) = form.select(&storage, "db1", &selector).unwrap();
    assert_eq!(count, 1);
}

#[test]
fn test_doc_insert_update() {
    let storage = temp_storage();
    let form = Form::new("f1".to_string(), "logs".to_string(), "".to_string(), FormType::Doc);
    let id1 = form.insert(&storage, "db1", Value::Int(100)).unwrap();
    assert_eq!(id1, 1);
    let id2 = form.insert(&storage, "db1", Value::Int(200)).unwrap();
    assert_eq!(id2, 2);

    form.update(&storage, "db1", Value::Int(201)).unwrap();
    let got = form.get(&storage, "db1", "2").unwrap();
    assert_eq!(got, Value::Int(201));
}

#[test]
fn test_recover_restores_autoincrement() {
    let storage = temp_storage();
    let form = Form::new("f1".to_string(), "logs".to_string(), "".to_string(), FormType::Doc);
    form.insert(&storage, "db1", Value::Int(1)).unwrap();
    form.insert(&storage, "db1", Value::Int(2)).unwrap();
    form.insert(&storage, "db1", Value::Int(3)).unwrap();

    let fresh = Form::new("f1".to_string(), "logs".to_string(), "".to_string(), FormType::Doc);
    fresh.recover(&storage, "db1").unwrap();
    let got = fresh.get(&storage, "db1", "3").unwrap();
    assert_eq!(got, Value::Int(3));
}
