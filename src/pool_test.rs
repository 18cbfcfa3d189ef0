use super::*;
use crate::{config::Config, value::Value, Error};
use std::sync::{atomic::{AtomicU64, Ordering}, Barrier};

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_engine() -> Arc<Engine> {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("pentastore-pooltest-{}-{}", std::process::id(), n));
    let config = Config {
        root_dir: dir.to_string_lossy().to_string(),
        ..Config::default()
    };
    Arc::new(Engine::new(&config).unwrap())
}

#[test]
fn test_submit_put_and_get() {
    let engine = temp_engine();
    engine.new_database("shop", "").unwrap();
    engine.new_form("shop", "orders", "", FormType::Kv).unwrap();

    let pool = Pool::new(Arc::clone(&engine), Options::default().with_min_idle(1)).unwrap();
    let result = pool.submit(Intent::Put {
        db: "shop".to_string(),
        form: "orders".to_string(),
        key: "o1".to_string(),
        value: Value::Int(7),
    });
    assert!(matches!(result, Ok(IntentResult::Unit)));

    let result = pool.submit(Intent::Get {
        db: "shop".to_string(),
        form: "orders".to_string(),
        key: "o1".to_string(),
    });
    match result {
        Ok(IntentResult::Value(Value::Int(7))) => {}
        _ => panic!("expected Get to return Value::Int(7)"),
    }
}

#[test]
fn test_overload_rejects_past_max_active() {
    let engine = temp_engine();
    engine.new_database("shop", "").unwrap();
    engine.new_form("shop", "orders", "", FormType::Kv).unwrap();

    // A single worker (min_idle=1) dispatches jobs one at a time, so with
    // max_active=1 every submission past the first genuinely contends for
    // the ActiveGate's one slot while the worker is still busy with an
    // earlier one. A short max_wait keeps the losing submissions fast.
    let options = Options::default()
        .with_min_idle(1)
        .with_max_active(1)
        .with_max_wait(Duration::from_micros(1));
    let pool = Arc::new(Pool::new(Arc::clone(&engine), options).unwrap());

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let pool = Arc::clone(&pool);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                pool.submit(Intent::Put {
                    db: "shop".to_string(),
                    form: "orders".to_string(),
                    key: format!("k{}", i),
                    value: Value::Int(i),
                })
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(
        results.iter().any(|r| matches!(r, Err(Error::PoolOverload(_, _)))),
        "expected at least one of {} concurrent submissions to see PoolOverload",
        results.len()
    );
    assert!(results.iter().any(|r| r.is_ok()), "expected at least one submission to succeed");
}

#[test]
fn test_unbounded_pool_bypasses_max_active() {
    let engine = temp_engine();
    engine.new_database("shop", "").unwrap();
    engine.new_form("shop", "orders", "", FormType::Kv).unwrap();

    let options = Options::default().with_min_idle(0).with_max_active(1);
    let pool = Pool::new(engine, options).unwrap();
    for i in 0..5 {
        let result = pool.submit(Intent::Put {
            db: "shop".to_string(),
            form: "orders".to_string(),
            key: format!("k{}", i),
            value: Value::Int(i),
        });
        assert!(result.is_ok());
    }
}
