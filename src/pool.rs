//! Worker pool serialising Intent objects onto the engine.
//!
//! Grounded on the generic `Thread`/`Pool` gen-server abstraction (one
//! channel per worker, join-on-drop) combined with a fixed-size worker
//! dispatch style, with `minIdle`/`maxActive`/`maxWait`/`expiryDuration`
//! knobs matching the original pool's functional-options shape.

use std::{
    sync::{mpsc, Arc, Condvar, Mutex},
    thread,
    time::{Duration, Instant},
};

use crate::{
    engine::Engine,
    form::FormType,
    selector::Selector,
    value::Value,
    Result,
};

/// A reified operation dispatched through the pool.
pub enum Intent {
    NewDatabase { name: String, comment: String },
    NewForm { db: String, form: String, comment: String, form_type: FormType },
    Put { db: String, form: String, key: String, value: Value },
    Set { db: String, form: String, key: String, value: Value },
    Get { db: String, form: String, key: String },
    Del { db: String, form: String, key: String },
    Insert { db: String, form: String, value: Value },
    Update { db: String, form: String, value: Value },
    Select { db: String, form: String, selector: Selector },
    Delete { db: String, form: String, selector: Selector },
}

pub enum IntentResult {
    Unit,
    Value(Value),
    Id(u64),
    Rows(u64, Vec<Value>),
}

impl Intent {
    fn run(&self, engine: &Engine) -> Result<IntentResult> {
        match self {
            Intent::NewDatabase { name, comment } => {
                engine.new_database(name, comment)?;
                Ok(IntentResult::Unit)
            }
            Intent::NewForm { db, form, comment, form_type } => {
                engine.new_form(db, form, comment, *form_type)?;
                Ok(IntentResult::Unit)
            }
            Intent::Put { db, form, key, value } => {
                engine.put(db, form, key, value.clone())?;
                Ok(IntentResult::Unit)
            }
            Intent::Set { db, form, key, value } => {
                engine.set(db, form, key, value.clone())?;
                Ok(IntentResult::Unit)
            }
            Intent::Get { db, form, key } => Ok(IntentResult::Value(engine.get(db, form, key)?)),
            Intent::Del { db, form, key } => {
                engine.del(db, form, key)?;
                Ok(IntentResult::Unit)
            }
            Intent::Insert { db, form, value } => Ok(IntentResult::Id(engine.insert(db, form, value.clone())?)),
            Intent::Update { db, form, value } => {
                engine.update(db, form, value.clone())?;
                Ok(IntentResult::Unit)
            }
            Intent::Select { db, form, selector } => {
                let (count, values) = engine.select(db, form, selector)?;
                Ok(IntentResult::Rows(count, values))
            }
            Intent::Delete { db, form, selector } => {
                let (count, values) = engine.delete(db, form, selector)?;
                Ok(IntentResult::Rows(count, values))
            }
        }
    }
}

/// Pool tuning knobs, built with the original's functional-option style.
pub struct Options {
    min_idle: i64,
    max_active: u64,
    max_wait: Duration,
    expiry_duration: Duration,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            min_idle: num_cpus::get() as i64,
            max_active: 256,
            max_wait: Duration::from_secs(5),
            expiry_duration: Duration::from_secs(60),
        }
    }
}

impl Options {
    pub fn with_min_idle(mut self, min_idle: i64) -> Self {
        self.min_idle = min_idle;
        self
    }

    pub fn with_max_active(mut self, max_active: u64) -> Self {
        self.max_active = max_active;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn with_expiry_duration(mut self, expiry_duration: Duration) -> Self {
        self.expiry_duration = expiry_duration;
        self
    }

    /// Ephemeral workers older than `expiry_duration` are reaped; a zero
    /// duration is never valid since it would reap a worker before it can
    /// run its intent.
    pub fn validate(&self) -> Result<()> {
        if self.min_idle > 0 && self.expiry_duration.is_zero() {
            return err_at!(PoolExpiryInvalid, msg: "expiry_duration must be > 0 when min_idle > 0");
        }
        Ok(())
    }
}

type Job = (Intent, mpsc::Sender<Result<IntentResult>>);

struct ActiveGate {
    count: Mutex<u64>,
    cond: Condvar,
}

/// Serialises Intent objects onto an [Engine]. With `min_idle > 0`, a fixed
/// set of long-lived workers drain a shared job channel; with `min_idle <=
/// 0` every submission spawns its own ephemeral worker thread, bypassing
/// the `max_active` gate entirely.
pub struct Pool {
    engine: Arc<Engine>,
    unbounded: bool,
    max_active: u64,
    max_wait: Duration,
    active: Arc<ActiveGate>,
    job_tx: Option<mpsc::Sender<Job>>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl Pool {
    pub fn new(engine: Arc<Engine>, options: Options) -> Result<Pool> {
        options.validate()?;
        let active = Arc::new(ActiveGate {
            count: Mutex::new(0),
            cond: Condvar::new(),
        });

        let unbounded = options.min_idle <= 0;
        let mut workers = Vec::new();
        let job_tx = if unbounded {
            None
        } else {
            let (tx, rx) = mpsc::channel::<Job>();
            let rx = Arc::new(Mutex::new(rx));
            for _ in 0..options.min_idle {
                let rx = Arc::clone(&rx);
                let engine = Arc::clone(&engine);
                workers.push(thread::spawn(move || worker_loop(rx, engine)));
            }
            Some(tx)
        };

        Ok(Pool {
            engine,
            unbounded,
            max_active: options.max_active,
            max_wait: options.max_wait,
            active,
            job_tx,
            workers,
        })
    }

    /// Submit an intent and block for its result, or `PoolOverload` if no
    /// slot becomes available within `max_wait`.
    pub fn submit(&self, intent: Intent) -> Result<IntentResult> {
        if self.unbounded {
            return self.run_ephemeral(intent);
        }

        if !self.reserve() {
            log::warn!("pool overload: max_active={} reached, rejecting submission", self.max_active);
            return err_at!(PoolOverload, msg: "pool at max_active={} capacity", self.max_active);
        }
        log::debug!("pool: dispatching intent");
        let result = self.dispatch(intent);
        self.release();
        result
    }

    fn dispatch(&self, intent: Intent) -> Result<IntentResult> {
        let (tx, rx) = mpsc::channel();
        match &self.job_tx {
            Some(job_tx) => {
                err_at!(IPCFail, job_tx.send((intent, tx)))?;
                err_at!(IPCFail, rx.recv())?
            }
            None => self.run_ephemeral(intent),
        }
    }

    /// Spawn a one-off worker thread for this intent and join it, mirroring
    /// the fixed-pool `worker_loop` minus the shared channel: unbounded mode
    /// trades the `max_active` gate for a thread per submission.
    fn run_ephemeral(&self, intent: Intent) -> Result<IntentResult> {
        let engine = Arc::clone(&self.engine);
        let handle = thread::spawn(move || intent.run(&engine));
        match handle.join() {
            Ok(result) => result,
            Err(_) => err_at!(IPCFail, msg: "ephemeral worker thread panicked"),
        }
    }

    fn reserve(&self) -> bool {
        let mut count = self.active.count.lock().unwrap();
        let deadline = Instant::now() + self.max_wait;
        while *count >= self.max_active {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, timeout) = self.active.cond.wait_timeout(count, deadline - now).unwrap();
            count = guard;
            if timeout.timed_out() && *count >= self.max_active {
                return false;
            }
        }
        *count += 1;
        true
    }

    fn release(&self) {
        let mut count = self.active.count.lock().unwrap();
        *count -= 1;
        self.active.cond.notify_one();
    }
}

fn worker_loop(rx: Arc<Mutex<mpsc::Receiver<Job>>>, engine: Arc<Engine>) {
    loop {
        let job = {
            let rx = rx.lock().unwrap();
            rx.recv()
        };
        match job {
            Ok((intent, tx)) => {
                let result = intent.run(&engine);
                let _ = tx.send(result);
            }
            Err(_) => break,
        }
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        log::info!("pool: reaping {} persistent worker(s)", self.workers.len());
        self.job_tx.take();
        for handle in self.workers.drain(..) {
            handle.join().ok();
        }
    }
}

#[cfg(test)]
#[path = "pool_test.rs"]
mod pool_test;
