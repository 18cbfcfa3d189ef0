//! File and path helpers shared across storage, index and recovery code.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Condvar, Mutex},
};

use crate::{Error, Result};

/// Open (creating parent directories as needed) a file for append + read,
/// creating it if it does not already exist.
pub fn open_file_rw<P: AsRef<Path>>(path: P) -> Result<fs::File> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        err_at!(IOError, fs::create_dir_all(parent), "mkdir {:?}", parent)?;
    }
    err_at!(
        IOError,
        fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path),
        "open {:?}",
        path
    )
}

/// Open an existing file for read only access.
pub fn open_file_r<P: AsRef<Path>>(path: P) -> Result<fs::File> {
    let path = path.as_ref();
    err_at!(IOError, fs::OpenOptions::new().read(true).open(path), "open {:?}", path)
}

pub fn form_data_path(data_dir: &Path, db_id: &str, form_id: &str) -> PathBuf {
    data_dir.join(db_id).join(form_id).join("form.dat")
}

pub fn index_file_path(data_dir: &Path, db_id: &str, form_id: &str, index_id: &str) -> PathBuf {
    data_dir.join(db_id).join(form_id).join(format!("{}.idx", index_id))
}

/// Counting gate bounding the number of simultaneously open file handles.
///
/// A condvar-guarded counter rather than an external semaphore crate,
/// matching this codebase's preference for small hand-rolled concurrency
/// primitives over a dependency.
pub struct FdGate {
    limit: usize,
    count: Mutex<usize>,
    cond: Condvar,
}

impl FdGate {
    pub fn new(limit: usize) -> FdGate {
        FdGate {
            limit,
            count: Mutex::new(0),
            cond: Condvar::new(),
        }
    }

    /// Block until a slot is available, then reserve it. The permit holds
    /// the slot for as long as it lives: callers that cache the open file
    /// handle must store the permit alongside it, not drop it once the
    /// accessor returns, or the gate stops bounding real open-FD count.
    pub fn acquire(self: &Arc<Self>) -> FdPermit {
        let mut count = self.count.lock().unwrap();
        while *count >= self.limit {
            count = self.cond.wait(count).unwrap();
        }
        *count += 1;
        FdPermit { gate: Arc::clone(self) }
    }

    fn release(&self) {
        let mut count = self.count.lock().unwrap();
        *count -= 1;
        self.cond.notify_one();
    }
}

pub struct FdPermit {
    gate: Arc<FdGate>,
}

impl Drop for FdPermit {
    fn drop(&mut self) {
        self.gate.release();
    }
}

/// Zero-left-pad `val` to `width` ASCII decimal digits. Errors if `val`
/// does not fit in `width` digits.
pub fn pad_decimal(val: u64, width: usize) -> Result<String> {
    let s = val.to_string();
    if s.len() > width {
        return err_at!(
            InvalidInput,
            msg: "value {} does not fit in {} decimal digits",
            val,
            width
        );
    }
    Ok(format!("{:0>width$}", s, width = width))
}

pub fn parse_decimal(field: &str) -> Result<u64> {
    err_at!(DecodeFail, field.trim().parse::<u64>(), "bad decimal field {:?}", field)
}

#[cfg(test)]
#[path = "util_test.rs"]
mod util_test;
