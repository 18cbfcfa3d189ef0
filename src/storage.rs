//! Append-only value storage and fixed-width index record persistence.

use std::{
    collections::HashMap,
    fs::File,
    io::{Read, Seek, SeekFrom, Write},
    path::PathBuf,
    sync::{Arc, Mutex},
};

use fs2::FileExt;
use rayon::prelude::*;

use crate::{
    link::Link,
    util::{self, FdGate, FdPermit},
    value::Value,
    Error, Result,
};

pub const HASH_KEY_WIDTH: usize = 11;
pub const MD5_WIDTH: usize = 16;
pub const SEEK_START_WIDTH: usize = 11;
pub const SEEK_LAST_WIDTH: usize = 4;
pub const VERSION_WIDTH: usize = 4;
pub const RECORD_LEN: usize =
    HASH_KEY_WIDTH + MD5_WIDTH + SEEK_START_WIDTH + SEEK_LAST_WIDTH + VERSION_WIDTH;

/// Default FD-gate depth, matching the recognised `LimitOpenFile` floor.
pub const DEFAULT_LIMIT_OPEN_FILE: usize = 10_000;

type FileKey = (String, String);
type IndexFileKey = (String, String, String);

/// An open file handle together with the FD-gate permit that was acquired
/// to open it. The permit is held for as long as this entry stays in the
/// cache, so the gate's count reflects genuinely open descriptors rather
/// than just in-flight open calls.
struct OpenFile {
    _permit: FdPermit,
    file: Mutex<File>,
}

/// Owns every open data and index file handle for an engine instance.
///
/// Not a process-wide singleton: an [Engine](crate::engine::Engine) owns one
/// `Arc<Storage>` and threads it through its databases/forms explicitly.
pub struct Storage {
    data_dir: PathBuf,
    fd_gate: Arc<FdGate>,
    open_guard: Mutex<()>,
    data_files: Mutex<HashMap<FileKey, Arc<OpenFile>>>,
    index_files: Mutex<HashMap<IndexFileKey, Arc<OpenFile>>>,
}

/// One pending index update accompanying a `store` call.
pub struct IndexWrite {
    pub index_id: String,
    pub hash_key: u64,
    pub link: Arc<Link>,
}

impl Storage {
    pub fn new(data_dir: PathBuf, limit_open_file: usize) -> Storage {
        Storage {
            data_dir,
            fd_gate: Arc::new(FdGate::new(limit_open_file)),
            open_guard: Mutex::new(()),
            data_files: Mutex::new(HashMap::new()),
            index_files: Mutex::new(HashMap::new()),
        }
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    fn data_file(&self, db_id: &str, form_id: &str) -> Result<Arc<OpenFile>> {
        let key = (db_id.to_string(), form_id.to_string());
        {
            let files = self.data_files.lock().unwrap();
            if let Some(f) = files.get(&key) {
                return Ok(Arc::clone(f));
            }
        }
        let _guard = self.open_guard.lock().unwrap();
        let mut files = self.data_files.lock().unwrap();
        if let Some(f) = files.get(&key) {
            return Ok(Arc::clone(f));
        }
        let permit = self.fd_gate.acquire();
        let path = util::form_data_path(&self.data_dir, db_id, form_id);
        log::debug!("opening data file {:?}", path);
        let file = util::open_file_rw(path)?;
        let handle = Arc::new(OpenFile {
            _permit: permit,
            file: Mutex::new(file),
        });
        files.insert(key, Arc::clone(&handle));
        Ok(handle)
    }

    fn index_file(&self, db_id: &str, form_id: &str, index_id: &str) -> Result<Arc<OpenFile>> {
        let key = (db_id.to_string(), form_id.to_string(), index_id.to_string());
        {
            let files = self.index_files.lock().unwrap();
            if let Some(f) = files.get(&key) {
                return Ok(Arc::clone(f));
            }
        }
        let _guard = self.open_guard.lock().unwrap();
        let mut files = self.index_files.lock().unwrap();
        if let Some(f) = files.get(&key) {
            return Ok(Arc::clone(f));
        }
        let permit = self.fd_gate.acquire();
        let path = util::index_file_path(&self.data_dir, db_id, form_id, index_id);
        log::debug!("opening index file {:?}", path);
        let file = util::open_file_rw(path)?;
        let handle = Arc::new(OpenFile {
            _permit: permit,
            file: Mutex::new(file),
        });
        files.insert(key, Arc::clone(&handle));
        Ok(handle)
    }

    pub fn index_file_path(&self, db_id: &str, form_id: &str, index_id: &str) -> PathBuf {
        util::index_file_path(&self.data_dir, db_id, form_id, index_id)
    }

    /// Encode `value` to msgpack, append it to the form's data file, then
    /// write or rewrite every index record in `writes`, publishing each
    /// Link's new extent via [Link::fit].
    pub fn store(
        &self,
        db_id: &str,
        form_id: &str,
        value: &Value,
        writes: &[IndexWrite],
    ) -> Result<(i64, i32)> {
        let data = err_at!(DecodeFail, rmp_serde::to_vec(value), "encode value")?;
        if data.len() > 10_u64.pow(SEEK_LAST_WIDTH as u32) as usize - 1 {
            return err_at!(
                InvalidInput,
                msg: "encoded value of {} bytes exceeds the {}-digit length field",
                data.len(),
                SEEK_LAST_WIDTH
            );
        }

        let data_file = self.data_file(db_id, form_id)?;
        let (seek_start, seek_last) = {
            let mut fd = data_file.file.lock().unwrap();
            err_at!(IOError, fd.lock_exclusive(), "lock data file")?;
            let seek_start = err_at!(IOError, fd.seek(SeekFrom::End(0)), "seek data file")?;
            err_at!(IOError, fd.write_all(&data), "write value")?;
            err_at!(IOError, FileExt::unlock(&*fd), "unlock data file")?;
            (seek_start as i64, data.len() as i32)
        };

        let errors: Vec<Error> = writes
            .par_iter()
            .filter_map(|write| self.store_index_record(db_id, form_id, write, seek_start, seek_last).err())
            .collect();
        if let Some(err) = errors.into_iter().next() {
            return Err(err);
        }

        log::info!(
            "stored {} byte value for form {:?} at seek_start={}, updated {} index record(s)",
            seek_last,
            form_id,
            seek_start,
            writes.len()
        );
        Ok((seek_start, seek_last))
    }

    fn store_index_record(
        &self,
        db_id: &str,
        form_id: &str,
        write: &IndexWrite,
        seek_start: i64,
        seek_last: i32,
    ) -> Result<()> {
        let index_file = self.index_file(db_id, form_id, &write.index_id)?;
        let mut fd = index_file.file.lock().unwrap();
        err_at!(IOError, fd.lock_exclusive(), "lock index file")?;

        // seek_start_index is stored as (real file offset + 1) so that the
        // sentinel "never flushed" value (<= 0) never collides with a
        // legitimate record at file offset 0.
        let existing = write.link.extent();
        let version = write.link.version();
        let seek_start_index = if existing.seek_start_index > 0 {
            let real_offset = (existing.seek_start_index - 1) as u64;
            err_at!(IOError, fd.seek(SeekFrom::Start(real_offset)), "seek index file")?;
            existing.seek_start_index
        } else {
            let real_offset = err_at!(IOError, fd.seek(SeekFrom::End(0)), "seek index file")?;
            real_offset as i64 + 1
        };

        let record = encode_record(write.hash_key, write.link.digest(), seek_start, seek_last, version)?;
        err_at!(IOError, fd.write_all(record.as_bytes()), "write index record")?;
        err_at!(IOError, FileExt::unlock(&*fd), "unlock index file")?;

        write.link.fit(seek_start_index, seek_start, seek_last, version);
        Ok(())
    }

    /// Read the `seek_last` bytes at `seek_start` from the form's data file
    /// and msgpack-decode them.
    pub fn take(&self, db_id: &str, form_id: &str, seek_start: i64, seek_last: i32) -> Result<Value> {
        log::debug!("take: form {:?} seek_start={} seek_last={}", form_id, seek_start, seek_last);
        let data_file = self.data_file(db_id, form_id)?;
        let mut buf = vec![0u8; seek_last as usize];
        {
            let mut fd = data_file.file.lock().unwrap();
            err_at!(IOError, fd.seek(SeekFrom::Start(seek_start as u64)), "seek data file")?;
            let n = err_at!(IOError, fd.read(&mut buf), "read value")?;
            if n != buf.len() {
                return err_at!(ShortRead, msg: "expected {} bytes, read {}", buf.len(), n);
            }
        }
        err_at!(CorruptValue, rmp_serde::from_slice(&buf), "decode value")
    }

    /// Read a raw chunk of an index file, used by recovery.
    pub fn read_index_chunk(&self, db_id: &str, form_id: &str, index_id: &str, offset: u64, len: usize) -> Result<Vec<u8>> {
        let index_file = self.index_file(db_id, form_id, index_id)?;
        let mut buf = vec![0u8; len];
        let mut fd = index_file.file.lock().unwrap();
        err_at!(IOError, fd.seek(SeekFrom::Start(offset)), "seek index file")?;
        let n = err_at!(IOError, fd.read(&mut buf), "read index chunk")?;
        buf.truncate(n);
        Ok(buf)
    }
}

fn encode_record(hash_key: u64, digest: &str, seek_start: i64, seek_last: i32, version: i32) -> Result<String> {
    let mut record = String::with_capacity(RECORD_LEN);
    record.push_str(&util::pad_decimal(hash_key, HASH_KEY_WIDTH)?);
    if digest.len() != MD5_WIDTH {
        return err_at!(InvalidInput, msg: "digest {:?} is not {} chars", digest, MD5_WIDTH);
    }
    record.push_str(digest);
    record.push_str(&util::pad_decimal(seek_start as u64, SEEK_START_WIDTH)?);
    record.push_str(&util::pad_decimal(seek_last as u64, SEEK_LAST_WIDTH)?);
    record.push_str(&util::pad_decimal(version as u64, VERSION_WIDTH)?);
    Ok(record)
}

/// Parsed contents of a single 46-byte index record.
pub struct ParsedRecord {
    pub hash_key: u64,
    pub digest: String,
    pub seek_start: i64,
    pub seek_last: i32,
    pub version: i32,
}

pub fn decode_record(record: &[u8], record_offset: i64) -> Result<(ParsedRecord, i64)> {
    if record.len() != RECORD_LEN {
        return err_at!(RecoveryCorrupt, msg: "record is {} bytes, expected {}", record.len(), RECORD_LEN);
    }
    let s = err_at!(DecodeFail, std::str::from_utf8(record), "non-utf8 index record")?;
    let mut at = 0;
    let hash_key = util::parse_decimal(&s[at..at + HASH_KEY_WIDTH])?;
    at += HASH_KEY_WIDTH;
    let digest = s[at..at + MD5_WIDTH].to_string();
    at += MD5_WIDTH;
    let seek_start = util::parse_decimal(&s[at..at + SEEK_START_WIDTH])? as i64;
    at += SEEK_START_WIDTH;
    let seek_last = util::parse_decimal(&s[at..at + SEEK_LAST_WIDTH])? as i32;
    at += SEEK_LAST_WIDTH;
    let version = util::parse_decimal(&s[at..at + VERSION_WIDTH])? as i32;

    Ok((
        ParsedRecord {
            hash_key,
            digest,
            seek_start,
            seek_last,
            version,
        },
        record_offset,
    ))
}

#[cfg(test)]
#[path = "storage_test.rs"]
mod storage_test;
