//! A single secondary (or primary) index: a tree root plus recovery.

use std::{
    fs,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use rayon::prelude::*;

use crate::{
    hash::md5_digest16,
    link::{Extent, Link},
    node::{Node, PutOutcome},
    storage::{decode_record, Storage, RECORD_LEN},
    Error, Result,
};

/// Chunk size used for parallel recovery reads: exactly 1000 index records.
pub const RECOVERY_CHUNK_BYTES: usize = RECORD_LEN * 1000;

/// What an index is keyed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStructure {
    /// Keyed on the caller-supplied put key (KV-style forms' default index).
    PutKey,
    /// Keyed on the form's autoincrement counter (Doc-style forms' default index).
    AutoIncrement,
    /// Keyed on a dotted path into the stored value.
    Path(String),
}

pub struct Index {
    id: String,
    is_primary: bool,
    key_structure: KeyStructure,
    root: Node,
}

impl Index {
    pub fn new(id: String, is_primary: bool, key_structure: KeyStructure) -> Index {
        Index {
            id,
            is_primary,
            key_structure,
            root: Node::new_root(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_primary(&self) -> bool {
        self.is_primary
    }

    pub fn key_structure(&self) -> &KeyStructure {
        &self.key_structure
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn put(&self, key_string: &str, hash_key: u64, version: i32) -> PutOutcome {
        let digest = md5_digest16(key_string.as_bytes());
        self.root.put(&digest, hash_key, hash_key, version)
    }

    pub fn get(&self, key_string: &str, hash_key: u64) -> Option<Arc<Link>> {
        let digest = md5_digest16(key_string.as_bytes());
        self.root.get(&digest, hash_key)
    }

    pub fn remove(&self, key_string: &str, hash_key: u64) -> Option<Arc<Link>> {
        let digest = md5_digest16(key_string.as_bytes());
        self.root.remove(&digest, hash_key)
    }

    /// Remove a specific, already-located Link from this index's tree.
    pub fn remove_link(&self, link: &Link) -> Option<Arc<Link>> {
        self.root.remove(link.digest(), link.hash_key())
    }

    /// Rebuild this index's in-memory tree from its on-disk index file by
    /// reading chunks of [RECOVERY_CHUNK_BYTES] in parallel, newest chunk
    /// first, so a record's version always decides the winner regardless of
    /// which task processes it. Returns the number of records whose version
    /// was accepted (i.e. actually materialised a Link update).
    pub fn recover(&self, storage: &Storage, db_id: &str, form_id: &str) -> Result<u64> {
        let path = storage.index_file_path(db_id, form_id, &self.id);
        let file_size = match fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(_) => return err_at!(IndexFileMissing, msg: "no index file at {:?}", path),
        };

        let full_chunks = file_size / RECOVERY_CHUNK_BYTES as u64;
        let remainder = file_size % RECOVERY_CHUNK_BYTES as u64;
        if remainder % RECORD_LEN as u64 != 0 {
            return err_at!(
                RecoveryCorrupt,
                msg: "trailing {} bytes of {:?} is not a multiple of {}",
                remainder,
                path,
                RECORD_LEN
            );
        }
        let n_chunks = full_chunks + if remainder > 0 { 1 } else { 0 };
        if n_chunks == 0 {
            return Ok(0);
        }

        let cancelled = AtomicBool::new(false);
        let accepted = AtomicU64::new(0);

        let chunk_indices: Vec<u64> = (0..n_chunks).rev().collect();
        let results: Vec<Result<()>> = chunk_indices
            .par_iter()
            .map(|&i| {
                if cancelled.load(Ordering::Relaxed) {
                    return Ok(());
                }
                let offset = i * RECOVERY_CHUNK_BYTES as u64;
                let len = if i == n_chunks - 1 && remainder > 0 {
                    remainder as usize
                } else {
                    RECOVERY_CHUNK_BYTES
                };
                match self.recover_chunk(storage, db_id, form_id, offset, len, &accepted) {
                    Ok(()) => Ok(()),
                    Err(err) => {
                        cancelled.store(true, Ordering::Relaxed);
                        Err(err)
                    }
                }
            })
            .collect();

        if let Some(err) = results.into_iter().find_map(|r| r.err()) {
            return Err(err);
        }

        let accepted = accepted.load(Ordering::Relaxed);
        log::info!(
            "recovered index {:?} for form {:?}: {} chunk(s), {} record(s) accepted",
            self.id,
            form_id,
            n_chunks,
            accepted
        );
        Ok(accepted)
    }

    fn recover_chunk(
        &self,
        storage: &Storage,
        db_id: &str,
        form_id: &str,
        offset: u64,
        len: usize,
        accepted: &AtomicU64,
    ) -> Result<()> {
        log::debug!("recovering chunk at offset {} ({} bytes) of index {:?}", offset, len, self.id);
        let bytes = storage.read_index_chunk(db_id, form_id, &self.id, offset, len)?;
        if bytes.len() != len {
            return err_at!(
                RecoveryCorrupt,
                msg: "short read at offset {}: wanted {} got {}",
                offset,
                len,
                bytes.len()
            );
        }
        for (i, record) in bytes.chunks(RECORD_LEN).enumerate() {
            let record_offset = offset + (i * RECORD_LEN) as u64;
            let (parsed, _) = decode_record(record, record_offset as i64)?;
            let extent = Extent {
                seek_start_index: record_offset as i64 + 1,
                seek_start: parsed.seek_start,
                seek_last: parsed.seek_last,
                version: parsed.version,
            };
            let (_, was_accepted) =
                self.root
                    .recover_record(&parsed.digest, parsed.hash_key, parsed.hash_key, extent);
            if was_accepted {
                accepted.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "index_test.rs"]
mod index_test;
