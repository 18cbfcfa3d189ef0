//! In-memory index entry pointing at a value's extent in the data file.

use std::sync::Mutex;

/// A single entry at a level-5 leaf.
///
/// The key digest is immutable for the lifetime of the Link; the extent and
/// version fields are mutated in place behind the Link's own lock so a
/// leaf's readers need not block on every Link update, only on the one
/// Link being written.
pub struct Link {
    digest: String,
    hash_key: u64,
    mutable: Mutex<Mutable>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Mutable {
    seek_start_index: i64,
    seek_start: i64,
    seek_last: i32,
    version: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Extent {
    pub seek_start_index: i64,
    pub seek_start: i64,
    pub seek_last: i32,
    pub version: i32,
}

impl Link {
    pub fn new(digest: String, hash_key: u64, version: i32) -> Link {
        Link {
            digest,
            hash_key,
            mutable: Mutex::new(Mutable {
                seek_start_index: 0,
                seek_start: 0,
                seek_last: 0,
                version,
            }),
        }
    }

    pub fn from_extent(digest: String, hash_key: u64, extent: Extent) -> Link {
        Link {
            digest,
            hash_key,
            mutable: Mutex::new(Mutable {
                seek_start_index: extent.seek_start_index,
                seek_start: extent.seek_start,
                seek_last: extent.seek_last,
                version: extent.version,
            }),
        }
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn hash_key(&self) -> u64 {
        self.hash_key
    }

    pub fn extent(&self) -> Extent {
        let m = self.mutable.lock().unwrap();
        Extent {
            seek_start_index: m.seek_start_index,
            seek_start: m.seek_start,
            seek_last: m.seek_last,
            version: m.version,
        }
    }

    pub fn version(&self) -> i32 {
        self.mutable.lock().unwrap().version
    }

    /// `true` once this Link's index record has been flushed at least once.
    pub fn is_flushed(&self) -> bool {
        self.mutable.lock().unwrap().seek_start_index > 0
    }

    /// Atomically update every mutable field. Used both when publishing a
    /// freshly written extent and when replaying an index record during
    /// recovery.
    pub fn fit(&self, seek_start_index: i64, seek_start: i64, seek_last: i32, version: i32) {
        let mut m = self.mutable.lock().unwrap();
        m.seek_start_index = seek_start_index;
        m.seek_start = seek_start;
        m.seek_last = seek_last;
        m.version = version;
    }

    /// Accept `version` only if it is strictly greater than the Link's
    /// current version. Returns whether it was accepted.
    pub fn try_bump_version(&self, version: i32) -> bool {
        let mut m = self.mutable.lock().unwrap();
        if version > m.version {
            m.version = version;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
#[path = "link_test.rs"]
mod link_test;
