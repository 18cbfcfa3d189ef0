//! A Form owns a set of indexes over a single table and dispatches writes,
//! point lookups and selects against them.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
};

use rayon::prelude::*;

use crate::{
    hash::{self, hash64},
    index::{Index, KeyStructure},
    node::PutOutcome,
    selector::Selector,
    storage::{IndexWrite, Storage},
    value::Value,
    Error, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormType {
    /// Caller supplies the key explicitly (Put/Set/Get/Del).
    Kv,
    /// Key is derived from the form's autoincrement counter (Insert/Update).
    Doc,
}

pub const PRIMARY_INDEX_ID: &str = "default";

pub struct Form {
    id: String,
    name: String,
    comment: String,
    form_type: FormType,
    autoincrement: AtomicU64,
    indexes: RwLock<BTreeMap<String, Arc<Index>>>,
}

impl Form {
    pub fn new(id: String, name: String, comment: String, form_type: FormType) -> Form {
        let key_structure = match form_type {
            FormType::Kv => KeyStructure::PutKey,
            FormType::Doc => KeyStructure::AutoIncrement,
        };
        let primary = Arc::new(Index::new(PRIMARY_INDEX_ID.to_string(), true, key_structure));
        let mut indexes = BTreeMap::new();
        indexes.insert(PRIMARY_INDEX_ID.to_string(), primary);

        Form {
            id,
            name,
            comment,
            form_type,
            autoincrement: AtomicU64::new(0),
            indexes: RwLock::new(indexes),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn form_type(&self) -> FormType {
        self.form_type
    }

    /// Register a new secondary index keyed on a dotted path into stored
    /// values. Returns the generated index id.
    pub fn new_index(&self, key_path: String) -> Result<String> {
        let mut indexes = self.indexes.write().unwrap();
        let mut id = hash::md5_digest16(format!("{}-{}", key_path, indexes.len()).as_bytes());
        let mut salt = 0u32;
        while indexes.contains_key(&id) {
            salt += 1;
            id = hash::md5_digest16(format!("{}-{}-{}", key_path, indexes.len(), salt).as_bytes());
        }
        indexes.insert(id.clone(), Arc::new(Index::new(id.clone(), false, KeyStructure::Path(key_path))));
        Ok(id)
    }

    pub fn indexes(&self) -> Vec<Arc<Index>> {
        self.indexes.read().unwrap().values().cloned().collect()
    }

    fn primary(&self) -> Arc<Index> {
        Arc::clone(self.indexes.read().unwrap().get(PRIMARY_INDEX_ID).unwrap())
    }

    /// Recover every index's in-memory tree from its on-disk file and
    /// restore the autoincrement counter to the number of accepted records
    /// replayed against the primary (Doc-style) index.
    pub fn recover(&self, storage: &Storage, db_id: &str) -> Result<()> {
        let indexes = self.indexes();
        for index in &indexes {
            match index.recover(storage, db_id, &self.id) {
                Ok(accepted) => {
                    if index.is_primary() && self.form_type == FormType::Doc {
                        self.autoincrement.fetch_add(accepted, Ordering::SeqCst);
                    }
                }
                Err(Error::IndexFileMissing(_, _)) => {
                    log::warn!("no index file yet for form {} index {}", self.id, index.id());
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn derive_key(&self, index: &Index, explicit_key: Option<&str>, value: &Value) -> Result<(String, u64)> {
        match index.key_structure() {
            KeyStructure::PutKey => {
                let key = explicit_key
                    .ok_or_else(|| ())
                    .map_err(|_| crate::Error::InvalidInput("form.rs".to_string(), "missing put key".to_string()))?
                    .to_string();
                let hash_key = hash64(key.as_bytes());
                Ok((key, hash_key))
            }
            KeyStructure::AutoIncrement => {
                let counter = self.autoincrement.load(Ordering::SeqCst);
                let key = counter.to_string();
                let hash_key = hash64(key.as_bytes());
                Ok((key, hash_key))
            }
            KeyStructure::Path(path) => {
                let scalar = value
                    .get_path(path)
                    .ok_or_else(|| crate::Error::UnsupportedIndexType("form.rs".to_string(), format!("path {:?} absent", path)))?;
                hash::type_to_index(scalar)
            }
        }
    }

    fn put_all_indexes(&self, explicit_key: Option<&str>, value: &Value, version: i32) -> Result<Vec<(PutOutcome, u64, String)>> {
        let indexes = self.indexes();
        let results: Vec<Result<(PutOutcome, u64, String)>> = indexes
            .par_iter()
            .map(|index| {
                let (key_string, hash_key) = self.derive_key(index, explicit_key, value)?;
                let outcome = index.put(&key_string, hash_key, version);
                Ok((outcome, hash_key, index.id().to_string()))
            })
            .collect();

        let mut out = Vec::with_capacity(results.len());
        for r in results {
            out.push(r?);
        }
        Ok(out)
    }

    fn write(&self, storage: &Storage, db_id: &str, explicit_key: Option<&str>, value: Value, version: i32, reject_duplicate: bool) -> Result<()> {
        let outcomes = self.put_all_indexes(explicit_key, &value, version)?;

        if reject_duplicate {
            let primary_outcome = outcomes.iter().find(|(_, _, id)| id == PRIMARY_INDEX_ID).unwrap();
            if primary_outcome.0.existed && !primary_outcome.0.accepted {
                return err_at!(DuplicateKey, msg: "key already present in form {}", self.id);
            }
        }

        let writes: Vec<IndexWrite> = outcomes
            .into_iter()
            .map(|(outcome, hash_key, index_id)| IndexWrite {
                index_id,
                hash_key,
                link: outcome.link,
            })
            .collect();

        storage.store(db_id, &self.id, &value, &writes)?;
        Ok(())
    }

    pub fn put(&self, storage: &Storage, db_id: &str, key: &str, value: Value) -> Result<()> {
        self.write(storage, db_id, Some(key), value, 1, true)
    }

    pub fn set(&self, storage: &Storage, db_id: &str, key: &str, value: Value) -> Result<()> {
        let next_version = self.next_version_for(key);
        self.write(storage, db_id, Some(key), value, next_version, false)
    }

    fn next_version_for(&self, key: &str) -> i32 {
        let hash_key = hash64(key.as_bytes());
        match self.primary().get(key, hash_key) {
            Some(link) => link.version() + 1,
            None => 1,
        }
    }

    pub fn insert(&self, storage: &Storage, db_id: &str, value: Value) -> Result<u64> {
        let id = self.autoincrement.fetch_add(1, Ordering::SeqCst) + 1;
        self.write(storage, db_id, None, value, 1, true)?;
        Ok(id)
    }

    pub fn update(&self, storage: &Storage, db_id: &str, value: Value) -> Result<()> {
        let counter = self.autoincrement.load(Ordering::SeqCst);
        let key = counter.to_string();
        let next_version = self.next_version_for(&key);
        self.write(storage, db_id, None, value, next_version, false)
    }

    pub fn get(&self, storage: &Storage, db_id: &str, key: &str) -> Result<Value> {
        let hash_key = hash64(key.as_bytes());
        let link = self
            .primary()
            .get(key, hash_key)
            .ok_or_else(|| crate::Error::KeyNotFound("form.rs".to_string(), format!("key {:?}", key)))?;
        let extent = link.extent();
        storage.take(db_id, &self.id, extent.seek_start, extent.seek_last)
    }

    /// Removes the Link from the primary index only; secondary indexes are
    /// left untouched (see the design notes on this documented caveat).
    pub fn del(&self, key: &str) -> Result<()> {
        let hash_key = hash64(key.as_bytes());
        self.primary()
            .remove(key, hash_key)
            .map(|_| ())
            .ok_or_else(|| crate::Error::LinkNotFound("form.rs".to_string(), format!("key {:?}", key)))
    }

    pub fn select(&self, storage: &Storage, db_id: &str, selector: &Selector) -> Result<(u64, Vec<Value>)> {
        selector.run(&self.indexes(), storage, db_id, &self.id)
    }

    pub fn delete(&self, storage: &Storage, db_id: &str, selector: &Selector) -> Result<(u64, Vec<Value>)> {
        let mut delete_selector = selector.clone();
        delete_selector.delete_mode = true;
        delete_selector.run(&self.indexes(), storage, db_id, &self.id)
    }
}

#[cfg(test)]
#[path = "form_test.rs"]
mod form_test;
