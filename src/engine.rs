//! Top-level handle: a map of databases, each a map of forms, all backed by
//! one shared [Storage].

use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::{Arc, Mutex, RwLock},
};

use crate::{
    config::Config,
    form::{Form, FormType},
    selector::Selector,
    storage::Storage,
    value::Value,
    Error, Result,
};

pub struct Database {
    id: String,
    name: String,
    comment: String,
    forms: RwLock<BTreeMap<String, Arc<Form>>>,
}

impl Database {
    fn new(id: String, name: String, comment: String) -> Database {
        Database {
            id,
            name,
            comment,
            forms: RwLock::new(BTreeMap::new()),
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

    fn new_form(&self, id: String, name: String, comment: String, form_type: FormType) -> Result<Arc<Form>> {
        let mut forms = self.forms.write().unwrap();
        if forms.values().any(|f| f.name() == name) {
            return err_at!(FormExists, msg: "form {:?} already exists in database {:?}", name, self.name);
        }
        let form = Arc::new(Form::new(id, name, comment, form_type));
        forms.insert(form.id().to_string(), Arc::clone(&form));
        Ok(form)
    }

    fn form(&self, name: &str) -> Result<Arc<Form>> {
        self.forms
            .read()
            .unwrap()
            .values()
            .find(|f| f.name() == name)
            .cloned()
            .ok_or_else(|| crate::Error::FormNotFound("engine.rs".to_string(), format!("form {:?}", name)))
    }

    fn forms(&self) -> Vec<Arc<Form>> {
        self.forms.read().unwrap().values().cloned().collect()
    }
}

/// Process-level handle threaded explicitly through callers; constructed
/// once at startup, not a hidden global.
pub struct Engine {
    data_dir: PathBuf,
    storage: Arc<Storage>,
    databases: Mutex<BTreeMap<String, Arc<Database>>>,
}

impl Engine {
    pub fn new(config: &Config) -> Result<Engine> {
        config.validate()?;
        let data_dir = config.data_dir();
        err_at!(IOError, std::fs::create_dir_all(&data_dir), "mkdir {:?}", data_dir)?;
        Ok(Engine {
            data_dir: data_dir.clone(),
            storage: Arc::new(Storage::new(data_dir, config.limit_open_file())),
            databases: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn storage(&self) -> Arc<Storage> {
        Arc::clone(&self.storage)
    }

    pub fn new_database(&self, name: &str, comment: &str) -> Result<()> {
        let mut databases = self.databases.lock().unwrap();
        if databases.values().any(|d| d.name() == name) {
            return err_at!(DatabaseExists, msg: "database {:?} already exists", name);
        }
        let id = crate::hash::md5_digest16(name.as_bytes());
        let path = self.data_dir.join(&id);
        err_at!(IOError, std::fs::create_dir_all(&path), "mkdir {:?}", path)?;
        let db = Arc::new(Database::new(id.clone(), name.to_string(), comment.to_string()));
        databases.insert(id, db);
        Ok(())
    }

    fn database(&self, name: &str) -> Result<Arc<Database>> {
        self.databases
            .lock()
            .unwrap()
            .values()
            .find(|d| d.name() == name)
            .cloned()
            .ok_or_else(|| crate::Error::DatabaseNotFound("engine.rs".to_string(), format!("database {:?}", name)))
    }

    pub fn new_form(&self, db: &str, name: &str, comment: &str, form_type: FormType) -> Result<()> {
        let database = self.database(db)?;
        let id = crate::hash::md5_digest16(format!("{}-{}", db, name).as_bytes());
        database.new_form(id, name.to_string(), comment.to_string(), form_type)?;
        Ok(())
    }

    fn form(&self, db: &str, form: &str) -> Result<(Arc<Database>, Arc<Form>)> {
        let database = self.database(db)?;
        let f = database.form(form)?;
        Ok((database, f))
    }

    pub fn put(&self, db: &str, form: &str, key: &str, value: Value) -> Result<()> {
        let (database, f) = self.form(db, form)?;
        f.put(&self.storage, database.id(), key, value)
    }

    pub fn set(&self, db: &str, form: &str, key: &str, value: Value) -> Result<()> {
        let (database, f) = self.form(db, form)?;
        f.set(&self.storage, database.id(), key, value)
    }

    pub fn get(&self, db: &str, form: &str, key: &str) -> Result<Value> {
        let (database, f) = self.form(db, form)?;
        f.get(&self.storage, database.id(), key)
    }

    pub fn del(&self, db: &str, form: &str, key: &str) -> Result<()> {
        let (_, f) = self.form(db, form)?;
        f.del(key)
    }

    pub fn insert(&self, db: &str, form: &str, value: Value) -> Result<u64> {
        let (database, f) = self.form(db, form)?;
        f.insert(&self.storage, database.id(), value)
    }

    pub fn update(&self, db: &str, form: &str, value: Value) -> Result<()> {
        let (database, f) = self.form(db, form)?;
        f.update(&self.storage, database.id(), value)
    }

    pub fn select(&self, db: &str, form: &str, selector: &Selector) -> Result<(u64, Vec<Value>)> {
        let (database, f) = self.form(db, form)?;
        f.select(&self.storage, database.id(), selector)
    }

    pub fn delete(&self, db: &str, form: &str, selector: &Selector) -> Result<(u64, Vec<Value>)> {
        let (database, f) = self.form(db, form)?;
        f.delete(&self.storage, database.id(), selector)
    }

    /// Recover every database's every form from on-disk index files.
    pub fn recover(&self) -> Result<()> {
        let databases: Vec<Arc<Database>> = self.databases.lock().unwrap().values().cloned().collect();
        for database in databases {
            for form in database.forms() {
                form.recover(&self.storage, database.id())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;
