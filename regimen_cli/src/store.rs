//! JSON file store for tracked items, with file locking.
//!
//! Items live in `<data_dir>/items.json` as a list of plain records. Records
//! the core rejects on load are kept verbatim and written back on save.

use fs2::FileExt;
use regimen_core::{Error, LoadFailure, Registry, Result, ScheduleConfig};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::PathBuf;
use tempfile::NamedTempFile;

const ITEMS_FILE: &str = "items.json";
const LOCK_FILE: &str = "items.json.lock";

/// Contents of the store after a load
pub struct Loaded {
    pub registry: Registry,
    pub failures: Vec<LoadFailure>,
}

impl Loaded {
    fn rejected(&self) -> Vec<Value> {
        self.failures.iter().map(|f| f.raw.clone()).collect()
    }
}

pub struct ItemStore {
    dir: PathBuf,
}

impl ItemStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(ITEMS_FILE)
    }

    /// Load all items with a shared lock.
    ///
    /// A missing file is an empty store. A file that is not a JSON list is an
    /// error, and nothing is overwritten.
    pub fn load(&self, config: &ScheduleConfig) -> Result<Loaded> {
        let path = self.path();
        if !path.exists() {
            tracing::info!("No items file at {:?}, starting empty", path);
            return Ok(Loaded {
                registry: Registry::new(config.clone()),
                failures: Vec::new(),
            });
        }

        let file = File::open(&path)?;
        file.lock_shared()?;

        let mut contents = String::new();
        let read = BufReader::new(&file).read_to_string(&mut contents);
        file.unlock()?;
        read?;

        let records = parse_records(&contents)?;
        let outcome = Registry::load(records, config.clone());
        tracing::debug!("Loaded items from {:?}", path);

        Ok(Loaded {
            registry: outcome.registry,
            failures: outcome.failures,
        })
    }

    /// Atomically write `registry` followed by any `rejected` raw records.
    ///
    /// Writes to a temp file in the same directory, syncs it, then renames
    /// it over the original. Callers that race other writers go through
    /// [`ItemStore::update`].
    pub fn save(&self, registry: &Registry, rejected: &[Value]) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        let mut records = registry
            .to_records()
            .iter()
            .map(|record| record.to_value())
            .collect::<Result<Vec<Value>>>()?;
        records.extend(rejected.iter().cloned());

        let temp = NamedTempFile::new_in(&self.dir)?;

        {
            let mut writer = BufWriter::new(temp.as_file());
            serde_json::to_writer_pretty(&mut writer, &records)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;

        let path = self.path();
        temp.persist(&path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved {} records to {:?}", records.len(), path);
        Ok(())
    }

    /// Load, modify and save under an exclusive lock held for the whole cycle.
    pub fn update<F, T>(&self, config: &ScheduleConfig, f: F) -> Result<T>
    where
        F: FnOnce(&mut Registry) -> Result<T>,
    {
        std::fs::create_dir_all(&self.dir)?;
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.dir.join(LOCK_FILE))?;
        lock.lock_exclusive()?;

        let result = self.update_locked(config, f);

        lock.unlock()?;
        result
    }

    fn update_locked<F, T>(&self, config: &ScheduleConfig, f: F) -> Result<T>
    where
        F: FnOnce(&mut Registry) -> Result<T>,
    {
        let mut loaded = self.load(config)?;
        warn_rejected(&loaded.failures);

        let value = f(&mut loaded.registry)?;
        self.save(&loaded.registry, &loaded.rejected())?;
        Ok(value)
    }
}

fn parse_records(contents: &str) -> Result<Vec<Value>> {
    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<Value>(contents)? {
        Value::Array(records) => Ok(records),
        _ => Err(Error::Other("items file must contain a JSON list".into())),
    }
}

/// Tell the user about records that were kept but not loaded
pub fn warn_rejected(failures: &[LoadFailure]) {
    for failure in failures {
        eprintln!("warning: {}", failure.error);
    }
}
