use std::path::{Path, PathBuf};

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::error::{Error, Result};

const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");

/// Well-known setting keys.
pub mod keys {
    /// Root directory holding one subdirectory per document.
    pub const WORKDIR: &str = "workdir";
    /// Language passed to the OCR engine.
    pub const OCR_LANG: &str = "ocr_lang";
    /// Upper bound on concurrent OCR jobs. Defaults to the CPU count.
    pub const OCR_WORKERS: &str = "ocr_workers";
}

pub const DEFAULT_OCR_LANG: &str = "eng";

pub struct ConfigDb {
    db: Database,
}

impl ConfigDb {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(SETTINGS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SETTINGS)?;
            table.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        Ok(table.get(key)?.map(|v| v.value().to_string()))
    }

    /// Get a setting, returning the default if not set.
    pub fn get_setting_or(&self, key: &str, default: &str) -> Result<String> {
        Ok(self
            .get_setting(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    pub fn remove_setting(&self, key: &str) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(SETTINGS)?;
            table.remove(key)?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    pub fn list_settings(&self) -> Result<Vec<(String, String)>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            result.push((k.value().to_string(), v.value().to_string()));
        }
        Ok(result)
    }

    // -- Typed accessors --

    /// The document root, which must have been configured beforehand.
    pub fn workdir(&self) -> Result<PathBuf> {
        self.get_setting(keys::WORKDIR)?
            .map(PathBuf::from)
            .ok_or_else(|| {
                Error::Config(
                    "no document directory configured; run `config set workdir <path>`"
                        .into(),
                )
            })
    }

    pub fn ocr_lang(&self) -> Result<String> {
        self.get_setting_or(keys::OCR_LANG, DEFAULT_OCR_LANG)
    }

    /// Worker count for batch OCR: the stored override, else the CPU count.
    pub fn ocr_workers(&self) -> Result<usize> {
        match self.get_setting(keys::OCR_WORKERS)? {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    Error::Config(format!(
                        "invalid {} value '{raw}': expected a positive integer",
                        keys::OCR_WORKERS
                    ))
                }),
            None => Ok(crate::ocr::default_worker_count()),
        }
    }
}

impl std::fmt::Debug for ConfigDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigDb").finish_non_exhaustive()
    }
}
