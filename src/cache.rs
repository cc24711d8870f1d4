use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::{ErrorKind, Write as _};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use getset::Getters;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

pub const CACHE_FILE_NAME: &str = ".qif-ledger-import-cache.json";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("import cache {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("I/O error on import cache {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot encode import cache: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The set of source identifiers that were already imported.
pub trait ImportCache {
    fn contains(&self, identifier: &str) -> bool;

    /// Adds `identifier`. Recording an identifier twice keeps the first record.
    fn record(&mut self, identifier: &str) -> Result<(), CacheError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct ImportRecord {
    identifier: String,
    /// Unknown for records migrated from the plain list format.
    imported_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ImportMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    imported_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CacheFile {
    Records(BTreeMap<String, ImportMetadata>),
    Identifiers(Vec<String>),
}

/// Import cache kept in a JSON file, rewritten after every recorded import.
#[derive(Debug)]
pub struct JsonFileCache {
    path: PathBuf,
    records: BTreeMap<String, ImportMetadata>,
}

impl JsonFileCache {
    /// `~/.qif-ledger-import-cache.json`, if a home directory is known.
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(|home| PathBuf::from(home).join(CACHE_FILE_NAME))
    }

    /// A missing or blank file is an empty cache; anything that isn't a cache is an error.
    pub fn load(path: &Path) -> Result<JsonFileCache, CacheError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => String::new(),
            Err(source) => {
                return Err(CacheError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            },
        };

        let records = if content.trim().is_empty() {
            BTreeMap::new()
        } else {
            match serde_json::from_str(&content) {
                Ok(CacheFile::Records(records)) => records,
                Ok(CacheFile::Identifiers(identifiers)) => identifiers
                    .into_iter()
                    .map(|identifier| (identifier, ImportMetadata { imported_at: None }))
                    .collect(),
                Err(err) => {
                    return Err(CacheError::Corrupt {
                        path: path.to_path_buf(),
                        reason: err.to_string(),
                    })
                },
            }
        };
        info!("loaded {} import records from {}", records.len(), path.display());

        Ok(JsonFileCache {
            path: path.to_path_buf(),
            records,
        })
    }

    pub fn records(&self) -> impl Iterator<Item = ImportRecord> + '_ {
        self.records.iter().map(|(identifier, metadata)| ImportRecord {
            identifier: identifier.clone(),
            imported_at: metadata.imported_at,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn flush(&self) -> Result<(), CacheError> {
        let io_error = |source| CacheError::Io {
            path: self.path.clone(),
            source,
        };

        let content = serde_json::to_string_pretty(&self.records)?;
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(dir).map_err(io_error)?;
        file.write_all(content.as_bytes()).map_err(io_error)?;
        file.persist(&self.path).map_err(|err| io_error(err.error))?;

        debug!("flushed {} import records to {}", self.records.len(), self.path.display());
        Ok(())
    }
}

impl ImportCache for JsonFileCache {
    fn contains(&self, identifier: &str) -> bool {
        self.records.contains_key(identifier)
    }

    fn record(&mut self, identifier: &str) -> Result<(), CacheError> {
        if self.contains(identifier) {
            return Ok(());
        }
        self.records.insert(
            identifier.to_string(),
            ImportMetadata {
                imported_at: Some(Utc::now()),
            },
        );
        self.flush()
    }
}

/// Cache that lives only as long as the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    identifiers: HashSet<String>,
}

impl MemoryCache {
    pub fn new() -> MemoryCache {
        MemoryCache::default()
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }
}

impl ImportCache for MemoryCache {
    fn contains(&self, identifier: &str) -> bool {
        self.identifiers.contains(identifier)
    }

    fn record(&mut self, identifier: &str) -> Result<(), CacheError> {
        self.identifiers.insert(identifier.to_string());
        Ok(())
    }
}
