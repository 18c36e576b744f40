use crate::index::WordIndex;
use crate::{ComicRecord, StoreError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

pub type RecordMap = HashMap<String, ComicRecord>;

/// File locations of a JSON-backed store.
#[derive(Debug, Clone)]
pub struct StorePaths {
    pub db: PathBuf,
    /// Persisted word index; `None` means searches scan every record.
    pub index: Option<PathBuf>,
}

impl StorePaths {
    pub fn new<P: AsRef<Path>>(db: P) -> Self {
        Self { db: db.as_ref().to_path_buf(), index: None }
    }

    pub fn with_index<P: AsRef<Path>>(mut self, index: P) -> Self {
        self.index = Some(index.as_ref().to_path_buf());
        self
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io { path: path.to_path_buf(), source }
}

/// Missing or empty files load as `T::default()`.
fn load_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StoreError> {
    let mut f = match File::open(path) {
        Ok(f) => BufReader::new(f),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(io_err(path)(e)),
    };
    let mut buf = String::new();
    f.read_to_string(&mut buf).map_err(io_err(path))?;
    if buf.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(&buf).map_err(|source| StoreError::Json { path: path.to_path_buf(), source })
}

/// Write to a sibling temp file and rename over the target.
fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(io_err(dir))?;
    }
    let tmp = path.with_extension("json.tmp");
    let f = File::create(&tmp).map_err(io_err(&tmp))?;
    let mut w = BufWriter::new(f);
    serde_json::to_writer(&mut w, value).map_err(|source| StoreError::Json { path: tmp.clone(), source })?;
    w.flush().map_err(io_err(&tmp))?;
    fs::rename(&tmp, path).map_err(io_err(path))?;
    Ok(())
}

pub fn load_records(path: &Path) -> Result<RecordMap, StoreError> {
    load_json(path)
}

pub fn save_records(path: &Path, records: &RecordMap) -> Result<(), StoreError> {
    save_json(path, records)
}

pub fn load_index(path: &Path) -> Result<WordIndex, StoreError> {
    load_json(path)
}

pub fn save_index(path: &Path, index: &WordIndex) -> Result<(), StoreError> {
    save_json(path, index)
}
