// Copyright 2020-2024, The Tremor Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Durable caches feeding the delivery pipelines
//!
//! Each north connector owns one [`sled`] database in its private cache folder. Values and files
//! waiting for delivery live in the `values` and `files` trees, keyed by monotonically increasing
//! ids so iteration order is arrival order. Quarantined items are moved into the `values-errors`
//! and `files-errors` trees.

pub(crate) mod archive;
pub(crate) mod files;
pub(crate) mod values;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use oibus_common::alias::South;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use simd_json::OwnedValue;

pub use self::archive::ArchiveService;
pub use self::files::SledFileCache;
pub use self::values::SledValueCache;

/// name of the database file inside the connector cache folder
pub(crate) const DB_FILE: &str = "cache.db";

/// Cache key, ordered by arrival
pub type Key = u64;

/// Cache errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),
    /// File system error
    #[error(transparent)]
    File(#[from] oibus_common::Error),
    /// Record (de)serialization error
    #[error("Invalid cache record: {0}")]
    Record(#[from] simd_json::Error),
    /// Key with an unexpected size
    #[error("Invalid cache key of {0} bytes")]
    InvalidKey(usize),
    /// Aborted transaction
    #[error("Cache transaction aborted")]
    Aborted,
}

impl From<sled::transaction::TransactionError<()>> for Error {
    fn from(e: sled::transaction::TransactionError<()>) -> Self {
        match e {
            sled::transaction::TransactionError::Abort(()) => Error::Aborted,
            sled::transaction::TransactionError::Storage(e) => Error::Storage(e),
        }
    }
}

/// Cache result
pub type Result<T> = std::result::Result<T, Error>;

/// A single measurement handed over by a south connector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointValue {
    /// point reference
    pub point_id: String,
    /// acquisition time
    pub timestamp: DateTime<Utc>,
    /// opaque payload
    pub data: OwnedValue,
}

impl PointValue {
    /// creates a new value
    pub fn new(point_id: impl Into<String>, timestamp: DateTime<Utc>, data: OwnedValue) -> Self {
        Self {
            point_id: point_id.into(),
            timestamp,
            data,
        }
    }
}

/// A value waiting for delivery, tagged with the south connector it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedValue {
    /// producing south connector
    pub source_id: String,
    /// point reference
    pub point_id: String,
    /// acquisition time
    pub timestamp: DateTime<Utc>,
    /// opaque payload
    pub data: OwnedValue,
}

impl CachedValue {
    pub(crate) fn new(source: &South, value: PointValue) -> Self {
        Self {
            source_id: source.to_string(),
            point_id: value.point_id,
            timestamp: value.timestamp,
            data: value.data,
        }
    }
}

/// A file waiting for delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedFile {
    /// location of the cached copy
    pub path: PathBuf,
    /// producing south connector
    pub source_id: String,
    /// file extension, or `raw` if there is none
    pub content_type: String,
    /// when the file entered the cache
    pub created_at: DateTime<Utc>,
    /// size in bytes
    pub size: u64,
}

impl CachedFile {
    /// name of the cached copy
    #[must_use]
    pub fn file_name(&self) -> &str {
        oibus_common::file::file_name(&self.path).unwrap_or_default()
    }
}

/// A cached item together with its key
#[derive(Debug, Clone, PartialEq)]
pub struct Entry<T> {
    /// cache key
    pub key: Key,
    /// cached item
    pub item: T,
}

/// Description of a quarantined file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorFile {
    /// file name inside the error folder
    pub filename: String,
    /// last modification
    pub modification_date: DateTime<Utc>,
    /// size in bytes
    pub size: u64,
}

/// Selection of quarantined files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorFileFilter {
    /// only files modified at or after this instant
    pub from: Option<DateTime<Utc>>,
    /// only files modified at or before this instant
    pub to: Option<DateTime<Utc>>,
    /// only files whose name contains this, case insensitive
    pub name_contains: String,
}

impl ErrorFileFilter {
    pub(crate) fn matches(&self, filename: &str, modified: &DateTime<Utc>) -> bool {
        self.from.as_ref().map_or(true, |from| modified >= from)
            && self.to.as_ref().map_or(true, |to| modified <= to)
            && filename
                .to_lowercase()
                .contains(&self.name_contains.to_lowercase())
    }
}

/// Durable FIFO of values
#[async_trait::async_trait]
pub trait ValueCache: Send + Sync {
    /// append values produced by `source`
    async fn cache_values(&self, source: &South, values: Vec<PointValue>) -> Result<()>;

    /// the oldest `max` values, oldest first, without removing them
    async fn retrieve_values(&self, max: usize) -> Result<Vec<Entry<CachedValue>>>;

    /// remove exactly the values with the given keys, returns how many were present
    async fn remove_values(&self, keys: &[Key]) -> Result<usize>;

    /// move the values with the given keys into the error store
    async fn manage_errored_values(&self, keys: &[Key]) -> Result<usize>;

    /// number of values waiting for delivery
    fn number_of_values(&self) -> usize;

    /// number of quarantined values
    fn number_of_errored_values(&self) -> usize;

    /// `true` if no value waits for delivery
    fn is_empty(&self) -> bool;

    /// flush everything to disk
    async fn stop(&self) -> Result<()>;
}

/// Durable FIFO of files
#[async_trait::async_trait]
pub trait FileCache: Send + Sync {
    /// begin background maintenance
    async fn start(&self) -> Result<()>;

    /// copy `path` into the cache and enqueue the copy
    async fn cache_file(&self, source: &South, path: &Path) -> Result<CachedFile>;

    /// the oldest file, without removing it
    async fn retrieve_file(&self) -> Result<Option<Entry<CachedFile>>>;

    /// dequeue a file, archiving the cached copy if `archive` is set, deleting it otherwise
    async fn remove_file(&self, entry: &Entry<CachedFile>, archive: bool) -> Result<()>;

    /// dequeue a file and move it into the error store
    async fn manage_errored_file(&self, entry: &Entry<CachedFile>) -> Result<()>;

    /// number of files waiting for delivery
    fn number_of_files(&self) -> usize;

    /// `true` if no file waits for delivery
    fn is_empty(&self) -> bool;

    /// quarantined files matching `filter`
    async fn error_files(&self, filter: &ErrorFileFilter) -> Result<Vec<ErrorFile>>;

    /// delete the named quarantined files, returns how many were removed
    async fn remove_error_files(&self, names: &[String]) -> Result<usize>;

    /// enqueue the named quarantined files again, returns how many were enqueued
    async fn retry_error_files(&self, names: &[String]) -> Result<usize>;

    /// delete all quarantined files
    async fn remove_all_error_files(&self) -> Result<usize>;

    /// enqueue all quarantined files again
    async fn retry_all_error_files(&self) -> Result<usize>;

    /// stop background maintenance and flush everything to disk
    async fn stop(&self) -> Result<()>;
}

/// opens the cache database inside `folder`
pub(crate) fn open_db(folder: &Path) -> Result<sled::Db> {
    Ok(sled::open(folder.join(DB_FILE))?)
}

pub(crate) fn decode_key(raw: &[u8]) -> Result<Key> {
    <[u8; 8]>::try_from(raw)
        .map(Key::from_be_bytes)
        .map_err(|_| Error::InvalidKey(raw.len()))
}

pub(crate) fn encode<T: Serialize>(item: &T) -> Result<Vec<u8>> {
    Ok(simd_json::serde::to_vec(item)?)
}

pub(crate) fn decode<T: DeserializeOwned>(raw: &[u8]) -> Result<T> {
    let mut bytes = raw.to_vec();
    Ok(simd_json::serde::from_slice(&mut bytes)?)
}
