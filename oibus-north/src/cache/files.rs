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

use std::{
    collections::HashSet,
    ffi::OsStr,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use oibus_common::{
    alias::{self, South},
    file, time,
};
use sled::{transaction::TransactionResult, Transactional};

use super::{
    decode, decode_key, encode, ArchiveService, CachedFile, Entry, ErrorFile, ErrorFileFilter,
    FileCache, Key, Result,
};
use crate::config;

const FILES_TREE: &str = "files";
const ERRORS_TREE: &str = "files-errors";
/// folder of the cached copies inside the connector cache folder
pub(crate) const FILES_FOLDER: &str = "files";
/// folder of the quarantined files inside the connector cache folder
pub(crate) const ERRORS_FOLDER: &str = "files-errors";
/// source of files found in the cache folder without a record
const UNKNOWN_SOURCE: &str = "unknown";

/// File cache keeping copies on disk and their records in sled
pub struct SledFileCache {
    alias: alias::North,
    db: sled::Db,
    queue: sled::Tree,
    errors: sled::Tree,
    files_folder: PathBuf,
    errors_folder: PathBuf,
    archive: ArchiveService,
}

impl SledFileCache {
    /// opens the file trees of `db` and the file folders inside `base`
    ///
    /// Files found in the cache folder without a record are enqueued again.
    ///
    /// # Errors
    ///   * if the folders or trees can't be opened
    pub async fn open(
        alias: &alias::North,
        db: &sled::Db,
        base: &Path,
        archive: &config::Archive,
    ) -> Result<Self> {
        let files_folder = base.join(FILES_FOLDER);
        let errors_folder = base.join(ERRORS_FOLDER);
        file::create_dir(&files_folder).await?;
        file::create_dir(&errors_folder).await?;
        let cache = Self {
            alias: alias.clone(),
            db: db.clone(),
            queue: db.open_tree(FILES_TREE)?,
            errors: db.open_tree(ERRORS_TREE)?,
            files_folder,
            errors_folder,
            archive: ArchiveService::new(alias, base, archive),
        };
        cache.recover_orphans().await?;
        debug!(
            "[North::{}] {} files in cache, {} files in error cache.",
            cache.alias,
            cache.queue.len(),
            cache.errors.len()
        );
        Ok(cache)
    }

    async fn recover_orphans(&self) -> Result<()> {
        let mut known = HashSet::new();
        for record in self.queue.iter() {
            let (_, raw) = record?;
            if let Ok(item) = decode::<CachedFile>(&raw) {
                known.insert(item.path);
            }
        }
        let mut orphans = Vec::new();
        for path in file::list_files(&self.files_folder).await? {
            if known.contains(&path) {
                continue;
            }
            let meta = file::stat(&path).await?;
            let created_at = meta.modified().map_or_else(|_| time::now(), DateTime::<Utc>::from);
            orphans.push(CachedFile {
                content_type: content_type(&path),
                path,
                source_id: UNKNOWN_SOURCE.to_string(),
                created_at,
                size: meta.len(),
            });
        }
        orphans.sort_by_key(|f| f.created_at);
        for orphan in orphans {
            warn!(
                "[North::{}] File {} found in the cache folder without a record. Adding it back to the cache.",
                self.alias,
                orphan.path.display()
            );
            let key: Key = self.db.generate_id()?;
            self.queue.insert(key.to_be_bytes(), encode(&orphan)?)?;
        }
        Ok(())
    }

    /// the records of the error store, as `(name, file)` pairs
    fn error_records(&self) -> Result<Vec<(String, Option<CachedFile>)>> {
        let mut records = Vec::new();
        for record in self.errors.iter() {
            let (name, raw) = record?;
            let name = String::from_utf8_lossy(&name).to_string();
            let item = match decode::<CachedFile>(&raw) {
                Ok(item) => Some(item),
                Err(e) => {
                    error!("[North::{}] Unreadable error record {name}: {e}", self.alias);
                    None
                }
            };
            records.push((name, item));
        }
        Ok(records)
    }

    fn error_names(&self) -> Result<Vec<String>> {
        self.errors
            .iter()
            .keys()
            .map(|k| Ok(String::from_utf8_lossy(&k?).to_string()))
            .collect()
    }
}

fn content_type(path: &Path) -> String {
    file::extension(path).unwrap_or("raw").to_string()
}

fn cached_name(path: &Path, suffix: &str) -> String {
    let stem = path.file_stem().and_then(OsStr::to_str).unwrap_or("file");
    match file::extension(path) {
        Some(ext) => format!("{stem}-{suffix}.{ext}"),
        None => format!("{stem}-{suffix}"),
    }
}

#[async_trait::async_trait]
impl FileCache for SledFileCache {
    async fn start(&self) -> Result<()> {
        self.archive.start().await
    }

    async fn cache_file(&self, source: &South, path: &Path) -> Result<CachedFile> {
        let key: Key = self.db.generate_id()?;
        let created_at = time::now();
        let mut target = self
            .files_folder
            .join(cached_name(path, &created_at.timestamp_millis().to_string()));
        if file::exists(&target).await {
            target = self.files_folder.join(cached_name(
                path,
                &format!("{}-{key}", created_at.timestamp_millis()),
            ));
        }
        let size = file::copy(path, &target).await?;
        let cached = CachedFile {
            path: target,
            source_id: source.to_string(),
            content_type: content_type(path),
            created_at,
            size,
        };
        self.queue.insert(key.to_be_bytes(), encode(&cached)?)?;
        debug!(
            "[North::{}] File {} cached as {}.",
            self.alias,
            path.display(),
            cached.path.display()
        );
        Ok(cached)
    }

    async fn retrieve_file(&self) -> Result<Option<Entry<CachedFile>>> {
        while let Some((key, raw)) = self.queue.first()? {
            match decode_key(&key).and_then(|k| Ok((k, decode::<CachedFile>(&raw)?))) {
                Ok((key, item)) => return Ok(Some(Entry { key, item })),
                Err(e) => {
                    error!(
                        "[North::{}] Dropping unreadable file record: {e}",
                        self.alias
                    );
                    self.queue.remove(key)?;
                }
            }
        }
        Ok(None)
    }

    async fn remove_file(&self, entry: &Entry<CachedFile>, archive: bool) -> Result<()> {
        let path = &entry.item.path;
        let res = if archive {
            self.archive.archive_or_remove(path).await
        } else {
            file::remove(path).await.map_err(Into::into)
        };
        match res {
            Err(super::Error::File(e)) if e.is_not_found() => {
                debug!(
                    "[North::{}] File {} already gone.",
                    self.alias,
                    path.display()
                );
            }
            // the record lives as long as the file sits in the cache folder
            Err(e) => return Err(e),
            Ok(()) => (),
        }
        self.queue.remove(entry.key.to_be_bytes())?;
        Ok(())
    }

    async fn manage_errored_file(&self, entry: &Entry<CachedFile>) -> Result<()> {
        let name = entry.item.file_name().to_string();
        let target = self.errors_folder.join(&name);
        let mut item = entry.item.clone();
        match file::rename(&entry.item.path, &target).await {
            Ok(()) => item.path = target,
            Err(e) => error!("[North::{}] {e}", self.alias),
        }
        let raw = encode(&item)?;
        let key = entry.key.to_be_bytes();
        let res: TransactionResult<()> =
            (&self.queue, &self.errors).transaction(|(queue, errors)| {
                queue.remove(&key[..])?;
                errors.insert(name.as_bytes(), raw.as_slice())?;
                Ok(())
            });
        res?;
        warn!(
            "[North::{}] File {} moved to the error cache.",
            self.alias,
            entry.item.path.display()
        );
        Ok(())
    }

    fn number_of_files(&self) -> usize {
        self.queue.len()
    }

    fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    async fn error_files(&self, filter: &ErrorFileFilter) -> Result<Vec<ErrorFile>> {
        let mut found = Vec::new();
        for (filename, item) in self.error_records()? {
            let path = item.map_or_else(|| self.errors_folder.join(&filename), |i| i.path);
            let meta = match file::stat(&path).await {
                Ok(meta) => meta,
                Err(e) => {
                    error!("[North::{}] {e}", self.alias);
                    continue;
                }
            };
            let modification_date = meta
                .modified()
                .map_or_else(|_| time::now(), DateTime::<Utc>::from);
            if filter.matches(&filename, &modification_date) {
                found.push(ErrorFile {
                    filename,
                    modification_date,
                    size: meta.len(),
                });
            }
        }
        Ok(found)
    }

    async fn remove_error_files(&self, names: &[String]) -> Result<usize> {
        let mut removed = 0;
        for name in names {
            let Some(raw) = self.errors.remove(name.as_bytes())? else {
                warn!("[North::{}] {name} is not in the error cache.", self.alias);
                continue;
            };
            let path = decode::<CachedFile>(&raw)
                .map_or_else(|_| self.errors_folder.join(name), |i| i.path);
            match file::remove(&path).await {
                Err(e) if !e.is_not_found() => error!("[North::{}] {e}", self.alias),
                _ => {
                    debug!("[North::{}] Error file {name} removed.", self.alias);
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn retry_error_files(&self, names: &[String]) -> Result<usize> {
        let mut retried = 0;
        for name in names {
            let Some(raw) = self.errors.get(name.as_bytes())? else {
                warn!("[North::{}] {name} is not in the error cache.", self.alias);
                continue;
            };
            let mut item = match decode::<CachedFile>(&raw) {
                Ok(item) => item,
                Err(e) => {
                    error!("[North::{}] Unreadable error record {name}: {e}", self.alias);
                    continue;
                }
            };
            let target = self.files_folder.join(name);
            if let Err(e) = file::rename(&item.path, &target).await {
                error!("[North::{}] {e}", self.alias);
                continue;
            }
            item.path = target;
            let raw = encode(&item)?;
            let key: Key = self.db.generate_id()?;
            let key = key.to_be_bytes();
            let res: TransactionResult<()> =
                (&self.queue, &self.errors).transaction(|(queue, errors)| {
                    errors.remove(name.as_bytes())?;
                    queue.insert(&key[..], raw.as_slice())?;
                    Ok(())
                });
            res?;
            debug!("[North::{}] Error file {name} added back to the cache.", self.alias);
            retried += 1;
        }
        Ok(retried)
    }

    async fn remove_all_error_files(&self) -> Result<usize> {
        let names = self.error_names()?;
        if names.is_empty() {
            debug!("[North::{}] No error file to remove.", self.alias);
            return Ok(0);
        }
        self.remove_error_files(&names).await
    }

    async fn retry_all_error_files(&self) -> Result<usize> {
        let names = self.error_names()?;
        if names.is_empty() {
            debug!("[North::{}] No error file to retry.", self.alias);
            return Ok(0);
        }
        self.retry_error_files(&names).await
    }

    async fn stop(&self) -> Result<()> {
        self.archive.stop();
        self.db.flush_async().await?;
        Ok(())
    }
}
