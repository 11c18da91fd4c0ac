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

use std::sync::atomic::{AtomicUsize, Ordering};

use oibus_common::alias::{self, South};
use sled::{transaction::TransactionResult, Transactional};

use super::{decode, decode_key, encode, CachedValue, Entry, Key, PointValue, Result, ValueCache};

const VALUES_TREE: &str = "values";
const ERRORS_TREE: &str = "values-errors";

/// Value cache backed by two sled trees
pub struct SledValueCache {
    alias: alias::North,
    db: sled::Db,
    queue: sled::Tree,
    errors: sled::Tree,
    // sled only counts by scanning
    count: AtomicUsize,
}

impl SledValueCache {
    /// opens the value trees of `db`
    ///
    /// # Errors
    ///   * if the trees can't be opened
    pub fn open(alias: &alias::North, db: &sled::Db) -> Result<Self> {
        let queue = db.open_tree(VALUES_TREE)?;
        let errors = db.open_tree(ERRORS_TREE)?;
        let count = queue.len();
        debug!("[North::{alias}] {count} values in cache.");
        if !errors.is_empty() {
            warn!(
                "[North::{alias}] {} values in error cache.",
                errors.len()
            );
        }
        Ok(Self {
            alias: alias.clone(),
            db: db.clone(),
            queue,
            errors,
            count: AtomicUsize::new(count),
        })
    }

    fn decrease(&self, n: usize) {
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                Some(c.saturating_sub(n))
            })
            .ok();
    }

    /// moves undecodable records out of the way so they don't block the queue
    fn quarantine_corrupt(&self, keys: Vec<sled::IVec>) -> Result<()> {
        let res: TransactionResult<usize> =
            (&self.queue, &self.errors).transaction(|(queue, errors)| {
                let mut moved = 0;
                for key in &keys {
                    if let Some(raw) = queue.remove(key)? {
                        errors.insert(key, raw)?;
                        moved += 1;
                    }
                }
                Ok(moved)
            });
        self.decrease(res?);
        Ok(())
    }
}

#[async_trait::async_trait]
impl ValueCache for SledValueCache {
    async fn cache_values(&self, source: &South, values: Vec<PointValue>) -> Result<()> {
        let n = values.len();
        let mut batch = sled::Batch::default();
        for value in values {
            let key: Key = self.db.generate_id()?;
            batch.insert(
                key.to_be_bytes().to_vec(),
                encode(&CachedValue::new(source, value))?,
            );
        }
        self.queue.apply_batch(batch)?;
        self.count.fetch_add(n, Ordering::AcqRel);
        trace!("[North::{}] {n} values cached from {source}.", self.alias);
        Ok(())
    }

    async fn retrieve_values(&self, max: usize) -> Result<Vec<Entry<CachedValue>>> {
        let mut entries = Vec::with_capacity(max.min(self.number_of_values()));
        let mut corrupt = Vec::new();
        for record in self.queue.iter() {
            if entries.len() >= max {
                break;
            }
            let (key, raw) = record?;
            match decode_key(&key).and_then(|k| Ok((k, decode::<CachedValue>(&raw)?))) {
                Ok((key, item)) => entries.push(Entry { key, item }),
                Err(e) => {
                    error!(
                        "[North::{}] Moving unreadable value record to the error cache: {e}",
                        self.alias
                    );
                    corrupt.push(key);
                }
            }
        }
        if !corrupt.is_empty() {
            self.quarantine_corrupt(corrupt)?;
        }
        Ok(entries)
    }

    async fn remove_values(&self, keys: &[Key]) -> Result<usize> {
        let res: TransactionResult<usize> = self.queue.transaction(|queue| {
            let mut removed = 0;
            for key in keys {
                if queue.remove(&key.to_be_bytes()[..])?.is_some() {
                    removed += 1;
                }
            }
            Ok(removed)
        });
        let removed = res?;
        self.decrease(removed);
        Ok(removed)
    }

    async fn manage_errored_values(&self, keys: &[Key]) -> Result<usize> {
        let res: TransactionResult<usize> =
            (&self.queue, &self.errors).transaction(|(queue, errors)| {
                let mut moved = 0;
                for key in keys {
                    let key = key.to_be_bytes();
                    if let Some(raw) = queue.remove(&key[..])? {
                        errors.insert(&key[..], raw)?;
                        moved += 1;
                    }
                }
                Ok(moved)
            });
        let moved = res?;
        self.decrease(moved);
        warn!(
            "[North::{}] {moved} values moved to the error cache.",
            self.alias
        );
        Ok(moved)
    }

    fn number_of_values(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    fn number_of_errored_values(&self) -> usize {
        self.errors.len()
    }

    fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    async fn stop(&self) -> Result<()> {
        self.db.flush_async().await?;
        Ok(())
    }
}
