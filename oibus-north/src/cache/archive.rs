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
    path::{Path, PathBuf},
    sync::Mutex,
    time::{Duration, SystemTime},
};

use oibus_common::{alias, file};
use tokio::task::{self, JoinHandle};

use super::Result;
use crate::config;

/// name of the archive folder inside the connector cache folder
pub(crate) const ARCHIVE_FOLDER: &str = "archive";

/// delay before the first sweep after start
const FIRST_SWEEP_DELAY: Duration = Duration::from_secs(10);
/// delay between two sweeps
const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Keeps delivered files around for a while, or deletes them right away
pub struct ArchiveService {
    alias: alias::North,
    folder: PathBuf,
    config: config::Archive,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl ArchiveService {
    /// creates an archive service storing files in `<base>/archive`
    #[must_use]
    pub fn new(alias: &alias::North, base: &Path, config: &config::Archive) -> Self {
        Self {
            alias: alias.clone(),
            folder: base.join(ARCHIVE_FOLDER),
            config: config.clone(),
            sweeper: Mutex::new(None),
        }
    }

    /// the archive folder
    #[must_use]
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// creates the archive folder and starts sweeping old files if a retention is configured
    ///
    /// # Errors
    ///   * if the archive folder can't be created
    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }
        file::create_dir(&self.folder).await?;
        let Some(retention) = self.config.retention() else {
            return Ok(());
        };
        let Ok(mut sweeper) = self.sweeper.lock() else {
            error!("[North::{}] Archive sweeper lock poisoned.", self.alias);
            return Ok(());
        };
        if sweeper.is_none() {
            let alias = self.alias.clone();
            let folder = self.folder.clone();
            *sweeper = Some(task::spawn(async move {
                tokio::time::sleep(FIRST_SWEEP_DELAY).await;
                loop {
                    if let Err(e) = remove_older_than(&folder, retention, SystemTime::now()).await
                    {
                        error!("[North::{alias}] Error while sweeping the archive folder: {e}");
                    }
                    tokio::time::sleep(SWEEP_INTERVAL).await;
                }
            }));
        }
        Ok(())
    }

    /// stops sweeping
    pub fn stop(&self) {
        if let Ok(mut sweeper) = self.sweeper.lock() {
            if let Some(handle) = sweeper.take() {
                handle.abort();
            }
        }
    }

    /// moves `path` into the archive folder if archiving is enabled, deletes it otherwise
    ///
    /// # Errors
    ///   * if the file can't be moved or deleted
    pub async fn archive_or_remove(&self, path: &Path) -> Result<()> {
        if self.config.enabled {
            let target = self.folder.join(path.file_name().unwrap_or_default());
            file::rename(path, &target).await?;
            debug!(
                "[North::{}] File {} moved to {}.",
                self.alias,
                path.display(),
                target.display()
            );
        } else {
            file::remove(path).await?;
            debug!("[North::{}] File {} removed.", self.alias, path.display());
        }
        Ok(())
    }
}

impl Drop for ArchiveService {
    fn drop(&mut self) {
        self.stop();
    }
}

/// deletes the files in `folder` whose last modification is more than `retention` before `now`
pub(crate) async fn remove_older_than(
    folder: &Path,
    retention: Duration,
    now: SystemTime,
) -> Result<usize> {
    let mut removed = 0;
    for path in file::list_files(folder).await? {
        let modified = match file::stat(&path).await.map(|m| m.modified()) {
            Ok(Ok(modified)) => modified,
            Ok(Err(e)) => {
                error!("Could not read the modification time of {}: {e}", path.display());
                continue;
            }
            Err(e) => {
                error!("{e}");
                continue;
            }
        };
        if modified + retention < now {
            match file::remove(&path).await {
                Ok(()) => {
                    debug!("Archived file {} removed.", path.display());
                    removed += 1;
                }
                Err(e) => error!("{e}"),
            }
        }
    }
    Ok(removed)
}
