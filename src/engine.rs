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

use std::path::{Path, PathBuf};

use futures::future::join_all;
use oibus_common::{alias::South, file};
use oibus_north::{
    status::{self, StatusBoard, StatusReporter},
    Known, North, PointValue,
};
use tokio::task::JoinHandle;

use crate::{config::Config, errors::Error};

type Result<T> = std::result::Result<T, Error>;

/// Owns the north connectors and fans data produced by south connectors out to them
pub struct Engine {
    name: String,
    cache_folder: PathBuf,
    norths: Vec<North>,
    board: StatusBoard,
    collector: JoinHandle<()>,
}

impl Engine {
    /// creates an engine with the builtin north connector types
    ///
    /// # Errors
    ///   * if the configuration is invalid
    pub async fn new(config: Config) -> Result<Self> {
        Self::with_known(config, &oibus_north::builtin()).await
    }

    /// creates an engine resolving north connector types in `known`
    ///
    /// Disabled connectors are skipped, as are connectors that fail to build.
    ///
    /// # Errors
    ///   * if the configuration is invalid
    pub async fn with_known(config: Config, known: &Known) -> Result<Self> {
        config.validate()?;
        let Config { engine, norths: configs } = config;
        let (tx, rx) = status::channel();
        let board = StatusBoard::default();
        let collector = board.spawn_collector(rx);

        let mut norths = Vec::with_capacity(configs.len());
        for north_config in configs {
            let alias = north_config.alias();
            if !north_config.enabled {
                info!("[Engine::{}] North {alias} is disabled.", engine.name);
                continue;
            }
            let reporter = StatusReporter::new(alias.clone(), tx.clone());
            match North::build(north_config, known, reporter).await {
                Ok(north) => {
                    debug!("[Engine::{}] North {alias} created.", engine.name);
                    norths.push(north);
                }
                Err(e) => error!("[Engine::{}] Failed to create North {alias}: {e}", engine.name),
            }
        }
        Ok(Self {
            name: engine.name,
            cache_folder: engine.cache_folder,
            norths,
            board,
            collector,
        })
    }

    /// name of this engine
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// root folder of the north caches
    #[must_use]
    pub fn cache_folder(&self) -> &Path {
        &self.cache_folder
    }

    /// all north connectors, started or not
    #[must_use]
    pub fn norths(&self) -> &[North] {
        &self.norths
    }

    /// the north connector with the given id
    #[must_use]
    pub fn north(&self, id: &str) -> Option<&North> {
        self.norths.iter().find(|n| n.alias().id() == id)
    }

    /// the north connector with the given id
    ///
    /// # Errors
    ///   * if no such connector exists
    pub fn north_mut(&mut self, id: &str) -> Result<&mut North> {
        self.norths
            .iter_mut()
            .find(|n| n.alias().id() == id)
            .ok_or_else(|| Error::UnknownNorth(id.to_string()))
    }

    /// status reported by the north connectors
    #[must_use]
    pub fn status(&self) -> &StatusBoard {
        &self.board
    }

    /// starts every north connector
    ///
    /// A connector failing to start is logged and does not receive data until the next start.
    ///
    /// # Errors
    ///   * if the cache folder can't be created
    pub async fn start(&mut self) -> Result<()> {
        file::create_dir(&self.cache_folder).await?;
        let mut started = 0_usize;
        for north in &mut self.norths {
            match north.start(&self.cache_folder).await {
                Ok(()) => started += 1,
                Err(e) => error!("[Engine::{}] Failed to start North {}: {e}", self.name, north.alias()),
            }
        }
        info!(
            "[Engine::{}] Started {started} of {} North connectors.",
            self.name,
            self.norths.len()
        );
        Ok(())
    }

    /// stops every north connector
    pub async fn stop(&mut self) {
        for north in &mut self.norths {
            north.stop().await;
        }
        info!("[Engine::{}] Stopped.", self.name);
    }

    /// hands `values` produced by `source` to every started north connector handling values
    pub async fn add_values(&self, source: &South, values: Vec<PointValue>) {
        trace!(
            "[Engine::{}] Adding {} values from {source}.",
            self.name,
            values.len()
        );
        join_all(
            self.norths
                .iter()
                .filter(|n| n.is_running() && n.handles_values())
                .map(|n| n.cache_values(source, values.clone())),
        )
        .await;
    }

    /// hands the file at `path` produced by `source` to every started north connector handling
    /// files
    ///
    /// Unless `preserve` is set, the source file is removed once every connector cached its copy.
    ///
    /// # Errors
    ///   * if the source file can't be removed
    pub async fn add_file(&self, source: &South, path: &Path, preserve: bool) -> Result<()> {
        trace!("[Engine::{}] Adding {} from {source}.", self.name, path.display());
        let results = join_all(
            self.norths
                .iter()
                .filter(|n| n.is_running() && n.handles_files())
                .map(|n| async move { (n, n.cache_file(source, path).await) }),
        )
        .await;
        let mut cached = true;
        for (north, res) in results {
            if let Err(e) = res {
                error!(
                    "[Engine::{}] North {} failed to cache {}: {e}",
                    self.name,
                    north.alias(),
                    path.display()
                );
                cached = false;
            }
        }
        if cached && !preserve {
            file::remove(path).await?;
        } else if !cached {
            warn!(
                "[Engine::{}] Keeping {} as not every North cached it.",
                self.name,
                path.display()
            );
        }
        Ok(())
    }

    /// `true` if no north connector holds data waiting for delivery
    ///
    /// Connectors whose caches were never opened are not taken into account.
    ///
    /// # Errors
    ///   * if a cache can't be queried
    pub fn is_cache_empty(&self) -> Result<bool> {
        for north in &self.norths {
            match north.is_cache_empty() {
                Ok(true) | Err(oibus_north::Error::NotStarted(_)) => (),
                Ok(false) => return Ok(false),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(true)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.collector.abort();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("name", &self.name)
            .field("cache_folder", &self.cache_folder)
            .field("norths", &self.norths)
            .finish_non_exhaustive()
    }
}
