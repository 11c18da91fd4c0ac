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

use std::{path::Path, sync::Arc};

use oibus_common::{
    alias::{self, South},
    file, time,
};
use simd_json::OwnedValue;

use crate::{
    cache::{
        self, CachedFile, Entry, ErrorFile, ErrorFileFilter, FileCache, PointValue,
        SledFileCache, SledValueCache, ValueCache,
    },
    config,
    errors::Error,
    pipeline::{self, files::Files, values::Values, Timing},
    status::{self, StatusReporter},
    Known, NorthConnector, NorthContext,
};

type Result<T> = std::result::Result<T, Error>;

#[derive(Clone)]
struct Caches {
    values: Arc<dyn ValueCache>,
    files: Arc<dyn FileCache>,
}

/// A running north connector: its caches, its two delivery pipelines and its connector
pub struct North {
    ctx: NorthContext,
    config: config::North,
    connector: Arc<dyn NorthConnector>,
    status: StatusReporter,
    caches: Option<Caches>,
    values: Option<pipeline::Addr<pipeline::values::Batch>>,
    files: Option<pipeline::Addr<Entry<CachedFile>>>,
    connected: bool,
}

impl North {
    /// creates a north connector around `connector`
    ///
    /// # Errors
    ///   * if the caching configuration is invalid
    pub fn new(
        config: config::North,
        connector: Arc<dyn NorthConnector>,
        status: StatusReporter,
    ) -> Result<Self> {
        let alias = config.alias();
        config.caching.validate(&alias)?;
        Ok(Self {
            ctx: NorthContext::new(alias, config.north_type.clone()),
            config,
            connector,
            status,
            caches: None,
            values: None,
            files: None,
            connected: false,
        })
    }

    /// creates a north connector of the configured type from the `known` builders
    ///
    /// # Errors
    ///   * if the type is unknown, the connector can't be built or the configuration is invalid
    pub async fn build(config: config::North, known: &Known, status: StatusReporter) -> Result<Self> {
        let alias = config.alias();
        let builder = known
            .get(&config.north_type)
            .ok_or_else(|| Error::UnknownType(alias.clone(), config.north_type.clone()))?;
        let connector = builder
            .build(&alias, &config)
            .await
            .map_err(|e| Error::Connector(alias.clone(), e))?;
        Self::new(config, connector, status)
    }

    /// the alias of this connector
    #[must_use]
    pub fn alias(&self) -> &alias::North {
        self.ctx.alias()
    }

    /// the configuration this connector was created with
    #[must_use]
    pub fn config(&self) -> &config::North {
        &self.config
    }

    /// `true` if the connector delivers values
    #[must_use]
    pub fn handles_values(&self) -> bool {
        self.connector.handles_values()
    }

    /// `true` if the connector delivers files
    #[must_use]
    pub fn handles_files(&self) -> bool {
        self.connector.handles_files()
    }

    /// `true` if data produced by `source` is accepted
    #[must_use]
    pub fn is_subscribed(&self, source: &South) -> bool {
        self.config.subscribed_to.is_empty()
            || self
                .config
                .subscribed_to
                .iter()
                .any(|s| s.as_str() == source.as_str())
    }

    /// `true` between a successful `start` and `stop`
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.connected
    }

    fn caches(&self) -> Result<&Caches> {
        self.caches
            .as_ref()
            .ok_or_else(|| Error::NotStarted(self.alias().clone()))
    }

    fn cache_err(&self, e: cache::Error) -> Error {
        Error::Cache(self.alias().clone(), e)
    }

    /// opens the caches inside `<cache_root>/north-<id>` without starting any delivery
    ///
    /// # Errors
    ///   * if the cache folder or the caches can't be opened
    pub async fn open_caches(&mut self, cache_root: &Path) -> Result<()> {
        if self.caches.is_some() {
            return Ok(());
        }
        let base = cache_root.join(self.alias().folder_name());
        file::create_dir(&base)
            .await
            .map_err(|e| self.cache_err(e.into()))?;
        let db = cache::open_db(&base).map_err(|e| self.cache_err(e))?;
        let values = SledValueCache::open(self.alias(), &db).map_err(|e| self.cache_err(e))?;
        let files = SledFileCache::open(self.alias(), &db, &base, &self.config.caching.archive)
            .await
            .map_err(|e| self.cache_err(e))?;
        self.caches = Some(Caches {
            values: Arc::new(values),
            files: Arc::new(files),
        });
        Ok(())
    }

    /// opens the caches, connects and arms both delivery pipelines
    ///
    /// With a send interval of `0` the connector caches data but never delivers it.
    ///
    /// # Errors
    ///   * if the caches can't be opened or the connector fails to connect
    pub async fn start(&mut self, cache_root: &Path) -> Result<()> {
        let ctx = self.ctx.clone();
        if self.connected {
            info!("{ctx} Already started.");
            return Ok(());
        }
        info!("{ctx} Starting...");
        self.open_caches(cache_root).await?;
        let caches = self.caches()?.clone();
        caches
            .files
            .start()
            .await
            .map_err(|e| self.cache_err(e))?;

        let mut fields = status::Fields::new();
        if self.handles_values() {
            fields.push((status::VALUES_SENT, Some(OwnedValue::from(0_u64))));
            fields.push((status::LAST_VALUES_AT, None));
            fields.push((status::LAST_VALUE, None));
        }
        if self.handles_files() {
            fields.push((status::FILES_SENT, Some(OwnedValue::from(0_u64))));
            fields.push((status::LAST_UPLOAD_AT, None));
            fields.push((status::LAST_UPLOADED_FILE, None));
        }
        self.status.update(fields);

        self.connector
            .connect(&ctx)
            .await
            .map_err(|e| Error::Connector(self.alias().clone(), e))?;
        self.connected = true;
        self.status.update(vec![(
            status::CONNECTED_AT,
            Some(OwnedValue::from(time::now_iso())),
        )]);

        let caching = &self.config.caching;
        if caching.delivers() {
            let timing = Timing::from(caching);
            self.values = Some(pipeline::spawn(
                Values {
                    cache: caches.values.clone(),
                    connector: self.connector.clone(),
                    status: self.status.clone(),
                    max_send_count: caching.max_send_count,
                },
                ctx.clone(),
                timing,
            ));
            self.files = Some(pipeline::spawn(
                Files {
                    cache: caches.files.clone(),
                    connector: self.connector.clone(),
                    status: self.status.clone(),
                    archive: caching.archive.enabled,
                },
                ctx.clone(),
                timing,
            ));
        } else {
            warn!("{ctx} No send interval. No values or files will be sent.");
        }
        info!("{ctx} Started.");
        Ok(())
    }

    /// cancels both pipelines, disconnects and flushes the caches
    ///
    /// A delivery in flight is not aborted, its outcome is still applied to the caches.
    pub async fn stop(&mut self) {
        let ctx = self.ctx.clone();
        if let Some(addr) = self.values.take() {
            ctx.swallow_err(addr.stop().await, "Error stopping the values pipeline");
        }
        if let Some(addr) = self.files.take() {
            ctx.swallow_err(addr.stop().await, "Error stopping the files pipeline");
        }
        if let Some(caches) = &self.caches {
            ctx.swallow_err(caches.values.stop().await, "Error closing the value cache");
            ctx.swallow_err(caches.files.stop().await, "Error closing the file cache");
        }
        if self.connected {
            self.connected = false;
            ctx.swallow_err(self.connector.disconnect(&ctx).await, "Error disconnecting");
            self.status.update(vec![(
                status::CONNECTED_AT,
                Some(OwnedValue::from(status::NOT_CONNECTED)),
            )]);
            info!("{ctx} Stopped.");
        }
    }

    /// caches `values` produced by `source`
    ///
    /// Values from sources this connector is not subscribed to are ignored. Reaching the group
    /// count triggers a delivery right away.
    pub async fn cache_values(&self, source: &South, values: Vec<PointValue>) {
        let ctx = &self.ctx;
        if values.is_empty() {
            return;
        }
        if !self.is_subscribed(source) {
            trace!("{ctx} Not subscribed to {source}, ignoring {} values.", values.len());
            return;
        }
        let Some(caches) = &self.caches else {
            warn!("{ctx} Not started, dropping {} values from {source}.", values.len());
            return;
        };
        if let Err(e) = caches.values.cache_values(source, values).await {
            error!("{ctx} Error while caching values from {source}: {e}");
            return;
        }
        let count = caches.values.number_of_values();
        if count >= self.config.caching.group_count {
            trace!(
                "{ctx} Group count reached: {count} >= {}",
                self.config.caching.group_count
            );
            if let Some(values) = &self.values {
                values.flush(ctx);
            }
        }
    }

    /// caches a copy of the file at `path` produced by `source`
    ///
    /// Files from sources this connector is not subscribed to are ignored.
    ///
    /// # Errors
    ///   * if the connector is not started or the file can't be cached
    pub async fn cache_file(&self, source: &South, path: &Path) -> Result<()> {
        if !self.is_subscribed(source) {
            trace!(
                "{} Not subscribed to {source}, ignoring {}.",
                self.ctx,
                path.display()
            );
            return Ok(());
        }
        self.caches()?
            .files
            .cache_file(source, path)
            .await
            .map_err(|e| self.cache_err(e))?;
        Ok(())
    }

    /// `true` if neither values nor files wait for delivery
    ///
    /// # Errors
    ///   * if the caches are not open
    pub fn is_cache_empty(&self) -> Result<bool> {
        let caches = self.caches()?;
        Ok(caches.values.is_empty() && caches.files.is_empty())
    }

    /// number of values waiting for delivery
    ///
    /// # Errors
    ///   * if the caches are not open
    pub fn number_of_values(&self) -> Result<usize> {
        Ok(self.caches()?.values.number_of_values())
    }

    /// number of quarantined values
    ///
    /// # Errors
    ///   * if the caches are not open
    pub fn number_of_errored_values(&self) -> Result<usize> {
        Ok(self.caches()?.values.number_of_errored_values())
    }

    /// number of files waiting for delivery
    ///
    /// # Errors
    ///   * if the caches are not open
    pub fn number_of_files(&self) -> Result<usize> {
        Ok(self.caches()?.files.number_of_files())
    }

    /// checks that the external system is reachable
    ///
    /// # Errors
    ///   * with the connector error
    pub async fn test_connection(&self) -> Result<()> {
        self.connector
            .test_connection(&self.ctx)
            .await
            .map_err(|e| Error::Connector(self.alias().clone(), e))
    }

    /// quarantined files matching `filter`
    ///
    /// # Errors
    ///   * if the caches are not open or can't be read
    pub async fn error_files(&self, filter: &ErrorFileFilter) -> Result<Vec<ErrorFile>> {
        self.caches()?
            .files
            .error_files(filter)
            .await
            .map_err(|e| self.cache_err(e))
    }

    /// deletes the named quarantined files
    ///
    /// # Errors
    ///   * if the caches are not open or can't be updated
    pub async fn remove_error_files(&self, names: &[String]) -> Result<usize> {
        self.caches()?
            .files
            .remove_error_files(names)
            .await
            .map_err(|e| self.cache_err(e))
    }

    /// enqueues the named quarantined files again
    ///
    /// # Errors
    ///   * if the caches are not open or can't be updated
    pub async fn retry_error_files(&self, names: &[String]) -> Result<usize> {
        self.caches()?
            .files
            .retry_error_files(names)
            .await
            .map_err(|e| self.cache_err(e))
    }

    /// deletes all quarantined files
    ///
    /// # Errors
    ///   * if the caches are not open or can't be updated
    pub async fn remove_all_error_files(&self) -> Result<usize> {
        self.caches()?
            .files
            .remove_all_error_files()
            .await
            .map_err(|e| self.cache_err(e))
    }

    /// enqueues all quarantined files again
    ///
    /// # Errors
    ///   * if the caches are not open or can't be updated
    pub async fn retry_all_error_files(&self) -> Result<usize> {
        self.caches()?
            .files
            .retry_all_error_files()
            .await
            .map_err(|e| self.cache_err(e))
    }
}

impl std::fmt::Debug for North {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("North")
            .field("alias", self.alias())
            .field("type", &self.config.north_type)
            .field("running", &self.connected)
            .finish_non_exhaustive()
    }
}
