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

//! North connectors of `OIBus`
//!
//! A north connector delivers data collected by south connectors to an external system. Every
//! connector owns a durable value cache and a durable file cache, drained by two independent
//! delivery pipelines. Each pipeline retries failed deliveries up to a ceiling, then moves the
//! failing item into an error cache so it no longer blocks the queue.

#![deny(missing_docs)]
#![deny(
    clippy::all,
    clippy::unwrap_used,
    clippy::unnecessary_unwrap,
    clippy::pedantic,
    clippy::mod_module_files
)]

/// durable caches
pub mod cache;
/// north connector configuration
pub mod config;
/// north connector errors
pub mod errors;
/// builtin connectors
pub mod impls;
/// prelude with commonly needed stuff imported
pub mod prelude;
/// status reporting
pub mod status;

pub(crate) mod pipeline;
mod runtime;

#[macro_use]
extern crate log;

use std::{collections::HashMap, fmt::Display, sync::Arc};

use oibus_common::alias;
use serde::{Deserialize, Serialize};

pub use crate::cache::{CachedFile, CachedValue, PointValue};
pub use crate::errors::Error;
pub use crate::runtime::North;

/// context handed to north connectors
#[derive(Clone, Debug)]
pub struct NorthContext {
    alias: alias::North,
    north_type: NorthType,
}

impl NorthContext {
    /// creates a context for the connector `alias` of type `north_type`
    #[must_use]
    pub fn new(alias: alias::North, north_type: NorthType) -> Self {
        Self { alias, north_type }
    }

    /// the alias of the connector
    #[must_use]
    pub fn alias(&self) -> &alias::North {
        &self.alias
    }

    /// the connector type
    #[must_use]
    pub fn north_type(&self) -> &NorthType {
        &self.north_type
    }

    /// only log an error and swallow the result
    #[inline]
    pub fn swallow_err<T, E, M>(&self, expr: std::result::Result<T, E>, msg: &M)
    where
        E: Display,
        M: Display + ?Sized,
    {
        if let Err(e) = expr {
            error!("{self} {msg}: {e}");
        }
    }
}

impl Display for NorthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[North::{}]", &self.alias)
    }
}

/// A north connector delivers cached values and files to an external system.
///
/// The runtime never calls the delivery methods of one kind concurrently, but a value delivery
/// and a file delivery may be in flight at the same time.
#[async_trait::async_trait]
pub trait NorthConnector: Send + Sync {
    /// `true` if this connector delivers values
    fn handles_values(&self) -> bool;

    /// `true` if this connector delivers files
    fn handles_files(&self) -> bool;

    /// called once when the connector is started, before any delivery
    async fn connect(&self, _ctx: &NorthContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// called once when the connector is stopped
    async fn disconnect(&self, _ctx: &NorthContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// deliver a batch of values, oldest first
    async fn handle_values(
        &self,
        _values: &[CachedValue],
        ctx: &NorthContext,
    ) -> anyhow::Result<()> {
        Err(Error::Unsupported(ctx.alias().clone(), "values").into())
    }

    /// deliver a single file
    async fn handle_file(&self, _file: &CachedFile, ctx: &NorthContext) -> anyhow::Result<()> {
        Err(Error::Unsupported(ctx.alias().clone(), "files").into())
    }

    /// `true` if a delivery that failed with `error` should be retried even though the retry
    /// ceiling is reached.
    ///
    /// Connectors that answer `true` for permanent errors will retry forever.
    fn should_retry(&self, _error: &anyhow::Error) -> bool {
        false
    }

    /// check that the external system is reachable with the current settings
    async fn test_connection(&self, _ctx: &NorthContext) -> anyhow::Result<()> {
        Ok(())
    }
}

/// the type of a north connector
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct NorthType(String);

impl From<NorthType> for String {
    fn from(nt: NorthType) -> Self {
        nt.0
    }
}

impl<'t> From<&'t NorthType> for &'t str {
    fn from(nt: &'t NorthType) -> Self {
        nt.0.as_str()
    }
}

impl Display for NorthType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl From<String> for NorthType {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl<T> From<&T> for NorthType
where
    T: ToString + ?Sized,
{
    fn from(s: &T) -> Self {
        Self(s.to_string())
    }
}

/// something that is able to create a north connector instance
#[async_trait::async_trait]
pub trait NorthBuilder: Sync + Send + std::fmt::Debug {
    /// the type of the connector
    fn north_type(&self) -> NorthType;

    /// create a connector from the given `alias` and `config`, if connector settings are mandatory
    /// implement `build_cfg` instead
    ///
    /// # Errors
    ///  * If the settings are invalid for the connector
    async fn build(
        &self,
        alias: &alias::North,
        config: &config::North,
    ) -> anyhow::Result<Arc<dyn NorthConnector>> {
        let settings = config.settings.as_ref().ok_or_else(|| {
            Error::InvalidConfiguration(alias.clone(), "missing settings".to_string())
        })?;
        self.build_cfg(alias, config, settings).await
    }

    /// create a connector from the given `alias`, outer `config` and the connector specific `settings`
    ///
    /// # Errors
    ///  * If the settings are invalid for the connector
    async fn build_cfg(
        &self,
        alias: &alias::North,
        _config: &config::North,
        _settings: &simd_json::OwnedValue,
    ) -> anyhow::Result<Arc<dyn NorthConnector>> {
        Err(Error::InvalidConfiguration(
            alias.clone(),
            format!("`{}` takes no settings", self.north_type()),
        )
        .into())
    }
}

/// Lookup table for known north connectors
pub type Known = HashMap<NorthType, Box<dyn NorthBuilder + 'static>>;

/// the builtin north connectors
#[must_use]
pub fn builtin() -> Known {
    impls::builtin_north_types()
        .into_iter()
        .map(|builder| (builder.north_type(), builder))
        .collect()
}
