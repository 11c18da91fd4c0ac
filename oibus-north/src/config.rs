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

use std::time::Duration;

use oibus_common::{alias, default_false, default_true};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use simd_json::OwnedValue;

use crate::{errors::Error, NorthType};

const DEFAULT_SEND_INTERVAL_MS: u64 = 10_000;
const DEFAULT_RETRY_INTERVAL_MS: u64 = 5_000;
const DEFAULT_RETRY_COUNT: u64 = 3;
const DEFAULT_GROUP_COUNT: usize = 1_000;
const DEFAULT_MAX_SEND_COUNT: usize = 10_000;
const DEFAULT_RETENTION_DURATION_H: u64 = 72;

fn default_send_interval_ms() -> u64 {
    DEFAULT_SEND_INTERVAL_MS
}
fn default_retry_interval_ms() -> u64 {
    DEFAULT_RETRY_INTERVAL_MS
}
fn default_retry_count() -> u64 {
    DEFAULT_RETRY_COUNT
}
fn default_group_count() -> usize {
    DEFAULT_GROUP_COUNT
}
fn default_max_send_count() -> usize {
    DEFAULT_MAX_SEND_COUNT
}
fn default_retention_duration_h() -> u64 {
    DEFAULT_RETENTION_DURATION_H
}

/// Archive settings for successfully delivered files
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Archive {
    /// keep delivered files in the archive folder instead of deleting them
    #[serde(default = "default_false")]
    pub enabled: bool,
    /// archived files older than this are deleted, `0` keeps them forever
    #[serde(default = "default_retention_duration_h")]
    pub retention_duration_h: u64,
}

impl Default for Archive {
    fn default() -> Self {
        Self {
            enabled: false,
            retention_duration_h: DEFAULT_RETENTION_DURATION_H,
        }
    }
}

impl Archive {
    /// retention as a `Duration`, `None` if archived files are kept forever
    #[must_use]
    pub fn retention(&self) -> Option<Duration> {
        (self.retention_duration_h > 0)
            .then(|| Duration::from_secs(self.retention_duration_h.saturating_mul(3600)))
    }
}

/// Caching and delivery settings of a north connector
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Caching {
    /// delay between two delivery attempts when idle, `0` disables delivery
    #[serde(default = "default_send_interval_ms")]
    pub send_interval_ms: u64,
    /// delay before retrying a failed delivery
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    /// number of retries before a failed item is quarantined
    #[serde(default = "default_retry_count")]
    pub retry_count: u64,
    /// number of cached values that triggers an immediate delivery
    #[serde(default = "default_group_count")]
    pub group_count: usize,
    /// maximum number of values handed to the connector in one batch
    #[serde(default = "default_max_send_count")]
    pub max_send_count: usize,
    /// archive settings
    #[serde(default)]
    pub archive: Archive,
}

impl Default for Caching {
    fn default() -> Self {
        Self {
            send_interval_ms: DEFAULT_SEND_INTERVAL_MS,
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
            retry_count: DEFAULT_RETRY_COUNT,
            group_count: DEFAULT_GROUP_COUNT,
            max_send_count: DEFAULT_MAX_SEND_COUNT,
            archive: Archive::default(),
        }
    }
}

impl Caching {
    /// idle delay between two delivery attempts
    #[must_use]
    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }

    /// delay before retrying a failed delivery
    #[must_use]
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// `false` if no delivery will ever be attempted
    #[must_use]
    pub fn delivers(&self) -> bool {
        self.send_interval_ms > 0
    }

    pub(crate) fn validate(&self, alias: &alias::North) -> Result<(), Error> {
        if self.max_send_count == 0 {
            return Err(Error::InvalidConfiguration(
                alias.clone(),
                "`max_send_count` must be at least 1".to_string(),
            ));
        }
        if self.group_count == 0 {
            return Err(Error::InvalidConfiguration(
                alias.clone(),
                "`group_count` must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// North connector configuration - the parts applicable to all north connectors.
/// Connector specific parts are kept in `settings`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct North {
    /// unique id, also names the cache folder
    pub id: String,
    /// human readable name used in logs
    pub name: String,
    /// connector type
    #[serde(rename = "type")]
    pub north_type: NorthType,
    /// disabled connectors are neither started nor fed
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// ids of the south connectors this connector accepts data from, empty accepts all
    #[serde(default)]
    pub subscribed_to: Vec<String>,
    /// caching and delivery settings
    #[serde(default)]
    pub caching: Caching,
    /// connector specific settings
    #[serde(default)]
    pub settings: Option<OwnedValue>,
}

impl North {
    /// the alias of the connector described by this configuration
    #[must_use]
    pub fn alias(&self) -> alias::North {
        alias::North::new(self.id.as_str(), self.name.as_str())
    }
}

/// Trait for connector specific configurations
pub trait Impl: DeserializeOwned {
    /// deserialize the connector specific settings
    ///
    /// # Errors
    ///  * if the settings don't match the expected structure
    fn new(settings: &OwnedValue) -> Result<Self, simd_json::Error> {
        simd_json::serde::from_owned_value(settings.clone())
    }
}
