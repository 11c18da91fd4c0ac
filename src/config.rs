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

use std::{collections::HashSet, path::{Path, PathBuf}, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::errors::Error;

fn default_cache_folder() -> PathBuf {
    PathBuf::from("./cache")
}

/// Engine settings
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Engine {
    /// name of this `OIBus` instance, used in logs
    pub name: String,
    /// root of the connector cache folders
    #[serde(default = "default_cache_folder")]
    pub cache_folder: PathBuf,
}

/// The runtime configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// engine settings
    pub engine: Engine,
    /// north connectors
    #[serde(default)]
    pub norths: Vec<oibus_north::config::North>,
}

impl Config {
    /// loads and validates the configuration file at `path`
    ///
    /// # Errors
    ///   * if the file can't be read, parsed or is invalid
    pub async fn from_file(path: &Path) -> Result<Self, Error> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Read(e, path.display().to_string()))?;
        raw.parse()
    }

    /// makes sure north connector ids are unique
    ///
    /// # Errors
    ///   * if two north connectors share an id
    pub fn validate(&self) -> Result<(), Error> {
        let mut ids = HashSet::new();
        for north in &self.norths {
            if !ids.insert(north.id.as_str()) {
                return Err(Error::DuplicateNorth(north.id.clone()));
            }
        }
        Ok(())
    }
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Self = serde_yaml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}
