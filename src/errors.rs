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

/// The error type for the runtime
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration file can't be read
    #[error("Failed to read `{1}`: {0}")]
    Read(std::io::Error, String),
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_yaml::Error),
    /// Two north connectors share an id
    #[error("Duplicate north connector id `{0}`")]
    DuplicateNorth(String),
    /// No north connector with this id
    #[error("Unknown north connector `{0}`")]
    UnknownNorth(String),
    /// North connector error
    #[error(transparent)]
    North(#[from] oibus_north::Error),
    /// File system error
    #[error(transparent)]
    File(#[from] oibus_common::Error),
}
