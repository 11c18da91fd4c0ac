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

use oibus_common::alias;

use crate::{cache, NorthType};

/// The error type for north connectors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration
    #[error("{0} Invalid configuration: {1}")]
    InvalidConfiguration(alias::North, String),
    /// Unknown connector type
    #[error("{0} Unknown north connector type `{1}`")]
    UnknownType(alias::North, NorthType),
    /// The connector was not started
    #[error("{0} is not started")]
    NotStarted(alias::North),
    /// The connector does not handle this kind of data
    #[error("{0} does not handle {1}")]
    Unsupported(alias::North, &'static str),
    /// Cache error
    #[error("{0} Cache error: {1}")]
    Cache(alias::North, #[source] cache::Error),
    /// Connector implementation error
    #[error("{0} Connector implementation error: {1}")]
    Connector(alias::North, anyhow::Error),
    /// A delivery pipeline is gone
    #[error("{0} {1} pipeline is closed")]
    PipelineClosed(alias::North, &'static str),
}

impl Error {
    /// the connector this error belongs to
    #[must_use]
    pub fn alias(&self) -> &alias::North {
        match self {
            Error::InvalidConfiguration(a, _)
            | Error::UnknownType(a, _)
            | Error::NotStarted(a)
            | Error::Unsupported(a, _)
            | Error::Cache(a, _)
            | Error::Connector(a, _)
            | Error::PipelineClosed(a, _) => a,
        }
    }
}
