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

//! Aliases for connector instances

use serde::{Deserialize, Serialize};

/// unique alias of a North connector instance
#[derive(Debug, PartialEq, PartialOrd, Eq, Hash, Clone, Serialize, Deserialize)]
pub struct North {
    id: String,
    name: String,
}

impl North {
    /// construct a new `North` alias from the connector id and its human readable name
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// the connector id
    #[must_use]
    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    /// the connector name
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// name of the private cache folder of this connector
    #[must_use]
    pub fn folder_name(&self) -> String {
        format!("north-{}", self.id)
    }
}

impl std::fmt::Display for North {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// identity of a South connector producing data
#[derive(Debug, PartialEq, PartialOrd, Eq, Hash, Clone, Serialize, Deserialize)]
pub struct South(String);

impl South {
    /// construct a new `South` from its id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// reference this id as a stringy thing again
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for South {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for South {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for South {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn north() {
        let north = North::new("n1", "my north");
        assert_eq!("n1", north.id());
        assert_eq!("my north", north.name());
        assert_eq!("north-n1", north.folder_name());
        assert_eq!("my north (n1)", north.to_string());
    }

    #[test]
    fn south() {
        let south = South::from("s1");
        assert_eq!("s1", south.as_str());
        assert_eq!(South::new("s1"), South::from("s1".to_string()));
        assert_eq!("s1", south.to_string());
    }
}
