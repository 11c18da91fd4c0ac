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

/// The `console` north connector
pub mod console;
/// The `file-writer` north connector
pub mod file_writer;

use crate::NorthBuilder;

/// builtin north connector types
#[must_use]
pub(crate) fn builtin_north_types() -> Vec<Box<dyn NorthBuilder + 'static>> {
    vec![
        Box::<console::Builder>::default(),
        Box::<file_writer::Builder>::default(),
    ]
}
