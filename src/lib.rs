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

//! The `OIBus` runtime
//!
//! Owns the configured north connectors, hands them the data produced by south connectors and
//! tells whether everything cached has been delivered.

#![deny(missing_docs)]
#![deny(
    clippy::all,
    clippy::unwrap_used,
    clippy::unnecessary_unwrap,
    clippy::pedantic,
    clippy::mod_module_files
)]

#[macro_use]
extern crate log;

/// runtime configuration
pub mod config;
/// the engine
pub mod engine;
/// runtime errors
pub mod errors;

pub use crate::config::Config;
pub use crate::engine::Engine;
pub use crate::errors::Error;
pub use oibus_north as north;
