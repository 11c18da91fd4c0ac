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

use anyhow::Context;

/// Sets up logging from a log4rs file or, without one, from `RUST_LOG`
pub(crate) fn setup(logger_config: Option<&str>) -> anyhow::Result<()> {
    if let Some(logger_config) = logger_config {
        log4rs::init_file(logger_config, log4rs::config::Deserializers::default())
            .with_context(|| format!("Failed to load logger config `{logger_config}`"))?;
    } else {
        env_logger::init();
    }
    Ok(())
}
