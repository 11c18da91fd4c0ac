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

use oibus_runtime::{Config, Engine};

use crate::cli::Run;

impl Run {
    pub(crate) async fn run(&self) -> anyhow::Result<()> {
        let config = Config::from_file(&self.config).await?;
        let mut engine = Engine::new(config).await?;
        engine.start().await?;
        info!("[Engine::{}] Running, press Ctrl-C to stop.", engine.name());

        tokio::signal::ctrl_c().await?;
        info!("[Engine::{}] Interrupted, stopping.", engine.name());
        engine.stop().await;

        for north in engine.norths() {
            let id = north.alias().id();
            for (field, value) in engine.status().get(id) {
                info!("[North::{}] {field}: {value}", north.alias());
            }
            match north.is_cache_empty() {
                Ok(true) => info!("[North::{}] Cache is empty.", north.alias()),
                Ok(false) => warn!("[North::{}] Undelivered data left in the cache.", north.alias()),
                Err(e) => warn!("[North::{}] {e}", north.alias()),
            }
        }
        Ok(())
    }
}
