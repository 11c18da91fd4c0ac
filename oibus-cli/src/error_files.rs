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

use oibus_north::{cache::ErrorFileFilter, North};
use oibus_runtime::{Config, Engine};

use crate::cli::{Errors, ErrorsCommand, Selection, Target};

async fn engine(target: &Target) -> anyhow::Result<Engine> {
    let config = Config::from_file(&target.config).await?;
    Ok(Engine::new(config).await?)
}

impl Target {
    pub(crate) async fn test(&self) -> anyhow::Result<()> {
        let engine = engine(self).await?;
        let north = engine
            .north(&self.north)
            .ok_or_else(|| oibus_runtime::Error::UnknownNorth(self.north.clone()))?;
        north.test_connection().await?;
        println!("{}: connection ok", north.alias());
        Ok(())
    }
}

async fn select(north: &North, selection: &Selection, retry: bool) -> anyhow::Result<usize> {
    let count = match (selection.all, retry) {
        (true, true) => north.retry_all_error_files().await?,
        (true, false) => north.remove_all_error_files().await?,
        (false, true) => north.retry_error_files(&selection.files).await?,
        (false, false) => north.remove_error_files(&selection.files).await?,
    };
    Ok(count)
}

impl Errors {
    pub(crate) async fn run(&self) -> anyhow::Result<()> {
        let mut engine = engine(&self.target).await?;
        let cache_folder = engine.cache_folder().to_path_buf();
        let north = engine.north_mut(&self.target.north)?;
        north.open_caches(&cache_folder).await?;
        match &self.command {
            ErrorsCommand::List { name, from, to } => {
                let filter = ErrorFileFilter {
                    from: *from,
                    to: *to,
                    name_contains: name.clone(),
                };
                for f in north.error_files(&filter).await? {
                    println!(
                        "{}\t{}\t{}",
                        oibus_common::time::iso(&f.modification_date),
                        f.size,
                        f.filename
                    );
                }
            }
            ErrorsCommand::Retry(selection) => {
                let n = select(north, selection, true).await?;
                println!("{n} files enqueued for delivery");
            }
            ErrorsCommand::Remove(selection) => {
                let n = select(north, selection, false).await?;
                println!("{n} files removed");
            }
        }
        Ok(())
    }
}
