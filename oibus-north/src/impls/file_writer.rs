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

//! The `file-writer` north connector writes delivered data into a local folder.
//!
//! Every batch of values is written as a JSON array into `<prefix><timestamp>-<n><suffix>.json`.
//! Every file is copied as `<prefix><name><suffix>.<extension>`. A missing output folder is
//! considered transient: the delivery is retried until the folder shows up.
//!
//! ## Configuration
//!
//! ```yaml
//! norths:
//!   - id: backup
//!     name: Backup
//!     type: file-writer
//!     settings:
//!       output_folder: /var/lib/oibus/out
//!       prefix: "plant-a-"
//!       suffix: ""
//! ```

use std::{
    ffi::OsStr,
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
};

use serde::Deserialize;

use crate::prelude::*;

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    /// folder receiving the delivered data
    pub(crate) output_folder: PathBuf,
    /// prepended to every written file name
    #[serde(default)]
    pub(crate) prefix: String,
    /// appended to every written file name, before the extension
    #[serde(default)]
    pub(crate) suffix: String,
}

impl ConfigImpl for Config {}

/// builder for the file-writer connector
#[derive(Default, Debug)]
pub struct Builder {}

#[async_trait::async_trait]
impl NorthBuilder for Builder {
    fn north_type(&self) -> NorthType {
        "file-writer".into()
    }

    async fn build_cfg(
        &self,
        _alias: &alias::North,
        _config: &config::North,
        settings: &OwnedValue,
    ) -> anyhow::Result<Arc<dyn NorthConnector>> {
        let config = Config::new(settings)?;
        Ok(Arc::new(FileWriter {
            config,
            batches: AtomicU64::new(0),
        }))
    }
}

struct FileWriter {
    config: Config,
    batches: AtomicU64,
}

impl FileWriter {
    fn values_path(&self) -> PathBuf {
        let n = self.batches.fetch_add(1, Ordering::AcqRel);
        self.config.output_folder.join(format!(
            "{}{}-{n}{}.json",
            self.config.prefix,
            time::millis(),
            self.config.suffix
        ))
    }

    fn file_path(&self, file: &CachedFile) -> PathBuf {
        let stem = file
            .path
            .file_stem()
            .and_then(OsStr::to_str)
            .unwrap_or_default();
        let name = match file::extension(&file.path) {
            Some(ext) => format!("{}{stem}{}.{ext}", self.config.prefix, self.config.suffix),
            None => format!("{}{stem}{}", self.config.prefix, self.config.suffix),
        };
        self.config.output_folder.join(name)
    }
}

#[async_trait::async_trait]
impl NorthConnector for FileWriter {
    fn handles_values(&self) -> bool {
        true
    }

    fn handles_files(&self) -> bool {
        true
    }

    async fn handle_values(&self, values: &[CachedValue], ctx: &NorthContext) -> anyhow::Result<()> {
        let path = self.values_path();
        let data = simd_json::serde::to_vec(values)?;
        tokio::fs::write(&path, data).await?;
        debug!("{ctx} {} values written to {}.", values.len(), path.display());
        Ok(())
    }

    async fn handle_file(&self, cached: &CachedFile, ctx: &NorthContext) -> anyhow::Result<()> {
        let target = self.file_path(cached);
        file::copy(&cached.path, &target).await?;
        debug!("{ctx} File {} copied to {}.", cached.path.display(), target.display());
        Ok(())
    }

    fn should_retry(&self, error: &anyhow::Error) -> bool {
        error
            .downcast_ref::<oibus_common::Error>()
            .is_some_and(oibus_common::Error::is_not_found)
            || error
                .downcast_ref::<std::io::Error>()
                .is_some_and(|e| e.kind() == std::io::ErrorKind::NotFound)
    }

    async fn test_connection(&self, ctx: &NorthContext) -> anyhow::Result<()> {
        let meta = file::stat(&self.config.output_folder).await?;
        if !meta.is_dir() {
            return Err(Error::InvalidConfiguration(
                ctx.alias().clone(),
                format!("{} is not a folder", self.config.output_folder.display()),
            )
            .into());
        }
        Ok(())
    }
}
