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

//! The `console` north connector writes everything it delivers to standard output.
//!
//! It is meant for trying out a configuration: values are summarized per batch, or printed one
//! JSON document per line when `verbose` is set. Files are reported with their path and size.
//!
//! ## Configuration
//!
//! ```yaml
//! norths:
//!   - id: console
//!     name: Console
//!     type: console
//!     settings:
//!       verbose: true
//! ```

use std::fmt::Write as _;

use oibus_common::default_false;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;

use crate::prelude::*;

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    /// print every value instead of a summary
    #[serde(default = "default_false")]
    pub(crate) verbose: bool,
}

impl ConfigImpl for Config {}

/// builder for the console connector
#[derive(Default, Debug)]
pub struct Builder {}

#[async_trait::async_trait]
impl NorthBuilder for Builder {
    fn north_type(&self) -> NorthType {
        "console".into()
    }

    async fn build(
        &self,
        _alias: &alias::North,
        config: &config::North,
    ) -> anyhow::Result<Arc<dyn NorthConnector>> {
        let config = match &config.settings {
            Some(settings) => Config::new(settings)?,
            None => Config::default(),
        };
        Ok(Arc::new(Console { config }))
    }
}

struct Console {
    config: Config,
}

fn render_values(values: &[CachedValue], verbose: bool) -> anyhow::Result<String> {
    let mut out = String::new();
    if verbose {
        for value in values {
            out.push_str(&simd_json::serde::to_string(value)?);
            out.push('\n');
        }
    } else {
        writeln!(out, "{} values", values.len())?;
    }
    Ok(out)
}

async fn print(out: &str) -> anyhow::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(out.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}

#[async_trait::async_trait]
impl NorthConnector for Console {
    fn handles_values(&self) -> bool {
        true
    }

    fn handles_files(&self) -> bool {
        true
    }

    async fn handle_values(&self, values: &[CachedValue], _ctx: &NorthContext) -> anyhow::Result<()> {
        print(&render_values(values, self.config.verbose)?).await
    }

    async fn handle_file(&self, file: &CachedFile, _ctx: &NorthContext) -> anyhow::Result<()> {
        print(&format!("{} ({} bytes)\n", file.path.display(), file.size)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn render() -> anyhow::Result<()> {
        let values = vec![CachedValue {
            source_id: "s1".to_string(),
            point_id: "p1".to_string(),
            timestamp: Utc::now(),
            data: OwnedValue::from(42_u64),
        }];
        assert_eq!("1 values\n", render_values(&values, false)?);
        let verbose = render_values(&values, true)?;
        assert!(verbose.starts_with("{\"source_id\":\"s1\",\"point_id\":\"p1\""));
        assert!(verbose.ends_with("\"data\":42}\n"));
        Ok(())
    }

    #[tokio::test]
    async fn build_without_settings() -> anyhow::Result<()> {
        let config: config::North = serde_yaml::from_str("id: c\nname: console\ntype: console\n")?;
        let console = Builder::default().build(&config.alias(), &config).await?;
        assert!(console.handles_values());
        assert!(console.handles_files());
        Ok(())
    }

    #[tokio::test]
    async fn unknown_settings_are_rejected() -> anyhow::Result<()> {
        let config: config::North = serde_yaml::from_str(
            "id: c\nname: console\ntype: console\nsettings:\n  snot: badger\n",
        )?;
        assert!(Builder::default().build(&config.alias(), &config).await.is_err());
        Ok(())
    }
}
