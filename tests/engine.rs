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

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use oibus_common::{alias::South, file, time};
use oibus_runtime::{north::status, north::PointValue, Config, Engine};
use pretty_assertions::assert_eq;
use simd_json::OwnedValue;
use tempfile::TempDir;

struct Folders {
    root: TempDir,
}

impl Folders {
    fn new() -> std::io::Result<Self> {
        Ok(Self {
            root: tempfile::tempdir()?,
        })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    async fn create(&self, name: &str) -> anyhow::Result<PathBuf> {
        let path = self.path(name);
        file::create_dir(&path).await?;
        Ok(path)
    }
}

fn config(folders: &Folders, send_interval_ms: u64) -> anyhow::Result<Config> {
    let yaml = format!(
        r"
engine:
  name: test
  cache_folder: {cache}
norths:
  - id: only-s1
    name: only s1
    type: file-writer
    subscribed_to: [s1]
    caching:
      send_interval_ms: {send_interval_ms}
    settings:
      output_folder: {out1}
  - id: all
    name: all sources
    type: file-writer
    caching:
      send_interval_ms: {send_interval_ms}
    settings:
      output_folder: {out2}
  - id: off
    name: disabled
    type: console
    enabled: false
  - id: bad
    name: unknown type
    type: snot
",
        cache = folders.path("cache").display(),
        out1 = folders.path("out1").display(),
        out2 = folders.path("out2").display(),
    );
    Ok(yaml.parse()?)
}

fn values(n: usize) -> Vec<PointValue> {
    (0..n)
        .map(|i| PointValue::new(format!("p{i}"), time::now(), OwnedValue::from(i as u64)))
        .collect()
}

async fn files_in(dir: &Path) -> anyhow::Result<usize> {
    Ok(file::list_files(dir).await?.len())
}

/// polls `check` until it holds or a few seconds passed
async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

async fn started(folders: &Folders, send_interval_ms: u64) -> anyhow::Result<Engine> {
    folders.create("out1").await?;
    folders.create("out2").await?;
    let mut engine = Engine::new(config(folders, send_interval_ms)?).await?;
    engine.start().await?;
    Ok(engine)
}

#[tokio::test]
async fn builds_enabled_known_norths() -> anyhow::Result<()> {
    let _ = env_logger::try_init();
    let folders = Folders::new()?;
    let engine = Engine::new(config(&folders, 100)?).await?;
    let ids: Vec<_> = engine.norths().iter().map(|n| n.alias().id()).collect();
    assert_eq!(vec!["only-s1", "all"], ids);
    assert!(engine.north("off").is_none());
    assert!(engine.north("bad").is_none());
    // nothing opened yet
    assert!(engine.is_cache_empty()?);
    Ok(())
}

#[tokio::test]
async fn values_follow_subscriptions() -> anyhow::Result<()> {
    let _ = env_logger::try_init();
    let folders = Folders::new()?;
    let mut engine = started(&folders, 100).await?;

    engine.add_values(&South::from("s2"), values(3)).await;
    assert_eq!(0, engine.north("only-s1").map_or(0, |n| n.number_of_values().unwrap_or(0)));

    let out2 = folders.path("out2");
    let (out2, engine_ref) = (out2.as_path(), &engine);
    assert!(eventually(|| async move { files_in(out2).await.unwrap_or(0) == 1 }).await);
    assert!(eventually(|| async move { engine_ref.is_cache_empty().unwrap_or(false) }).await);
    assert_eq!(0, files_in(&folders.path("out1")).await?);

    let board = engine.status();
    let three = OwnedValue::from(3_u64);
    let three = &three;
    assert!(
        eventually(|| async move { board.get("all").get(status::VALUES_SENT) == Some(three) })
            .await
    );

    engine.stop().await;
    Ok(())
}

#[tokio::test]
async fn files_are_removed_once_cached() -> anyhow::Result<()> {
    let _ = env_logger::try_init();
    let folders = Folders::new()?;
    let mut engine = started(&folders, 100).await?;
    let input = folders.create("input").await?;

    let consumed = input.join("consumed.csv");
    tokio::fs::write(&consumed, b"snot").await?;
    engine.add_file(&South::from("s1"), &consumed, false).await?;
    assert!(!file::exists(&consumed).await);

    let kept = input.join("kept.csv");
    tokio::fs::write(&kept, b"badger").await?;
    engine.add_file(&South::from("s1"), &kept, true).await?;
    assert!(file::exists(&kept).await);

    let (out1, out2) = (folders.path("out1"), folders.path("out2"));
    let (out1, out2, engine_ref) = (out1.as_path(), out2.as_path(), &engine);
    assert!(eventually(|| async move { files_in(out1).await.unwrap_or(0) == 2 }).await);
    assert!(eventually(|| async move { files_in(out2).await.unwrap_or(0) == 2 }).await);
    assert!(eventually(|| async move { engine_ref.is_cache_empty().unwrap_or(false) }).await);

    let mut contents = Vec::new();
    for path in file::list_files(out1).await? {
        contents.push(tokio::fs::read_to_string(path).await?);
    }
    contents.sort();
    assert_eq!(vec!["badger".to_string(), "snot".to_string()], contents);

    engine.stop().await;
    Ok(())
}

#[tokio::test]
async fn missing_files_are_not_cached() -> anyhow::Result<()> {
    let _ = env_logger::try_init();
    let folders = Folders::new()?;
    let mut engine = started(&folders, 100).await?;

    let missing = folders.path("missing.csv");
    engine.add_file(&South::from("s1"), &missing, false).await?;
    assert!(engine.is_cache_empty()?);

    engine.stop().await;
    Ok(())
}

#[tokio::test]
async fn inert_norths_keep_their_cache() -> anyhow::Result<()> {
    let _ = env_logger::try_init();
    let folders = Folders::new()?;
    let mut engine = started(&folders, 0).await?;

    engine.add_values(&South::from("s1"), values(2)).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!engine.is_cache_empty()?);
    assert_eq!(
        Some(2),
        engine.north("only-s1").and_then(|n| n.number_of_values().ok())
    );
    assert_eq!(0, files_in(&folders.path("out1")).await?);

    engine.stop().await;
    Ok(())
}

#[tokio::test]
async fn north_lookup() -> anyhow::Result<()> {
    let folders = Folders::new()?;
    let mut engine = Engine::new(config(&folders, 100)?).await?;
    assert!(engine.north_mut("all").is_ok());
    assert!(matches!(
        engine.north_mut("snot"),
        Err(oibus_runtime::Error::UnknownNorth(id)) if id == "snot"
    ));
    Ok(())
}
