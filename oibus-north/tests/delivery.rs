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
    collections::VecDeque,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use oibus_common::{alias::South, file, time};
use oibus_north::{
    cache::ErrorFileFilter,
    config::{self, Caching},
    status::{self, StatusBoard, StatusReporter},
    CachedFile, CachedValue, North, NorthConnector, NorthContext, PointValue,
};
use simd_json::OwnedValue;
use tokio::{
    sync::Semaphore,
    time::{sleep, Instant},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
    Panic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Payload {
    Values(Vec<String>),
    File(String),
}

#[derive(Debug, Clone)]
struct Attempt {
    at: u128,
    payload: Payload,
}

/// connector answering from a script of outcomes and recording every attempt
struct Script {
    origin: Instant,
    handles_files: bool,
    retryable: bool,
    hold: Duration,
    gate: Option<Arc<Semaphore>>,
    outcomes: Mutex<VecDeque<Outcome>>,
    attempts: Mutex<Vec<Attempt>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    disconnects: AtomicUsize,
}

impl Script {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
            handles_files: true,
            retryable: false,
            hold: Duration::ZERO,
            gate: None,
            outcomes: Mutex::new(VecDeque::new()),
            attempts: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        }
    }

    fn outcomes(self, outcomes: &[Outcome]) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.iter().copied().collect()),
            ..self
        }
    }

    fn retryable(self) -> Self {
        Self {
            retryable: true,
            ..self
        }
    }

    fn values_only(self) -> Self {
        Self {
            handles_files: false,
            ..self
        }
    }

    fn hold(self, hold: Duration) -> Self {
        Self { hold, ..self }
    }

    /// every attempt waits for a permit of `gate`
    fn gated(self, gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..self
        }
    }

    fn attempts(&self) -> Vec<Attempt> {
        self.attempts.lock().map(|a| a.clone()).unwrap_or_default()
    }

    /// `(millis since origin, number of values)` of every value attempt
    fn value_attempts(&self) -> Vec<(u128, usize)> {
        self.attempts()
            .into_iter()
            .filter_map(|a| match a.payload {
                Payload::Values(points) => Some((a.at, points.len())),
                Payload::File(_) => None,
            })
            .collect()
    }

    /// millis since origin of every file attempt
    fn file_attempts(&self) -> Vec<u128> {
        self.attempts()
            .into_iter()
            .filter_map(|a| match a.payload {
                Payload::File(_) => Some(a.at),
                Payload::Values(_) => None,
            })
            .collect()
    }

    async fn attempt(&self, payload: Payload) -> anyhow::Result<()> {
        let running = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_in_flight.fetch_max(running, Ordering::AcqRel);
        if let Ok(mut attempts) = self.attempts.lock() {
            attempts.push(Attempt {
                at: self.origin.elapsed().as_millis(),
                payload,
            });
        }
        sleep(self.hold).await;
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        let outcome = self
            .outcomes
            .lock()
            .ok()
            .and_then(|mut o| o.pop_front())
            .unwrap_or(Outcome::Success);
        match outcome {
            Outcome::Success => Ok(()),
            Outcome::Failure => Err(anyhow::anyhow!("remote unavailable")),
            Outcome::Panic => panic!("connector bug"),
        }
    }
}

#[async_trait::async_trait]
impl NorthConnector for Script {
    fn handles_values(&self) -> bool {
        true
    }

    fn handles_files(&self) -> bool {
        self.handles_files
    }

    async fn disconnect(&self, _ctx: &NorthContext) -> anyhow::Result<()> {
        self.disconnects.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn handle_values(&self, values: &[CachedValue], _ctx: &NorthContext) -> anyhow::Result<()> {
        let points = values.iter().map(|v| v.point_id.clone()).collect();
        self.attempt(Payload::Values(points)).await
    }

    async fn handle_file(&self, file: &CachedFile, _ctx: &NorthContext) -> anyhow::Result<()> {
        self.attempt(Payload::File(file.file_name().to_string())).await
    }

    fn should_retry(&self, _error: &anyhow::Error) -> bool {
        self.retryable
    }
}

fn caching(send_interval_ms: u64, retry_interval_ms: u64, retry_count: u64) -> Caching {
    Caching {
        send_interval_ms,
        retry_interval_ms,
        retry_count,
        ..Caching::default()
    }
}

fn north_config(caching: Caching) -> config::North {
    config::North {
        id: "n1".to_string(),
        name: "scripted".to_string(),
        north_type: "scripted".into(),
        enabled: true,
        subscribed_to: vec!["s1".to_string()],
        caching,
        settings: None,
    }
}

async fn start(
    script: &Arc<Script>,
    caching: Caching,
    root: &Path,
) -> anyhow::Result<(North, StatusBoard)> {
    let config = north_config(caching);
    let (tx, rx) = status::channel();
    let board = StatusBoard::default();
    drop(board.spawn_collector(rx));
    let connector: Arc<dyn NorthConnector> = script.clone();
    let mut north = North::new(config.clone(), connector, StatusReporter::new(config.alias(), tx))?;
    north.start(root).await?;
    Ok((north, board))
}

fn values(points: &[&str]) -> Vec<PointValue> {
    points
        .iter()
        .map(|p| PointValue::new(*p, time::now(), OwnedValue::from(42_u64)))
        .collect()
}

fn s1() -> South {
    South::from("s1")
}

async fn source_file(dir: &Path, name: &str) -> anyhow::Result<PathBuf> {
    let path = dir.join(name);
    tokio::fs::write(&path, b"snot,badger\n").await?;
    Ok(path)
}

#[tokio::test(start_paused = true)]
async fn retry_then_quarantine_timeline() -> anyhow::Result<()> {
    let _ = env_logger::try_init();
    let root = tempfile::tempdir()?;
    let script = Arc::new(Script::new().outcomes(&[
        Outcome::Failure,
        Outcome::Failure,
        Outcome::Failure,
    ]));
    let (mut north, _) = start(&script, caching(1000, 5000, 2), root.path()).await?;

    north.cache_values(&s1(), values(&["p1"])).await;
    sleep(Duration::from_millis(11_500)).await;
    assert_eq!(vec![(1000, 1), (6000, 1), (11_000, 1)], script.value_attempts());
    assert_eq!(0, north.number_of_values()?);
    assert_eq!(1, north.number_of_errored_values()?);

    // the quarantined value is never attempted again, the idle timer fires at t=12000
    north.cache_values(&s1(), values(&["p2"])).await;
    sleep(Duration::from_millis(10_000)).await;
    assert_eq!(
        vec![(1000, 1), (6000, 1), (11_000, 1), (12_000, 1)],
        script.value_attempts()
    );
    assert!(north.is_cache_empty()?);
    north.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn retryable_errors_are_retried_beyond_the_ceiling() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let script = Arc::new(
        Script::new()
            .retryable()
            .outcomes(&[Outcome::Failure, Outcome::Failure, Outcome::Failure]),
    );
    let (mut north, _) = start(&script, caching(1000, 5000, 0), root.path()).await?;

    north.cache_values(&s1(), values(&["p1"])).await;
    sleep(Duration::from_millis(20_000)).await;
    assert_eq!(
        vec![(1000, 1), (6000, 1), (11_000, 1), (16_000, 1)],
        script.value_attempts()
    );
    assert_eq!(0, north.number_of_errored_values()?);
    assert!(north.is_cache_empty()?);
    north.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn flush_on_threshold() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let script = Arc::new(Script::new());
    let caching = Caching {
        group_count: 10,
        ..caching(1000, 5000, 2)
    };
    let (mut north, _) = start(&script, caching, root.path()).await?;

    sleep(Duration::from_millis(100)).await;
    let points: Vec<String> = (0..10).map(|i| format!("p{i}")).collect();
    let points: Vec<&str> = points.iter().map(String::as_str).collect();
    north.cache_values(&s1(), values(&points)).await;
    sleep(Duration::from_millis(100)).await;
    assert_eq!(vec![(100, 10)], script.value_attempts());

    // below the threshold the idle interval applies again
    north.cache_values(&s1(), values(&["a", "b", "c"])).await;
    sleep(Duration::from_millis(1500)).await;
    assert_eq!(vec![(100, 10), (1100, 3)], script.value_attempts());
    north.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn threshold_reached_while_sending_is_not_lost() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let gate = Arc::new(Semaphore::new(0));
    let script = Arc::new(Script::new().gated(gate.clone()));
    let caching = Caching {
        group_count: 1,
        ..caching(10_000, 5000, 2)
    };
    let (mut north, _) = start(&script, caching, root.path()).await?;

    north.cache_values(&s1(), values(&["p1"])).await;
    sleep(Duration::from_millis(100)).await;
    assert_eq!(vec![(0, 1)], script.value_attempts());

    // the threshold is reached again right before the delivery in flight completes
    north.cache_values(&s1(), values(&["p2"])).await;
    gate.add_permits(2);
    sleep(Duration::from_millis(1000)).await;

    assert_eq!(vec![(0, 1), (100, 1)], script.value_attempts());
    assert!(north.is_cache_empty()?);
    north.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn ticks_during_a_delivery_are_coalesced() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let script = Arc::new(Script::new().hold(Duration::from_millis(3000)));
    let caching = Caching {
        group_count: 1,
        ..caching(10_000, 5000, 2)
    };
    let (mut north, _) = start(&script, caching, root.path()).await?;

    north.cache_values(&s1(), values(&["p1"])).await;
    sleep(Duration::from_millis(500)).await;
    north.cache_values(&s1(), values(&["p2"])).await;
    sleep(Duration::from_millis(500)).await;
    north.cache_values(&s1(), values(&["p3"])).await;
    sleep(Duration::from_millis(10_000)).await;

    // one follow-up right after the first delivery, carrying what arrived meanwhile
    assert_eq!(vec![(0, 1), (3000, 2)], script.value_attempts());
    assert_eq!(1, script.max_in_flight.load(Ordering::Acquire));
    let delivered: Vec<Payload> = script.attempts().into_iter().map(|a| a.payload).collect();
    assert_eq!(
        vec![
            Payload::Values(vec!["p1".to_string()]),
            Payload::Values(vec!["p2".to_string(), "p3".to_string()])
        ],
        delivered
    );
    assert!(north.is_cache_empty()?);
    north.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn batches_are_bounded_and_ordered() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let script = Arc::new(Script::new());
    let caching = Caching {
        max_send_count: 2,
        ..caching(1000, 5000, 2)
    };
    let (mut north, board) = start(&script, caching, root.path()).await?;

    north.cache_values(&s1(), values(&["p1", "p2", "p3"])).await;
    sleep(Duration::from_millis(2500)).await;
    let delivered: Vec<Payload> = script.attempts().into_iter().map(|a| a.payload).collect();
    assert_eq!(
        vec![
            Payload::Values(vec!["p1".to_string(), "p2".to_string()]),
            Payload::Values(vec!["p3".to_string()])
        ],
        delivered
    );
    let status = board.get("n1");
    assert_eq!(Some(&OwnedValue::from(3_u64)), status.get(status::VALUES_SENT));
    assert_eq!(
        Some(&OwnedValue::from("p3 (42)")),
        status.get(status::LAST_VALUE)
    );
    assert!(status.contains_key(status::LAST_VALUES_AT));
    north.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unsubscribed_and_empty_input_is_ignored() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let script = Arc::new(Script::new());
    let (mut north, _) = start(&script, caching(1000, 5000, 2), root.path()).await?;

    north.cache_values(&South::from("s2"), values(&["p1"])).await;
    north.cache_values(&s1(), Vec::new()).await;
    let source = source_file(root.path(), "snot.csv").await?;
    north.cache_file(&South::from("s2"), &source).await?;
    assert!(north.is_cache_empty()?);
    sleep(Duration::from_millis(5000)).await;
    assert!(script.attempts().is_empty());
    north.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stale_files_are_dropped_without_delivery() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let script = Arc::new(Script::new());
    let (mut north, _) = start(&script, caching(1000, 5000, 2), root.path()).await?;

    let source = source_file(root.path(), "snot.csv").await?;
    north.cache_file(&s1(), &source).await?;
    assert!(!north.is_cache_empty()?);
    let files = root.path().join("north-n1").join("files");
    for cached in file::list_files(&files).await? {
        file::remove(&cached).await?;
    }

    sleep(Duration::from_millis(1500)).await;
    assert!(script.file_attempts().is_empty());
    assert!(north.is_cache_empty()?);
    assert_eq!(0, north.number_of_errored_values()?);
    assert!(north.error_files(&ErrorFileFilter::default()).await?.is_empty());
    north.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failing_files_are_quarantined_and_can_be_retried() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let script = Arc::new(Script::new().outcomes(&[Outcome::Failure, Outcome::Failure]));
    let (mut north, board) = start(&script, caching(1000, 1000, 1), root.path()).await?;

    let source = source_file(root.path(), "snot.csv").await?;
    north.cache_file(&s1(), &source).await?;
    // the source belongs to the caller
    assert!(file::exists(&source).await);
    sleep(Duration::from_millis(2500)).await;
    assert_eq!(vec![1000, 2000], script.file_attempts());
    assert!(north.is_cache_empty()?);

    let errors = north.error_files(&ErrorFileFilter::default()).await?;
    assert_eq!(1, errors.len());
    assert!(errors[0].filename.starts_with("snot-"));
    assert_eq!(12, errors[0].size);

    assert_eq!(1, north.retry_error_files(&[errors[0].filename.clone()]).await?);
    sleep(Duration::from_millis(1000)).await;
    assert_eq!(vec![1000, 2000, 3000], script.file_attempts());
    assert!(north.is_cache_empty()?);
    assert!(north.error_files(&ErrorFileFilter::default()).await?.is_empty());
    let status = board.get("n1");
    assert_eq!(Some(&OwnedValue::from(1_u64)), status.get(status::FILES_SENT));
    north.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn delivered_files_are_archived() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let script = Arc::new(Script::new());
    let caching = Caching {
        archive: config::Archive {
            enabled: true,
            retention_duration_h: 0,
        },
        ..caching(1000, 5000, 2)
    };
    let (mut north, _) = start(&script, caching, root.path()).await?;

    let source = source_file(root.path(), "snot.csv").await?;
    north.cache_file(&s1(), &source).await?;
    sleep(Duration::from_millis(1500)).await;
    assert_eq!(vec![1000], script.file_attempts());
    let archived = file::list_files(&root.path().join("north-n1").join("archive")).await?;
    assert_eq!(1, archived.len());
    assert!(file::list_files(&root.path().join("north-n1").join("files"))
        .await?
        .is_empty());
    north.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn pipelines_are_independent() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let script = Arc::new(Script::new().hold(Duration::from_millis(10_000)));
    let (mut north, _) = start(&script, caching(1000, 5000, 2), root.path()).await?;

    north.cache_values(&s1(), values(&["p1"])).await;
    let source = source_file(root.path(), "snot.csv").await?;
    north.cache_file(&s1(), &source).await?;
    sleep(Duration::from_millis(1500)).await;
    // the file goes out while the value delivery is still in flight
    assert_eq!(vec![(1000, 1)], script.value_attempts());
    assert_eq!(vec![1000], script.file_attempts());
    assert_eq!(2, script.max_in_flight.load(Ordering::Acquire));
    north.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn without_send_interval_nothing_is_sent() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let script = Arc::new(Script::new());
    let caching = Caching {
        group_count: 1,
        ..caching(0, 5000, 2)
    };
    let (mut north, _) = start(&script, caching, root.path()).await?;

    north.cache_values(&s1(), values(&["p1", "p2"])).await;
    sleep(Duration::from_secs(3600)).await;
    assert!(script.attempts().is_empty());
    assert_eq!(2, north.number_of_values()?);
    assert!(!north.is_cache_empty()?);
    north.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn a_panicking_delivery_is_a_failure() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let script = Arc::new(Script::new().values_only().outcomes(&[Outcome::Panic]));
    let (mut north, _) = start(&script, caching(1000, 2000, 2), root.path()).await?;

    north.cache_values(&s1(), values(&["p1"])).await;
    sleep(Duration::from_millis(3500)).await;
    assert_eq!(vec![(1000, 1), (3000, 1)], script.value_attempts());
    assert!(north.is_cache_empty()?);
    north.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_timers_and_is_idempotent() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let script = Arc::new(Script::new());
    let (mut north, board) = start(&script, caching(1000, 5000, 2), root.path()).await?;
    assert!(north.is_running());

    north.cache_values(&s1(), values(&["p1"])).await;
    north.stop().await;
    north.stop().await;
    assert!(!north.is_running());
    assert_eq!(1, script.disconnects.load(Ordering::Acquire));
    sleep(Duration::from_millis(5000)).await;
    assert!(script.attempts().is_empty());
    assert_eq!(
        Some(&OwnedValue::from(status::NOT_CONNECTED)),
        board.get("n1").get(status::CONNECTED_AT)
    );

    // the cached value survives and goes out after a restart
    north.start(root.path()).await?;
    sleep(Duration::from_millis(1500)).await;
    assert_eq!(vec![(6000, 1)], script.value_attempts());
    assert!(north.is_cache_empty()?);
    north.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn an_in_flight_delivery_completes_after_stop() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let script = Arc::new(Script::new().hold(Duration::from_millis(3000)));
    let caching = Caching {
        group_count: 1,
        ..caching(1000, 5000, 2)
    };
    let (mut north, _) = start(&script, caching, root.path()).await?;

    north.cache_values(&s1(), values(&["p1"])).await;
    sleep(Duration::from_millis(1000)).await;
    north.stop().await;
    sleep(Duration::from_millis(10_000)).await;
    assert_eq!(vec![(0, 1)], script.value_attempts());
    // the outcome was still applied to the cache
    assert_eq!(0, north.number_of_values()?);
    Ok(())
}
