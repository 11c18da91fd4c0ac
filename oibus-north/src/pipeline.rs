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

//! Delivery pipelines
//!
//! A pipeline is a task owning the delivery state of one kind of data. It is driven by messages:
//! timer ticks, flush requests and the outcome of the delivery it spawned. At most one
//! delivery is in flight per pipeline. A tick arriving while a delivery is in flight is
//! remembered, and the next attempt starts right after the current one completes.

pub(crate) mod files;
pub(crate) mod values;

use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};

use anyhow::anyhow;
use futures::FutureExt;
use tokio::{
    sync::{
        mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
        oneshot,
    },
    task::{self, JoinHandle},
};

use oibus_common::alias;

use crate::{cache, config, Error, NorthContext};

/// outcome of looking into the cache
pub(crate) enum Retrieval<T> {
    /// nothing to deliver
    Empty,
    /// something was found but can't be delivered, the cache healed itself
    Discarded,
    /// deliver this
    Ready(T),
}

/// the part of a pipeline that knows about one kind of data
#[async_trait::async_trait]
pub(crate) trait Lane: Send + Sync + 'static {
    /// what a single delivery hands to the connector
    type Item: Send + Sync + 'static;

    /// human readable kind of data, used in logs
    const KIND: &'static str;

    /// number of delivered elements in `item`
    fn size(item: &Self::Item) -> u64;

    /// look for the next thing to deliver
    async fn retrieve(&self, ctx: &NorthContext) -> cache::Result<Retrieval<Self::Item>>;

    /// hand `item` to the connector
    async fn deliver(&self, item: &Self::Item, ctx: &NorthContext) -> anyhow::Result<()>;

    /// should a delivery failing with `error` be retried beyond the ceiling
    fn should_retry(&self, error: &anyhow::Error) -> bool;

    /// `item` was delivered, `sent` elements were delivered since start
    async fn delivered(
        &self,
        item: Self::Item,
        sent: u64,
        ctx: &NorthContext,
    ) -> cache::Result<()>;

    /// `item` failed too often
    async fn quarantine(&self, item: Self::Item, ctx: &NorthContext) -> cache::Result<()>;
}

pub(crate) enum Msg<T> {
    /// a timer fired, carries the generation of the timer
    Tick(u64),
    /// attempt now, or right after the delivery in flight
    Flush,
    /// a delivery completed
    Delivered(T, anyhow::Result<()>),
    /// stop the pipeline
    Stop(oneshot::Sender<()>),
}

/// timing snapshot taken when the pipeline starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Timing {
    pub(crate) send_interval: Duration,
    pub(crate) retry_interval: Duration,
    pub(crate) retry_count: u64,
}

impl From<&config::Caching> for Timing {
    fn from(caching: &config::Caching) -> Self {
        Self {
            send_interval: caching.send_interval(),
            retry_interval: caching.retry_interval(),
            retry_count: caching.retry_count,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct DeliveryState {
    /// a delivery is in flight
    pub(crate) in_progress: bool,
    /// consecutive failures of the item at the head of the queue
    pub(crate) retry_count: u64,
    /// a tick arrived while a delivery was in flight
    pub(crate) resend_immediately: bool,
    /// elements delivered since start
    pub(crate) sent: u64,
}

/// delay until the next attempt, once a delivery completed
pub(crate) fn next_delay(state: &DeliveryState, timing: &Timing) -> Duration {
    if state.resend_immediately {
        Duration::ZERO
    } else if state.retry_count > 0 {
        timing.retry_interval
    } else {
        timing.send_interval
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OnFailure {
    Retry,
    Quarantine,
}

/// what to do with an item whose delivery failed after `retry_count` retries.
/// `retryable` is only consulted once the ceiling is reached.
pub(crate) fn on_failure<F>(retry_count: u64, ceiling: u64, retryable: F) -> OnFailure
where
    F: FnOnce() -> bool,
{
    if retry_count < ceiling || retryable() {
        OnFailure::Retry
    } else {
        OnFailure::Quarantine
    }
}

/// address of a running pipeline
pub(crate) struct Addr<T> {
    kind: &'static str,
    alias: alias::North,
    tx: UnboundedSender<Msg<T>>,
}

impl<T> Addr<T> {
    /// request an attempt without waiting for the armed timer
    pub(crate) fn flush(&self, ctx: &NorthContext) {
        if self.tx.send(Msg::Flush).is_err() {
            error!("{ctx} {} pipeline is gone.", self.kind);
        }
    }

    /// stop the pipeline, returns once the timer is cancelled
    pub(crate) async fn stop(&self) -> Result<(), Error> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Msg::Stop(tx)).is_err() || rx.await.is_err() {
            return Err(Error::PipelineClosed(self.alias.clone(), self.kind));
        }
        Ok(())
    }
}

struct Pipeline<L: Lane> {
    lane: Arc<L>,
    ctx: NorthContext,
    timing: Timing,
    state: DeliveryState,
    tx: UnboundedSender<Msg<L::Item>>,
    rx: UnboundedReceiver<Msg<L::Item>>,
    timer: Option<JoinHandle<()>>,
    generation: u64,
    stopped: bool,
}

/// starts a pipeline whose first attempt happens after the send interval
pub(crate) fn spawn<L: Lane>(lane: L, ctx: NorthContext, timing: Timing) -> Addr<L::Item> {
    let (tx, rx) = unbounded_channel();
    let addr = Addr {
        kind: L::KIND,
        alias: ctx.alias().clone(),
        tx: tx.clone(),
    };
    let mut pipeline = Pipeline {
        lane: Arc::new(lane),
        ctx,
        timing,
        state: DeliveryState::default(),
        tx,
        rx,
        timer: None,
        generation: 0,
        stopped: false,
    };
    pipeline.schedule(timing.send_interval);
    task::spawn(pipeline.run());
    addr
}

impl<L: Lane> Pipeline<L> {
    async fn run(mut self) {
        let ctx = self.ctx.clone();
        debug!("{ctx} {} pipeline started.", L::KIND);
        while let Some(msg) = self.rx.recv().await {
            match msg {
                Msg::Tick(generation) if generation == self.generation && !self.stopped => {
                    self.timer = None;
                    self.on_tick().await;
                }
                Msg::Tick(_) => trace!("{ctx} Ignoring outdated {} timer.", L::KIND),
                Msg::Flush if self.stopped => (),
                Msg::Flush if self.state.in_progress => {
                    trace!("{ctx} Already sending {}, will resend immediately.", L::KIND);
                    self.state.resend_immediately = true;
                }
                Msg::Flush => self.schedule(Duration::ZERO),
                Msg::Delivered(item, result) => {
                    self.on_delivered(item, result).await;
                    if self.stopped {
                        break;
                    }
                }
                Msg::Stop(reply) => {
                    self.cancel_timer();
                    self.stopped = true;
                    self.state.retry_count = 0;
                    self.state.resend_immediately = false;
                    if reply.send(()).is_err() {
                        trace!("{ctx} Nobody waits for the {} pipeline to stop.", L::KIND);
                    }
                    if !self.state.in_progress {
                        break;
                    }
                }
            }
        }
        debug!("{ctx} {} pipeline stopped.", L::KIND);
    }

    async fn on_tick(&mut self) {
        let ctx = &self.ctx;
        if self.state.in_progress {
            trace!("{ctx} Already sending {}, will resend immediately.", L::KIND);
            self.state.resend_immediately = true;
            return;
        }
        match self.lane.retrieve(ctx).await {
            Ok(Retrieval::Ready(item)) => {
                self.state.in_progress = true;
                self.state.resend_immediately = false;
                self.dispatch(item);
            }
            Ok(Retrieval::Empty) => {
                trace!("{ctx} No {} to send in the cache.", L::KIND);
                self.schedule(self.timing.send_interval);
            }
            Ok(Retrieval::Discarded) => self.schedule(self.timing.send_interval),
            Err(e) => {
                error!("{ctx} Error while reading {} from the cache: {e}", L::KIND);
                self.schedule(self.timing.retry_interval);
            }
        }
    }

    /// runs the delivery in its own task so ticks keep being handled meanwhile
    fn dispatch(&self, item: L::Item) {
        let lane = self.lane.clone();
        let ctx = self.ctx.clone();
        let tx = self.tx.clone();
        task::spawn(async move {
            let result = AssertUnwindSafe(lane.deliver(&item, &ctx))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(anyhow!("{} delivery panicked", L::KIND)));
            if tx.send(Msg::Delivered(item, result)).is_err() {
                error!("{ctx} {} pipeline is gone.", L::KIND);
            }
        });
    }

    async fn on_delivered(&mut self, item: L::Item, result: anyhow::Result<()>) {
        let ctx = &self.ctx;
        match result {
            Ok(()) => {
                self.state.sent += L::size(&item);
                if let Err(e) = self.lane.delivered(item, self.state.sent, ctx).await {
                    error!("{ctx} Error while removing sent {} from the cache: {e}", L::KIND);
                }
                self.state.retry_count = 0;
            }
            Err(e) => {
                error!("{ctx} Error while sending {}: {e}", L::KIND);
                let lane = &self.lane;
                match on_failure(self.state.retry_count, self.timing.retry_count, || {
                    lane.should_retry(&e)
                }) {
                    OnFailure::Retry => {
                        self.state.retry_count += 1;
                        debug!(
                            "{ctx} Retrying {} in {} ms. Retry count: {}",
                            L::KIND,
                            self.timing.retry_interval.as_millis(),
                            self.state.retry_count
                        );
                    }
                    OnFailure::Quarantine => {
                        warn!(
                            "{ctx} Too many retries ({}). Moving {} to the error cache.",
                            self.state.retry_count,
                            L::KIND
                        );
                        if let Err(e) = self.lane.quarantine(item, ctx).await {
                            error!("{ctx} Error while moving {} to the error cache: {e}", L::KIND);
                        }
                        self.state.retry_count = 0;
                    }
                }
            }
        }
        self.state.in_progress = false;
        if !self.stopped {
            self.schedule(next_delay(&self.state, &self.timing));
        }
    }

    /// replace the armed timer by one firing after `delay`
    fn schedule(&mut self, delay: Duration) {
        self.cancel_timer();
        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;
        let tx = self.tx.clone();
        self.timer = Some(task::spawn(async move {
            tokio::time::sleep(delay).await;
            // the pipeline may be gone already
            let _ = tx.send(Msg::Tick(generation));
        }));
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
