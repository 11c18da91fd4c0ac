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

//! Status reporting
//!
//! North connectors publish key/value status fields through a [`StatusReporter`]. Publishing
//! never blocks delivery: updates are pushed onto an unbounded channel and merged into a
//! [`StatusBoard`] by a collector task. A field set to `None` is removed from the board.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, RwLock},
};

use oibus_common::alias;
use simd_json::OwnedValue;
use tokio::{
    sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    task::{self, JoinHandle},
};

/// number of values delivered since start
pub const VALUES_SENT: &str = "Number of values sent since OIBus has started";
/// last successful value delivery
pub const LAST_VALUES_AT: &str = "Last handled values at";
/// last value of the last delivered batch
pub const LAST_VALUE: &str = "Last added point id (value)";
/// number of files delivered since start
pub const FILES_SENT: &str = "Number of files sent since OIBus has started";
/// last successful file delivery
pub const LAST_UPLOAD_AT: &str = "Last upload at";
/// last delivered file
pub const LAST_UPLOADED_FILE: &str = "Last uploaded file";
/// connection state
pub const CONNECTED_AT: &str = "Connected at";
/// value of [`CONNECTED_AT`] while disconnected
pub const NOT_CONNECTED: &str = "Not connected";

/// status fields, `None` removes a field
pub type Fields = Vec<(&'static str, Option<OwnedValue>)>;

/// A batch of status fields published by a connector
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    /// publishing connector
    pub north: alias::North,
    /// updated fields
    pub fields: Fields,
}

/// sending half of the status channel
pub type StatusSender = UnboundedSender<StatusUpdate>;
/// receiving half of the status channel
pub type StatusReceiver = UnboundedReceiver<StatusUpdate>;

/// creates a status channel
#[must_use]
pub fn channel() -> (StatusSender, StatusReceiver) {
    unbounded_channel()
}

/// fire and forget status publisher of a single connector
#[derive(Debug, Clone)]
pub struct StatusReporter {
    alias: alias::North,
    tx: Option<StatusSender>,
}

impl StatusReporter {
    /// reporter publishing to `tx`
    #[must_use]
    pub fn new(alias: alias::North, tx: StatusSender) -> Self {
        Self {
            alias,
            tx: Some(tx),
        }
    }

    /// reporter dropping every update
    #[must_use]
    pub fn disabled(alias: alias::North) -> Self {
        Self { alias, tx: None }
    }

    /// publish `fields`
    pub fn update(&self, fields: Fields) {
        if let Some(tx) = &self.tx {
            let update = StatusUpdate {
                north: self.alias.clone(),
                fields,
            };
            if tx.send(update).is_err() {
                debug!("[North::{}] Status collector is gone.", self.alias);
            }
        }
    }
}

/// the merged status of all connectors, by connector id
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    inner: Arc<RwLock<HashMap<String, BTreeMap<String, OwnedValue>>>>,
}

impl StatusBoard {
    /// merge `update` into the board
    pub fn apply(&self, update: StatusUpdate) {
        let Ok(mut board) = self.inner.write() else {
            error!("Status board lock poisoned.");
            return;
        };
        let fields = board.entry(update.north.id().to_string()).or_default();
        for (key, value) in update.fields {
            match value {
                Some(value) => {
                    fields.insert(key.to_string(), value);
                }
                None => {
                    fields.remove(key);
                }
            }
        }
    }

    /// the current status of a connector
    #[must_use]
    pub fn get(&self, north_id: &str) -> BTreeMap<String, OwnedValue> {
        self.inner
            .read()
            .ok()
            .and_then(|board| board.get(north_id).cloned())
            .unwrap_or_default()
    }

    /// merges every update received on `rx` until all senders are gone
    #[must_use]
    pub fn spawn_collector(&self, mut rx: StatusReceiver) -> JoinHandle<()> {
        let board = self.clone();
        task::spawn(async move {
            while let Some(update) = rx.recv().await {
                trace!("[North::{}] Status update {:?}", update.north, update.fields);
                board.apply(update);
            }
        })
    }
}
