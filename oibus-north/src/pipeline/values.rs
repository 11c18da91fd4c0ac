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

use std::sync::Arc;

use oibus_common::time;
use simd_json::OwnedValue;

use super::{Lane, Retrieval};
use crate::{
    cache::{self, CachedValue, Key, ValueCache},
    status::{self, StatusReporter},
    NorthConnector, NorthContext,
};

/// a batch of values handed to the connector in one delivery
pub(crate) struct Batch {
    keys: Vec<Key>,
    values: Vec<CachedValue>,
}

pub(crate) struct Values {
    pub(crate) cache: Arc<dyn ValueCache>,
    pub(crate) connector: Arc<dyn NorthConnector>,
    pub(crate) status: StatusReporter,
    pub(crate) max_send_count: usize,
}

/// `point (data)` of the last value in `values`
fn last_value(values: &[CachedValue]) -> Option<OwnedValue> {
    values.last().map(|v| {
        let data = simd_json::serde::to_string(&v.data).unwrap_or_default();
        OwnedValue::from(format!("{} ({data})", v.point_id))
    })
}

#[async_trait::async_trait]
impl Lane for Values {
    type Item = Batch;
    const KIND: &'static str = "values";

    fn size(item: &Batch) -> u64 {
        item.values.len() as u64
    }

    async fn retrieve(&self, _ctx: &NorthContext) -> cache::Result<Retrieval<Batch>> {
        let entries = self.cache.retrieve_values(self.max_send_count).await?;
        if entries.is_empty() {
            return Ok(Retrieval::Empty);
        }
        let (keys, values) = entries.into_iter().map(|e| (e.key, e.item)).unzip();
        Ok(Retrieval::Ready(Batch { keys, values }))
    }

    async fn deliver(&self, item: &Batch, ctx: &NorthContext) -> anyhow::Result<()> {
        debug!("{ctx} Handling {} values.", item.values.len());
        self.connector.handle_values(&item.values, ctx).await
    }

    fn should_retry(&self, error: &anyhow::Error) -> bool {
        self.connector.should_retry(error)
    }

    async fn delivered(&self, item: Batch, sent: u64, _ctx: &NorthContext) -> cache::Result<()> {
        let removed = self.cache.remove_values(&item.keys).await;
        self.status.update(vec![
            (status::LAST_VALUES_AT, Some(OwnedValue::from(time::now_iso()))),
            (status::VALUES_SENT, Some(OwnedValue::from(sent))),
            (status::LAST_VALUE, last_value(&item.values)),
        ]);
        removed.map(|_| ())
    }

    async fn quarantine(&self, item: Batch, _ctx: &NorthContext) -> cache::Result<()> {
        self.cache.manage_errored_values(&item.keys).await.map(|_| ())
    }
}
