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

use oibus_common::{file, time};
use simd_json::OwnedValue;

use super::{Lane, Retrieval};
use crate::{
    cache::{self, CachedFile, Entry, FileCache},
    status::{self, StatusReporter},
    NorthConnector, NorthContext,
};

pub(crate) struct Files {
    pub(crate) cache: Arc<dyn FileCache>,
    pub(crate) connector: Arc<dyn NorthConnector>,
    pub(crate) status: StatusReporter,
    pub(crate) archive: bool,
}

#[async_trait::async_trait]
impl Lane for Files {
    type Item = Entry<CachedFile>;
    const KIND: &'static str = "files";

    fn size(_item: &Entry<CachedFile>) -> u64 {
        1
    }

    async fn retrieve(&self, ctx: &NorthContext) -> cache::Result<Retrieval<Entry<CachedFile>>> {
        let Some(entry) = self.cache.retrieve_file().await? else {
            return Ok(Retrieval::Empty);
        };
        match file::stat(&entry.item.path).await {
            Ok(_) => return Ok(Retrieval::Ready(entry)),
            Err(e) if !e.is_not_found() => return Err(e.into()),
            Err(_) => (),
        }
        // the cached copy vanished, drop its record so it does not block the queue
        self.cache.remove_file(&entry, false).await?;
        error!(
            "{ctx} File {} not found! The file has been removed from the cache.",
            entry.item.path.display()
        );
        Ok(Retrieval::Discarded)
    }

    async fn deliver(&self, item: &Entry<CachedFile>, ctx: &NorthContext) -> anyhow::Result<()> {
        debug!("{ctx} Handling file {}.", item.item.path.display());
        self.connector.handle_file(&item.item, ctx).await
    }

    fn should_retry(&self, error: &anyhow::Error) -> bool {
        self.connector.should_retry(error)
    }

    async fn delivered(
        &self,
        item: Entry<CachedFile>,
        sent: u64,
        _ctx: &NorthContext,
    ) -> cache::Result<()> {
        let removed = self.cache.remove_file(&item, self.archive).await;
        self.status.update(vec![
            (status::LAST_UPLOAD_AT, Some(OwnedValue::from(time::now_iso()))),
            (status::FILES_SENT, Some(OwnedValue::from(sent))),
            (
                status::LAST_UPLOADED_FILE,
                Some(OwnedValue::from(item.item.path.display().to_string())),
            ),
        ]);
        removed
    }

    async fn quarantine(&self, item: Entry<CachedFile>, _ctx: &NorthContext) -> cache::Result<()> {
        self.cache.manage_errored_file(&item).await
    }
}
