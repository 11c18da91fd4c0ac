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

//! Time helpers

use chrono::{DateTime, SecondsFormat, Utc};

/// The current instant
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// The current instant as an ISO-8601 string with millisecond precision
#[must_use]
pub fn now_iso() -> String {
    iso(&now())
}

/// Render an instant as an ISO-8601 string with millisecond precision
#[must_use]
pub fn iso(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Milliseconds since the unix epoch
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub fn millis() -> u64 {
    // timestamps before the epoch are clamped to 0
    now().timestamp_millis().max(0) as u64
}
