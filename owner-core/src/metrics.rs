// Copyright 2024 Owner Core Contributors
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

//! Observability surface: the `metrics` facade crate emits through. The
//! crate the reactor runs in owns which exporter (if any) is installed;
//! `owner-core` only records values against named instruments, calling
//! `metrics::histogram!`/`gauge!`/`counter!` straight from business logic
//! with no local registry wrapper.

use crate::ids::{ChangeFeedId, Ts};

pub const METRIC_OWNER_CAPTURE_COUNT: &str = "owner_capture_count";
pub const METRIC_OWNER_CHANGEFEED_COUNT: &str = "owner_changefeed_count";
pub const METRIC_OWNER_CHECKPOINT_TS: &str = "owner_changefeed_checkpoint_ts";
pub const METRIC_OWNER_RESOLVED_TS: &str = "owner_changefeed_resolved_ts";
pub const METRIC_OWNER_TICK_DURATION: &str = "owner_tick_duration_seconds";
pub const METRIC_OWNER_GC_SAFEPOINT: &str = "owner_gc_safepoint_ts";

pub fn record_cluster_sizes(capture_count: usize, changefeed_count: usize) {
    metrics::gauge!(METRIC_OWNER_CAPTURE_COUNT).set(capture_count as f64);
    metrics::gauge!(METRIC_OWNER_CHANGEFEED_COUNT).set(changefeed_count as f64);
}

pub fn record_watermarks(changefeed_id: &ChangeFeedId, checkpoint_ts: Ts, resolved_ts: Ts) {
    metrics::gauge!(METRIC_OWNER_CHECKPOINT_TS, "changefeed" => changefeed_id.to_string())
        .set(checkpoint_ts as f64);
    metrics::gauge!(METRIC_OWNER_RESOLVED_TS, "changefeed" => changefeed_id.to_string())
        .set(resolved_ts as f64);
}

pub fn record_gc_safepoint(safepoint: Ts) {
    metrics::gauge!(METRIC_OWNER_GC_SAFEPOINT).set(safepoint as f64);
}

/// RAII timer for a single owner-reactor tick; records the elapsed duration on drop.
pub struct TickTimer {
    start: std::time::Instant,
}

impl TickTimer {
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for TickTimer {
    fn drop(&mut self) {
        metrics::histogram!(METRIC_OWNER_TICK_DURATION).record(self.start.elapsed().as_secs_f64());
    }
}
