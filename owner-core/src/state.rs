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

//! The external state-store contract: the reactor state object the driver
//! hands to [`crate::reactor::owner::OwnerReactor::tick`], and the `Patch*`
//! mutator pattern the core uses to emit changes without owning persistence
//! itself.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::feed_state::ChangeFeedState as FeedState;
use crate::ids::{CaptureId, ChangeFeedId, TableId, Ts};

/// Read-only snapshot of a live capture, supplied by the driver each tick. The core never
/// mutates these; `OwnerReactor` only ever replaces its whole copy of the map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureInfo {
    pub id: CaptureId,
    pub advertise_addr: String,
    pub version: String,
}

/// Kinds of admin job the FSM understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdminJobKind {
    Pause,
    Resume,
    Remove { force: bool },
    Finish,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminJob {
    pub changefeed_id: ChangeFeedId,
    pub kind: AdminJobKind,
}

/// Persisted descriptor of a changefeed. `state` is owned by the FSM; the reactor patches it
/// back here after processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeFeedInfo {
    pub id: ChangeFeedId,
    pub state: FeedState,
    pub start_ts: Ts,
    pub target_ts: Option<Ts>,
    /// The table set the upstream schema currently wants replicated. Populated externally (by
    /// whatever tracks DDL) and read by the [`crate::reactor::changefeed::ChangefeedReactor`] as
    /// the schedule dispatcher's `current_tables` input each tick.
    pub tables: Vec<TableId>,
}

impl ChangeFeedInfo {
    pub fn new(id: ChangeFeedId, start_ts: Ts) -> Self {
        Self {
            id,
            state: FeedState::Normal,
            start_ts,
            target_ts: None,
            tables: Vec::new(),
        }
    }
}

/// Persisted progress of a changefeed, patched atomically once per tick when watermarks
/// advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeFeedStatus {
    pub checkpoint_ts: Ts,
    pub resolved_ts: Ts,
}

impl ChangeFeedStatus {
    pub fn new(start_ts: Ts) -> Self {
        Self {
            checkpoint_ts: start_ts,
            resolved_ts: start_ts,
        }
    }
}

/// Published, per-(changefeed, capture) view returned by status queries. A deep copy: mutating
/// it never affects the core's internal table-record store or capture-status table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskStatus {
    pub tables: Vec<TableId>,
    pub operation_in_flight: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskPosition {
    pub checkpoint_ts: Ts,
    pub resolved_ts: Ts,
}

/// A changefeed's full slice of the reactor state: its descriptor, progress, and the
/// published per-capture views. `Info = None` signals deletion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangefeedState {
    pub info: Option<ChangeFeedInfo>,
    pub status: Option<ChangeFeedStatus>,
    pub task_statuses: BTreeMap<CaptureId, TaskStatus>,
    pub task_positions: BTreeMap<CaptureId, TaskPosition>,
}

impl ChangefeedState {
    pub fn new(info: ChangeFeedInfo, status: ChangeFeedStatus) -> Self {
        Self {
            info: Some(info),
            status: Some(status),
            task_statuses: BTreeMap::new(),
            task_positions: BTreeMap::new(),
        }
    }

    /// `PatchInfo`/`PatchStatus`: apply `f` to the current value; a `None` result deletes it.
    pub fn patch_info(&mut self, f: impl FnOnce(Option<&ChangeFeedInfo>) -> Option<ChangeFeedInfo>) {
        self.info = f(self.info.as_ref());
    }

    pub fn patch_status(
        &mut self,
        f: impl FnOnce(Option<&ChangeFeedStatus>) -> Option<ChangeFeedStatus>,
    ) {
        self.status = f(self.status.as_ref());
    }

    pub fn clear_tasks(&mut self) {
        self.task_statuses.clear();
        self.task_positions.clear();
    }

    /// `GetCheckpointTs`: the watermark the GC coordinator reasons about.
    pub fn checkpoint_ts(&self) -> Ts {
        self.status.map(|s| s.checkpoint_ts).unwrap_or(0)
    }
}

/// The full cluster snapshot handed to [`crate::reactor::owner::OwnerReactor::tick`] each
/// invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReactorState {
    pub captures: BTreeMap<CaptureId, CaptureInfo>,
    pub changefeeds: BTreeMap<ChangeFeedId, ChangefeedState>,
}

impl ReactorState {
    pub fn new() -> Self {
        Self::default()
    }
}
