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

//! The Capture Status Table (CST): per-capture handshake state and last
//! reported watermarks, owned exclusively by a [`crate::dispatcher::ScheduleDispatcher`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::{CaptureId, Ts};

/// Handshake state of a tracked capture. A capture absent from the table is implicitly
/// uninitialized — nothing reads that state besides logging, so "no entry yet" plays that
/// role instead of a dedicated variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    /// `Announce` has been issued (or is pending redelivery); no sync reply received yet.
    SyncSent,
    /// The capture has replied with its table assignments via `OnAgentSyncTaskStatuses`.
    SyncFinished,
}

/// A capture's handshake state and last reported watermarks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureStatus {
    pub sync_status: SyncStatus,
    pub checkpoint_ts: Ts,
    pub resolved_ts: Ts,
}

impl CaptureStatus {
    fn new_sent() -> Self {
        Self {
            sync_status: SyncStatus::SyncSent,
            checkpoint_ts: 0,
            resolved_ts: 0,
        }
    }

    pub fn is_synced(&self) -> bool {
        self.sync_status == SyncStatus::SyncFinished
    }

    /// Watermarks are monotonic per capture: store the larger of (stored, reported).
    fn merge_checkpoint(&mut self, checkpoint_ts: Ts, resolved_ts: Ts) {
        self.checkpoint_ts = self.checkpoint_ts.max(checkpoint_ts);
        self.resolved_ts = self.resolved_ts.max(resolved_ts);
    }
}

/// In-memory index from `CaptureId` to [`CaptureStatus`].
#[derive(Debug, Default)]
pub struct CaptureStatusTable {
    captures: BTreeMap<CaptureId, CaptureStatus>,
}

impl CaptureStatusTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &CaptureId) -> Option<&CaptureStatus> {
        self.captures.get(id)
    }

    pub fn contains(&self, id: &CaptureId) -> bool {
        self.captures.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CaptureId, &CaptureStatus)> {
        self.captures.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.captures.is_empty()
    }

    pub fn insert_sent(&mut self, id: CaptureId) {
        self.captures.entry(id).or_insert_with(CaptureStatus::new_sent);
    }

    pub fn remove(&mut self, id: &CaptureId) -> Option<CaptureStatus> {
        self.captures.remove(id)
    }

    pub fn mark_finished(&mut self, id: &CaptureId) {
        if let Some(status) = self.captures.get_mut(id) {
            status.sync_status = SyncStatus::SyncFinished;
        }
    }

    /// `OnAgentCheckpoint`: ignored if the capture is absent or unsynced.
    pub fn report_checkpoint(&mut self, id: &CaptureId, checkpoint_ts: Ts, resolved_ts: Ts) -> bool {
        match self.captures.get_mut(id) {
            Some(status) if status.is_synced() => {
                status.merge_checkpoint(checkpoint_ts, resolved_ts);
                true
            }
            _ => false,
        }
    }

    /// `true` iff every tracked capture has completed its handshake.
    pub fn all_synced(&self) -> bool {
        self.captures.values().all(CaptureStatus::is_synced)
    }

    /// `min(globalBarrierTs, min over captures of field)`, or `globalBarrierTs` if empty.
    pub fn min_watermark(&self, barrier_ts: Ts, field: impl Fn(&CaptureStatus) -> Ts) -> Ts {
        self.captures
            .values()
            .map(&field)
            .fold(barrier_ts, Ts::min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_capture_checkpoint_is_ignored() {
        let mut cst = CaptureStatusTable::new();
        assert!(!cst.report_checkpoint(&CaptureId::from("c1"), 100, 100));
    }

    #[test]
    fn unsynced_capture_checkpoint_is_ignored() {
        let mut cst = CaptureStatusTable::new();
        cst.insert_sent(CaptureId::from("c1"));
        assert!(!cst.report_checkpoint(&CaptureId::from("c1"), 100, 100));
    }

    #[test]
    fn watermarks_never_regress() {
        let mut cst = CaptureStatusTable::new();
        let id = CaptureId::from("c1");
        cst.insert_sent(id.clone());
        cst.mark_finished(&id);
        assert!(cst.report_checkpoint(&id, 2000, 2000));
        assert!(cst.report_checkpoint(&id, 1000, 1000));
        let status = cst.get(&id).unwrap();
        assert_eq!(status.checkpoint_ts, 2000);
        assert_eq!(status.resolved_ts, 2000);
    }
}
