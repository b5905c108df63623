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

//! The Schedule Dispatcher: the per-changefeed table-assignment, rebalance,
//! and watermark-aggregation state machine. Owns a
//! [`TableRecordStore`] and a [`CaptureStatusTable`]; issues dispatches
//! through a [`Communicator`] and is driven entirely by [`ScheduleDispatcher::tick`]
//! plus the three agent callbacks.

use std::collections::{BTreeMap, VecDeque};

use crate::capture::CaptureStatusTable;
use crate::communicator::Communicator;
use crate::error::OwnerResult;
use crate::ids::{CaptureId, ChangeFeedId, TableId, Ts};
use crate::state::CaptureInfo;
use crate::table::{TableRecordStore, TableStatus};

/// The result of a tick: either the watermarks advanced, or the dispatcher is still
/// converging and has nothing new to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleProgress {
    Advanced { checkpoint_ts: Ts, resolved_ts: Ts },
    Blocked,
}

impl ScheduleProgress {
    pub fn is_blocked(self) -> bool {
        matches!(self, ScheduleProgress::Blocked)
    }
}

struct PendingMove {
    table_id: TableId,
    target: CaptureId,
}

pub struct ScheduleDispatcher<C> {
    changefeed_id: ChangeFeedId,
    trs: TableRecordStore,
    cst: CaptureStatusTable,
    communicator: C,
    pending_moves: VecDeque<PendingMove>,
    /// Target capture for a table whose remove-then-readd move is mid-flight: once the remove
    /// is acknowledged (the record vanishes from the TRS) the table re-enters the to-add set in
    /// phase 4, which consults this map instead of the load-balancing rule.
    pending_readds: BTreeMap<TableId, CaptureId>,
    rebalance_requested: bool,
}

impl<C: Communicator> ScheduleDispatcher<C> {
    pub fn new(changefeed_id: ChangeFeedId, communicator: C) -> Self {
        Self {
            changefeed_id,
            trs: TableRecordStore::new(),
            cst: CaptureStatusTable::new(),
            communicator,
            pending_moves: VecDeque::new(),
            pending_readds: BTreeMap::new(),
            rebalance_requested: false,
        }
    }

    pub fn move_table(&mut self, table_id: TableId, target: CaptureId) {
        self.pending_moves.push_back(PendingMove { table_id, target });
    }

    /// Latches a rebalance request; overlapping requests collapse into one.
    pub fn rebalance(&mut self) {
        self.rebalance_requested = true;
    }

    pub fn table_record_store(&self) -> &TableRecordStore {
        &self.trs
    }

    pub fn capture_status_table(&self) -> &CaptureStatusTable {
        &self.cst
    }

    pub fn tick(
        &mut self,
        global_barrier_ts: Ts,
        current_tables: &[TableId],
        captures: &BTreeMap<CaptureId, CaptureInfo>,
    ) -> OwnerResult<ScheduleProgress> {
        let span = tracing::info_span!("schedule_tick", changefeed = %self.changefeed_id);
        let _enter = span.enter();

        if !self.reconcile_captures(captures)? {
            return Ok(ScheduleProgress::Blocked);
        }

        if !self.cst.all_synced() {
            return Ok(ScheduleProgress::Blocked);
        }

        self.process_moves()?;
        let added_cleanly = self.reconcile_tables(current_tables)?;
        let rebalanced_cleanly = self.process_rebalance()?;

        if !added_cleanly || !rebalanced_cleanly || self.trs.has_pending() {
            return Ok(ScheduleProgress::Blocked);
        }

        Ok(self.aggregate_watermarks(global_barrier_ts))
    }

    /// Phase 1: add newly observed captures (Announce), drop departed ones and all of their
    /// table records regardless of status — an `AddingTable`/`RemovingTable` record pointing
    /// at a vanished capture is just as stranded as a `RunningTable` one. The dropped table
    /// ids fall out of the TRS entirely and are picked back up by phase 4's to-add computation
    /// next tick.
    ///
    /// Returns `false` if an `Announce` hit backpressure (tick must report `Blocked`).
    fn reconcile_captures(&mut self, captures: &BTreeMap<CaptureId, CaptureInfo>) -> OwnerResult<bool> {
        for id in captures.keys() {
            if !self.cst.contains(id) {
                self.cst.insert_sent(id.clone());
                let done = self.communicator.announce(&self.changefeed_id, id)?;
                if !done {
                    tracing::debug!(capture = %id, "announce backpressure, retrying next tick");
                    return Ok(false);
                }
            }
        }

        let departed: Vec<CaptureId> = self
            .cst
            .iter()
            .map(|(id, _)| id.clone())
            .filter(|id| !captures.contains_key(id))
            .collect();
        for id in departed {
            self.cst.remove(&id);
            let stale: Vec<TableId> = self.trs.tables_of(&id).map(|r| r.table_id).collect();
            for table_id in stale {
                self.trs.remove(table_id);
                tracing::info!(capture = %id, table = table_id, "capture departed, table re-queued");
            }
            self.pending_readds.retain(|_, target| *target != id);
            self.pending_moves.retain(|mv| mv.target != id);
        }

        Ok(true)
    }

    /// Phase 3: process queued manual moves. A move whose target already equals the current
    /// owner is a no-op. A move for a table with an in-flight dispatch is deferred until that
    /// dispatch's ack clears the table to `RunningTable` — only then is the remove issued.
    fn process_moves(&mut self) -> OwnerResult<()> {
        let pending = std::mem::take(&mut self.pending_moves);
        for mv in pending {
            let Some(record) = self.trs.get(mv.table_id) else {
                continue;
            };
            if record.capture_id == mv.target {
                continue;
            }
            if record.status != TableStatus::RunningTable {
                // In flight: keep the move queued and retry once it settles.
                self.pending_moves.push_back(mv);
                continue;
            }
            let owner = record.capture_id.clone();
            let done = self
                .communicator
                .dispatch_table(&self.changefeed_id, mv.table_id, &owner, true)?;
            if done {
                self.trs.set_status(mv.table_id, TableStatus::RemovingTable);
                self.pending_readds.insert(mv.table_id, mv.target);
            } else {
                self.pending_moves.push_back(mv);
            }
        }
        Ok(())
    }

    /// Phase 4: reconcile the table set against `current_tables`. Returns `false` if an add
    /// dispatch hit backpressure (remaining to-add tables are left for next tick).
    fn reconcile_tables(&mut self, current_tables: &[TableId]) -> OwnerResult<bool> {
        let wanted: std::collections::BTreeSet<TableId> = current_tables.iter().copied().collect();

        let to_remove: Vec<(TableId, CaptureId)> = self
            .trs
            .by_status(TableStatus::RunningTable)
            .filter(|r| !wanted.contains(&r.table_id))
            .map(|r| (r.table_id, r.capture_id.clone()))
            .collect();
        for (table_id, owner) in to_remove {
            let done = self
                .communicator
                .dispatch_table(&self.changefeed_id, table_id, &owner, true)?;
            if done {
                self.trs.set_status(table_id, TableStatus::RemovingTable);
            }
        }
        // A TRS record of any other status for a table no longer wanted is left as-is; it
        // converges once its current op acks and falls out of the table set on a later tick.

        let to_add: Vec<TableId> = current_tables
            .iter()
            .copied()
            .filter(|id| !self.trs.contains(*id))
            .collect();

        for table_id in to_add {
            let target = match self.pending_readds.get(&table_id).cloned() {
                Some(capture) if self.is_eligible_target(&capture) => {
                    self.pending_readds.remove(&table_id);
                    Some(capture)
                }
                Some(_) => {
                    // Target vanished or never synced before the readd landed; fall back to the
                    // ordinary load-balancing rule instead of stranding the table forever.
                    self.pending_readds.remove(&table_id);
                    self.pick_least_loaded_capture()
                }
                None => self.pick_least_loaded_capture(),
            };
            let Some(target) = target else {
                continue;
            };
            let done = self
                .communicator
                .dispatch_table(&self.changefeed_id, table_id, &target, false)?;
            if done {
                self.trs.insert(table_id, target, TableStatus::AddingTable);
            } else {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn is_eligible_target(&self, capture_id: &CaptureId) -> bool {
        self.cst.get(capture_id).is_some_and(|s| s.is_synced())
    }

    /// Load-balancing rule: fewest non-`RemovingTable` records, ties broken lexicographically.
    fn pick_least_loaded_capture(&self) -> Option<CaptureId> {
        self.cst
            .iter()
            .filter(|(_, status)| status.is_synced())
            .map(|(id, _)| (self.trs.load_of(id), id.clone()))
            .min_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
            .map(|(_, id)| id)
    }

    /// Phase 5: evict the excess from overloaded captures only while quiescent; the evicted
    /// tables simply fall off the TRS and re-enter the to-add set on the next tick. Stops
    /// issuing further eviction dispatches the instant one hits backpressure, same as the
    /// to-add loop in `reconcile_tables`.
    fn process_rebalance(&mut self) -> OwnerResult<bool> {
        if !self.rebalance_requested || self.trs.has_pending() {
            return Ok(true);
        }

        let synced_captures: Vec<CaptureId> = self
            .cst
            .iter()
            .filter(|(_, s)| s.is_synced())
            .map(|(id, _)| id.clone())
            .collect();
        if synced_captures.is_empty() {
            return Ok(true);
        }

        let running = self.trs.running_count_by_capture();
        let total: usize = running.values().sum();
        let n = synced_captures.len();
        let upper = total.div_ceil(n);

        for capture_id in &synced_captures {
            let load = running.get(capture_id).copied().unwrap_or(0);
            if load <= upper {
                continue;
            }
            let excess = load - upper;
            let victims: Vec<TableId> = self
                .trs
                .by_status(TableStatus::RunningTable)
                .filter(|r| &r.capture_id == capture_id)
                .map(|r| r.table_id)
                .take(excess)
                .collect();
            for table_id in victims {
                let done =
                    self.communicator
                        .dispatch_table(&self.changefeed_id, table_id, capture_id, true)?;
                if done {
                    self.trs.set_status(table_id, TableStatus::RemovingTable);
                } else {
                    return Ok(false);
                }
            }
        }

        self.rebalance_requested = false;
        Ok(true)
    }

    /// Phase 6: only once quiescent and every tracked capture is synced.
    fn aggregate_watermarks(&self, global_barrier_ts: Ts) -> ScheduleProgress {
        if self.trs.has_pending() || !self.cst.all_synced() {
            return ScheduleProgress::Blocked;
        }
        let checkpoint_ts = self.cst.min_watermark(global_barrier_ts, |s| s.checkpoint_ts);
        let resolved_ts = self.cst.min_watermark(global_barrier_ts, |s| s.resolved_ts);
        ScheduleProgress::Advanced {
            checkpoint_ts,
            resolved_ts,
        }
    }

    /// Agent handshake reply: `running`/`adding`/`removing` replace the SD's view of this
    /// capture's table assignments.
    pub fn on_agent_sync_task_statuses(
        &mut self,
        capture_id: &CaptureId,
        running: &[TableId],
        adding: &[TableId],
        removing: &[TableId],
    ) {
        if !self.cst.contains(capture_id) {
            tracing::warn!(capture = %capture_id, "sync from unknown capture, dropped");
            return;
        }

        let declared: std::collections::BTreeSet<TableId> = running
            .iter()
            .chain(adding)
            .chain(removing)
            .copied()
            .collect();

        let stale: Vec<TableId> = self
            .trs
            .tables_of(capture_id)
            .filter(|r| !declared.contains(&r.table_id))
            .map(|r| r.table_id)
            .collect();
        for table_id in stale {
            self.trs.remove(table_id);
        }

        for &table_id in running {
            self.trs.insert(table_id, capture_id.clone(), TableStatus::RunningTable);
        }
        for &table_id in adding {
            if !self.trs.contains(table_id) {
                self.trs.insert(table_id, capture_id.clone(), TableStatus::AddingTable);
            }
        }
        for &table_id in removing {
            if !self.trs.contains(table_id) {
                self.trs.insert(table_id, capture_id.clone(), TableStatus::RemovingTable);
            }
        }

        self.cst.mark_finished(capture_id);
    }

    /// Completion ack for the most recent dispatch targeting `(capture_id, table_id)`.
    pub fn on_agent_finished_table_operation(&mut self, capture_id: &CaptureId, table_id: TableId) {
        let Some(record) = self.trs.get(table_id) else {
            tracing::warn!(capture = %capture_id, table = table_id, "unmatched finish-op ack, dropped");
            return;
        };
        if record.capture_id != *capture_id {
            tracing::warn!(capture = %capture_id, table = table_id, "finish-op ack from non-owning capture, dropped");
            return;
        }
        match record.status {
            TableStatus::AddingTable => self.trs.set_status(table_id, TableStatus::RunningTable),
            TableStatus::RemovingTable => {
                self.trs.remove(table_id);
            }
            TableStatus::RunningTable => {
                tracing::debug!(capture = %capture_id, table = table_id, "duplicate finish-op ack, dropped");
            }
        }
    }

    /// Watermark report: ignored for dead or unsynced captures; stores the larger of
    /// (stored, reported) per field.
    pub fn on_agent_checkpoint(&mut self, capture_id: &CaptureId, checkpoint_ts: Ts, resolved_ts: Ts) {
        self.cst.report_checkpoint(capture_id, checkpoint_ts, resolved_ts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OwnerError;

    #[derive(Default)]
    struct MockCommunicator {
        announce_done: BTreeMap<CaptureId, bool>,
        dispatch_done: Option<bool>,
        add_calls: Vec<(CaptureId, TableId)>,
        remove_calls: Vec<(CaptureId, TableId)>,
        dispatch_attempts: usize,
    }

    impl MockCommunicator {
        fn reset(&mut self) {
            self.add_calls.clear();
            self.remove_calls.clear();
            self.dispatch_attempts = 0;
        }
    }

    impl Communicator for MockCommunicator {
        fn announce(&mut self, _cf: &ChangeFeedId, capture_id: &CaptureId) -> Result<bool, OwnerError> {
            Ok(*self.announce_done.get(capture_id).unwrap_or(&true))
        }

        fn dispatch_table(
            &mut self,
            _cf: &ChangeFeedId,
            table_id: TableId,
            capture_id: &CaptureId,
            is_delete: bool,
        ) -> Result<bool, OwnerError> {
            self.dispatch_attempts += 1;
            let done = self.dispatch_done.unwrap_or(true);
            if done {
                if is_delete {
                    self.remove_calls.push((capture_id.clone(), table_id));
                } else {
                    self.add_calls.push((capture_id.clone(), table_id));
                }
            }
            Ok(done)
        }
    }

    fn captures(ids: &[&str]) -> BTreeMap<CaptureId, CaptureInfo> {
        ids.iter()
            .map(|id| {
                (
                    CaptureId::from(*id),
                    CaptureInfo {
                        id: CaptureId::from(*id),
                        advertise_addr: format!("fakeip:{id}"),
                        version: "test".into(),
                    },
                )
            })
            .collect()
    }

    fn sync_all(sd: &mut ScheduleDispatcher<MockCommunicator>, ids: &[&str]) {
        for id in ids {
            sd.on_agent_sync_task_statuses(&CaptureId::from(*id), &[], &[], &[]);
        }
    }

    /// Scenario 1: initial dispatch of three tables across two fresh captures.
    #[test]
    fn initial_dispatch_converges() {
        let mut sd = ScheduleDispatcher::new(ChangeFeedId::from("cf-1"), MockCommunicator::default());
        let caps = captures(&["c1", "c2"]);

        let progress = sd.tick(1000, &[1, 2, 3], &caps).unwrap();
        assert!(progress.is_blocked());

        sync_all(&mut sd, &["c1", "c2"]);

        let progress = sd.tick(1000, &[1, 2, 3], &caps).unwrap();
        assert!(progress.is_blocked());
        let adds: Vec<TableId> = sd
            .communicator
            .add_calls
            .iter()
            .map(|(_, t)| *t)
            .collect();
        assert_eq!(adds.len(), 3);
        sd.communicator.reset();

        for table_id in [1, 2, 3] {
            let owner = sd.trs.get(table_id).unwrap().capture_id.clone();
            sd.on_agent_finished_table_operation(&owner, table_id);
        }
        sd.on_agent_checkpoint(&CaptureId::from("c1"), 1000, 1000);
        sd.on_agent_checkpoint(&CaptureId::from("c2"), 1000, 1000);

        let progress = sd.tick(1000, &[1, 2, 3], &caps).unwrap();
        assert_eq!(
            progress,
            ScheduleProgress::Advanced {
                checkpoint_ts: 1000,
                resolved_ts: 1000
            }
        );
    }

    /// Scenario 2: an unsynced capture's checkpoint report is ignored and blocks the tick.
    #[test]
    fn unsynced_capture_blocks_tick() {
        let mut sd = ScheduleDispatcher::new(ChangeFeedId::from("cf-1"), MockCommunicator::default());
        let caps = captures(&["c1", "c2"]);
        sd.tick(1300, &[1, 2, 3, 4, 5, 6], &caps).unwrap();
        sd.on_agent_sync_task_statuses(&CaptureId::from("c1"), &[1, 3, 5], &[], &[]);
        // c1 ready, c2 still SyncSent.
        sd.on_agent_checkpoint(&CaptureId::from("c2"), 1000, 1000);
        let progress = sd.tick(1300, &[1, 2, 3, 4, 5, 6], &caps).unwrap();
        assert!(progress.is_blocked());

        sd.on_agent_sync_task_statuses(&CaptureId::from("c2"), &[2, 4, 6], &[], &[]);
        sd.on_agent_checkpoint(&CaptureId::from("c1"), 1300, 1600);
        sd.on_agent_checkpoint(&CaptureId::from("c2"), 1500, 1500);
        let progress = sd.tick(1300, &[1, 2, 3, 4, 5, 6], &caps).unwrap();
        // Both watermarks are bounded by the global barrier ts even though c1/c2 individually
        // reported further ahead.
        assert_eq!(
            progress,
            ScheduleProgress::Advanced {
                checkpoint_ts: 1300,
                resolved_ts: 1300
            }
        );
    }

    /// Scenario 3: a checkpoint report from a capture the SD has never heard of is dropped.
    #[test]
    fn dead_capture_checkpoint_is_excluded() {
        let mut sd = ScheduleDispatcher::new(ChangeFeedId::from("cf-1"), MockCommunicator::default());
        let caps = captures(&["c1", "c2"]);
        sd.tick(1300, &[1, 2, 3, 4, 5, 6], &caps).unwrap();
        sync_all(&mut sd, &["c1", "c2"]);
        sd.tick(1300, &[1, 2, 3, 4, 5, 6], &caps).unwrap();
        for table_id in 1..=6 {
            let owner = sd.trs.get(table_id).unwrap().capture_id.clone();
            sd.on_agent_finished_table_operation(&owner, table_id);
        }
        sd.on_agent_checkpoint(&CaptureId::from("c1"), 1300, 1600);
        sd.on_agent_checkpoint(&CaptureId::from("c2"), 1500, 1550);
        sd.on_agent_checkpoint(&CaptureId::from("c3"), 1000, 1000);

        let progress = sd.tick(1300, &[1, 2, 3, 4, 5, 6], &caps).unwrap();
        assert_eq!(
            progress,
            ScheduleProgress::Advanced {
                checkpoint_ts: 1300,
                resolved_ts: 1300
            }
        );
    }

    /// Scenario 4: a capture disappears mid-move; its tables are re-dispatched elsewhere.
    #[test]
    fn capture_gone_mid_move_redispatches() {
        let mut sd = ScheduleDispatcher::new(ChangeFeedId::from("cf-1"), MockCommunicator::default());
        let caps = captures(&["c1", "c2"]);
        sd.tick(1000, &[1, 2], &caps).unwrap();
        sync_all(&mut sd, &["c1", "c2"]);
        sd.tick(1000, &[1, 2], &caps).unwrap();
        for (table_id, owner) in [(1, "c1"), (2, "c2")] {
            sd.on_agent_finished_table_operation(&CaptureId::from(owner), table_id);
        }
        assert_eq!(sd.tick(1000, &[1, 2], &caps).unwrap().is_blocked(), false);

        sd.move_table(1, CaptureId::from("c2"));
        sd.communicator.reset();
        let progress = sd.tick(1000, &[1, 2], &caps).unwrap();
        assert!(progress.is_blocked());
        assert_eq!(sd.communicator.remove_calls, vec![(CaptureId::from("c1"), 1)]);

        // c2 vanishes before any ack arrives.
        let caps_one = captures(&["c1"]);
        sd.communicator.reset();
        let progress = sd.tick(1000, &[1, 2], &caps_one).unwrap();
        assert!(progress.is_blocked());

        // table 1's remove was already in flight so it is untouched by the departure; table 2
        // (owned by the vanished c2) is purged and becomes a fresh to-add target for c1.
        sd.on_agent_finished_table_operation(&CaptureId::from("c1"), 1);
        let progress = sd.tick(1000, &[1, 2], &caps_one).unwrap();
        assert!(progress.is_blocked());
        for table_id in [1, 2] {
            assert_eq!(sd.trs.get(table_id).unwrap().capture_id, CaptureId::from("c1"));
        }
    }

    /// Scenario 5: rebalance evicts the excess from an overloaded capture exactly once.
    #[test]
    fn rebalance_converges_to_even_split() {
        let mut sd = ScheduleDispatcher::new(ChangeFeedId::from("cf-1"), MockCommunicator::default());
        let caps = captures(&["c1", "c2", "c3"]);
        sd.tick(1000, &[], &caps).unwrap();
        sync_all(&mut sd, &["c1", "c2", "c3"]);
        sd.tick(1000, &[], &caps).unwrap();
        // Force a skewed layout: all 6 tables land on c2 via manual moves once added normally.
        for table_id in 1..=6 {
            sd.trs.insert(table_id, CaptureId::from("c2"), TableStatus::RunningTable);
        }
        sd.communicator.reset();
        sd.rebalance();
        let progress = sd.tick(1000, &(1..=6).collect::<Vec<_>>(), &caps).unwrap();
        assert!(progress.is_blocked());
        assert_eq!(sd.communicator.remove_calls.len(), 4); // evict down to ceil(6/3) = 2

        for (capture, table_id) in sd.communicator.remove_calls.clone() {
            sd.on_agent_finished_table_operation(&capture, table_id);
        }
        sd.communicator.reset();
        let progress = sd.tick(1000, &(1..=6).collect::<Vec<_>>(), &caps).unwrap();
        assert!(progress.is_blocked());
        for (capture, table_id) in sd.communicator.add_calls.clone() {
            sd.on_agent_finished_table_operation(&capture, table_id);
        }

        let counts = sd.trs.running_count_by_capture();
        let max = *counts.values().max().unwrap();
        let min = *counts.values().min().unwrap();
        assert!(max - min <= 1);
    }

    /// Scenario 5b: the first evicted-dispatch backpressure stops the rebalance pass outright
    /// instead of moving on to the next overloaded capture.
    #[test]
    fn rebalance_stops_after_first_backpressure() {
        let mut sd = ScheduleDispatcher::new(ChangeFeedId::from("cf-1"), MockCommunicator::default());
        let caps = captures(&["c1", "c2", "c3"]);
        sd.tick(1000, &[], &caps).unwrap();
        sync_all(&mut sd, &["c1", "c2", "c3"]);
        sd.tick(1000, &[], &caps).unwrap();
        for table_id in 1..=6 {
            sd.trs.insert(table_id, CaptureId::from("c2"), TableStatus::RunningTable);
        }
        sd.communicator.reset();
        sd.communicator.dispatch_done = Some(false);
        sd.rebalance();
        let progress = sd.tick(1000, &(1..=6).collect::<Vec<_>>(), &caps).unwrap();
        assert!(progress.is_blocked());
        assert_eq!(sd.communicator.dispatch_attempts, 1);
        assert!(sd.communicator.remove_calls.is_empty());
    }

    /// Scenario 6: a manual move queued while the table's add is in flight waits for the add
    /// to finish before issuing the remove.
    #[test]
    fn manual_move_waits_for_in_flight_add() {
        let mut sd = ScheduleDispatcher::new(ChangeFeedId::from("cf-1"), MockCommunicator::default());
        let caps = captures(&["c1", "c2"]);
        sd.tick(1000, &[], &caps).unwrap();
        sync_all(&mut sd, &["c1", "c2"]);
        sd.trs.insert(1, CaptureId::from("c2"), TableStatus::AddingTable);

        sd.move_table(1, CaptureId::from("c1"));
        sd.communicator.reset();
        let progress = sd.tick(1000, &[1], &caps).unwrap();
        assert!(progress.is_blocked());
        assert!(sd.communicator.remove_calls.is_empty());

        sd.on_agent_finished_table_operation(&CaptureId::from("c2"), 1);
        sd.communicator.reset();
        sd.tick(1000, &[1], &caps).unwrap();
        assert_eq!(sd.communicator.remove_calls, vec![(CaptureId::from("c2"), 1)]);

        sd.on_agent_finished_table_operation(&CaptureId::from("c2"), 1);
        sd.communicator.reset();
        sd.tick(1000, &[1], &caps).unwrap();
        assert_eq!(sd.communicator.add_calls, vec![(CaptureId::from("c1"), 1)]);
        sd.on_agent_finished_table_operation(&CaptureId::from("c1"), 1);

        assert_eq!(sd.trs.get(1).unwrap().capture_id, CaptureId::from("c1"));
    }

    #[test]
    fn sync_from_unknown_capture_is_noop() {
        let mut sd = ScheduleDispatcher::new(ChangeFeedId::from("cf-1"), MockCommunicator::default());
        sd.on_agent_sync_task_statuses(&CaptureId::from("ghost"), &[1], &[], &[]);
        assert!(sd.trs.is_empty());
        assert!(!sd.cst.contains(&CaptureId::from("ghost")));
    }

    #[test]
    fn replaying_finish_op_is_noop() {
        let mut sd = ScheduleDispatcher::new(ChangeFeedId::from("cf-1"), MockCommunicator::default());
        sd.trs.insert(1, CaptureId::from("c1"), TableStatus::AddingTable);
        sd.on_agent_finished_table_operation(&CaptureId::from("c1"), 1);
        assert_eq!(sd.trs.get(1).unwrap().status, TableStatus::RunningTable);
        sd.on_agent_finished_table_operation(&CaptureId::from("c1"), 1);
        assert_eq!(sd.trs.get(1).unwrap().status, TableStatus::RunningTable);
    }
}
