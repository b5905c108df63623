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

//! The Changefeed Reactor: composes the Schedule Dispatcher and Feed-State
//! Manager for a single changefeed and drives one tick of each per
//! [`crate::reactor::owner::OwnerReactor`] tick.

use std::collections::BTreeMap;

use crate::communicator::Communicator;
use crate::dispatcher::{ScheduleDispatcher, ScheduleProgress};
use crate::error::OwnerResult;
use crate::feed_state::FeedStateManager;
use crate::ids::{CaptureId, ChangeFeedId, Ts, MAX_TS};
use crate::metrics;
use crate::state::{CaptureInfo, ChangeFeedStatus, ChangefeedState};

/// The upstream DDL/barrier collaborator the changefeed reactor consults for the upper bound
/// on progress; parsing DDL itself is out of scope here, so this is the seam a real
/// implementation plugs into. `NoBarrier` never holds progress back.
pub trait DdlBarrier {
    fn barrier_ts(&mut self, changefeed_id: &ChangeFeedId, target_ts: Option<Ts>) -> OwnerResult<Ts>;
}

impl DdlBarrier for Box<dyn DdlBarrier> {
    fn barrier_ts(&mut self, changefeed_id: &ChangeFeedId, target_ts: Option<Ts>) -> OwnerResult<Ts> {
        (**self).barrier_ts(changefeed_id, target_ts)
    }
}

#[derive(Debug, Default)]
pub struct NoBarrier;

impl DdlBarrier for NoBarrier {
    fn barrier_ts(&mut self, _changefeed_id: &ChangeFeedId, target_ts: Option<Ts>) -> OwnerResult<Ts> {
        Ok(target_ts.unwrap_or(MAX_TS))
    }
}

pub struct ChangefeedReactor {
    id: ChangeFeedId,
    dispatcher: ScheduleDispatcher<Box<dyn Communicator>>,
    fsm: FeedStateManager,
    ddl_barrier: Box<dyn DdlBarrier>,
}

impl ChangefeedReactor {
    pub fn new(id: ChangeFeedId, communicator: Box<dyn Communicator>, ddl_barrier: Box<dyn DdlBarrier>) -> Self {
        Self {
            dispatcher: ScheduleDispatcher::new(id.clone(), communicator),
            fsm: FeedStateManager::new(),
            ddl_barrier,
            id,
        }
    }

    pub fn push_admin_job(&mut self, job: crate::state::AdminJob) {
        self.fsm.push_admin_job(job);
    }

    pub fn request_rebalance(&mut self) {
        self.dispatcher.rebalance();
    }

    pub fn request_move_table(&mut self, table_id: crate::ids::TableId, target: CaptureId) {
        self.dispatcher.move_table(table_id, target);
    }

    pub fn on_agent_sync_task_statuses(
        &mut self,
        capture_id: &CaptureId,
        running: &[crate::ids::TableId],
        adding: &[crate::ids::TableId],
        removing: &[crate::ids::TableId],
    ) {
        self.dispatcher.on_agent_sync_task_statuses(capture_id, running, adding, removing);
    }

    pub fn on_agent_finished_table_operation(&mut self, capture_id: &CaptureId, table_id: crate::ids::TableId) {
        self.dispatcher.on_agent_finished_table_operation(capture_id, table_id);
    }

    pub fn on_agent_checkpoint(&mut self, capture_id: &CaptureId, checkpoint_ts: Ts, resolved_ts: Ts) {
        self.dispatcher.on_agent_checkpoint(capture_id, checkpoint_ts, resolved_ts);
    }

    /// Forces this changefeed to `Failed`, called by the owner once it has seen enough
    /// consecutive tick errors from this reactor to give up retrying.
    pub fn mark_failed(&self, cf_state: &mut ChangefeedState) {
        self.fsm.mark_failed(cf_state);
    }

    /// Drives one tick of the FSM then (if runnable) the SD, patching `cf_state.status` on
    /// progress. Returns `true` once the FSM has cleared the persisted descriptor (`info ==
    /// None`, the Remove admin job's doing) so the caller can reap this changefeed's entry.
    /// A DDL barrier or dispatcher error moves the changefeed to `Error` before propagating,
    /// since neither collaborator in this crate has a notion of a retryable failure.
    pub fn tick(
        &mut self,
        cf_state: &mut ChangefeedState,
        captures: &BTreeMap<CaptureId, CaptureInfo>,
    ) -> OwnerResult<bool> {
        let span = tracing::info_span!("changefeed_tick", changefeed = %self.id);
        let _enter = span.enter();

        let runnable = self.fsm.tick(cf_state);

        if cf_state.info.is_none() {
            return Ok(true);
        }
        if !runnable {
            return Ok(false);
        }

        let (target_ts, current_tables) = match cf_state.info.as_ref() {
            Some(info) => (info.target_ts, info.tables.clone()),
            None => return Ok(false),
        };
        let barrier_ts = match self.ddl_barrier.barrier_ts(&self.id, target_ts) {
            Ok(ts) => ts,
            Err(err) => {
                self.fsm.mark_error(cf_state);
                return Err(err);
            }
        };
        let progress = match self.dispatcher.tick(barrier_ts, &current_tables, captures) {
            Ok(progress) => progress,
            Err(err) => {
                self.fsm.mark_error(cf_state);
                return Err(err);
            }
        };

        if let ScheduleProgress::Advanced {
            checkpoint_ts,
            resolved_ts,
        } = progress
        {
            cf_state.patch_status(|prev| {
                let floor = prev.map(|s| (s.checkpoint_ts, s.resolved_ts)).unwrap_or((0, 0));
                Some(ChangeFeedStatus {
                    checkpoint_ts: checkpoint_ts.max(floor.0),
                    resolved_ts: resolved_ts.max(floor.1),
                })
            });
            metrics::record_watermarks(&self.id, checkpoint_ts, resolved_ts);
        }

        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OwnerError;
    use crate::ids::TableId;
    use crate::state::{AdminJob, AdminJobKind, ChangeFeedInfo};

    #[derive(Default)]
    struct AlwaysDone;

    impl Communicator for AlwaysDone {
        fn announce(&mut self, _cf: &ChangeFeedId, _capture_id: &CaptureId) -> Result<bool, OwnerError> {
            Ok(true)
        }

        fn dispatch_table(
            &mut self,
            _cf: &ChangeFeedId,
            _table_id: TableId,
            _capture_id: &CaptureId,
            _is_delete: bool,
        ) -> Result<bool, OwnerError> {
            Ok(true)
        }
    }

    fn reactor(id: &str) -> ChangefeedReactor {
        ChangefeedReactor::new(
            ChangeFeedId::from(id),
            Box::new(AlwaysDone),
            Box::new(NoBarrier),
        )
    }

    fn fresh_state(id: &str) -> ChangefeedState {
        ChangefeedState::new(ChangeFeedInfo::new(ChangeFeedId::from(id), 0), ChangeFeedStatus::new(0))
    }

    #[test]
    fn paused_changefeed_skips_dispatcher() {
        let mut cfr = reactor("cf-1");
        let mut state = fresh_state("cf-1");
        cfr.push_admin_job(AdminJob {
            changefeed_id: ChangeFeedId::from("cf-1"),
            kind: AdminJobKind::Pause,
        });
        let reaped = cfr.tick(&mut state, &BTreeMap::new()).unwrap();
        assert!(!reaped);
        assert_eq!(state.status.unwrap().checkpoint_ts, 0);
    }

    #[test]
    fn removed_changefeed_is_reaped() {
        let mut cfr = reactor("cf-1");
        let mut state = fresh_state("cf-1");
        cfr.push_admin_job(AdminJob {
            changefeed_id: ChangeFeedId::from("cf-1"),
            kind: AdminJobKind::Remove { force: false },
        });
        let reaped = cfr.tick(&mut state, &BTreeMap::new()).unwrap();
        assert!(reaped);
    }

    #[derive(Default)]
    struct AlwaysErrors;

    impl Communicator for AlwaysErrors {
        fn announce(&mut self, _cf: &ChangeFeedId, _capture_id: &CaptureId) -> Result<bool, OwnerError> {
            Err(crate::error::fatal(crate::error::StringError("capture unreachable".into())))
        }

        fn dispatch_table(
            &mut self,
            _cf: &ChangeFeedId,
            _table_id: TableId,
            _capture_id: &CaptureId,
            _is_delete: bool,
        ) -> Result<bool, OwnerError> {
            Err(crate::error::fatal(crate::error::StringError("capture unreachable".into())))
        }
    }

    #[test]
    fn collaborator_error_marks_changefeed_errored() {
        let mut cfr = ChangefeedReactor::new(ChangeFeedId::from("cf-1"), Box::new(AlwaysErrors), Box::new(NoBarrier));
        let mut state = fresh_state("cf-1");
        let mut captures = BTreeMap::new();
        captures.insert(
            CaptureId::from("c1"),
            CaptureInfo {
                id: CaptureId::from("c1"),
                advertise_addr: "fakeip:1".into(),
                version: "v1".into(),
            },
        );

        let result = cfr.tick(&mut state, &captures);
        assert!(result.is_err());
        assert_eq!(state.info.as_ref().unwrap().state, crate::feed_state::ChangeFeedState::Error);
    }

    #[test]
    fn watermark_patch_never_regresses() {
        let mut cfr = reactor("cf-1");
        let mut state = fresh_state("cf-1");
        state.status = Some(ChangeFeedStatus {
            checkpoint_ts: 500,
            resolved_ts: 500,
        });
        // Dispatcher with no captures and no tables advances trivially to the barrier ts, which
        // here is MAX_TS via NoBarrier; patch must still respect the existing floor.
        let reaped = cfr.tick(&mut state, &BTreeMap::new()).unwrap();
        assert!(!reaped);
        assert!(state.status.unwrap().checkpoint_ts >= 500);
    }
}
