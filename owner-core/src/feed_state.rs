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

//! The Feed-State Manager (FSM): the per-changefeed lifecycle state machine,
//! processing queued admin jobs against the persisted `ChangeFeedInfo`.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::state::{AdminJob, AdminJobKind, ChangefeedState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeFeedState {
    Normal,
    Stopped,
    Error,
    Finished,
    Removed,
    Failed,
}

impl ChangeFeedState {
    /// `Error` keeps retrying on its own (the owner gives up and moves it to `Failed` only
    /// after too many consecutive tick errors); only `Stopped` needs an explicit `Resume`.
    fn is_runnable(self) -> bool {
        matches!(self, ChangeFeedState::Normal | ChangeFeedState::Error)
    }

    fn is_terminal(self) -> bool {
        matches!(
            self,
            ChangeFeedState::Finished | ChangeFeedState::Removed | ChangeFeedState::Failed
        )
    }
}

/// Owns the admin-job queue for one changefeed and applies the lifecycle transition table.
#[derive(Debug, Default)]
pub struct FeedStateManager {
    pending_jobs: VecDeque<AdminJob>,
}

impl FeedStateManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues an admin job to be applied on the next [`Self::tick`].
    pub fn push_admin_job(&mut self, job: AdminJob) {
        self.pending_jobs.push_back(job);
    }

    /// Enters `Error` from the reactor when a non-retryable collaborator error is observed.
    pub fn mark_error(&self, state: &mut ChangefeedState) {
        if let Some(info) = state.info.as_mut() {
            if !info.state.is_terminal() {
                info.state = ChangeFeedState::Error;
            }
        }
    }

    /// Enters `Failed` from the owner once retries are exhausted.
    pub fn mark_failed(&self, state: &mut ChangefeedState) {
        if let Some(info) = state.info.as_mut() {
            info.state = ChangeFeedState::Failed;
        }
    }

    /// Drains and applies all pending admin jobs in order, returning whether the changefeed is
    /// runnable afterward. Applying the same job twice (replay) is idempotent: the transition
    /// table has no self-loops that accumulate state, so reprocessing a no-op `Resume` while
    /// already `Normal` leaves the state unchanged.
    pub fn tick(&mut self, state: &mut ChangefeedState) -> bool {
        while let Some(job) = self.pending_jobs.pop_front() {
            self.apply(job, state);
        }
        state
            .info
            .as_ref()
            .map(|info| info.state.is_runnable())
            .unwrap_or(false)
    }

    fn apply(&self, job: AdminJob, state: &mut ChangefeedState) {
        let Some(info) = state.info.as_mut() else {
            return;
        };
        if info.state.is_terminal() {
            tracing::warn!(changefeed = %job.changefeed_id, ?job.kind, "admin job on terminal changefeed, ignored");
            return;
        }
        match job.kind {
            AdminJobKind::Pause => info.state = ChangeFeedState::Stopped,
            AdminJobKind::Resume => info.state = ChangeFeedState::Normal,
            AdminJobKind::Remove { force: _ } => {
                // Clearing `info` to `None` is itself the Removed signal: the reactor's reap
                // condition watches for a nil descriptor rather than an enum value.
                state.clear_tasks();
                state.info = None;
            }
            AdminJobKind::Finish => info.state = ChangeFeedState::Finished,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ChangeFeedId;
    use crate::state::{ChangeFeedInfo, ChangeFeedStatus};

    fn fresh_state() -> ChangefeedState {
        ChangefeedState::new(
            ChangeFeedInfo::new(ChangeFeedId::from("cf-1"), 0),
            ChangeFeedStatus::new(0),
        )
    }

    #[test]
    fn pause_then_resume_round_trips() {
        let mut fsm = FeedStateManager::new();
        let mut state = fresh_state();
        fsm.push_admin_job(AdminJob {
            changefeed_id: ChangeFeedId::from("cf-1"),
            kind: AdminJobKind::Pause,
        });
        assert!(!fsm.tick(&mut state));
        assert_eq!(state.info.as_ref().unwrap().state, ChangeFeedState::Stopped);

        fsm.push_admin_job(AdminJob {
            changefeed_id: ChangeFeedId::from("cf-1"),
            kind: AdminJobKind::Resume,
        });
        assert!(fsm.tick(&mut state));
        assert_eq!(state.info.as_ref().unwrap().state, ChangeFeedState::Normal);
    }

    #[test]
    fn remove_clears_task_state() {
        let mut fsm = FeedStateManager::new();
        let mut state = fresh_state();
        state.task_statuses.insert(
            crate::ids::CaptureId::from("c1"),
            crate::state::TaskStatus::default(),
        );
        fsm.push_admin_job(AdminJob {
            changefeed_id: ChangeFeedId::from("cf-1"),
            kind: AdminJobKind::Remove { force: false },
        });
        fsm.tick(&mut state);
        assert!(state.info.is_none());
        assert!(state.task_statuses.is_empty());
    }

    #[test]
    fn terminal_state_rejects_further_jobs() {
        let mut fsm = FeedStateManager::new();
        let mut state = fresh_state();
        fsm.push_admin_job(AdminJob {
            changefeed_id: ChangeFeedId::from("cf-1"),
            kind: AdminJobKind::Finish,
        });
        fsm.tick(&mut state);
        fsm.push_admin_job(AdminJob {
            changefeed_id: ChangeFeedId::from("cf-1"),
            kind: AdminJobKind::Resume,
        });
        assert!(!fsm.tick(&mut state));
        assert_eq!(state.info.as_ref().unwrap().state, ChangeFeedState::Finished);
    }

    #[test]
    fn replaying_same_job_is_idempotent() {
        let mut fsm_once = FeedStateManager::new();
        let mut state_once = fresh_state();
        fsm_once.push_admin_job(AdminJob {
            changefeed_id: ChangeFeedId::from("cf-1"),
            kind: AdminJobKind::Pause,
        });
        fsm_once.tick(&mut state_once);

        let mut fsm_twice = FeedStateManager::new();
        let mut state_twice = fresh_state();
        fsm_twice.push_admin_job(AdminJob {
            changefeed_id: ChangeFeedId::from("cf-1"),
            kind: AdminJobKind::Pause,
        });
        fsm_twice.push_admin_job(AdminJob {
            changefeed_id: ChangeFeedId::from("cf-1"),
            kind: AdminJobKind::Pause,
        });
        fsm_twice.tick(&mut state_twice);

        assert_eq!(
            state_once.info.as_ref().unwrap().state,
            state_twice.info.as_ref().unwrap().state
        );
    }
}
