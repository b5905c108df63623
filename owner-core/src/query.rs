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

//! Read-only status queries: every answer is a deep copy of the reactor's
//! state, so a caller can never observe (or corrupt) the live table-record
//! store, capture-status table, or feed-state manager through the returned
//! value.

use std::collections::BTreeMap;

use crate::error::{OwnerError, OwnerResult};
use crate::ids::{CaptureId, ChangeFeedId};
use crate::state::{CaptureInfo, ChangeFeedInfo, ChangeFeedStatus, ReactorState, TaskPosition, TaskStatus};

/// A query the reactor answers from its current in-memory snapshot, queued alongside admin
/// jobs on the same mutex-guarded job queue.
#[derive(Debug, Clone)]
pub enum OwnerQuery {
    AllChangeFeedStatuses,
    AllChangeFeedInfo,
    AllTaskStatuses(ChangeFeedId),
    TaskPositions(ChangeFeedId),
    Processors,
    Captures,
}

#[derive(Debug, Clone)]
pub enum OwnerQueryResult {
    ChangeFeedStatuses(BTreeMap<ChangeFeedId, ChangeFeedStatus>),
    ChangeFeedInfo(BTreeMap<ChangeFeedId, ChangeFeedInfo>),
    TaskStatuses(BTreeMap<CaptureId, TaskStatus>),
    TaskPositions(BTreeMap<CaptureId, TaskPosition>),
    Processors(Vec<ProcessorInfo>),
    Captures(Vec<CaptureInfo>),
}

/// One (changefeed, capture) pairing with an active task, flattened out of every changefeed's
/// task-status map for `Processors`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorInfo {
    pub changefeed_id: ChangeFeedId,
    pub capture_id: CaptureId,
}

/// Answers an [`OwnerQuery`] against a [`ReactorState`] snapshot.
pub fn answer(state: &ReactorState, query: OwnerQuery) -> OwnerResult<OwnerQueryResult> {
    match query {
        OwnerQuery::AllChangeFeedStatuses => Ok(OwnerQueryResult::ChangeFeedStatuses(
            state
                .changefeeds
                .iter()
                .filter_map(|(id, cf)| cf.status.map(|status| (id.clone(), status)))
                .collect(),
        )),
        OwnerQuery::AllChangeFeedInfo => Ok(OwnerQueryResult::ChangeFeedInfo(
            state
                .changefeeds
                .iter()
                .filter_map(|(id, cf)| cf.info.clone().map(|info| (id.clone(), info)))
                .collect(),
        )),
        OwnerQuery::AllTaskStatuses(id) => {
            let cf = state
                .changefeeds
                .get(&id)
                .ok_or_else(|| OwnerError::ChangeFeedNotExists(id.clone()))?;
            Ok(OwnerQueryResult::TaskStatuses(cf.task_statuses.clone()))
        }
        OwnerQuery::TaskPositions(id) => {
            let cf = state
                .changefeeds
                .get(&id)
                .ok_or_else(|| OwnerError::ChangeFeedNotExists(id.clone()))?;
            Ok(OwnerQueryResult::TaskPositions(cf.task_positions.clone()))
        }
        OwnerQuery::Processors => {
            let mut processors = Vec::new();
            for (changefeed_id, cf) in &state.changefeeds {
                for capture_id in cf.task_statuses.keys() {
                    processors.push(ProcessorInfo {
                        changefeed_id: changefeed_id.clone(),
                        capture_id: capture_id.clone(),
                    });
                }
            }
            Ok(OwnerQueryResult::Processors(processors))
        }
        OwnerQuery::Captures => Ok(OwnerQueryResult::Captures(
            state.captures.values().cloned().collect(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ChangefeedState;

    fn state_with_one_changefeed() -> ReactorState {
        let mut state = ReactorState::new();
        let id = ChangeFeedId::from("cf-1");
        let mut cf = ChangefeedState::new(ChangeFeedInfo::new(id.clone(), 100), ChangeFeedStatus::new(100));
        cf.task_statuses.insert(CaptureId::from("c1"), TaskStatus::default());
        state.changefeeds.insert(id, cf);
        state
    }

    #[test]
    fn unknown_changefeed_is_an_error() {
        let state = state_with_one_changefeed();
        let result = answer(&state, OwnerQuery::AllTaskStatuses(ChangeFeedId::from("ghost")));
        assert!(matches!(result, Err(OwnerError::ChangeFeedNotExists(_))));
    }

    #[test]
    fn processors_flattens_task_statuses() {
        let state = state_with_one_changefeed();
        let result = answer(&state, OwnerQuery::Processors).unwrap();
        let OwnerQueryResult::Processors(processors) = result else {
            panic!("wrong result variant");
        };
        assert_eq!(processors.len(), 1);
        assert_eq!(processors[0].capture_id, CaptureId::from("c1"));
    }

    #[test]
    fn mutating_query_result_does_not_touch_live_state() {
        let state = state_with_one_changefeed();
        let result = answer(&state, OwnerQuery::AllChangeFeedInfo).unwrap();
        let OwnerQueryResult::ChangeFeedInfo(mut infos) = result else {
            panic!("wrong result variant");
        };
        infos.clear();
        assert_eq!(state.changefeeds.len(), 1);
    }
}
