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

//! The GC Safepoint Coordinator: derives the upstream GC safepoint from the
//! minimum checkpoint ts across changefeeds that still hold data back, and
//! pushes it upstream once per tick.

use crate::feed_state::ChangeFeedState;
use crate::ids::{Ts, MAX_TS};
use crate::state::ChangefeedState;

/// Changefeeds in these states still block GC; everything else (terminal or about to be
/// reaped) is excluded from the minimum.
fn blocks_gc(state: ChangeFeedState) -> bool {
    matches!(
        state,
        ChangeFeedState::Normal | ChangeFeedState::Stopped | ChangeFeedState::Error
    )
}

/// Pushes a new GC safepoint upstream. Returns `Ok(true)` if accepted, `Ok(false)` on
/// backpressure (retry next tick), mirroring [`crate::communicator::Communicator`]'s
/// non-blocking send-attempt convention.
pub trait GcSafepointSink {
    fn push_safepoint(&mut self, safepoint: Ts) -> Result<bool, crate::error::OwnerError>;
}

#[derive(Debug, Default)]
pub struct GcSafepointCoordinator {
    last_pushed: Option<Ts>,
}

impl GcSafepointCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// `minCheckpointTs - 1` over changefeeds in a GC-blocking state, or [`MAX_TS`] if none
    /// exist yet (nothing to protect).
    pub fn compute_upper_bound<'a>(
        &self,
        changefeeds: impl Iterator<Item = &'a ChangefeedState>,
    ) -> Ts {
        let min_checkpoint = changefeeds
            .filter(|cf| cf.info.as_ref().is_some_and(|info| blocks_gc(info.state)))
            .map(ChangefeedState::checkpoint_ts)
            .min()
            .unwrap_or(MAX_TS);
        min_checkpoint.saturating_sub(1)
    }

    /// Pushes the safepoint upstream if it advanced, or if `force_update` is set (the reactor
    /// sets this whenever a changefeed was created this tick, since a fresh changefeed's
    /// checkpoint may lower the bound below what was last pushed). The safepoint must never
    /// regress except through `force_update`, so a non-forced push is skipped unless the new
    /// bound is strictly greater than the last one pushed.
    pub fn tick<'a>(
        &mut self,
        sink: &mut impl GcSafepointSink,
        changefeeds: impl Iterator<Item = &'a ChangefeedState>,
        force_update: bool,
    ) -> Result<(), crate::error::OwnerError> {
        let upper_bound = self.compute_upper_bound(changefeeds);
        let should_push = force_update
            || match self.last_pushed {
                Some(last) => upper_bound > last,
                None => true,
            };
        if !should_push {
            return Ok(());
        }
        if sink.push_safepoint(upper_bound)? {
            self.last_pushed = Some(upper_bound);
        }
        Ok(())
    }
}
