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

//! The Communicator Interface (CI): the abstract boundary to remote captures.
//!
//! Both operations model a non-blocking send attempt: `Ok(false)` means
//! backpressure (try again next tick), not failure. `Err` is fatal to the
//! tick that issued it. There are no suspension points on this trait: a
//! tick must complete in bounded time, so a real network-backed
//! implementation is expected to buffer/poll underneath rather than block
//! here.

use crate::error::OwnerError;
use crate::ids::{CaptureId, ChangeFeedId, TableId};

pub trait Communicator {
    /// Announce the dispatcher's presence to `capture_id` so it can begin the sync handshake.
    fn announce(
        &mut self,
        changefeed_id: &ChangeFeedId,
        capture_id: &CaptureId,
    ) -> Result<bool, OwnerError>;

    /// Ask `capture_id` to start (`is_delete = false`) or stop (`is_delete = true`) replicating
    /// `table_id`.
    fn dispatch_table(
        &mut self,
        changefeed_id: &ChangeFeedId,
        table_id: TableId,
        capture_id: &CaptureId,
        is_delete: bool,
    ) -> Result<bool, OwnerError>;
}

impl Communicator for Box<dyn Communicator> {
    fn announce(&mut self, changefeed_id: &ChangeFeedId, capture_id: &CaptureId) -> Result<bool, OwnerError> {
        (**self).announce(changefeed_id, capture_id)
    }

    fn dispatch_table(
        &mut self,
        changefeed_id: &ChangeFeedId,
        table_id: TableId,
        capture_id: &CaptureId,
        is_delete: bool,
    ) -> Result<bool, OwnerError> {
        (**self).dispatch_table(changefeed_id, table_id, capture_id, is_delete)
    }
}
