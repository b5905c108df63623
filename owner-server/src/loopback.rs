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

//! A `Communicator` that always succeeds and only logs, standing in for a
//! real network-backed capture pool. This is demonstration scaffolding for
//! `owner-server`, not something a production deployment would link in.

use owner_core::{CaptureId, ChangeFeedId, Communicator, OwnerError, TableId};

#[derive(Debug, Default)]
pub struct LoopbackCommunicator;

impl Communicator for LoopbackCommunicator {
    fn announce(&mut self, changefeed_id: &ChangeFeedId, capture_id: &CaptureId) -> Result<bool, OwnerError> {
        tracing::debug!(changefeed = %changefeed_id, capture = %capture_id, "announce");
        Ok(true)
    }

    fn dispatch_table(
        &mut self,
        changefeed_id: &ChangeFeedId,
        table_id: TableId,
        capture_id: &CaptureId,
        is_delete: bool,
    ) -> Result<bool, OwnerError> {
        tracing::debug!(
            changefeed = %changefeed_id,
            capture = %capture_id,
            table = table_id,
            is_delete,
            "dispatch_table"
        );
        Ok(true)
    }
}
