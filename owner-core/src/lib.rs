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

//! `owner-core`: the owner / schedule-dispatcher control plane of a
//! change-data-capture cluster, independent of any particular transport,
//! persistence layer, or process lifecycle. See [`reactor::owner::OwnerReactor`]
//! for the entry point an external driver ticks.

pub mod capture;
pub mod communicator;
pub mod dispatcher;
pub mod error;
pub mod feed_state;
pub mod gc;
pub mod ids;
pub mod metrics;
pub mod query;
pub mod reactor;
pub mod state;
pub mod table;

pub use capture::{CaptureStatus, CaptureStatusTable, SyncStatus};
pub use communicator::Communicator;
pub use dispatcher::{ScheduleDispatcher, ScheduleProgress};
pub use error::{OwnerError, OwnerResult};
pub use feed_state::{ChangeFeedState, FeedStateManager};
pub use gc::{GcSafepointCoordinator, GcSafepointSink};
pub use ids::{CaptureId, ChangeFeedId, TableId, Ts, MAX_TS};
pub use query::{answer as answer_query, OwnerQuery, OwnerQueryResult};
pub use reactor::changefeed::{ChangefeedReactor, DdlBarrier, NoBarrier};
pub use reactor::owner::{OwnerHandle, OwnerJob, OwnerReactor};
pub use state::{
    AdminJob, AdminJobKind, CaptureInfo, ChangeFeedInfo, ChangeFeedStatus, ChangefeedState, ReactorState,
    TaskPosition, TaskStatus,
};
pub use table::{TableRecord, TableRecordStore, TableStatus};
