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

use std::fmt;

use crate::ids::ChangeFeedId;

pub type OwnerResult<T> = Result<T, OwnerError>;

/// Errors that can escape the core's public surface.
///
/// `CommunicatorTransient` (the `done = false` path) deliberately has no
/// variant here: it is a scheduling signal, not an error, and is consumed
/// entirely inside [`crate::dispatcher::ScheduleDispatcher::tick`].
#[derive(thiserror::Error, Debug)]
pub enum OwnerError {
    /// Normal shutdown sentinel, returned by [`crate::reactor::owner::OwnerReactor::tick`]
    /// once the close flag is observed and all changefeed reactors are closed.
    #[error("reactor finished")]
    ReactorFinished,

    /// A status query named a changefeed the owner has no reactor for.
    #[error("changefeed {0} does not exist")]
    ChangeFeedNotExists(ChangeFeedId),

    /// A non-`nil` error from the [`crate::communicator::Communicator`]; fatal to the tick
    /// that produced it.
    #[error("communicator error: {0}")]
    CommunicatorFatal(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The GC safepoint coordinator failed to push the new safepoint upstream.
    #[error("failed to update GC safepoint: {0}")]
    UpstreamUnavailable(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The driver cancelled the in-progress tick.
    #[error("tick cancelled")]
    Cancelled,
}

/// Helper for collaborators that want to report a fatal, opaque error without
/// depending on `owner-core`'s error type directly.
pub fn fatal<E>(err: E) -> OwnerError
where
    E: std::error::Error + Send + Sync + 'static,
{
    OwnerError::CommunicatorFatal(Box::new(err))
}

#[derive(Debug)]
pub struct StringError(pub String);

impl fmt::Display for StringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for StringError {}
