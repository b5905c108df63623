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

//! The Owner Reactor: the cluster-wide tick loop. Owns one
//! [`ChangefeedReactor`] per live changefeed, drains the shared admin-job
//! queue, checks cluster version consistency, coordinates GC, and drives
//! every changefeed's tick once per invocation.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::communicator::Communicator;
use crate::error::{OwnerError, OwnerResult};
use crate::gc::{GcSafepointCoordinator, GcSafepointSink};
use crate::ids::{CaptureId, ChangeFeedId, TableId, Ts};
use crate::metrics::{self, TickTimer};
use crate::query::{self, OwnerQuery, OwnerQueryResult};
use crate::reactor::changefeed::{ChangefeedReactor, DdlBarrier};
use crate::state::{AdminJob, ReactorState};

use super::changefeed::NoBarrier;

/// The work items routed through the shared job queue: one mutex-guarded `VecDeque`, drained
/// in full at the start of every tick.
pub enum OwnerJob {
    Rebalance(ChangeFeedId),
    ManualSchedule {
        changefeed_id: ChangeFeedId,
        table_id: TableId,
        target_capture: CaptureId,
    },
    AdminJob(AdminJob),
    DebugInfo(mpsc::Sender<String>),
    Query(OwnerQuery, mpsc::Sender<OwnerResult<OwnerQueryResult>>),
}

const DEBUG_INFO_TIMEOUT: Duration = Duration::from_secs(3);
const DEBUG_INFO_PLACEHOLDER: &str = "failed to print debug info for owner\n";

/// Consecutive tick errors a changefeed may accrue (each one already having moved it to
/// `Error`) before the owner gives up and marks it `Failed`.
const MAX_CONSECUTIVE_TICK_ERRORS: u32 = 3;

/// Cheap, `Clone`-able reference to a running [`OwnerReactor`]'s job queue and close flag. The
/// reactor itself is driven from one place (the external driver loop); every other caller,
/// including from other threads, reaches it only through a handle.
#[derive(Clone)]
pub struct OwnerHandle {
    job_queue: Arc<Mutex<VecDeque<OwnerJob>>>,
    closed: Arc<AtomicBool>,
}

impl OwnerHandle {
    pub fn enqueue_job(&self, job: OwnerJob) {
        self.job_queue.lock().unwrap().push_back(job);
    }

    pub fn trigger_rebalance(&self, changefeed_id: ChangeFeedId) {
        self.enqueue_job(OwnerJob::Rebalance(changefeed_id));
    }

    pub fn manual_schedule(&self, changefeed_id: ChangeFeedId, table_id: TableId, target_capture: CaptureId) {
        self.enqueue_job(OwnerJob::ManualSchedule {
            changefeed_id,
            table_id,
            target_capture,
        });
    }

    pub fn admin_job(&self, job: AdminJob) {
        self.enqueue_job(OwnerJob::AdminJob(job));
    }

    /// Blocks the caller (not the reactor) for up to three seconds waiting for the next tick to
    /// render a debug dump; returns a placeholder string on timeout.
    pub fn write_debug_info(&self) -> String {
        let (tx, rx) = mpsc::channel();
        self.enqueue_job(OwnerJob::DebugInfo(tx));
        rx.recv_timeout(DEBUG_INFO_TIMEOUT)
            .unwrap_or_else(|_| DEBUG_INFO_PLACEHOLDER.to_string())
    }

    pub fn query(&self, query: OwnerQuery) -> OwnerResult<OwnerQueryResult> {
        let (tx, rx) = mpsc::channel();
        self.enqueue_job(OwnerJob::Query(query, tx));
        rx.recv_timeout(DEBUG_INFO_TIMEOUT)
            .unwrap_or(Err(OwnerError::Cancelled))
    }

    pub fn async_stop(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub type CommunicatorFactory = Box<dyn Fn(&ChangeFeedId) -> Box<dyn Communicator>>;
pub type DdlBarrierFactory = Box<dyn Fn(&ChangeFeedId) -> Box<dyn DdlBarrier>>;

pub struct OwnerReactor {
    cluster_version: String,
    reactors: BTreeMap<ChangeFeedId, ChangefeedReactor>,
    communicator_factory: CommunicatorFactory,
    ddl_barrier_factory: DdlBarrierFactory,
    gsc: GcSafepointCoordinator,
    job_queue: Arc<Mutex<VecDeque<OwnerJob>>>,
    closed: Arc<AtomicBool>,
    /// Consecutive tick-error counts, keyed by changefeed; cleared on a clean tick or reap.
    tick_error_counts: BTreeMap<ChangeFeedId, u32>,
}

impl OwnerReactor {
    pub fn new(cluster_version: impl Into<String>, communicator_factory: CommunicatorFactory) -> Self {
        Self::with_ddl_barrier_factory(
            cluster_version,
            communicator_factory,
            Box::new(|_: &ChangeFeedId| Box::new(NoBarrier) as Box<dyn DdlBarrier>),
        )
    }

    pub fn with_ddl_barrier_factory(
        cluster_version: impl Into<String>,
        communicator_factory: CommunicatorFactory,
        ddl_barrier_factory: DdlBarrierFactory,
    ) -> Self {
        Self {
            cluster_version: cluster_version.into(),
            reactors: BTreeMap::new(),
            communicator_factory,
            ddl_barrier_factory,
            gsc: GcSafepointCoordinator::new(),
            job_queue: Arc::new(Mutex::new(VecDeque::new())),
            closed: Arc::new(AtomicBool::new(false)),
            tick_error_counts: BTreeMap::new(),
        }
    }

    pub fn handle(&self) -> OwnerHandle {
        OwnerHandle {
            job_queue: Arc::clone(&self.job_queue),
            closed: Arc::clone(&self.closed),
        }
    }

    /// Runs one full tick against `state`. Returns `Err(OwnerError::ReactorFinished)` once
    /// `async_stop` has been observed and every changefeed reactor has been torn down — the
    /// driver should stop calling `tick` after that.
    pub fn tick(&mut self, state: &mut ReactorState) -> OwnerResult<()> {
        let _timer = TickTimer::start();
        let span = tracing::info_span!("owner_tick");
        let _enter = span.enter();

        metrics::record_cluster_sizes(state.captures.len(), state.changefeeds.len());

        let created_new = self.sync_reactors(state);
        self.handle_jobs(state)?;

        if let Some(mismatched) = self.find_version_mismatch(state) {
            tracing::warn!(capture = %mismatched, owner_version = %self.cluster_version, "capture version skew, deferring this tick");
            return Ok(());
        }

        self.update_gc_safepoint(state, created_new)?;
        self.tick_changefeeds(state)?;

        if self.closed.load(Ordering::SeqCst) {
            self.reactors.clear();
            return Err(OwnerError::ReactorFinished);
        }
        Ok(())
    }

    /// Creates a [`ChangefeedReactor`] for every changefeed id newly observed in `state` and
    /// drops any whose entry vanished from `state` without going through the normal `Removed`
    /// path (defensive cleanup). Returns whether any reactor was newly created this tick, which
    /// forces a GC safepoint push regardless of whether the computed bound moved.
    fn sync_reactors(&mut self, state: &ReactorState) -> bool {
        let mut created_new = false;
        for id in state.changefeeds.keys() {
            if !self.reactors.contains_key(id) {
                let communicator = (self.communicator_factory)(id);
                let ddl_barrier = (self.ddl_barrier_factory)(id);
                self.reactors
                    .insert(id.clone(), ChangefeedReactor::new(id.clone(), communicator, ddl_barrier));
                created_new = true;
            }
        }
        self.reactors.retain(|id, _| state.changefeeds.contains_key(id));
        created_new
    }

    fn handle_jobs(&mut self, state: &mut ReactorState) -> OwnerResult<()> {
        let jobs: Vec<OwnerJob> = {
            let mut queue = self.job_queue.lock().unwrap();
            queue.drain(..).collect()
        };
        for job in jobs {
            match job {
                OwnerJob::Rebalance(id) => {
                    if let Some(reactor) = self.reactors.get_mut(&id) {
                        reactor.request_rebalance();
                    } else {
                        tracing::warn!(changefeed = %id, "rebalance requested for unknown changefeed");
                    }
                }
                OwnerJob::ManualSchedule {
                    changefeed_id,
                    table_id,
                    target_capture,
                } => {
                    if let Some(reactor) = self.reactors.get_mut(&changefeed_id) {
                        reactor.request_move_table(table_id, target_capture);
                    } else {
                        tracing::warn!(changefeed = %changefeed_id, "manual schedule for unknown changefeed");
                    }
                }
                OwnerJob::AdminJob(admin_job) => {
                    if let Some(reactor) = self.reactors.get_mut(&admin_job.changefeed_id) {
                        reactor.push_admin_job(admin_job);
                    } else {
                        tracing::warn!(changefeed = %admin_job.changefeed_id, "admin job for unknown changefeed");
                    }
                }
                OwnerJob::DebugInfo(sender) => {
                    let dump = format!(
                        "owner: {} changefeeds, {} captures\n",
                        state.changefeeds.len(),
                        state.captures.len()
                    );
                    let _ = sender.send(dump);
                }
                OwnerJob::Query(query, sender) => {
                    let _ = sender.send(query::answer(state, query));
                }
            }
        }
        Ok(())
    }

    /// A mismatched capture version means the cluster is mid-rolling-upgrade; scheduling
    /// decisions made against a stale or ahead capture binary could be unsafe, so the whole
    /// tick is deferred rather than risk issuing a dispatch the capture can't honor. A
    /// synchronous tick must not block the driver, so rather than sleeping in-thread this
    /// skips the tick's remaining work and relies on the driver's own tick cadence as the
    /// retry interval.
    fn find_version_mismatch<'a>(&self, state: &'a ReactorState) -> Option<&'a CaptureId> {
        state
            .captures
            .values()
            .find(|capture| capture.version != self.cluster_version)
            .map(|capture| &capture.id)
    }

    fn update_gc_safepoint(&mut self, state: &mut ReactorState, force_update: bool) -> OwnerResult<()> {
        struct MetricsSink;
        impl GcSafepointSink for MetricsSink {
            fn push_safepoint(&mut self, safepoint: Ts) -> OwnerResult<bool> {
                metrics::record_gc_safepoint(safepoint);
                Ok(true)
            }
        }
        let mut sink = MetricsSink;
        self.gsc.tick(&mut sink, state.changefeeds.values(), force_update)
    }

    fn tick_changefeeds(&mut self, state: &mut ReactorState) -> OwnerResult<()> {
        let mut reaped = Vec::new();
        for (id, reactor) in self.reactors.iter_mut() {
            let Some(cf_state) = state.changefeeds.get_mut(id) else {
                continue;
            };
            match reactor.tick(cf_state, &state.captures) {
                Ok(true) => reaped.push(id.clone()),
                Ok(false) => {
                    self.tick_error_counts.remove(id);
                }
                Err(err) => {
                    tracing::error!(changefeed = %id, error = %err, "changefeed tick failed");
                    let count = self.tick_error_counts.entry(id.clone()).or_insert(0);
                    *count += 1;
                    if *count >= MAX_CONSECUTIVE_TICK_ERRORS {
                        tracing::error!(changefeed = %id, "retries exhausted, marking failed");
                        reactor.mark_failed(cf_state);
                    }
                }
            }
        }
        for id in reaped {
            self.reactors.remove(&id);
            state.changefeeds.remove(&id);
            self.tick_error_counts.remove(&id);
        }
        Ok(())
    }
}
