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

//! The Table Record Store (TRS): the index from `TableId` to its owning
//! capture and dispatch status, owned exclusively by a
//! [`crate::dispatcher::ScheduleDispatcher`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::{CaptureId, TableId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableStatus {
    /// `DispatchTable(isDelete=false)` issued, not yet acknowledged.
    AddingTable,
    /// Acknowledged add; steady state.
    RunningTable,
    /// `DispatchTable(isDelete=true)` issued, not yet acknowledged.
    RemovingTable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRecord {
    pub table_id: TableId,
    pub capture_id: CaptureId,
    pub status: TableStatus,
}

/// In-memory index from `TableId` to its [`TableRecord`]. At most one record per table.
#[derive(Debug, Default)]
pub struct TableRecordStore {
    tables: BTreeMap<TableId, TableRecord>,
}

impl TableRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: TableId) -> Option<&TableRecord> {
        self.tables.get(&id)
    }

    pub fn contains(&self, id: TableId) -> bool {
        self.tables.contains_key(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TableRecord> {
        self.tables.values()
    }

    pub fn insert(&mut self, table_id: TableId, capture_id: CaptureId, status: TableStatus) {
        self.tables.insert(
            table_id,
            TableRecord {
                table_id,
                capture_id,
                status,
            },
        );
    }

    pub fn remove(&mut self, id: TableId) -> Option<TableRecord> {
        self.tables.remove(&id)
    }

    pub fn set_status(&mut self, id: TableId, status: TableStatus) {
        if let Some(record) = self.tables.get_mut(&id) {
            record.status = status;
        }
    }

    pub fn tables_of<'a>(&'a self, capture_id: &'a CaptureId) -> impl Iterator<Item = &'a TableRecord> + 'a {
        self.tables
            .values()
            .filter(move |record| &record.capture_id == capture_id)
    }

    /// Count of non-`RemovingTable` records owned by `capture_id`; used by the load-balancing
    /// rule to pick the least-loaded capture for a new assignment.
    pub fn load_of(&self, capture_id: &CaptureId) -> usize {
        self.tables_of(capture_id)
            .filter(|record| record.status != TableStatus::RemovingTable)
            .count()
    }

    pub fn by_status(&self, status: TableStatus) -> impl Iterator<Item = &TableRecord> {
        self.tables.values().filter(move |record| record.status == status)
    }

    pub fn has_pending(&self) -> bool {
        self.tables
            .values()
            .any(|record| record.status != TableStatus::RunningTable)
    }

    pub fn running_count_by_capture(&self) -> BTreeMap<CaptureId, usize> {
        let mut counts = BTreeMap::new();
        for record in self.by_status(TableStatus::RunningTable) {
            *counts.entry(record.capture_id.clone()).or_insert(0) += 1;
        }
        counts
    }
}
