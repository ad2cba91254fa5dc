// Copyright [2026] [FleetMed Contributors]
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// Copyright (c) 2026 FleetMed Contributors
// SPDX-License-Identifier: Apache-2.0

//! Durable-storage collaborator contract and the in-memory reference
//! store.
//!
//! Records are append-only: no updates, no deletes in normal operation,
//! only retention-based expiry. A record becomes visible to queries
//! only once fully committed.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::StorageError;
use crate::record::{RecordId, TelemetryRecord, ValidatedPayload, VehicleId};

/// Retrieval filter: by vehicle and/or `timestamp_received` range
/// (inclusive `from`, exclusive `to`). `limit` caps the result after
/// ordering; `newest_first` serves the dashboard's "most recent N".
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub vehicle_id: Option<VehicleId>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub newest_first: bool,
}

impl RecordFilter {
    pub fn matches(&self, record: &TelemetryRecord) -> bool {
        if let Some(vehicle_id) = &self.vehicle_id {
            if &record.vehicle_id != vehicle_id {
                return false;
            }
        }
        if let Some(from) = self.from {
            if record.timestamp_received < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if record.timestamp_received >= to {
                return false;
            }
        }
        true
    }
}

/// The durable-storage collaborator. The core defines this contract but
/// not its backing engine.
pub trait RecordStore: Send + Sync {
    /// Commit a validated payload. Atomic: either the whole record is
    /// visible with its assigned id, or nothing is.
    fn persist(
        &self,
        payload: ValidatedPayload,
        timestamp_received: DateTime<Utc>,
    ) -> Result<RecordId, StorageError>;

    fn query(&self, filter: &RecordFilter) -> Result<Vec<TelemetryRecord>, StorageError>;

    /// Retention expiry: drop records with `timestamp_received` before
    /// `cutoff`. The only permitted removal path.
    fn expire_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError>;
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    records: Vec<TelemetryRecord>,
    next_id: u64,
}

/// Append-only in-memory store. The id sequence and the append happen
/// under one brief write lock, so ids are strictly increasing and
/// readers never observe a partially-written record.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().records.is_empty()
    }
}

impl RecordStore for MemoryStore {
    fn persist(
        &self,
        payload: ValidatedPayload,
        timestamp_received: DateTime<Utc>,
    ) -> Result<RecordId, StorageError> {
        let mut inner = self.inner.write();
        inner.next_id += 1;
        let record_id = RecordId(inner.next_id);
        inner
            .records
            .push(TelemetryRecord::from_payload(payload, record_id, timestamp_received));
        Ok(record_id)
    }

    fn query(&self, filter: &RecordFilter) -> Result<Vec<TelemetryRecord>, StorageError> {
        let inner = self.inner.read();
        Ok(inner
            .records
            .iter()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect())
    }

    fn expire_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        let mut inner = self.inner.write();
        let before = inner.records.len();
        inner
            .records
            .retain(|record| record.timestamp_received >= cutoff);
        Ok(before - inner.records.len())
    }
}
