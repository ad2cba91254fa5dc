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

//! Query orchestration: retrieval, then mandatory policy filtering.
//!
//! No record leaves this module unfiltered; there is no query path that
//! bypasses [`disclose`].

use std::sync::Arc;

use crate::error::QueryError;
use crate::policy::{disclose, PartialRecord, RoleAttributes};
use crate::record::{TelemetryRecord, VehicleId};
use crate::session::Principal;
use crate::store::{RecordFilter, RecordStore};

pub struct QueryService {
    store: Arc<dyn RecordStore>,
}

/// Lazy, finite stream of policy-filtered records. Not restartable: a
/// fresh `query` call re-reads current store state.
pub struct Disclosures {
    records: std::vec::IntoIter<TelemetryRecord>,
    attrs: RoleAttributes,
}

impl Iterator for Disclosures {
    type Item = PartialRecord;

    fn next(&mut self) -> Option<PartialRecord> {
        self.records.next().map(|record| disclose(&record, self.attrs))
    }
}

impl QueryService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Matching records in `timestamp_received` order (ties broken by
    /// `record_id` ascending), each projected to what the principal's
    /// role may see.
    pub fn query(
        &self,
        principal: &Principal,
        filter: &RecordFilter,
    ) -> Result<Disclosures, QueryError> {
        let mut records = self.store.query(filter)?;
        records.sort_by_key(|record| (record.timestamp_received, record.record_id));
        if filter.newest_first {
            records.reverse();
        }
        if let Some(limit) = filter.limit {
            records.truncate(limit);
        }
        Ok(Disclosures {
            records: records.into_iter(),
            attrs: principal.role.attributes(),
        })
    }

    /// The most recent record per vehicle, for the dispatch overview.
    /// Filtered by the same policy engine as every other read; each
    /// role sees exactly its permitted fields.
    pub fn latest_per_vehicle(
        &self,
        principal: &Principal,
    ) -> Result<Vec<PartialRecord>, QueryError> {
        let records = self.store.query(&RecordFilter::default())?;
        let mut latest: std::collections::BTreeMap<VehicleId, TelemetryRecord> =
            std::collections::BTreeMap::new();
        for record in records {
            let key = (record.timestamp_received, record.record_id);
            match latest.get(&record.vehicle_id) {
                Some(current) if (current.timestamp_received, current.record_id) >= key => {}
                _ => {
                    latest.insert(record.vehicle_id.clone(), record);
                }
            }
        }
        let attrs = principal.role.attributes();
        Ok(latest
            .into_values()
            .map(|record| disclose(&record, attrs))
            .collect())
    }
}
