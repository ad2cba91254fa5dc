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

//! Ingestion orchestration: validate, authenticate, cross-check, stamp,
//! persist. Any failure at any stage aborts with nothing persisted.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::device::{DeviceProof, DeviceRegistry};
use crate::error::{IngestError, ValidationError};
use crate::record::{RecordId, VehicleId};
use crate::schema;
use crate::store::RecordStore;

/// Source of the authoritative `timestamp_received`. Swappable so tests
/// can pin ordering deterministically.
pub trait IngestClock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl IngestClock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub struct IngestService {
    registry: Arc<RwLock<DeviceRegistry>>,
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn IngestClock>,
}

impl IngestService {
    pub fn new(
        registry: Arc<RwLock<DeviceRegistry>>,
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn IngestClock>,
    ) -> Self {
        Self {
            registry,
            store,
            clock,
        }
    }

    /// Ingest one device submission.
    ///
    /// `claimed` is the identity asserted at the transport layer; the
    /// proof is verified against that identity's registered key, and
    /// the payload's own `vehicle_id` must match it, so one device
    /// cannot submit data under another vehicle's name. Identical
    /// retransmissions are accepted as distinct records; lossy device
    /// networks retry by design.
    pub fn ingest(
        &self,
        raw: &[u8],
        claimed: &VehicleId,
        proof: &DeviceProof,
    ) -> Result<RecordId, IngestError> {
        self.ingest_with_deadline(raw, claimed, proof, None)
    }

    /// [`ingest`](Self::ingest) with a processing deadline. The
    /// deadline is checked once, immediately before the commit: past
    /// that point the store call runs to completion, so a returned
    /// [`IngestError::DeadlineExceeded`] guarantees nothing was
    /// persisted, and any other outcome reflects what the store did.
    pub fn ingest_with_deadline(
        &self,
        raw: &[u8],
        claimed: &VehicleId,
        proof: &DeviceProof,
        deadline: Option<std::time::Instant>,
    ) -> Result<RecordId, IngestError> {
        let value: serde_json::Value = serde_json::from_slice(raw)
            .map_err(|_| ValidationError::new("payload", "body is not valid JSON"))?;
        let payload = schema::validate(&value)?;

        let token = self
            .registry
            .read()
            .authenticate(claimed, proof, raw)
            .map_err(|err| {
                tracing::warn!(vehicle_id = %claimed, kind = %err, "device authentication failed");
                err
            })?;
        if token.vehicle_id() != &payload.vehicle_id {
            tracing::warn!(
                claimed = %claimed,
                payload_vehicle = %payload.vehicle_id,
                "payload vehicle_id does not match authenticated device"
            );
            return Err(crate::error::AuthError::VehicleMismatch.into());
        }

        if deadline.is_some_and(|deadline| std::time::Instant::now() >= deadline) {
            tracing::warn!(vehicle_id = %claimed, "processing deadline passed before commit");
            return Err(IngestError::DeadlineExceeded);
        }

        let timestamp_received = self.clock.now();
        let record_id = self.store.persist(payload, timestamp_received)?;
        tracing::debug!(vehicle_id = %claimed, record_id = record_id.0, "record committed");
        Ok(record_id)
    }
}
