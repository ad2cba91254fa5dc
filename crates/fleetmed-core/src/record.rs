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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique vehicle/device identifier, registered out-of-band.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleId(String);

impl VehicleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VehicleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Monotonic record identifier, assigned by the store at persistence.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct RecordId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Environmental and patient vitals. Individual members are optional;
/// a basic (non-medical) vehicle may report none of them.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vitals {
    pub temperature_c: Option<f64>,
    pub humidity_percent: Option<f64>,
    pub heart_rate_bpm: Option<f64>,
    pub blood_oxygen_spo2: Option<f64>,
}

/// Patient identity pair. All-or-nothing: the validator rejects a
/// payload carrying one member without the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientIdentity {
    pub name: String,
    pub medical_id: String,
}

/// A device payload that has passed every validator check. Carries only
/// typed, bounds-checked fields; raw untrusted input never travels past
/// the validator.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedPayload {
    pub vehicle_id: VehicleId,
    pub timestamp_device: DateTime<Utc>,
    pub location: GeoPoint,
    pub speed_kmh: f64,
    pub vitals: Vitals,
    pub patient: Option<PatientIdentity>,
}

/// A committed telemetry record. Immutable after creation; the store
/// owns it and never updates it in place. `timestamp_received` is
/// server-assigned and authoritative for ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub record_id: RecordId,
    pub vehicle_id: VehicleId,
    pub timestamp_device: DateTime<Utc>,
    pub timestamp_received: DateTime<Utc>,
    pub location: GeoPoint,
    pub speed_kmh: f64,
    pub vitals: Vitals,
    pub patient: Option<PatientIdentity>,
}

impl TelemetryRecord {
    pub fn from_payload(
        payload: ValidatedPayload,
        record_id: RecordId,
        timestamp_received: DateTime<Utc>,
    ) -> Self {
        Self {
            record_id,
            vehicle_id: payload.vehicle_id,
            timestamp_device: payload.timestamp_device,
            timestamp_received,
            location: payload.location,
            speed_kmh: payload.speed_kmh,
            vitals: payload.vitals,
            patient: payload.patient,
        }
    }
}
