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

//! Attribute-based disclosure policy.
//!
//! Every telemetry field carries exactly one static sensitivity class;
//! a role maps to a fixed set of classes it may read. [`disclose`] is
//! pure and total: it projects a record to the fields the given
//! attributes permit, omitting everything else from the output
//! structure entirely (never present-but-masked). Routing metadata
//! (`record_id`, `vehicle_id`, `timestamp_received`) is always
//! disclosed.
//!
//! The role table is a total const function, not mutable state.
//! Extending access means adding a class to the table, not a code
//! branch or a per-user exception.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::{RecordId, TelemetryRecord, VehicleId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensitivityClass {
    Location,
    Vehicle,
    Vitals,
    Identity,
}

impl SensitivityClass {
    pub const ALL: [SensitivityClass; 4] = [
        SensitivityClass::Location,
        SensitivityClass::Vehicle,
        SensitivityClass::Vitals,
        SensitivityClass::Identity,
    ];

    const fn bit(self) -> u8 {
        match self {
            SensitivityClass::Location => 1 << 0,
            SensitivityClass::Vehicle => 1 << 1,
            SensitivityClass::Vitals => 1 << 2,
            SensitivityClass::Identity => 1 << 3,
        }
    }
}

/// Static field -> sensitivity class mapping. This is metadata about
/// the schema, not per-record state.
const FIELD_CLASSES: [(&str, SensitivityClass); 10] = [
    ("latitude", SensitivityClass::Location),
    ("longitude", SensitivityClass::Location),
    ("speed_kmh", SensitivityClass::Vehicle),
    ("timestamp_device", SensitivityClass::Vehicle),
    ("temperature_c", SensitivityClass::Vitals),
    ("humidity_percent", SensitivityClass::Vitals),
    ("heart_rate_bpm", SensitivityClass::Vitals),
    ("blood_oxygen_spo2", SensitivityClass::Vitals),
    ("patient_name", SensitivityClass::Identity),
    ("medical_id", SensitivityClass::Identity),
];

pub fn class_of_field(field: &str) -> Option<SensitivityClass> {
    FIELD_CLASSES
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, class)| *class)
}

/// The set of sensitivity classes a role may read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleAttributes(u8);

impl RoleAttributes {
    pub const EMPTY: RoleAttributes = RoleAttributes(0);

    pub const fn with(self, class: SensitivityClass) -> Self {
        RoleAttributes(self.0 | class.bit())
    }

    pub const fn all() -> Self {
        RoleAttributes::EMPTY
            .with(SensitivityClass::Location)
            .with(SensitivityClass::Vehicle)
            .with(SensitivityClass::Vitals)
            .with(SensitivityClass::Identity)
    }

    pub const fn permits(self, class: SensitivityClass) -> bool {
        self.0 & class.bit() != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Police,
    Doctor,
    Admin,
}

impl Role {
    /// Total, fixed role -> attribute mapping. No per-user overrides.
    pub const fn attributes(self) -> RoleAttributes {
        match self {
            Role::Police => RoleAttributes::EMPTY
                .with(SensitivityClass::Location)
                .with(SensitivityClass::Vehicle),
            Role::Doctor => RoleAttributes::EMPTY
                .with(SensitivityClass::Vitals)
                .with(SensitivityClass::Identity),
            Role::Admin => RoleAttributes::all(),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Police => "police",
            Role::Doctor => "doctor",
            Role::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "police" => Ok(Role::Police),
            "doctor" => Ok(Role::Doctor),
            "admin" => Ok(Role::Admin),
            _ => Err(UnknownRole),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown role; expected police, doctor, or admin")]
pub struct UnknownRole;

/// A telemetry record projected to the fields a set of attributes
/// permits. Withheld fields are absent, not null: serialization skips
/// them so they cannot leak through null-checks or logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialRecord {
    pub record_id: RecordId,
    pub vehicle_id: VehicleId,
    pub timestamp_received: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_device: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_kmh: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_c: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heart_rate_bpm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blood_oxygen_spo2: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medical_id: Option<String>,
}

impl PartialRecord {
    /// Re-apply an attribute set to an already-filtered projection.
    /// `disclose(r, a).restricted(a) == disclose(r, a)` always holds.
    pub fn restricted(&self, attrs: RoleAttributes) -> PartialRecord {
        let keep = |field: &'static str| permitted(attrs, field);
        PartialRecord {
            record_id: self.record_id,
            vehicle_id: self.vehicle_id.clone(),
            timestamp_received: self.timestamp_received,
            timestamp_device: self.timestamp_device.filter(|_| keep("timestamp_device")),
            latitude: self.latitude.filter(|_| keep("latitude")),
            longitude: self.longitude.filter(|_| keep("longitude")),
            speed_kmh: self.speed_kmh.filter(|_| keep("speed_kmh")),
            temperature_c: self.temperature_c.filter(|_| keep("temperature_c")),
            humidity_percent: self.humidity_percent.filter(|_| keep("humidity_percent")),
            heart_rate_bpm: self.heart_rate_bpm.filter(|_| keep("heart_rate_bpm")),
            blood_oxygen_spo2: self.blood_oxygen_spo2.filter(|_| keep("blood_oxygen_spo2")),
            patient_name: self.patient_name.clone().filter(|_| keep("patient_name")),
            medical_id: self.medical_id.clone().filter(|_| keep("medical_id")),
        }
    }
}

/// Fail closed: a field with no class mapping is withheld and raised as
/// an internal alert rather than disclosed. Unreachable as long as
/// `FIELD_CLASSES` covers the schema.
fn permitted(attrs: RoleAttributes, field: &'static str) -> bool {
    match class_of_field(field) {
        Some(class) => attrs.permits(class),
        None => {
            tracing::error!(field, "field has no sensitivity class mapping; withholding");
            false
        }
    }
}

/// Project `record` to the fields `attrs` permits.
///
/// Pure and total: never fails, never partially applies the policy, and
/// depends only on its two inputs.
pub fn disclose(record: &TelemetryRecord, attrs: RoleAttributes) -> PartialRecord {
    let keep = |field: &'static str| permitted(attrs, field);
    PartialRecord {
        record_id: record.record_id,
        vehicle_id: record.vehicle_id.clone(),
        timestamp_received: record.timestamp_received,
        timestamp_device: keep("timestamp_device").then_some(record.timestamp_device),
        latitude: keep("latitude").then_some(record.location.latitude),
        longitude: keep("longitude").then_some(record.location.longitude),
        speed_kmh: keep("speed_kmh").then_some(record.speed_kmh),
        temperature_c: record.vitals.temperature_c.filter(|_| keep("temperature_c")),
        humidity_percent: record
            .vitals
            .humidity_percent
            .filter(|_| keep("humidity_percent")),
        heart_rate_bpm: record
            .vitals
            .heart_rate_bpm
            .filter(|_| keep("heart_rate_bpm")),
        blood_oxygen_spo2: record
            .vitals
            .blood_oxygen_spo2
            .filter(|_| keep("blood_oxygen_spo2")),
        patient_name: record
            .patient
            .as_ref()
            .filter(|_| keep("patient_name"))
            .map(|p| p.name.clone()),
        medical_id: record
            .patient
            .as_ref()
            .filter(|_| keep("medical_id"))
            .map(|p| p.medical_id.clone()),
    }
}

/// Key-supply hook for a future cryptographic backend. When record
/// fields are stored pre-encrypted per sensitivity class, the release
/// implementation hands out decryption key material; the access-control
/// decision itself is made identically with or without encryption.
pub trait ClassKeyRelease: Send + Sync {
    fn key_for(&self, class: SensitivityClass) -> Option<Vec<u8>>;
}

/// Default hook for plaintext storage: releases nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoKeyRelease;

impl ClassKeyRelease for NoKeyRelease {
    fn key_for(&self, _class: SensitivityClass) -> Option<Vec<u8>> {
        None
    }
}

/// [`disclose`], additionally supplying key material for exactly the
/// classes the attributes permit. The hook is never consulted for a
/// class the caller is not entitled to.
pub fn disclose_with_keys(
    record: &TelemetryRecord,
    attrs: RoleAttributes,
    release: &dyn ClassKeyRelease,
) -> (PartialRecord, Vec<(SensitivityClass, Vec<u8>)>) {
    let keys = SensitivityClass::ALL
        .into_iter()
        .filter(|class| attrs.permits(*class))
        .filter_map(|class| release.key_for(class).map(|key| (class, key)))
        .collect();
    (disclose(record, attrs), keys)
}
