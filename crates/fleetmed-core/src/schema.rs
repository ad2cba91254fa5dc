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

//! Structural and semantic validation of inbound device payloads.
//!
//! Checks run in a fixed order and short-circuit on the first failure:
//! required-field presence, type/range checks, device timestamp parse,
//! then the all-or-nothing patient identity pair. Nothing downstream
//! ever sees raw untyped input.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::ValidationError;
use crate::record::{GeoPoint, PatientIdentity, ValidatedPayload, VehicleId, Vitals};

const REQUIRED_FIELDS: [&str; 5] = [
    "vehicle_id",
    "timestamp_device",
    "latitude",
    "longitude",
    "speed_kmh",
];

/// Validate a raw JSON payload into a [`ValidatedPayload`].
///
/// No side effects on failure; the caller may resubmit a corrected
/// payload.
pub fn validate(raw: &Value) -> Result<ValidatedPayload, ValidationError> {
    let object = raw
        .as_object()
        .ok_or_else(|| ValidationError::new("payload", "payload must be a JSON object"))?;

    for field in REQUIRED_FIELDS {
        if !object.contains_key(field) {
            return Err(ValidationError::new_required(field));
        }
    }

    let vehicle_id = require_string(raw, "vehicle_id")?;
    if vehicle_id.is_empty() {
        return Err(ValidationError::new("vehicle_id", "must not be empty"));
    }

    let latitude = require_number(raw, "latitude")?;
    check_range("latitude", latitude, -90.0, 90.0)?;
    let longitude = require_number(raw, "longitude")?;
    check_range("longitude", longitude, -180.0, 180.0)?;

    let speed_kmh = require_number(raw, "speed_kmh")?;
    if speed_kmh < 0.0 {
        return Err(ValidationError::new("speed_kmh", "must be >= 0"));
    }

    let temperature_c = optional_number(raw, "temperature_c")?;
    let humidity_percent = optional_number(raw, "humidity_percent")?;
    if let Some(humidity) = humidity_percent {
        check_range("humidity_percent", humidity, 0.0, 100.0)?;
    }
    let heart_rate_bpm = optional_number(raw, "heart_rate_bpm")?;
    if let Some(bpm) = heart_rate_bpm {
        check_range("heart_rate_bpm", bpm, 0.0, 300.0)?;
    }
    let blood_oxygen_spo2 = optional_number(raw, "blood_oxygen_spo2")?;
    if let Some(spo2) = blood_oxygen_spo2 {
        check_range("blood_oxygen_spo2", spo2, 0.0, 100.0)?;
    }

    let timestamp_raw = require_string(raw, "timestamp_device")?;
    let timestamp_device = parse_utc_instant(timestamp_raw)?;

    let patient = validate_identity_pair(raw)?;

    Ok(ValidatedPayload {
        vehicle_id: VehicleId::new(vehicle_id),
        timestamp_device,
        location: GeoPoint {
            latitude,
            longitude,
        },
        speed_kmh,
        vitals: Vitals {
            temperature_c,
            humidity_percent,
            heart_rate_bpm,
            blood_oxygen_spo2,
        },
        patient,
    })
}

impl ValidationError {
    fn new_required(field: &'static str) -> Self {
        Self::new(field, "required field is missing")
    }
}

fn require_string<'a>(raw: &'a Value, field: &'static str) -> Result<&'a str, ValidationError> {
    raw.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ValidationError::new(field, "must be a string"))
}

fn require_number(raw: &Value, field: &'static str) -> Result<f64, ValidationError> {
    raw.get(field)
        .and_then(Value::as_f64)
        .ok_or_else(|| ValidationError::new(field, "must be a number"))
}

fn optional_number(raw: &Value, field: &'static str) -> Result<Option<f64>, ValidationError> {
    match raw.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| ValidationError::new(field, "must be a number")),
    }
}

fn optional_string<'a>(
    raw: &'a Value,
    field: &'static str,
) -> Result<Option<&'a str>, ValidationError> {
    match raw.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_str()
            .map(Some)
            .ok_or_else(|| ValidationError::new(field, "must be a string")),
    }
}

fn check_range(field: &'static str, value: f64, lo: f64, hi: f64) -> Result<(), ValidationError> {
    if value < lo || value > hi {
        return Err(ValidationError::new(
            field,
            format!("must be within [{lo}, {hi}]"),
        ));
    }
    Ok(())
}

fn parse_utc_instant(raw: &str) -> Result<DateTime<Utc>, ValidationError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| {
            ValidationError::new(
                "timestamp_device",
                "must be an ISO-8601 UTC instant (RFC 3339)",
            )
        })
}

/// Patient identity fields are all-or-nothing: a record naming a
/// patient without a medical id (or vice versa) is partially
/// identifying and rejected outright.
fn validate_identity_pair(raw: &Value) -> Result<Option<PatientIdentity>, ValidationError> {
    let name = optional_string(raw, "patient_name")?;
    let medical_id = optional_string(raw, "medical_id")?;
    match (name, medical_id) {
        (Some(name), Some(medical_id)) => Ok(Some(PatientIdentity {
            name: name.to_string(),
            medical_id: medical_id.to_string(),
        })),
        (None, None) => Ok(None),
        (Some(_), None) => Err(ValidationError::new(
            "medical_id",
            "patient_name requires medical_id",
        )),
        (None, Some(_)) => Err(ValidationError::new(
            "patient_name",
            "medical_id requires patient_name",
        )),
    }
}
