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

//! fleetmed-core
//!
//! The FleetMed ingestion and disclosure core for vehicle-mounted
//! telemetry devices.
//!
//! This crate implements the core contracts:
//! - Schema validation of untrusted device payloads (typed, bounds-checked)
//! - Device authentication (HMAC-SHA256 proofs, constant-time comparison)
//! - Append-only record store with a monotonic id sequence
//! - Attribute-based disclosure policy (role -> sensitivity classes)
//! - Ingestion and query services that orchestrate the above
//!
//! Transport, configuration, and operator credentials live in
//! `fleetmed-daemon`.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod device;
pub mod error;
pub mod ingest;
pub mod policy;
pub mod query;
pub mod record;
pub mod schema;
pub mod session;
pub mod store;

pub use crate::error::{AuthError, IngestError, QueryError, StorageError, ValidationError};
pub use crate::policy::{disclose, PartialRecord, Role, RoleAttributes, SensitivityClass};
pub use crate::record::{RecordId, TelemetryRecord, ValidatedPayload, VehicleId};
