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

//! Device registry and submission authentication.
//!
//! Each registered vehicle carries a shared secret. A submission proof
//! is HMAC-SHA256 over the raw request body; verification is a keyed
//! lookup plus a constant-time comparison, with no I/O on the hot
//! ingestion path.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::error::AuthError;
use crate::record::VehicleId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Active,
    Revoked,
}

#[derive(Debug, Clone)]
struct DeviceEntry {
    key: Vec<u8>,
    status: DeviceStatus,
}

/// A proof accompanying a device submission. Holds raw signature bytes;
/// deliberately has no `Display` so it cannot end up in error messages
/// or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceProof(Vec<u8>);

impl DeviceProof {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Debug for DeviceProof {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DeviceProof(..)")
    }
}

/// Authorization scoped to exactly one vehicle. Only this module can
/// mint one, so a token is proof that authentication succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceToken {
    vehicle_id: VehicleId,
}

impl DeviceToken {
    pub fn vehicle_id(&self) -> &VehicleId {
        &self.vehicle_id
    }
}

/// Registered vehicles keyed by id. Entries are immutable once created
/// except for revocation.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: HashMap<VehicleId, DeviceEntry>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, vehicle_id: VehicleId, key: Vec<u8>) {
        self.devices.insert(
            vehicle_id,
            DeviceEntry {
                key,
                status: DeviceStatus::Active,
            },
        );
    }

    /// Revoke a compromised device. Subsequent authentications fail
    /// immediately with [`AuthError::RevokedDevice`].
    pub fn revoke(&mut self, vehicle_id: &VehicleId) -> bool {
        match self.devices.get_mut(vehicle_id) {
            Some(entry) => {
                entry.status = DeviceStatus::Revoked;
                true
            }
            None => false,
        }
    }

    pub fn status(&self, vehicle_id: &VehicleId) -> Option<DeviceStatus> {
        self.devices.get(vehicle_id).map(|entry| entry.status)
    }

    /// Verify that `proof` is HMAC-SHA256 over `message` under the
    /// secret registered for `vehicle_id`. On success the returned
    /// token is scoped to that vehicle only.
    pub fn authenticate(
        &self,
        vehicle_id: &VehicleId,
        proof: &DeviceProof,
        message: &[u8],
    ) -> Result<DeviceToken, AuthError> {
        let entry = self
            .devices
            .get(vehicle_id)
            .ok_or(AuthError::UnknownDevice)?;
        if entry.status == DeviceStatus::Revoked {
            return Err(AuthError::RevokedDevice);
        }

        let expected = hmac_sha256(&entry.key, message);
        if constant_time_eq(expected.as_slice(), proof.0.as_slice()) {
            Ok(DeviceToken {
                vehicle_id: vehicle_id.clone(),
            })
        } else {
            Err(AuthError::InvalidProof)
        }
    }
}

pub fn hmac_sha256(secret: &[u8], message: &[u8]) -> [u8; 32] {
    const BLOCK_SIZE: usize = 64;
    let mut key_block = [0u8; BLOCK_SIZE];
    if secret.len() > BLOCK_SIZE {
        let digest = Sha256::digest(secret);
        key_block[..digest.len()].copy_from_slice(&digest);
    } else {
        key_block[..secret.len()].copy_from_slice(secret);
    }

    let mut o_key_pad = [0u8; BLOCK_SIZE];
    let mut i_key_pad = [0u8; BLOCK_SIZE];
    for i in 0..BLOCK_SIZE {
        o_key_pad[i] = key_block[i] ^ 0x5c;
        i_key_pad[i] = key_block[i] ^ 0x36;
    }

    let mut inner = Sha256::new();
    inner.update(i_key_pad);
    inner.update(message);
    let inner_hash = inner.finalize();

    let mut outer = Sha256::new();
    outer.update(o_key_pad);
    outer.update(inner_hash);
    outer.finalize().into()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (&x, &y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
