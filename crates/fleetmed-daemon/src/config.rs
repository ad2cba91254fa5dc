use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use fleetmed_core::device::DeviceRegistry;
use fleetmed_core::policy::Role;
use fleetmed_core::record::VehicleId;
use fleetmed_core::session::{Credentials, Principal, UserAuthenticator, UserId};

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub max_body_bytes: usize,
    pub ingest_timeout_ms: u64,
    pub retention_days: Option<u32>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 16_384,
            ingest_timeout_ms: 2_000,
            retention_days: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("device {vehicle_id}: key must be valid hex")]
    BadDeviceKey { vehicle_id: String },
}

#[derive(Debug, Deserialize)]
struct DeviceFile {
    devices: BTreeMap<String, DeviceFileEntry>,
}

#[derive(Debug, Deserialize)]
struct DeviceFileEntry {
    key_hex: String,
    #[serde(default)]
    revoked: bool,
}

/// Load the out-of-band device registration file:
/// `{"devices": {"<vehicle_id>": {"key_hex": "...", "revoked": false}}}`.
pub fn load_device_registry(path: &Path) -> Result<DeviceRegistry, ConfigError> {
    let payload = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_device_registry(&payload).map_err(|err| match err {
        ConfigError::Parse { source, .. } => ConfigError::Parse {
            path: path.display().to_string(),
            source,
        },
        other => other,
    })
}

pub fn parse_device_registry(payload: &str) -> Result<DeviceRegistry, ConfigError> {
    let file: DeviceFile = serde_json::from_str(payload).map_err(|source| ConfigError::Parse {
        path: String::new(),
        source,
    })?;
    let mut registry = DeviceRegistry::new();
    for (vehicle_id, entry) in file.devices {
        let key = hex::decode(&entry.key_hex).map_err(|_| ConfigError::BadDeviceKey {
            vehicle_id: vehicle_id.clone(),
        })?;
        let id = VehicleId::new(vehicle_id);
        registry.register(id.clone(), key);
        if entry.revoked {
            registry.revoke(&id);
        }
    }
    Ok(registry)
}

#[derive(Debug, Deserialize)]
struct OperatorFile {
    tokens: BTreeMap<String, OperatorFileEntry>,
}

#[derive(Debug, Deserialize)]
struct OperatorFileEntry {
    user_id: String,
    role: Role,
}

/// Stand-in for the external login/session subsystem: a static mapping
/// of bearer tokens to `(user_id, role)`.
#[derive(Debug, Default)]
pub struct TokenDirectory {
    tokens: HashMap<String, Principal>,
}

impl TokenDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, token: impl Into<String>, user_id: impl Into<String>, role: Role) {
        self.tokens.insert(
            token.into(),
            Principal {
                user_id: UserId::new(user_id),
                role,
            },
        );
    }
}

impl UserAuthenticator for TokenDirectory {
    fn authenticate_user(&self, credentials: &Credentials) -> Option<Principal> {
        self.tokens.get(&credentials.token).cloned()
    }
}

pub fn load_operator_tokens(path: &Path) -> Result<TokenDirectory, ConfigError> {
    let payload = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_operator_tokens(&payload).map_err(|err| match err {
        ConfigError::Parse { source, .. } => ConfigError::Parse {
            path: path.display().to_string(),
            source,
        },
        other => other,
    })
}

pub fn parse_operator_tokens(payload: &str) -> Result<TokenDirectory, ConfigError> {
    let file: OperatorFile = serde_json::from_str(payload).map_err(|source| ConfigError::Parse {
        path: String::new(),
        source,
    })?;
    let mut directory = TokenDirectory::new();
    for (token, entry) in file.tokens {
        directory.insert(token, entry.user_id, entry.role);
    }
    Ok(directory)
}
