// Adept Core - Adobe Digital Editions DRM Lifecycle Client
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Device identity lifecycle
//!
//! A device identity is the pair of key material (`devicesalt`) and
//! descriptor (`device.xml`). The serial and fingerprint are derived
//! deterministically from the key material, which makes the pair's
//! consistency checkable: a descriptor whose fingerprint does not match
//! the key on disk is stale and gets rebuilt.
//!
//! Key material is strictly load-or-generate. Regenerating an existing
//! key would orphan every activation bound to this device, so an existing
//! `devicesalt` always wins.

use crate::api::xml::{first_text, ADEPT_NS};
use crate::crypto::DeviceKey;
use crate::device::descriptor::{build_descriptor, AdeVersion};
use crate::error::{AdeptError, Result};
use crate::file::ConfigStore;
use base64::{engine::general_purpose, Engine as _};
use sha2::{Digest, Sha256};

/// A complete, on-disk device identity
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    key: DeviceKey,
    serial: String,
    fingerprint: String,
    descriptor: String,
}

impl DeviceIdentity {
    /// Ensure key material and descriptor both exist and are mutually
    /// consistent, creating or rebuilding whatever is missing
    ///
    /// # Errors
    /// - `DeviceDescriptor` when the config store cannot be written
    pub async fn ensure(store: &ConfigStore, version: AdeVersion) -> Result<Self> {
        let key = ensure_device_key(store).await?;

        let serial = derive_serial(&key);
        let fingerprint = derive_fingerprint(&key, &serial);

        if let Some(existing) = store.read_descriptor().await? {
            let on_disk = first_text(&existing, ADEPT_NS, "fingerprint")
                .ok()
                .flatten();
            if on_disk.as_deref() == Some(fingerprint.as_str()) {
                return Ok(Self {
                    key,
                    serial,
                    fingerprint,
                    descriptor: existing,
                });
            }
            tracing::warn!("device descriptor is stale, rebuilding");
        }

        let descriptor = build_descriptor(&serial, &device_name(), &fingerprint, version);
        store
            .write_descriptor(&descriptor)
            .await
            .map_err(|e| AdeptError::device_descriptor(e.to_string()))?;

        Ok(Self {
            key,
            serial,
            fingerprint,
            descriptor,
        })
    }

    pub fn key(&self) -> &DeviceKey {
        &self.key
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }
}

/// Load existing device key material or generate and persist fresh bytes
pub async fn ensure_device_key(store: &ConfigStore) -> Result<DeviceKey> {
    store
        .ensure_exists()
        .await
        .map_err(|e| AdeptError::device_descriptor(e.to_string()))?;

    if let Some(existing) = store.read_device_key().await? {
        tracing::debug!(key = %existing.masked(), "reusing existing device key");
        return Ok(existing);
    }

    let key = DeviceKey::generate();
    store
        .write_device_key(&key)
        .await
        .map_err(|e| AdeptError::device_descriptor(e.to_string()))?;
    tracing::info!("generated new device key material");
    Ok(key)
}

/// Device serial: first eight bytes of SHA-256 over the key material
fn derive_serial(key: &DeviceKey) -> String {
    let digest = Sha256::digest(key.as_bytes());
    hex::encode_upper(&digest[..8])
}

/// Device fingerprint: base64 SHA-256 over key material and serial
fn derive_fingerprint(key: &DeviceKey, serial: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update(serial.as_bytes());
    general_purpose::STANDARD.encode(hasher.finalize())
}

fn device_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "standalone".to_string())
}
