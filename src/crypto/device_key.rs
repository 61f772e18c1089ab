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


//! Per-installation device key material
//!
//! # What is the device key?
//! - 16 random bytes generated once per installation
//! - Seeds the device fingerprint that every descriptor and activation
//!   request embeds
//! - Stored raw in the config store (`devicesalt`)
//! - Regenerating it invalidates every prior activation bound to this
//!   device, so an existing key must always be reused
//!
//! # Storage
//! - Persisted as exactly [`DeviceKey::LEN`] raw bytes
//! - Never log or expose in plaintext; use [`DeviceKey::masked`] in
//!   diagnostics

use crate::error::{AdeptError, Result};
use rand::RngCore;

/// Newtype wrapper around device key material to provide type safety
///
/// The wrapper guarantees the key is always exactly 16 bytes and keeps
/// accidental `Debug`/log exposure from printing the raw material.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DeviceKey([u8; Self::LEN]);

impl DeviceKey {
    /// Key material length in bytes
    pub const LEN: usize = 16;

    /// Create a DeviceKey from a 16-byte array
    pub fn new(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    /// Generate fresh key material from the OS RNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; Self::LEN];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Parse key material from a raw byte slice
    ///
    /// # Errors
    /// - `InvalidInput` if the slice is not exactly 16 bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; Self::LEN] = bytes.try_into().map_err(|_| {
            AdeptError::invalid_input(format!(
                "Device key must be {} bytes, got {}",
                Self::LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    /// Parse key material from a hex string (32 characters, case-insensitive)
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str.trim())
            .map_err(|e| AdeptError::invalid_input(format!("Invalid hex device key: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    /// Format key material as an uppercase hex string
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }

    /// Abbreviated form safe for logs: first two bytes, rest elided
    pub fn masked(&self) -> String {
        format!("{:02X}{:02X}…", self.0[0], self.0[1])
    }
}

// Manual Debug so key material never lands in logs or panic output.
impl std::fmt::Debug for DeviceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DeviceKey({})", self.masked())
    }
}
