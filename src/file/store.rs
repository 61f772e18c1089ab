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


//! Config store: the per-user directory holding device and account state
//!
//! # Layout
//! ```text
//! ~/.deacsm/
//!   devicesalt        device key material (16 raw bytes)
//!   device.xml        device descriptor
//!   activation.xml    activation record
//!   adobekey.der      exported account encryption key
//! ```
//!
//! The exported key file is the sole authorization signal: readers check
//! nothing but its presence. All writes go through write-to-temp plus
//! rename-into-place so a concurrent reader never observes a half-written
//! file. The store also carries the operation lock that keeps authorize,
//! fulfill and decrypt from running against it at the same time.
//!
//! Every operation takes the store (and with it the base path) explicitly;
//! nothing in this crate changes the process working directory.

use crate::crypto::DeviceKey;
use crate::error::{AdeptError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Device key material file name
pub const DEVICE_KEY_FILE: &str = "devicesalt";

/// Device descriptor file name
pub const DEVICE_DESCRIPTOR_FILE: &str = "device.xml";

/// Activation record file name
pub const ACTIVATION_FILE: &str = "activation.xml";

/// Exported account encryption key file name
pub const ACCOUNT_KEY_FILE: &str = "adobekey.der";

/// Default config directory name under the user's home
const DEFAULT_DIR_NAME: &str = ".deacsm";

/// Per-user config directory with atomic replace semantics
#[derive(Debug)]
pub struct ConfigStore {
    base: PathBuf,
    op_lock: Arc<Mutex<()>>,
}

impl ConfigStore {
    /// Create a store rooted at an explicit directory
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        Self {
            base: base.into(),
            op_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Default per-user location (`~/.deacsm`)
    pub fn default_dir() -> PathBuf {
        match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(DEFAULT_DIR_NAME),
            None => PathBuf::from(DEFAULT_DIR_NAME),
        }
    }

    /// Open the store at the default per-user location
    pub fn open_default() -> Self {
        Self::new(Self::default_dir())
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn device_key_path(&self) -> PathBuf {
        self.base.join(DEVICE_KEY_FILE)
    }

    pub fn descriptor_path(&self) -> PathBuf {
        self.base.join(DEVICE_DESCRIPTOR_FILE)
    }

    pub fn activation_path(&self) -> PathBuf {
        self.base.join(ACTIVATION_FILE)
    }

    pub fn account_key_path(&self) -> PathBuf {
        self.base.join(ACCOUNT_KEY_FILE)
    }

    /// Create the base directory if missing
    pub async fn ensure_exists(&self) -> Result<()> {
        fs::create_dir_all(&self.base).await?;
        Ok(())
    }

    /// Whether an exported account key is present
    ///
    /// File existence is the authorization signal; the key contents are
    /// only read when decryption actually needs them.
    pub fn is_authorized(&self) -> bool {
        self.account_key_path().exists()
    }

    /// Claim the store for one operation, or refuse if one is in flight
    ///
    /// Front ends are expected to disable re-entry, but the store refuses
    /// it as well rather than queueing a second operation.
    pub fn try_lock_operation(&self) -> Result<OwnedMutexGuard<()>> {
        Arc::clone(&self.op_lock)
            .try_lock_owned()
            .map_err(|_| AdeptError::OperationInProgress)
    }

    /// Atomic write: write to a temp file in the same directory, flush,
    /// then rename into place
    pub async fn atomic_write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| AdeptError::invalid_input(format!("Invalid path: {}", path.display())))?;
        let temp_path = path.with_file_name(format!(".{}.tmp", file_name));

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(contents).await?;
        file.flush().await?;
        drop(file);

        fs::rename(&temp_path, path).await?;
        Ok(())
    }

    // ----- device key material -----

    /// Load existing key material, if any
    pub async fn read_device_key(&self) -> Result<Option<DeviceKey>> {
        match fs::read(self.device_key_path()).await {
            Ok(bytes) => Ok(Some(DeviceKey::from_bytes(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn write_device_key(&self, key: &DeviceKey) -> Result<()> {
        self.atomic_write(&self.device_key_path(), key.as_bytes())
            .await
    }

    // ----- device descriptor -----

    pub async fn read_descriptor(&self) -> Result<Option<String>> {
        read_optional_string(&self.descriptor_path()).await
    }

    pub async fn write_descriptor(&self, xml: &str) -> Result<()> {
        self.atomic_write(&self.descriptor_path(), xml.as_bytes())
            .await
    }

    // ----- activation record -----

    pub async fn read_activation(&self) -> Result<Option<String>> {
        read_optional_string(&self.activation_path()).await
    }

    pub async fn write_activation(&self, xml: &str) -> Result<()> {
        self.atomic_write(&self.activation_path(), xml.as_bytes())
            .await
    }

    // ----- exported account key -----

    pub async fn read_account_key(&self) -> Result<Vec<u8>> {
        match fs::read(self.account_key_path()).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(AdeptError::NotAuthorized),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn write_account_key(&self, der: &[u8]) -> Result<()> {
        self.atomic_write(&self.account_key_path(), der).await
    }

    /// Explicit reset: delete all device and account state
    ///
    /// This is the only path that removes device key material.
    pub async fn reset(&self) -> Result<()> {
        for path in [
            self.device_key_path(),
            self.descriptor_path(),
            self.activation_path(),
            self.account_key_path(),
        ] {
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

async fn read_optional_string(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
