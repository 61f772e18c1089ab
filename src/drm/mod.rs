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


//! DRM collaborator interfaces
//!
//! Content decryption and PDF patching are external capabilities; this
//! crate orchestrates them but never implements the cipher work itself.
//! The traits here are the call contracts, plus the exact mapping from
//! decryptor outcomes to user-facing results:
//!
//! - `Success` → the output file was produced
//! - `AlreadyDrmFree` → informational, *not* a failure; the input is left
//!   untouched and there was simply nothing to do
//! - `WrongKey` → actionable failure suggesting re-authorization
//! - `OtherFailure(code)` → failure preserving the numeric code verbatim

use crate::error::{AdeptError, Result};
use crate::file::ConfigStore;
use crate::progress::Reporter;
use std::path::Path;

/// Result of a decryption attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptOutcome {
    /// A DRM-free copy was written to the output path
    Success,
    /// The input carries no DRM; nothing was done
    AlreadyDrmFree,
    /// The supplied account key does not match the content
    WrongKey,
    /// Decryptor-specific failure code, preserved for diagnostics
    OtherFailure(i32),
}

impl DecryptOutcome {
    /// Map a conventional decryptor exit code (0 = success, 1 = DRM-free,
    /// 2 = wrong key, anything else = failure)
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => DecryptOutcome::Success,
            1 => DecryptOutcome::AlreadyDrmFree,
            2 => DecryptOutcome::WrongKey,
            other => DecryptOutcome::OtherFailure(other),
        }
    }
}

/// External content decryptor (EPUB containers)
pub trait Decryptor: Send + Sync {
    /// Decrypt `input` with the exported account key, writing the
    /// DRM-free container to `output`
    ///
    /// `Err` is reserved for environmental problems (I/O, missing
    /// decryptor); protocol-level results come back as the outcome.
    fn decrypt(&self, key: &[u8], input: &Path, output: &Path) -> Result<DecryptOutcome>;
}

/// External PDF patcher: injects a rights record into a downloaded PDF
pub trait PdfPatcher: Send + Sync {
    /// Patch `input` with the rights record and resource identifier,
    /// producing `output`
    fn patch(&self, input: &Path, rights_xml: &str, output: &Path, resource: &str) -> Result<()>;
}

/// Decrypt a container with the store's exported account key
///
/// Returns the outcome for the two non-error cases; `WrongKey` and
/// `OtherFailure` are promoted to classified errors so every caller
/// reports them uniformly.
pub async fn decrypt_file<D: Decryptor + ?Sized>(
    decryptor: &D,
    store: &ConfigStore,
    input: &Path,
    output: &Path,
    reporter: &Reporter,
) -> Result<DecryptOutcome> {
    reporter.status("Reading key file...");
    let key = store.read_account_key().await?;

    reporter.status("Decrypting...");
    let outcome = decryptor.decrypt(&key, input, output)?;
    tracing::debug!(?outcome, input = %input.display(), "decryptor finished");

    match outcome {
        DecryptOutcome::Success | DecryptOutcome::AlreadyDrmFree => Ok(outcome),
        DecryptOutcome::WrongKey => Err(AdeptError::WrongKey),
        DecryptOutcome::OtherFailure(code) => Err(AdeptError::DecryptFailed { code }),
    }
}

/// Terminal message for a non-error decrypt outcome
pub fn outcome_message(outcome: DecryptOutcome, output: &Path) -> String {
    match outcome {
        DecryptOutcome::Success => {
            format!("Successfully decrypted to: {}", output.display())
        }
        DecryptOutcome::AlreadyDrmFree => {
            "File is already DRM-free; nothing to do".to_string()
        }
        // Error outcomes never reach here; they surface as AdeptError.
        DecryptOutcome::WrongKey => AdeptError::WrongKey.to_string(),
        DecryptOutcome::OtherFailure(code) => AdeptError::DecryptFailed { code }.to_string(),
    }
}
