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


//! Adobe Digital Editions DRM lifecycle for a single user and device:
//! device registration, account activation, ACSM fulfillment and
//! decryption of DRM-wrapped containers with the exported account key.
//!
//! The two centerpieces are the authorization pipeline
//! ([`api::auth::authorize`]), a strictly ordered device/account state
//! machine, and the fulfillment handler ([`api::fulfillment::fulfill`]),
//! which turns an ACSM ticket into a rights-carrying EPUB or patched PDF.
//! Cryptographic primitives, PDF patching and EPUB content decryption are
//! external collaborators behind the traits in [`drm`] and
//! [`crypto::signer`]; this crate owns the orchestration, the persisted
//! device/account state and the error taxonomy.

pub mod api;
pub mod crypto;
pub mod device;
pub mod drm;
pub mod error;
pub mod file;
pub mod progress;
pub mod worker;

// Re-export the types most front ends need
pub use api::{
    authorize, fulfill, AccountSession, AuthConfig, AuthType, AuthorizeRequest, Credentials,
    FulfilledFile, HttpTransport, Transport,
};
pub use device::AdeVersion;
pub use drm::{DecryptOutcome, Decryptor, PdfPatcher};
pub use error::{AdeptError, Result};
pub use file::{ConfigStore, ContentKind};
pub use progress::{ProgressEvent, Reporter};
