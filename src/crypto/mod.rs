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


//! Device key material and request signing
//!
//! This module holds the crypto-adjacent pieces of the authorization
//! pipeline: the per-installation device key and the RSA keypair used to
//! sign activation requests. Content encryption and decryption are *not*
//! here; those live behind the collaborator traits in [`crate::drm`].

pub mod device_key;
pub mod signer;

pub use device_key::DeviceKey;
pub use signer::{RequestSigner, RsaRequestSigner};
