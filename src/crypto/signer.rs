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


//! Request signing for activation traffic
//!
//! Registration, sign-in and activation requests carry a signature over
//! the request payload, made with an RSA auth keypair generated during
//! authorization. The keypair is embedded (base64 DER) in the activation
//! record so a device can later prove it is the same installation.
//!
//! The [`RequestSigner`] trait is the seam: the pipeline never touches key
//! algebra directly, and tests substitute a canned signer.

use crate::error::{AdeptError, Result};
use base64::{engine::general_purpose, Engine as _};
use pkcs8::spki::EncodePublicKey;
use pkcs8::{DecodePrivateKey, EncodePrivateKey};
use rsa::pkcs1v15::SigningKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

/// RSA modulus size for device auth keys
const RSA_BITS: usize = 1024;

/// Signs authorization request payloads and exposes the auth keypair
/// in the base64-DER form the protocol envelopes embed.
pub trait RequestSigner: Send + Sync {
    /// Sign a payload, returning the signature as base64
    fn sign_b64(&self, payload: &[u8]) -> Result<String>;

    /// Public auth key as base64 SubjectPublicKeyInfo DER
    fn public_key_b64(&self) -> Result<String>;

    /// Private auth key as base64 PKCS#8 DER, for the activation record
    fn private_key_b64(&self) -> Result<String>;
}

/// Default signer backed by an in-memory RSA keypair
pub struct RsaRequestSigner {
    signing_key: SigningKey<Sha256>,
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
}

impl RsaRequestSigner {
    /// Generate a fresh auth keypair
    pub fn generate() -> Result<Self> {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, RSA_BITS)
            .map_err(|e| AdeptError::invalid_input(format!("RSA key generation failed: {}", e)))?;
        Ok(Self::from_private_key(private_key))
    }

    /// Rebuild a signer from base64 PKCS#8 DER, as stored in an
    /// activation record
    pub fn from_private_key_b64(der_b64: &str) -> Result<Self> {
        let der = general_purpose::STANDARD.decode(der_b64.trim())?;
        let private_key = RsaPrivateKey::from_pkcs8_der(&der)
            .map_err(|e| AdeptError::invalid_input(format!("Invalid auth key DER: {}", e)))?;
        Ok(Self::from_private_key(private_key))
    }

    fn from_private_key(private_key: RsaPrivateKey) -> Self {
        let public_key = RsaPublicKey::from(&private_key);
        Self {
            signing_key: SigningKey::new(private_key.clone()),
            private_key,
            public_key,
        }
    }
}

impl RequestSigner for RsaRequestSigner {
    fn sign_b64(&self, payload: &[u8]) -> Result<String> {
        let signature = self
            .signing_key
            .try_sign(payload)
            .map_err(|e| AdeptError::invalid_input(format!("Signing failed: {}", e)))?;
        Ok(general_purpose::STANDARD.encode(signature.to_vec()))
    }

    fn public_key_b64(&self) -> Result<String> {
        let der = self
            .public_key
            .to_public_key_der()
            .map_err(|e| AdeptError::invalid_input(format!("Public key encoding failed: {}", e)))?;
        Ok(general_purpose::STANDARD.encode(der.as_bytes()))
    }

    fn private_key_b64(&self) -> Result<String> {
        let der = self
            .private_key
            .to_pkcs8_der()
            .map_err(|e| AdeptError::invalid_input(format!("Private key encoding failed: {}", e)))?;
        Ok(general_purpose::STANDARD.encode(der.as_bytes()))
    }
}
