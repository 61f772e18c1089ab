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


//! Error types for adept-core
//!
//! Errors are categorized by domain so that callers can react precisely:
//!
//! - **Authorization**: one variant per pipeline step (device descriptor,
//!   registration, sign-in, activation, key export). A failed step carries
//!   the server message where one was returned.
//! - **Fulfillment**: request submission, response parsing, rights
//!   building, download, content-type and PDF patching failures.
//! - **Decryption**: wrong key and numeric failure codes from the external
//!   decryptor. A DRM-free input is *not* an error and therefore has no
//!   variant here; see [`crate::drm::DecryptOutcome`].
//! - **Ambient**: I/O, HTTP, XML and archive errors converted via `#[from]`.
//!
//! Every operation terminates with exactly one classified result; raw
//! panics or opaque error chains must never be the sole explanation
//! surfaced to a front end.

use thiserror::Error;

/// Result type alias using our AdeptError type
pub type Result<T> = std::result::Result<T, AdeptError>;

/// Main error type for adept-core
#[derive(Error, Debug)]
pub enum AdeptError {
    // ===== Authorization pipeline =====

    /// Device descriptor could not be created, typically because the
    /// config store location is not writable
    #[error("Failed to create device file: {message}")]
    DeviceDescriptor { message: String },

    /// Anonymous user registration was rejected by the authorization service
    #[error("Failed to create user: {message}")]
    Registration { message: String },

    /// Credential sign-in was rejected by the authorization service
    #[error("Failed to sign in: {message}")]
    SignIn { message: String },

    /// Device activation was rejected by the authorization service
    #[error("Failed to activate device: {message}")]
    Activation { message: String },

    /// The account encryption key could not be derived or written
    #[error("Failed to export account key: {message}")]
    KeyExport { message: String },

    // ===== Fulfillment =====

    /// The fulfillment service rejected the ACSM ticket
    #[error("Fulfillment failed: {message}")]
    FulfillmentRequest { message: String },

    /// The fulfillment response could not be parsed, or is missing the
    /// download URL or license token
    #[error("Failed to parse fulfillment response: {message}")]
    MalformedResponse { message: String },

    /// A rights record could not be built from the license token
    #[error("Failed to build rights.xml: {message}")]
    RightsBuild { message: String },

    /// Content download returned a non-success HTTP status
    #[error("Download failed with error {status}")]
    Download { status: u16 },

    /// Downloaded content is neither an EPUB nor a PDF
    #[error("Unsupported file type")]
    UnsupportedContentType,

    /// The external PDF patcher reported a failure
    #[error("Failed to patch PDF: {message}")]
    PdfPatch { message: String },

    // ===== Decryption =====

    /// The exported account key does not match the content
    #[error("Failed to decrypt: wrong key")]
    WrongKey,

    /// The external decryptor failed with a numeric code; the code is
    /// preserved verbatim for diagnostics
    #[error("Decryption failed with error code {code}")]
    DecryptFailed { code: i32 },

    // ===== State =====

    /// No exported account key is present; authorization must run first
    #[error("Not authorized. Please authorize an account first.")]
    NotAuthorized,

    /// Another operation already holds the config store
    #[error("Another operation is already in progress")]
    OperationInProgress,

    /// Generic input validation error
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ===== External library errors =====

    /// HTTP client error from reqwest
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// XML reader/writer error
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// ZIP archive error
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// Helper constructors for the message-carrying variants. Server messages
// arrive as free text; `impl Into<String>` keeps call sites terse.
impl AdeptError {
    pub fn device_descriptor<S: Into<String>>(message: S) -> Self {
        AdeptError::DeviceDescriptor { message: message.into() }
    }

    pub fn registration<S: Into<String>>(message: S) -> Self {
        AdeptError::Registration { message: message.into() }
    }

    pub fn sign_in<S: Into<String>>(message: S) -> Self {
        AdeptError::SignIn { message: message.into() }
    }

    pub fn activation<S: Into<String>>(message: S) -> Self {
        AdeptError::Activation { message: message.into() }
    }

    pub fn key_export<S: Into<String>>(message: S) -> Self {
        AdeptError::KeyExport { message: message.into() }
    }

    pub fn fulfillment<S: Into<String>>(message: S) -> Self {
        AdeptError::FulfillmentRequest { message: message.into() }
    }

    pub fn malformed<S: Into<String>>(message: S) -> Self {
        AdeptError::MalformedResponse { message: message.into() }
    }

    pub fn rights<S: Into<String>>(message: S) -> Self {
        AdeptError::RightsBuild { message: message.into() }
    }

    pub fn pdf_patch<S: Into<String>>(message: S) -> Self {
        AdeptError::PdfPatch { message: message.into() }
    }

    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        AdeptError::InvalidInput(message.into())
    }

    /// Check if the error indicates the user needs to (re-)authorize
    ///
    /// Returns `true` for failures that a fresh authorization run can fix:
    /// missing or stale account keys and rejected credentials.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            AdeptError::SignIn { .. }
                | AdeptError::Activation { .. }
                | AdeptError::NotAuthorized
                | AdeptError::WrongKey
        )
    }

    /// Check if the error is transient and might succeed on retry
    pub fn is_retryable(&self) -> bool {
        match self {
            AdeptError::Http(e) => e.is_timeout() || e.is_connect(),
            AdeptError::Download { status } => (500..=599).contains(status),
            AdeptError::OperationInProgress => true,
            _ => false,
        }
    }

    /// Get user-friendly error message suitable for display
    ///
    /// Most variants already format as a single actionable sentence; the
    /// cases below add guidance a front end would otherwise have to invent.
    pub fn user_message(&self) -> String {
        match self {
            AdeptError::WrongKey => {
                "Failed to decrypt: wrong key. Re-authorize this account and try again.".to_string()
            }
            AdeptError::OperationInProgress => {
                "Another operation is already in progress. Wait for it to finish and try again."
                    .to_string()
            }
            AdeptError::Http(e) if e.is_timeout() => {
                "The server did not respond in time. Check your connection and try again."
                    .to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl From<std::string::FromUtf8Error> for AdeptError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        AdeptError::InvalidInput(format!("UTF-8 conversion error: {}", err))
    }
}

impl From<base64::DecodeError> for AdeptError {
    fn from(err: base64::DecodeError) -> Self {
        AdeptError::InvalidInput(format!("Invalid base64 data: {}", err))
    }
}
