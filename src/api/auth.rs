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


//! Authorization pipeline
//!
//! Turns a device plus optional Adobe ID credentials into an authorized
//! account whose encryption key is exported to the config store. The
//! pipeline is a strict sequence; each step is a precondition for the
//! next and failure aborts the chain with that step's classified error:
//!
//! 1. device key generation (idempotent; an existing key is always reused)
//! 2. device descriptor creation
//! 3. anonymous user registration
//! 4. credential sign-in (skipped entirely for anonymous authorization)
//! 5. device activation
//! 6. account key export
//!
//! Progress through the chain is tracked as an [`AuthStep`] so partial
//! failures are precise: device files written in steps 1–2 stay on disk
//! and a retry picks them up unchanged; steps 3–6 are safely redone. No
//! [`AccountSession`] exists until step 6 has completed; the exported
//! key file is what the rest of the crate treats as "authorized".
//!
//! The sign-in password is used to build one request body and never
//! persisted or logged.

use crate::api::client::{Transport, XmlResponse};
use crate::api::xml::{
    capture_element, first_text, parse_error_response, ADEPT_NS,
};
use crate::crypto::signer::{RequestSigner, RsaRequestSigner};
use crate::device::{AdeVersion, DeviceIdentity};
use crate::error::{AdeptError, Result};
use crate::file::ConfigStore;
use crate::progress::Reporter;
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use quick_xml::escape::escape;
use std::path::PathBuf;

/// Production authorization service base URL
pub const DEFAULT_AUTH_BASE_URL: &str = "https://adeactivate.adobe.com/adept";

/// How far in the future signed requests expire
const REQUEST_EXPIRATION_MINUTES: i64 = 10;

/// How the account is authorized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    /// Full Adobe ID account (email + password)
    AdobeAccount,
    /// Anonymous authorization bound to this device only
    Anonymous,
}

impl AuthType {
    /// Method string sent in sign-in requests
    fn method(&self) -> &'static str {
        match self {
            AuthType::AdobeAccount => "AdobeID",
            AuthType::Anonymous => "anonymous",
        }
    }
}

/// Adobe ID credentials
///
/// The password is only reachable long enough to build the sign-in
/// request; `Debug` masks it so it cannot leak through logging.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    password: String,
}

impl Credentials {
    pub fn new<E: Into<String>, P: Into<String>>(email: E, password: P) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Sign-in payload: base64 over `email:password`
    fn sign_in_data(&self) -> String {
        general_purpose::STANDARD.encode(format!("{}:{}", self.email, self.password))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"********")
            .finish()
    }
}

/// Authorization request parameters
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    pub auth_type: AuthType,
    pub credentials: Option<Credentials>,
    pub version: AdeVersion,
}

impl AuthorizeRequest {
    pub fn adobe_id(credentials: Credentials, version: AdeVersion) -> Self {
        Self {
            auth_type: AuthType::AdobeAccount,
            credentials: Some(credentials),
            version,
        }
    }

    pub fn anonymous(version: AdeVersion) -> Self {
        Self {
            auth_type: AuthType::Anonymous,
            credentials: None,
            version,
        }
    }
}

/// Authorization service endpoints
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub base_url: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_AUTH_BASE_URL.to_string(),
        }
    }
}

impl AuthConfig {
    pub fn with_base_url<S: Into<String>>(base_url: S) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    fn sign_in_url(&self) -> String {
        format!("{}/SignInDirect", self.base_url)
    }

    fn activate_url(&self) -> String {
        format!("{}/Activate", self.base_url)
    }
}

/// Progress through the authorization chain
///
/// Each completed step is a precondition for the next; the pipeline never
/// skips forward except over `SignedIn` for anonymous authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AuthStep {
    Created,
    DeviceReady,
    Registered,
    SignedIn,
    Activated,
    KeyExported,
}

/// A fully authorized account bound to this device
///
/// Exists only after key export has completed. The signed-in email is
/// kept in memory for the success message and never written to disk.
#[derive(Debug, Clone)]
pub struct AccountSession {
    pub auth_type: AuthType,
    pub account_uuid: String,
    pub activation_record: String,
    pub exported_key_path: PathBuf,
    signed_in_as: Option<String>,
}

impl AccountSession {
    /// Terminal success message for this authorization
    pub fn success_message(&self) -> String {
        match &self.signed_in_as {
            Some(email) => format!("Successfully authorized as {}", email),
            None => "Successfully authorized anonymously".to_string(),
        }
    }
}

/// Run the authorization pipeline
///
/// On success the device identity and account session are both durably
/// persisted and the previous activation (if any) has been replaced. On
/// failure, state from completed steps remains on disk so a retry can
/// resume cheaply; no session is returned.
pub async fn authorize<T: Transport>(
    store: &ConfigStore,
    transport: &T,
    config: &AuthConfig,
    request: &AuthorizeRequest,
    reporter: &Reporter,
) -> Result<AccountSession> {
    let credentials = match (request.auth_type, &request.credentials) {
        (AuthType::AdobeAccount, Some(c)) => Some(c),
        (AuthType::AdobeAccount, None) => {
            return Err(AdeptError::invalid_input(
                "Adobe account authorization requires credentials",
            ))
        }
        (AuthType::Anonymous, _) => None,
    };

    let mut step = AuthStep::Created;
    tracing::info!(
        ?step,
        auth_type = ?request.auth_type,
        version = request.version.label(),
        "starting authorization"
    );

    // Steps 1 + 2: device key material and descriptor.
    reporter.status("Creating device files...");
    let identity = DeviceIdentity::ensure(store, request.version).await?;
    step = AuthStep::DeviceReady;
    tracing::debug!(?step, "device identity ready");

    // Auth keypair for signing the remaining exchanges. Regenerated per
    // authorization; the device key material is what must stay stable.
    let signer = RsaRequestSigner::generate()?;

    // Step 3: anonymous user registration mints a provisional identity.
    reporter.status("Creating user account...");
    let registration = sign_in_exchange(
        transport,
        &config.sign_in_url(),
        AuthType::Anonymous.method(),
        None,
        &identity,
        &signer,
    )
    .await
    .map_err(classify_step_err(AuthStep::Registered))?;

    let mut user_uuid = registration.user_uuid;
    let mut license_key_b64 = registration.license_key_b64;
    step = AuthStep::Registered;
    tracing::debug!(?step, "provisional identity registered");

    // Step 4: credential sign-in binds the provisional identity to an
    // Adobe ID. Entirely skipped for anonymous authorization.
    if let Some(credentials) = credentials {
        reporter.status("Signing in...");
        let signed_in = sign_in_exchange(
            transport,
            &config.sign_in_url(),
            AuthType::AdobeAccount.method(),
            Some(credentials.sign_in_data()),
            &identity,
            &signer,
        )
        .await
        .map_err(classify_step_err(AuthStep::SignedIn))?;

        user_uuid = signed_in.user_uuid;
        license_key_b64 = signed_in.license_key_b64;
        step = AuthStep::SignedIn;
        tracing::debug!(?step, "credentials accepted");
    }

    // Step 5: activation binds the identity to this device descriptor.
    reporter.status("Activating device...");
    let activation_token = activate_exchange(
        transport,
        &config.activate_url(),
        &identity,
        &user_uuid,
        request.version,
        &signer,
    )
    .await?;
    step = AuthStep::Activated;
    tracing::debug!(?step, "device activated");

    // Step 6: persist the activation record, then derive and export the
    // account encryption key. Only now does the device become authorized.
    reporter.status("Exporting keys...");
    let activation_record = build_activation_record(
        &user_uuid,
        request.auth_type,
        &signer,
        &activation_token,
    )?;
    store
        .write_activation(&activation_record)
        .await
        .map_err(|e| AdeptError::key_export(e.to_string()))?;

    let key_b64 = license_key_b64
        .ok_or_else(|| AdeptError::key_export("no account key in server response"))?;
    let key_der = general_purpose::STANDARD
        .decode(key_b64.trim())
        .map_err(|e| AdeptError::key_export(format!("account key is not valid base64: {}", e)))?;
    store
        .write_account_key(&key_der)
        .await
        .map_err(|e| AdeptError::key_export(e.to_string()))?;
    step = AuthStep::KeyExported;

    tracing::info!(?step, account = %user_uuid, "authorization complete");

    Ok(AccountSession {
        auth_type: request.auth_type,
        account_uuid: user_uuid,
        activation_record,
        exported_key_path: store.account_key_path(),
        signed_in_as: credentials.map(|c| c.email.clone()),
    })
}

/// Parsed fields of a sign-in/registration response
struct SignInOutcome {
    user_uuid: String,
    license_key_b64: Option<String>,
}

/// One SignInDirect exchange (registration or credential sign-in)
///
/// Returns the raw server message as the error string; the caller wraps
/// it in the step-specific error kind.
async fn sign_in_exchange<T: Transport>(
    transport: &T,
    url: &str,
    method: &str,
    sign_in_data: Option<String>,
    identity: &DeviceIdentity,
    signer: &dyn RequestSigner,
) -> std::result::Result<SignInOutcome, StepFailure> {
    let body = build_sign_in_request(method, sign_in_data.as_deref(), identity, signer)
        .map_err(StepFailure::Fatal)?;

    let response = transport
        .post_xml(url, body)
        .await
        .map_err(StepFailure::Fatal)?;

    if let Some(message) = server_failure(&response) {
        return Err(StepFailure::Server(message));
    }

    let user_uuid = first_text(&response.body, ADEPT_NS, "user")
        .ok()
        .flatten()
        .ok_or_else(|| StepFailure::Server("response has no user identifier".to_string()))?;

    let license_key_b64 = first_text(&response.body, ADEPT_NS, "encryptedPrivateLicenseKey")
        .ok()
        .flatten();

    Ok(SignInOutcome {
        user_uuid,
        license_key_b64,
    })
}

/// One Activate exchange; returns the captured activationToken element
async fn activate_exchange<T: Transport>(
    transport: &T,
    url: &str,
    identity: &DeviceIdentity,
    user_uuid: &str,
    version: AdeVersion,
    signer: &dyn RequestSigner,
) -> Result<String> {
    let body = build_activation_request(identity, user_uuid, version, signer)?;
    let response = transport.post_xml(url, body).await?;

    if let Some(message) = server_failure(&response) {
        return Err(AdeptError::activation(message));
    }

    capture_element(&response.body, "activationToken")
        .map_err(|e| AdeptError::activation(e.to_string()))?
        .ok_or_else(|| AdeptError::activation("response has no activationToken"))
}

/// Failure inside a sign-in exchange, before step classification
enum StepFailure {
    /// The server answered with a protocol error message
    Server(String),
    /// Transport or local failure, already classified
    Fatal(AdeptError),
}

/// Wrap a step failure in the error kind for the step being attempted
fn classify_step_err(step: AuthStep) -> impl Fn(StepFailure) -> AdeptError {
    move |failure| match failure {
        StepFailure::Fatal(e) => e,
        StepFailure::Server(message) => match step {
            AuthStep::Registered => AdeptError::registration(message),
            AuthStep::SignedIn => AdeptError::sign_in(message),
            _ => AdeptError::invalid_input(message),
        },
    }
}

/// Extract the failure message from a response, if it is one
fn server_failure(response: &XmlResponse) -> Option<String> {
    if let Some(message) = parse_error_response(&response.body) {
        return Some(message);
    }
    if !response.is_success() {
        return Some(format!("HTTP {}", response.status));
    }
    None
}

fn build_sign_in_request(
    method: &str,
    sign_in_data: Option<&str>,
    identity: &DeviceIdentity,
    signer: &dyn RequestSigner,
) -> Result<String> {
    let data_element = match sign_in_data {
        Some(data) => format!("  <adept:signInData>{}</adept:signInData>\n", data),
        None => String::new(),
    };

    Ok(format!(
        concat!(
            "<?xml version=\"1.0\"?>\n",
            "<adept:signIn xmlns:adept=\"{ns}\" method=\"{method}\">\n",
            "  <adept:deviceType>standalone</adept:deviceType>\n",
            "  <adept:deviceSerial>{serial}</adept:deviceSerial>\n",
            "  <adept:fingerprint>{fingerprint}</adept:fingerprint>\n",
            "{data}",
            "  <adept:publicAuthKey>{public_key}</adept:publicAuthKey>\n",
            "</adept:signIn>\n",
        ),
        ns = ADEPT_NS,
        method = escape(method),
        serial = identity.serial(),
        fingerprint = identity.fingerprint(),
        data = data_element,
        public_key = signer.public_key_b64()?,
    ))
}

fn build_activation_request(
    identity: &DeviceIdentity,
    user_uuid: &str,
    version: AdeVersion,
    signer: &dyn RequestSigner,
) -> Result<String> {
    let expiration = (Utc::now() + chrono::Duration::minutes(REQUEST_EXPIRATION_MINUTES))
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string();

    let unsigned = format!(
        concat!(
            "<?xml version=\"1.0\"?>\n",
            "<adept:activate xmlns:adept=\"{ns}\" requestType=\"initial\">\n",
            "  <adept:fingerprint>{fingerprint}</adept:fingerprint>\n",
            "  <adept:deviceType>standalone</adept:deviceType>\n",
            "  <adept:deviceSerial>{serial}</adept:deviceSerial>\n",
            "  <adept:user>{user}</adept:user>\n",
            "  <adept:version name=\"ADE\" value=\"{version}\"/>\n",
            "  <adept:nonce>{nonce}</adept:nonce>\n",
            "  <adept:expiration>{expiration}</adept:expiration>\n",
            "</adept:activate>\n",
        ),
        ns = ADEPT_NS,
        fingerprint = identity.fingerprint(),
        serial = identity.serial(),
        user = escape(user_uuid),
        version = version.version_string(),
        nonce = uuid::Uuid::new_v4(),
        expiration = expiration,
    );

    // The signature covers the request exactly as built above and rides
    // inside the closing tag.
    let signature = signer.sign_b64(unsigned.as_bytes())?;
    Ok(unsigned.replace(
        "</adept:activate>",
        &format!("  <adept:signature>{}</adept:signature>\n</adept:activate>", signature),
    ))
}

/// Render the activation record persisted as `activation.xml`
fn build_activation_record(
    user_uuid: &str,
    auth_type: AuthType,
    signer: &dyn RequestSigner,
    activation_token: &str,
) -> Result<String> {
    Ok(format!(
        concat!(
            "<?xml version=\"1.0\"?>\n",
            "<adept:activationInfo xmlns:adept=\"{ns}\">\n",
            "<adept:credentials>\n",
            "  <adept:user>{user}</adept:user>\n",
            "  <adept:authType>{auth_type}</adept:authType>\n",
            "  <adept:publicAuthKey>{public_key}</adept:publicAuthKey>\n",
            "  <adept:privateAuthKey>{private_key}</adept:privateAuthKey>\n",
            "</adept:credentials>\n",
            "{token}\n",
            "</adept:activationInfo>\n",
        ),
        ns = ADEPT_NS,
        user = escape(user_uuid),
        auth_type = auth_type.method(),
        public_key = signer.public_key_b64()?,
        private_key = signer.private_key_b64()?,
        token = activation_token,
    ))
}
