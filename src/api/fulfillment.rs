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


//! Fulfillment handler
//!
//! Converts an ACSM ticket into a usable file:
//!
//! 1. read the ticket and submit it to its operator's fulfillment service
//! 2. parse the namespaced response for the download URL, license token
//!    and title (title falls back to the literal `"Book"`)
//! 3. build a fresh rights record from the license token
//! 4. download the resource to `<title>.tmp`
//! 5. sniff the content by magic bytes, then atomically rename into place
//! 6. EPUB: embed the rights record as `META-INF/rights.xml`;
//!    PDF: hand the working copy to the external patcher; anything else
//!    is unsupported and the temp artifact is removed
//!
//! A ticket and its parsed response live only for the duration of one
//! call; nothing here is cached across fulfillments.

use crate::api::client::Transport;
use crate::api::xml::{
    self, build_rights_xml, parse_acsm_operator_url, parse_error_response,
    parse_fulfillment_response, ADEPT_NS,
};
use crate::drm::PdfPatcher;
use crate::error::{AdeptError, Result};
use crate::file::container::{add_rights_entry, ContentKind};
use crate::file::names::{final_name, sanitize_title, temp_download_name, working_name, DEFAULT_TITLE};
use crate::file::ConfigStore;
use crate::progress::Reporter;
use std::path::{Path, PathBuf};

/// How many leading bytes are needed to classify downloaded content
const SNIFF_LEN: usize = 10;

/// A successfully fulfilled content file
#[derive(Debug, Clone)]
pub struct FulfilledFile {
    pub path: PathBuf,
    pub kind: ContentKind,
    pub title: String,
}

/// Session context a fulfillment request embeds, loaded from the store
struct SessionContext {
    user_uuid: String,
    device_serial: String,
    device_fingerprint: String,
}

impl SessionContext {
    /// Load the persisted session, refusing when the device is not
    /// authorized (missing key file, descriptor or activation record)
    async fn load(store: &ConfigStore) -> Result<Self> {
        if !store.is_authorized() {
            return Err(AdeptError::NotAuthorized);
        }

        let descriptor = store
            .read_descriptor()
            .await?
            .ok_or(AdeptError::NotAuthorized)?;
        let activation = store
            .read_activation()
            .await?
            .ok_or(AdeptError::NotAuthorized)?;

        let user_uuid = xml::first_text(&activation, ADEPT_NS, "user")?
            .ok_or(AdeptError::NotAuthorized)?;
        let device_serial = xml::first_text(&descriptor, ADEPT_NS, "deviceSerial")?
            .ok_or(AdeptError::NotAuthorized)?;
        let device_fingerprint = xml::first_text(&descriptor, ADEPT_NS, "fingerprint")?
            .ok_or(AdeptError::NotAuthorized)?;

        Ok(Self {
            user_uuid,
            device_serial,
            device_fingerprint,
        })
    }
}

/// Fulfill an ACSM ticket into a downloaded EPUB or patched PDF
///
/// The output lands in `output_dir`, named after the (sanitized) book
/// title. Exactly one file is produced; on any failure the in-flight
/// artifacts are cleaned up rather than left as plausible output.
pub async fn fulfill<T: Transport>(
    acsm_path: &Path,
    store: &ConfigStore,
    transport: &T,
    patcher: &dyn PdfPatcher,
    output_dir: &Path,
    reporter: &Reporter,
) -> Result<FulfilledFile> {
    reporter.status("Reading ACSM file...");
    let ticket = tokio::fs::read_to_string(acsm_path).await?;
    let operator_url = parse_acsm_operator_url(&ticket)?;
    let session = SessionContext::load(store).await?;

    // Submit the ticket wrapped in this device's session context.
    reporter.status("Fulfilling book...");
    let request = build_fulfill_request(&session, &ticket);
    let fulfill_url = format!("{}/Fulfill", operator_url.trim_end_matches('/'));
    let response = transport.post_xml(&fulfill_url, request).await?;

    if let Some(message) = parse_error_response(&response.body) {
        return Err(AdeptError::fulfillment(message));
    }
    if !response.is_success() {
        return Err(AdeptError::fulfillment(format!("HTTP {}", response.status)));
    }

    let parsed = parse_fulfillment_response(&response.body)?;
    let download_url = parsed
        .download_url
        .ok_or_else(|| AdeptError::malformed("response has no resourceItemInfo/src"))?;
    url::Url::parse(&download_url)
        .map_err(|e| AdeptError::malformed(format!("invalid download URL: {}", e)))?;
    let license_token = parsed
        .license_token
        .ok_or_else(|| AdeptError::malformed("response has no licenseToken"))?;

    // Rights are regenerated from this ticket's license token, never
    // reused from a previous fulfillment.
    let rights_xml = build_rights_xml(&license_token)?;

    let title = match parsed.title {
        Some(raw) => sanitize_title(&raw),
        None => DEFAULT_TITLE.to_string(),
    };
    tracing::info!(%title, "fulfillment granted");

    // Download to a temp name first; the real name is only decided after
    // the content has been sniffed.
    reporter.status("Downloading book...");
    let temp_path = output_dir.join(temp_download_name(&title));
    let status = transport.download_to_file(&download_url, &temp_path).await?;
    if status != 200 {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(AdeptError::Download { status });
    }

    let kind = sniff_file(&temp_path).await?;
    if kind == ContentKind::Unknown {
        // An unrecognized download must not linger looking like output.
        tokio::fs::remove_file(&temp_path).await?;
        return Err(AdeptError::UnsupportedContentType);
    }

    let file_name = final_name(&title, kind);
    let final_path = output_dir.join(&file_name);
    tokio::fs::rename(&temp_path, &final_path).await?;

    match kind {
        ContentKind::Epub => {
            add_rights_entry(&final_path, &rights_xml)?;
            reporter.status(format!("File fulfilled: {}", file_name));
        }
        ContentKind::Pdf => {
            reporter.status("Patching PDF encryption...");
            let resource = xml::extract_resource(&rights_xml)?;

            let working_path = output_dir.join(working_name(&file_name));
            tokio::fs::rename(&final_path, &working_path).await?;

            patcher.patch(&working_path, &rights_xml, &final_path, &resource)?;
            tokio::fs::remove_file(&working_path).await?;
        }
        ContentKind::Unknown => unreachable!("rejected above"),
    }

    Ok(FulfilledFile {
        path: final_path,
        kind,
        title,
    })
}

/// Terminal success message for a fulfillment
pub fn success_message(file: &FulfilledFile) -> String {
    format!(
        "Successfully fulfilled: {}",
        file.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.path.display().to_string())
    )
}

/// Wrap the raw ticket in a fulfill envelope naming this device
fn build_fulfill_request(session: &SessionContext, ticket: &str) -> String {
    format!(
        concat!(
            "<?xml version=\"1.0\"?>\n",
            "<adept:fulfill xmlns:adept=\"{ns}\">\n",
            "  <adept:user>{user}</adept:user>\n",
            "  <adept:device>{device}</adept:device>\n",
            "  <adept:deviceType>standalone</adept:deviceType>\n",
            "  <adept:fingerprint>{fingerprint}</adept:fingerprint>\n",
            "{ticket}\n",
            "</adept:fulfill>\n",
        ),
        ns = ADEPT_NS,
        user = session.user_uuid,
        device = session.device_serial,
        fingerprint = session.device_fingerprint,
        ticket = strip_xml_declaration(ticket).trim_end(),
    )
}

/// Drop a leading `<?xml …?>` declaration so a document can be embedded
fn strip_xml_declaration(xml: &str) -> &str {
    let trimmed = xml.trim_start();
    if let Some(rest) = trimmed.strip_prefix("<?xml") {
        if let Some(end) = rest.find("?>") {
            return rest[end + 2..].trim_start();
        }
    }
    trimmed
}

/// Read the leading bytes of a file and classify them
async fn sniff_file(path: &Path) -> Result<ContentKind> {
    use tokio::io::AsyncReadExt;

    let mut file = tokio::fs::File::open(path).await?;
    let mut leading = [0u8; SNIFF_LEN];
    let read = file.read(&mut leading).await?;
    Ok(ContentKind::sniff(&leading[..read]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_xml_declaration() {
        assert_eq!(
            strip_xml_declaration("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<a/>"),
            "<a/>"
        );
        assert_eq!(strip_xml_declaration("<a/>"), "<a/>");
        assert_eq!(strip_xml_declaration("  \n<?xml version=\"1.0\"?><a/>"), "<a/>");
    }

    #[test]
    fn test_fulfill_request_embeds_session_and_ticket() {
        let session = SessionContext {
            user_uuid: "urn:uuid:user-1".to_string(),
            device_serial: "SERIAL".to_string(),
            device_fingerprint: "FP==".to_string(),
        };
        let ticket = "<?xml version=\"1.0\"?>\n<fulfillmentToken xmlns=\"http://ns.adobe.com/adept\"><operatorURL>http://x</operatorURL></fulfillmentToken>";

        let request = build_fulfill_request(&session, ticket);
        assert!(request.contains("urn:uuid:user-1"));
        assert!(request.contains("SERIAL"));
        assert!(request.contains("<fulfillmentToken"));
        // The embedded ticket must not smuggle a second XML declaration.
        assert_eq!(request.matches("<?xml").count(), 1);
    }

    #[tokio::test]
    async fn test_sniff_file() {
        let dir = tempfile::TempDir::new().unwrap();

        let epub = dir.path().join("a");
        tokio::fs::write(&epub, b"PK\x03\x04...").await.unwrap();
        assert_eq!(sniff_file(&epub).await.unwrap(), ContentKind::Epub);

        let pdf = dir.path().join("b");
        tokio::fs::write(&pdf, b"%PDF-1.4").await.unwrap();
        assert_eq!(sniff_file(&pdf).await.unwrap(), ContentKind::Pdf);

        let other = dir.path().join("c");
        tokio::fs::write(&other, b"hello").await.unwrap();
        assert_eq!(sniff_file(&other).await.unwrap(), ContentKind::Unknown);

        let empty = dir.path().join("d");
        tokio::fs::write(&empty, b"").await.unwrap();
        assert_eq!(sniff_file(&empty).await.unwrap(), ContentKind::Unknown);
    }
}
