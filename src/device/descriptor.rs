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


//! Device descriptor building
//!
//! The descriptor (`device.xml`) is the XML document that introduces this
//! installation to the authorization service. It binds the device serial
//! and fingerprint (both derived from the device key material) to a
//! client version string.

use crate::api::xml::ADEPT_NS;
use quick_xml::escape::escape;

/// Client protocol version advertised in descriptors and activation
///
/// Treated as an opaque pass-through: the two variants differ only in the
/// version string sent to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdeVersion {
    /// ADE 2.0 line
    Ade20,
    /// ADE 3.0 line (current default)
    #[default]
    Ade30,
}

impl AdeVersion {
    /// Version string embedded in the descriptor
    pub fn version_string(&self) -> &'static str {
        match self {
            AdeVersion::Ade20 => "2.0.1.78765",
            AdeVersion::Ade30 => "3.0.1.91394",
        }
    }

    /// Human-readable label for status output
    pub fn label(&self) -> &'static str {
        match self {
            AdeVersion::Ade20 => "ADE 2.0",
            AdeVersion::Ade30 => "ADE 3.0",
        }
    }
}

/// Render the device descriptor document
pub fn build_descriptor(
    serial: &str,
    device_name: &str,
    fingerprint: &str,
    version: AdeVersion,
) -> String {
    format!(
        concat!(
            "<?xml version=\"1.0\"?>\n",
            "<adept:deviceInfo xmlns:adept=\"{ns}\">\n",
            "  <adept:deviceType>standalone</adept:deviceType>\n",
            "  <adept:deviceClass>Desktop</adept:deviceClass>\n",
            "  <adept:deviceSerial>{serial}</adept:deviceSerial>\n",
            "  <adept:deviceName>{name}</adept:deviceName>\n",
            "  <adept:version name=\"ADE\" value=\"{version}\"/>\n",
            "  <adept:fingerprint>{fingerprint}</adept:fingerprint>\n",
            "</adept:deviceInfo>\n",
        ),
        ns = ADEPT_NS,
        serial = serial,
        name = escape(device_name),
        version = version.version_string(),
        fingerprint = fingerprint,
    )
}
