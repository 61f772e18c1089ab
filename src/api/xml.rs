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


//! ADEPT XML parsing
//!
//! Everything the protocol returns is namespaced XML. The elements this
//! crate cares about live in the `adept` namespace
//! (`http://ns.adobe.com/adept`), except book titles which use Dublin
//! Core. Parsing is namespace-aware throughout: a `src` element outside
//! `fulfillmentResult/resourceItemInfo` does not count.
//!
//! # Fulfillment response structure
//! ```text
//! <envelope xmlns="http://ns.adobe.com/adept">
//!   <fulfillmentResult>
//!     <resourceItemInfo>
//!       <src>…download URL…</src>
//!       <licenseToken>…usage rights…</licenseToken>
//!       <metadata><dc:title>…</dc:title>…</metadata>
//!     </resourceItemInfo>
//!   </fulfillmentResult>
//! </envelope>
//! ```
//!
//! Parse failures are classified into [`AdeptError::MalformedResponse`]
//! here; they never escape as panics or bare library errors.

use crate::error::{AdeptError, Result};
use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;

/// ADEPT protocol namespace
pub const ADEPT_NS: &str = "http://ns.adobe.com/adept";

/// Dublin Core namespace (book metadata)
pub const DC_NS: &str = "http://purl.org/dc/elements/1.1/";

/// Raw pieces pulled out of a fulfillment response
///
/// `download_url` and `license_token` must both be present for the
/// response to be usable; `title` is optional and falls back downstream.
#[derive(Debug, Clone, Default)]
pub struct FulfillmentResponse {
    pub download_url: Option<String>,
    pub license_token: Option<String>,
    pub title: Option<String>,
}

/// Element stack entry: (namespace, local name)
type StackEntry = (Vec<u8>, Vec<u8>);

fn ns_of(resolve: &ResolveResult) -> Vec<u8> {
    match resolve {
        ResolveResult::Bound(Namespace(ns)) => ns.to_vec(),
        _ => Vec::new(),
    }
}

/// Exact-path check: the stack is `[root, …expected]` with every expected
/// segment in its required namespace. The envelope root may carry any name.
fn tail_matches(stack: &[StackEntry], expected: &[(&str, &str)]) -> bool {
    stack.len() == expected.len() + 1
        && stack[1..]
            .iter()
            .zip(expected)
            .all(|((ns, local), (exp_ns, exp_local))| {
                ns.as_slice() == exp_ns.as_bytes() && local.as_slice() == exp_local.as_bytes()
            })
}

fn malformed(e: impl std::fmt::Display) -> AdeptError {
    AdeptError::malformed(e.to_string())
}

/// Parse a fulfillment response, extracting the download URL, the license
/// token element and the optional title
///
/// The license token is captured with its full inner XML and re-rooted as
/// a standalone `licenseToken` element so it can be embedded in a rights
/// record later. Both the default-namespace and prefixed response forms
/// are accepted.
pub fn parse_fulfillment_response(xml: &str) -> Result<FulfillmentResponse> {
    const ITEM_INFO: [(&str, &str); 2] =
        [(ADEPT_NS, "fulfillmentResult"), (ADEPT_NS, "resourceItemInfo")];
    const SRC_PATH: [(&str, &str); 3] = [
        (ADEPT_NS, "fulfillmentResult"),
        (ADEPT_NS, "resourceItemInfo"),
        (ADEPT_NS, "src"),
    ];
    const TITLE_PATH: [(&str, &str); 4] = [
        (ADEPT_NS, "fulfillmentResult"),
        (ADEPT_NS, "resourceItemInfo"),
        (ADEPT_NS, "metadata"),
        (DC_NS, "title"),
    ];

    let mut reader = NsReader::from_str(xml);

    let mut stack: Vec<StackEntry> = Vec::new();
    let mut response = FulfillmentResponse::default();

    loop {
        match reader.read_resolved_event().map_err(malformed)? {
            (resolve, Event::Start(e)) => {
                let ns = ns_of(&resolve);
                let local = e.local_name().as_ref().to_vec();
                let is_license_token =
                    ns.as_slice() == ADEPT_NS.as_bytes() && local == b"licenseToken";
                stack.push((ns, local));

                if is_license_token && tail_matches(&stack[..stack.len() - 1], &ITEM_INFO[..]) {
                    let span = reader.read_to_end(e.name()).map_err(malformed)?;
                    let inner = &xml[span];
                    response.license_token = Some(rewrap_element("licenseToken", inner));
                    stack.pop();
                }
            }
            (_, Event::Text(t)) => {
                let text = t.unescape().map_err(malformed)?;
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                if tail_matches(&stack, &SRC_PATH[..]) {
                    response.download_url = Some(text.to_string());
                } else if tail_matches(&stack, &TITLE_PATH[..]) {
                    response.title = Some(text.to_string());
                }
            }
            (_, Event::End(_)) => {
                stack.pop();
            }
            (_, Event::Eof) => break,
            _ => {}
        }
    }

    Ok(response)
}

/// Re-root a captured element body as a standalone document fragment
///
/// Declares the adept namespace both as default and under the `adept:`
/// prefix, so captured content keeps resolving no matter which form the
/// server used.
fn rewrap_element(local: &str, inner: &str) -> String {
    format!("<{local} xmlns=\"{ADEPT_NS}\" xmlns:adept=\"{ADEPT_NS}\">{inner}</{local}>")
}

/// Build a rights record from a captured license token element
///
/// A rights record is regenerated from the token on every fulfillment and
/// never reused across tickets.
pub fn build_rights_xml(license_token: &str) -> Result<String> {
    if license_token.trim().is_empty() {
        return Err(AdeptError::rights("license token is empty"));
    }

    let rights = format!(
        "<?xml version=\"1.0\"?>\n<adept:rights xmlns:adept=\"{}\">{}</adept:rights>\n",
        ADEPT_NS, license_token
    );

    // A rights record without an extractable resource identifier would
    // fail later on the PDF path; validate while we still know why.
    extract_resource(&rights)
        .map_err(|_| AdeptError::rights("license token does not parse"))?;
    Ok(rights)
}

/// Extract the `licenseToken/resource` identifier from a rights record
pub fn extract_resource(rights_xml: &str) -> Result<String> {
    const RESOURCE_PATH: [(&str, &str); 2] =
        [(ADEPT_NS, "licenseToken"), (ADEPT_NS, "resource")];

    let mut reader = NsReader::from_str(rights_xml);
    let mut stack: Vec<StackEntry> = Vec::new();

    loop {
        match reader.read_resolved_event().map_err(malformed)? {
            (resolve, Event::Start(e)) => {
                stack.push((ns_of(&resolve), e.local_name().as_ref().to_vec()));
            }
            (_, Event::Text(t)) => {
                if tail_matches(&stack, &RESOURCE_PATH[..]) {
                    let text = t.unescape().map_err(malformed)?;
                    let text = text.trim();
                    if !text.is_empty() {
                        return Ok(text.to_string());
                    }
                }
            }
            (_, Event::End(_)) => {
                stack.pop();
            }
            (_, Event::Eof) => break,
            _ => {}
        }
    }

    Err(AdeptError::malformed(
        "rights record has no licenseToken/resource identifier",
    ))
}

/// First text content of the named adept-namespace element, at any depth
pub fn first_text(xml: &str, ns: &str, local: &str) -> Result<Option<String>> {
    let mut reader = NsReader::from_str(xml);
    let mut stack: Vec<StackEntry> = Vec::new();

    loop {
        match reader.read_resolved_event().map_err(malformed)? {
            (resolve, Event::Start(e)) => {
                stack.push((ns_of(&resolve), e.local_name().as_ref().to_vec()));
            }
            (_, Event::Text(t)) => {
                if let Some((top_ns, top_local)) = stack.last() {
                    if top_ns.as_slice() == ns.as_bytes()
                        && top_local.as_slice() == local.as_bytes()
                    {
                        let text = t.unescape().map_err(malformed)?;
                        let text = text.trim();
                        if !text.is_empty() {
                            return Ok(Some(text.to_string()));
                        }
                    }
                }
            }
            (_, Event::End(_)) => {
                stack.pop();
            }
            (_, Event::Eof) => break,
            _ => {}
        }
    }

    Ok(None)
}

/// Capture the named adept-namespace element (any depth) as a standalone
/// fragment, preserving its inner XML
pub fn capture_element(xml: &str, local: &str) -> Result<Option<String>> {
    let mut reader = NsReader::from_str(xml);

    loop {
        match reader.read_resolved_event().map_err(malformed)? {
            (resolve, Event::Start(e)) => {
                if ns_of(&resolve).as_slice() == ADEPT_NS.as_bytes()
                    && e.local_name().as_ref() == local.as_bytes()
                {
                    let span = reader.read_to_end(e.name()).map_err(malformed)?;
                    return Ok(Some(rewrap_element(local, &xml[span])));
                }
            }
            (_, Event::Eof) => break,
            _ => {}
        }
    }

    Ok(None)
}

/// Server-reported protocol error, if the body carries one
///
/// Error responses look like `<error xmlns="…" data="E_ADEPT_…"/>`; the
/// `data` attribute is the message shown to users.
pub fn parse_error_response(xml: &str) -> Option<String> {
    let mut reader = NsReader::from_str(xml);

    loop {
        match reader.read_resolved_event() {
            Ok((resolve, Event::Start(e))) | Ok((resolve, Event::Empty(e))) => {
                if ns_of(&resolve).as_slice() == ADEPT_NS.as_bytes()
                    && e.local_name().as_ref() == b"error"
                {
                    if let Ok(Some(attr)) = e.try_get_attribute("data") {
                        if let Ok(value) = attr.unescape_value() {
                            return Some(value.into_owned());
                        }
                    }
                    return Some("unknown server error".to_string());
                }
            }
            Ok((_, Event::Eof)) | Err(_) => break,
            _ => {}
        }
    }

    None
}

/// Operator URL from an ACSM ticket (`fulfillmentToken/operatorURL`)
pub fn parse_acsm_operator_url(acsm_xml: &str) -> Result<String> {
    first_text(acsm_xml, ADEPT_NS, "operatorURL")?
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .ok_or_else(|| AdeptError::fulfillment("ACSM ticket has no operatorURL"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = r#"<envelope xmlns="http://ns.adobe.com/adept"
      xmlns:dc="http://purl.org/dc/elements/1.1/">
      <fulfillmentResult>
        <resourceItemInfo>
          <src>http://example.com/media/book</src>
          <licenseToken>
            <user>urn:uuid:6f2d1300-0000-0000-0000-000000000001</user>
            <resource>urn:uuid:8c7e0000-0000-0000-0000-00000000res1</resource>
            <permissions><display/><play/></permissions>
          </licenseToken>
          <metadata>
            <dc:title>Sample</dc:title>
            <dc:creator>A. Author</dc:creator>
          </metadata>
        </resourceItemInfo>
      </fulfillmentResult>
    </envelope>"#;

    #[test]
    fn test_parse_complete_response() {
        let parsed = parse_fulfillment_response(RESPONSE).unwrap();
        assert_eq!(
            parsed.download_url.as_deref(),
            Some("http://example.com/media/book")
        );
        assert_eq!(parsed.title.as_deref(), Some("Sample"));

        let token = parsed.license_token.unwrap();
        assert!(token.starts_with("<licenseToken"));
        assert!(token.contains("urn:uuid:8c7e0000-0000-0000-0000-00000000res1"));
        assert!(token.contains("<permissions>"));
    }

    #[test]
    fn test_parse_prefixed_response_form() {
        let xml = r#"<adept:envelope xmlns:adept="http://ns.adobe.com/adept"
          xmlns:dc="http://purl.org/dc/elements/1.1/">
          <adept:fulfillmentResult>
            <adept:resourceItemInfo>
              <adept:src>http://example.com/x</adept:src>
              <adept:licenseToken><adept:resource>urn:uuid:r</adept:resource></adept:licenseToken>
              <adept:metadata><dc:title>Prefixed</dc:title></adept:metadata>
            </adept:resourceItemInfo>
          </adept:fulfillmentResult>
        </adept:envelope>"#;

        let parsed = parse_fulfillment_response(xml).unwrap();
        assert_eq!(parsed.download_url.as_deref(), Some("http://example.com/x"));
        assert_eq!(parsed.title.as_deref(), Some("Prefixed"));
        assert!(parsed.license_token.is_some());
    }

    #[test]
    fn test_src_outside_path_is_ignored() {
        let xml = r#"<envelope xmlns="http://ns.adobe.com/adept">
          <src>http://decoy.example.com</src>
          <fulfillmentResult><resourceItemInfo>
            <src>http://real.example.com</src>
          </resourceItemInfo></fulfillmentResult>
        </envelope>"#;

        let parsed = parse_fulfillment_response(xml).unwrap();
        assert_eq!(parsed.download_url.as_deref(), Some("http://real.example.com"));
    }

    #[test]
    fn test_wrong_namespace_is_ignored() {
        let xml = r#"<envelope xmlns="http://example.com/not-adept">
          <fulfillmentResult><resourceItemInfo>
            <src>http://example.com/x</src>
          </resourceItemInfo></fulfillmentResult>
        </envelope>"#;

        let parsed = parse_fulfillment_response(xml).unwrap();
        assert!(parsed.download_url.is_none());
    }

    #[test]
    fn test_missing_title_is_none() {
        let xml = r#"<envelope xmlns="http://ns.adobe.com/adept">
          <fulfillmentResult><resourceItemInfo>
            <src>http://example.com/x</src>
            <licenseToken><resource>urn:x</resource></licenseToken>
          </resourceItemInfo></fulfillmentResult>
        </envelope>"#;

        let parsed = parse_fulfillment_response(xml).unwrap();
        assert!(parsed.title.is_none());
        assert!(parsed.download_url.is_some());
    }

    #[test]
    fn test_unparsable_body_is_classified() {
        let err = parse_fulfillment_response("this is not xml <<<").unwrap_err();
        assert!(matches!(err, AdeptError::MalformedResponse { .. }));
    }

    #[test]
    fn test_rights_round_trip_to_resource() {
        let parsed = parse_fulfillment_response(RESPONSE).unwrap();
        let rights = build_rights_xml(&parsed.license_token.unwrap()).unwrap();

        assert!(rights.starts_with("<?xml version=\"1.0\"?>"));
        assert!(rights.contains("<adept:rights"));

        let resource = extract_resource(&rights).unwrap();
        assert_eq!(resource, "urn:uuid:8c7e0000-0000-0000-0000-00000000res1");
    }

    #[test]
    fn test_rights_from_empty_token_fails() {
        let err = build_rights_xml("").unwrap_err();
        assert!(matches!(err, AdeptError::RightsBuild { .. }));
    }

    #[test]
    fn test_extract_resource_requires_license_token_parent() {
        let rights = format!(
            "<adept:rights xmlns:adept=\"{}\"><adept:resource>urn:stray</adept:resource></adept:rights>",
            ADEPT_NS
        );
        assert!(extract_resource(&rights).is_err());
    }

    #[test]
    fn test_parse_error_response() {
        let body = r#"<error xmlns="http://ns.adobe.com/adept"
            data="E_AUTH_FAILED http://adeactivate.adobe.com/adept/SignInDirect"/>"#;
        let message = parse_error_response(body).unwrap();
        assert!(message.starts_with("E_AUTH_FAILED"));

        assert!(parse_error_response("<ok xmlns=\"http://ns.adobe.com/adept\"/>").is_none());
    }

    #[test]
    fn test_first_text_and_capture() {
        let body = r#"<credentials xmlns="http://ns.adobe.com/adept">
          <user>urn:uuid:user-1</user>
          <encryptedPrivateLicenseKey>AAECAw==</encryptedPrivateLicenseKey>
        </credentials>"#;

        assert_eq!(
            first_text(body, ADEPT_NS, "user").unwrap().as_deref(),
            Some("urn:uuid:user-1")
        );
        let captured = capture_element(body, "credentials").unwrap().unwrap();
        assert!(captured.starts_with("<credentials"));
        assert!(captured.contains("urn:uuid:user-1"));
    }

    #[test]
    fn test_acsm_operator_url() {
        let acsm = r#"<fulfillmentToken xmlns="http://ns.adobe.com/adept">
          <operatorURL>http://fulfill.example.com/fulfillment</operatorURL>
          <transaction>12345</transaction>
        </fulfillmentToken>"#;
        assert_eq!(
            parse_acsm_operator_url(acsm).unwrap(),
            "http://fulfill.example.com/fulfillment"
        );

        let missing = r#"<fulfillmentToken xmlns="http://ns.adobe.com/adept"/>"#;
        assert!(parse_acsm_operator_url(missing).is_err());
    }
}
