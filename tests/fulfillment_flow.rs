//! End-to-end fulfillment and decryption flows over an in-memory
//! transport. No test here opens a network socket; the transport and the
//! external DRM collaborators are scripted stand-ins.

use adept_core::api::client::{Transport, XmlResponse};
use adept_core::api::fulfillment::fulfill;
use adept_core::api::xml::ADEPT_NS;
use adept_core::device::{AdeVersion, DeviceIdentity};
use adept_core::drm::{decrypt_file, DecryptOutcome, Decryptor, PdfPatcher};
use adept_core::file::container::RIGHTS_ENTRY_NAME;
use adept_core::progress::Reporter;
use adept_core::{AdeptError, ConfigStore};
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Scripted collaborators
// ---------------------------------------------------------------------------

/// Transport that answers every POST with one canned body and serves one
/// canned download.
struct FakeTransport {
    response_body: String,
    download_status: u16,
    download_content: Vec<u8>,
    posted: Mutex<Vec<String>>,
}

impl FakeTransport {
    fn new(response_body: String, download_content: Vec<u8>) -> Self {
        Self {
            response_body,
            download_status: 200,
            download_content,
            posted: Mutex::new(Vec::new()),
        }
    }

    fn with_download_status(mut self, status: u16) -> Self {
        self.download_status = status;
        self
    }
}

impl Transport for FakeTransport {
    async fn post_xml(&self, url: &str, _body: String) -> adept_core::Result<XmlResponse> {
        self.posted.lock().unwrap().push(url.to_string());
        Ok(XmlResponse {
            status: 200,
            body: self.response_body.clone(),
        })
    }

    async fn download_to_file(&self, _url: &str, dest: &Path) -> adept_core::Result<u16> {
        if self.download_status == 200 {
            std::fs::write(dest, &self.download_content)?;
        }
        Ok(self.download_status)
    }
}

/// Patcher that records its arguments and produces the output by copying
/// the working file.
#[derive(Default)]
struct RecordingPatcher {
    calls: Mutex<Vec<(PathBuf, PathBuf, String)>>,
}

impl PdfPatcher for RecordingPatcher {
    fn patch(
        &self,
        input: &Path,
        rights_xml: &str,
        output: &Path,
        resource: &str,
    ) -> adept_core::Result<()> {
        assert!(rights_xml.contains("licenseToken"));
        std::fs::copy(input, output)?;
        self.calls.lock().unwrap().push((
            input.to_path_buf(),
            output.to_path_buf(),
            resource.to_string(),
        ));
        Ok(())
    }
}

/// Patcher that always refuses
struct FailingPatcher;

impl PdfPatcher for FailingPatcher {
    fn patch(
        &self,
        _input: &Path,
        _rights_xml: &str,
        _output: &Path,
        _resource: &str,
    ) -> adept_core::Result<()> {
        Err(AdeptError::pdf_patch("patch tool crashed"))
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const RESOURCE_ID: &str = "urn:uuid:res-0001";

/// A config store that looks authorized: device files, activation record
/// and exported key all present.
async fn authorized_store(dir: &TempDir) -> ConfigStore {
    let store = ConfigStore::new(dir.path());
    DeviceIdentity::ensure(&store, AdeVersion::Ade30)
        .await
        .unwrap();
    store
        .write_activation(&format!(
            "<adept:activationInfo xmlns:adept=\"{}\"><adept:credentials>\
             <adept:user>urn:uuid:test-user</adept:user>\
             </adept:credentials></adept:activationInfo>",
            ADEPT_NS
        ))
        .await
        .unwrap();
    store.write_account_key(b"exported-key").await.unwrap();
    store
}

fn acsm(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("ticket.acsm");
    std::fs::write(
        &path,
        format!(
            "<?xml version=\"1.0\"?>\n<fulfillmentToken xmlns=\"{}\">\
             <operatorURL>http://fulfill.example.com/ops</operatorURL>\
             <transaction>tx-1</transaction></fulfillmentToken>",
            ADEPT_NS
        ),
    )
    .unwrap();
    path
}

fn fulfillment_response(title: Option<&str>) -> String {
    let metadata = match title {
        Some(t) => format!(
            "<metadata><dc:title>{}</dc:title><dc:creator>A. Author</dc:creator></metadata>",
            t
        ),
        None => String::new(),
    };
    format!(
        "<envelope xmlns=\"{}\" xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\
         <fulfillmentResult><resourceItemInfo>\
         <src>http://cdn.example.com/content</src>\
         <licenseToken><user>urn:uuid:test-user</user>\
         <resource>{}</resource>\
         <permissions><display/></permissions></licenseToken>\
         {}\
         </resourceItemInfo></fulfillmentResult></envelope>",
        ADEPT_NS, RESOURCE_ID, metadata
    )
}

/// Minimal but valid EPUB container bytes
fn epub_bytes() -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    writer.start_file("mimetype", options).unwrap();
    writer.write_all(b"application/epub+zip").unwrap();
    writer.start_file("OEBPS/content.opf", options).unwrap();
    writer.write_all(b"<package/>").unwrap();
    writer.finish().unwrap().into_inner()
}

fn entry_names(path: &Path) -> Vec<String> {
    let archive = zip::ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
    archive.file_names().map(|n| n.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Scenario A: EPUB fulfillment
// ---------------------------------------------------------------------------

#[tokio::test]
async fn epub_fulfillment_produces_named_file_with_rights_entry() {
    let dir = TempDir::new().unwrap();
    let store = authorized_store(&dir).await;
    let transport = FakeTransport::new(fulfillment_response(Some("Sample")), epub_bytes());

    let file = fulfill(
        &acsm(&dir),
        &store,
        &transport,
        &RecordingPatcher::default(),
        dir.path(),
        &Reporter::disabled(),
    )
    .await
    .unwrap();

    assert_eq!(file.title, "Sample");
    assert_eq!(file.path, dir.path().join("Sample.epub"));
    assert!(file.path.exists());

    // The fulfill request went to the ACSM's operator.
    let posted = transport.posted.lock().unwrap();
    assert_eq!(posted.as_slice(), ["http://fulfill.example.com/ops/Fulfill"]);

    // All original entries survived, plus exactly one rights entry.
    let names = entry_names(&file.path);
    assert!(names.contains(&"mimetype".to_string()));
    assert!(names.contains(&"OEBPS/content.opf".to_string()));
    assert_eq!(names.iter().filter(|n| *n == RIGHTS_ENTRY_NAME).count(), 1);

    // The embedded rights carry this fulfillment's resource.
    let mut archive = zip::ZipArchive::new(std::fs::File::open(&file.path).unwrap()).unwrap();
    let mut rights = String::new();
    archive
        .by_name(RIGHTS_ENTRY_NAME)
        .unwrap()
        .read_to_string(&mut rights)
        .unwrap();
    assert!(rights.contains(RESOURCE_ID));

    // No in-flight artifact left behind.
    assert!(!dir.path().join("Sample.tmp").exists());
}

#[tokio::test]
async fn missing_title_falls_back_to_book() {
    let dir = TempDir::new().unwrap();
    let store = authorized_store(&dir).await;
    let transport = FakeTransport::new(fulfillment_response(None), epub_bytes());

    let file = fulfill(
        &acsm(&dir),
        &store,
        &transport,
        &RecordingPatcher::default(),
        dir.path(),
        &Reporter::disabled(),
    )
    .await
    .unwrap();

    assert_eq!(file.title, "Book");
    assert_eq!(file.path, dir.path().join("Book.epub"));
}

// ---------------------------------------------------------------------------
// Scenario B: PDF fulfillment
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pdf_fulfillment_patches_via_working_file() {
    let dir = TempDir::new().unwrap();
    let store = authorized_store(&dir).await;
    let transport = FakeTransport::new(
        fulfillment_response(Some("Sample")),
        b"%PDF-1.7\n...content...".to_vec(),
    );
    let patcher = RecordingPatcher::default();

    let file = fulfill(
        &acsm(&dir),
        &store,
        &transport,
        &patcher,
        dir.path(),
        &Reporter::disabled(),
    )
    .await
    .unwrap();

    assert_eq!(file.path, dir.path().join("Sample.pdf"));
    assert!(file.path.exists());

    // The working copy fed the patcher and was removed afterwards.
    let calls = patcher.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (input, output, resource) = &calls[0];
    assert_eq!(*input, dir.path().join("tmp_Sample.pdf"));
    assert_eq!(*output, dir.path().join("Sample.pdf"));
    assert_eq!(resource, RESOURCE_ID);
    assert!(!dir.path().join("tmp_Sample.pdf").exists());
}

#[tokio::test]
async fn pdf_patch_failure_is_propagated() {
    let dir = TempDir::new().unwrap();
    let store = authorized_store(&dir).await;
    let transport = FakeTransport::new(
        fulfillment_response(Some("Sample")),
        b"%PDF-1.7".to_vec(),
    );

    let err = fulfill(
        &acsm(&dir),
        &store,
        &transport,
        &FailingPatcher,
        dir.path(),
        &Reporter::disabled(),
    )
    .await
    .unwrap_err();

    match err {
        AdeptError::PdfPatch { message } => assert!(message.contains("patch tool crashed")),
        other => panic!("expected PdfPatch, got {:?}", other),
    }
}

// ---------------------------------------------------------------------------
// Failure classification
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_content_is_rejected_and_cleaned_up() {
    let dir = TempDir::new().unwrap();
    let store = authorized_store(&dir).await;
    let transport = FakeTransport::new(
        fulfillment_response(Some("Sample")),
        b"<html>not a book</html>".to_vec(),
    );

    let err = fulfill(
        &acsm(&dir),
        &store,
        &transport,
        &RecordingPatcher::default(),
        dir.path(),
        &Reporter::disabled(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AdeptError::UnsupportedContentType));

    // The unrecognized download must not remain as plausible output.
    assert!(!dir.path().join("Sample.tmp").exists());
    assert!(!dir.path().join("Sample.bin").exists());
    assert!(!dir.path().join("Sample.epub").exists());
}

#[tokio::test]
async fn download_failure_carries_status_code() {
    let dir = TempDir::new().unwrap();
    let store = authorized_store(&dir).await;
    let transport = FakeTransport::new(fulfillment_response(Some("Sample")), Vec::new())
        .with_download_status(404);

    let err = fulfill(
        &acsm(&dir),
        &store,
        &transport,
        &RecordingPatcher::default(),
        dir.path(),
        &Reporter::disabled(),
    )
    .await
    .unwrap_err();

    match err {
        AdeptError::Download { status } => assert_eq!(status, 404),
        other => panic!("expected Download, got {:?}", other),
    }
    assert!(err.to_string().contains("404"));
}

#[tokio::test]
async fn response_missing_license_token_is_malformed() {
    let dir = TempDir::new().unwrap();
    let store = authorized_store(&dir).await;
    let body = format!(
        "<envelope xmlns=\"{}\"><fulfillmentResult><resourceItemInfo>\
         <src>http://cdn.example.com/content</src>\
         </resourceItemInfo></fulfillmentResult></envelope>",
        ADEPT_NS
    );
    let transport = FakeTransport::new(body, epub_bytes());

    let err = fulfill(
        &acsm(&dir),
        &store,
        &transport,
        &RecordingPatcher::default(),
        dir.path(),
        &Reporter::disabled(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AdeptError::MalformedResponse { .. }));
}

#[tokio::test]
async fn server_error_response_is_classified_as_fulfillment_failure() {
    let dir = TempDir::new().unwrap();
    let store = authorized_store(&dir).await;
    let body = format!(
        "<error xmlns=\"{}\" data=\"E_LIC_ALREADY_FULFILLED_BY_ANOTHER_USER\"/>",
        ADEPT_NS
    );
    let transport = FakeTransport::new(body, Vec::new());

    let err = fulfill(
        &acsm(&dir),
        &store,
        &transport,
        &RecordingPatcher::default(),
        dir.path(),
        &Reporter::disabled(),
    )
    .await
    .unwrap_err();

    match err {
        AdeptError::FulfillmentRequest { message } => {
            assert!(message.contains("E_LIC_ALREADY_FULFILLED_BY_ANOTHER_USER"))
        }
        other => panic!("expected FulfillmentRequest, got {:?}", other),
    }
}

#[tokio::test]
async fn unauthorized_device_cannot_fulfill() {
    let dir = TempDir::new().unwrap();
    let store = ConfigStore::new(dir.path());
    store.ensure_exists().await.unwrap();
    let transport = FakeTransport::new(fulfillment_response(Some("Sample")), epub_bytes());

    let err = fulfill(
        &acsm(&dir),
        &store,
        &transport,
        &RecordingPatcher::default(),
        dir.path(),
        &Reporter::disabled(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AdeptError::NotAuthorized));
}

// ---------------------------------------------------------------------------
// Scenario C: decrypting a DRM-free container
// ---------------------------------------------------------------------------

/// Decryptor that inspects the input: EPUBs without a rights entry are
/// reported as DRM-free, everything else decrypts to a copy.
struct SniffingDecryptor;

impl Decryptor for SniffingDecryptor {
    fn decrypt(
        &self,
        _key: &[u8],
        input: &Path,
        output: &Path,
    ) -> adept_core::Result<DecryptOutcome> {
        let mut archive = zip::ZipArchive::new(std::fs::File::open(input)?)?;
        if archive.by_name(RIGHTS_ENTRY_NAME).is_err() {
            return Ok(DecryptOutcome::AlreadyDrmFree);
        }
        std::fs::copy(input, output)?;
        Ok(DecryptOutcome::Success)
    }
}

#[tokio::test]
async fn decrypting_drm_free_container_is_informational() {
    let dir = TempDir::new().unwrap();
    let store = authorized_store(&dir).await;

    let input = dir.path().join("plain.epub");
    std::fs::write(&input, epub_bytes()).unwrap();
    let before = std::fs::read(&input).unwrap();

    let outcome = decrypt_file(
        &SniffingDecryptor,
        &store,
        &input,
        &dir.path().join("out.epub"),
        &Reporter::disabled(),
    )
    .await
    .unwrap();

    assert_eq!(outcome, DecryptOutcome::AlreadyDrmFree);
    // Informational outcome: the original is untouched, no output exists.
    assert_eq!(std::fs::read(&input).unwrap(), before);
    assert!(!dir.path().join("out.epub").exists());
}

#[tokio::test]
async fn fulfilled_epub_decrypts_successfully() {
    let dir = TempDir::new().unwrap();
    let store = authorized_store(&dir).await;
    let transport = FakeTransport::new(fulfillment_response(Some("Sample")), epub_bytes());

    let file = fulfill(
        &acsm(&dir),
        &store,
        &transport,
        &RecordingPatcher::default(),
        dir.path(),
        &Reporter::disabled(),
    )
    .await
    .unwrap();

    let output = dir.path().join("Sample-decrypted.epub");
    let outcome = decrypt_file(
        &SniffingDecryptor,
        &store,
        &file.path,
        &output,
        &Reporter::disabled(),
    )
    .await
    .unwrap();

    assert_eq!(outcome, DecryptOutcome::Success);
    assert!(output.exists());
}
