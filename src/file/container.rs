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


//! Content containers: type sniffing and EPUB rights injection
//!
//! Fulfilled content arrives as an opaque download; its type is decided
//! purely by magic bytes (`PK` for the EPUB ZIP container, `%PDF` for
//! PDF). [`ContentKind::sniff`] is a pure function over the leading bytes
//! so the classification is unit-testable without touching a filesystem.
//!
//! EPUBs get their usage rights embedded as a `META-INF/rights.xml` entry.
//! The injection rewrites the archive additively: every pre-existing entry
//! is carried over byte-for-byte (raw copy, no recompression), any stale
//! rights entry is dropped, and the new archive replaces the original via
//! rename so a failed write never corrupts the container.

use crate::error::Result;
use std::io::Write;
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Archive entry name for embedded usage rights
pub const RIGHTS_ENTRY_NAME: &str = "META-INF/rights.xml";

/// Content type of a fulfilled download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// EPUB container (ZIP magic)
    Epub,
    /// PDF document
    Pdf,
    /// Anything else; treated as unsupported
    Unknown,
}

impl ContentKind {
    /// Classify content by its leading magic bytes
    pub fn sniff(leading: &[u8]) -> Self {
        if leading.starts_with(b"PK") {
            ContentKind::Epub
        } else if leading.starts_with(b"%PDF") {
            ContentKind::Pdf
        } else {
            ContentKind::Unknown
        }
    }

    /// File extension for this kind
    pub fn extension(&self) -> &'static str {
        match self {
            ContentKind::Epub => "epub",
            ContentKind::Pdf => "pdf",
            ContentKind::Unknown => "bin",
        }
    }
}

/// Embed a rights record into an EPUB as `META-INF/rights.xml`
///
/// All existing entries survive unchanged; an already-present rights
/// entry is replaced rather than duplicated, so the operation is
/// idempotent on the entry name.
pub fn add_rights_entry(epub_path: &Path, rights_xml: &str) -> Result<()> {
    let source = std::fs::File::open(epub_path)?;
    let mut archive = ZipArchive::new(source)?;

    let temp_path = epub_path.with_extension("epub.tmp");
    let mut writer = ZipWriter::new(std::fs::File::create(&temp_path)?);

    let copy_result = (|| -> Result<()> {
        for i in 0..archive.len() {
            let entry = archive.by_index_raw(i)?;
            if entry.name() == RIGHTS_ENTRY_NAME {
                continue;
            }
            writer.raw_copy_file(entry)?;
        }

        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        writer.start_file(RIGHTS_ENTRY_NAME, options)?;
        writer.write_all(rights_xml.as_bytes())?;
        writer.finish()?;
        Ok(())
    })();

    if let Err(e) = copy_result {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e);
    }

    std::fs::rename(&temp_path, epub_path)?;
    Ok(())
}
