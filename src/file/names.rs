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


//! Output file naming
//!
//! Book titles come straight from server metadata and can contain
//! anything; everything that ends up in a filename passes through
//! [`sanitize_title`] first. The temp/working name helpers keep the
//! download-then-rename choreography in one place.

use crate::file::container::ContentKind;
use regex::Regex;

/// Fallback base name when a title is absent or sanitizes to nothing
pub const DEFAULT_TITLE: &str = "Book";

/// Suffix for in-flight downloads, before content sniffing
const DOWNLOAD_SUFFIX: &str = ".tmp";

/// Prefix for the PDF patcher's working copy
const WORKING_PREFIX: &str = "tmp_";

/// Reduce a server-supplied title to a safe filename base
///
/// Strips path separators, characters that are invalid on common
/// filesystems and control characters, then collapses runs of
/// whitespace. An empty result falls back to [`DEFAULT_TITLE`].
pub fn sanitize_title(title: &str) -> String {
    let invalid = Regex::new(r#"[\\/:*?"<>|[:cntrl:]]"#).unwrap();
    let cleaned = invalid.replace_all(title, " ");

    let whitespace = Regex::new(r"\s+").unwrap();
    let collapsed = whitespace.replace_all(cleaned.trim(), " ");

    // Trailing dots confuse Windows; leading dots hide the file.
    let trimmed = collapsed.trim_matches(|c| c == '.' || c == ' ');

    if trimmed.is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Name for the in-flight download of a (sanitized) title
pub fn temp_download_name(title: &str) -> String {
    format!("{}{}", title, DOWNLOAD_SUFFIX)
}

/// Final name for a sniffed content kind
pub fn final_name(title: &str, kind: ContentKind) -> String {
    format!("{}.{}", title, kind.extension())
}

/// Working-copy name handed to the PDF patcher
pub fn working_name(final_name: &str) -> String {
    format!("{}{}", WORKING_PREFIX, final_name)
}
