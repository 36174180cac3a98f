//! In-memory ZIP archives for the download route.

use crate::error::Result;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Build a ZIP archive holding `entries` as `(file name, contents)` pairs
pub fn build_zip(entries: &[(String, Vec<u8>)]) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o600);

    for (name, contents) in entries {
        zip.start_file(name.as_str(), options)?;
        zip.write_all(contents).map_err(zip::result::ZipError::Io)?;
    }

    Ok(zip.finish()?.into_inner())
}
