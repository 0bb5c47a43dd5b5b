//! Payload archive decompression and unpacking.
//!
//! The payload travels as a bzip2-compressed tar. Decompression tries the
//! in-process decoder first and falls back to the external `bunzip2` utility
//! run against the same file; each failure mode is logged distinctly so a
//! multi-cause failure stays diagnosable. Unpacking places every archive
//! member under an absolute destination path.

use crate::error::{Error, Result};
use bzip2::read::BzDecoder;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

/// How the payload archive was decompressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DecodeMethod {
    /// In-process bzip2 decoder
    Native,
    /// External `bunzip2` utility
    External,
}

/// Decompress a `.tar.bz2` file, native decoder first, `bunzip2` second.
///
/// Only when both paths fail does this return [`Error::DecoderUnavailable`],
/// carrying both failure descriptions.
pub(crate) fn decompress(compressed: &Path) -> Result<(Vec<u8>, DecodeMethod)> {
    let native_err = match decompress_native(compressed) {
        Ok(bytes) => return Ok((bytes, DecodeMethod::Native)),
        Err(e) => e,
    };
    warn!(
        "native bzip2 decode of {} failed: {}",
        compressed.display(),
        native_err
    );

    match decompress_external(compressed) {
        Ok(bytes) => Ok((bytes, DecodeMethod::External)),
        Err(fallback_err) => {
            warn!(
                "external bunzip2 decode of {} failed: {}",
                compressed.display(),
                fallback_err
            );
            Err(Error::decoder_unavailable(native_err, fallback_err))
        }
    }
}

fn decompress_native(compressed: &Path) -> std::result::Result<Vec<u8>, String> {
    let file = File::open(compressed).map_err(|e| format!("cannot open: {}", e))?;
    let mut decoder = BzDecoder::new(file);
    let mut bytes = Vec::new();
    decoder
        .read_to_end(&mut bytes)
        .map_err(|e| format!("bzip2 stream error: {}", e))?;
    Ok(bytes)
}

/// Run `bunzip2` against the compressed file.
///
/// The utility replaces `<name>.tar.bz2` with `<name>.tar` in place, so the
/// decompressed bytes are read back from the sibling path.
fn decompress_external(compressed: &Path) -> std::result::Result<Vec<u8>, String> {
    let tool = which::which("bunzip2").map_err(|e| format!("bunzip2 not found: {}", e))?;
    debug!("falling back to {}", tool.display());

    let status = Command::new(&tool)
        .arg(compressed)
        .status()
        .map_err(|e| format!("cannot run bunzip2: {}", e))?;
    if !status.success() {
        return Err(format!("bunzip2 exited with {}", status));
    }

    let decompressed = compressed.with_extension("");
    std::fs::read(&decompressed).map_err(|e| {
        format!(
            "bunzip2 produced no output at {}: {}",
            decompressed.display(),
            e
        )
    })
}

/// Unpack every tar member into the destination directory.
///
/// Returns the number of members written. Members whose paths would escape
/// the destination are skipped with a warning rather than written.
pub(crate) fn unpack(tar_bytes: &[u8], dest: &Path) -> Result<usize> {
    let mut archive = tar::Archive::new(Cursor::new(tar_bytes));
    let mut unpacked = 0usize;

    let entries = archive.entries().map_err(|e| Error::extraction(dest, e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| Error::extraction(dest, e))?;
        let member = entry
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| String::from("<invalid path>"));

        if entry.unpack_in(dest).map_err(|e| Error::extraction(dest, e))? {
            unpacked += 1;
        } else {
            warn!("skipped archive member with unsafe path: {}", member);
        }
    }

    debug!("unpacked {} members into {}", unpacked, dest.display());
    Ok(unpacked)
}
