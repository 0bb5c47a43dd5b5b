//! Embedded-block scanning and framing.
//!
//! A carrier file holds the compressed payload archive inside a
//! marker-delimited block appended after its ordinary content:
//!
//! ```text
//! #==>
//! #<one line of escaped archive bytes>
//! #<==
//! ```
//!
//! The payload line carries one leading sentinel byte (`#`, which keeps the
//! line a comment in script-style carriers) and ends with its own newline;
//! both are stripped before decoding. Because the escaping codec removes all
//! raw `\n`/`\r` bytes, the payload always fits on exactly one line.
//!
//! ## Scanning
//!
//! [`locate`] reads the carrier line by line from the start and honors the
//! first begin marker it finds. Reaching end of file first is the
//! archive-not-found condition; a begin marker not followed by exactly one
//! payload line and the end marker is the corrupt-archive condition. The
//! scan treats lines as byte strings, so a block appended to a compiled
//! executable is found just as well as one appended to a text stub.

pub mod codec;

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, trace};

/// Line marking the start of the embedded block
pub const ARCHIVE_BEGIN: &[u8] = b"#==>\n";

/// Line marking the end of the embedded block
pub const ARCHIVE_END: &[u8] = b"#<==\n";

/// Leading sentinel byte of the payload line
pub const PAYLOAD_SENTINEL: u8 = b'#';

/// Locate the embedded block in a carrier file and return the escaped payload.
///
/// Scans line by line for [`ARCHIVE_BEGIN`], reads exactly one payload line,
/// and requires the line immediately after to be [`ARCHIVE_END`]. The leading
/// sentinel and the trailing newline are stripped from the returned bytes;
/// the result is still escaped (see [`codec::unescape`]).
///
/// # Errors
///
/// [`Error::ArchiveNotFound`] if end of file is reached before a begin
/// marker, [`Error::CorruptArchive`] on any structural deviation inside the
/// block.
pub fn locate(carrier: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = carrier.as_ref();
    let file = File::open(path).map_err(|e| Error::file_read(path, e))?;
    let mut reader = BufReader::new(file);

    let mut line = Vec::new();
    loop {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .map_err(|e| Error::file_read(path, e))?;

        if read == 0 {
            return Err(Error::archive_not_found(path));
        }
        if line == ARCHIVE_BEGIN {
            break;
        }
    }

    trace!("found begin marker in {}", path.display());

    let mut payload = Vec::new();
    let read = reader
        .read_until(b'\n', &mut payload)
        .map_err(|e| Error::file_read(path, e))?;
    if read == 0 {
        return Err(Error::corrupt_archive(path, "payload line missing"));
    }

    let mut end = Vec::new();
    reader
        .read_until(b'\n', &mut end)
        .map_err(|e| Error::file_read(path, e))?;
    if end != ARCHIVE_END {
        return Err(Error::corrupt_archive(
            path,
            "end marker does not immediately follow the payload line",
        ));
    }

    // One leading sentinel plus the line's own newline
    if payload.len() < 2
        || payload[0] != PAYLOAD_SENTINEL
        || payload[payload.len() - 1] != b'\n'
    {
        return Err(Error::corrupt_archive(path, "payload line missing sentinels"));
    }

    let stripped = payload[1..payload.len() - 1].to_vec();
    debug!(
        "located embedded block in {} ({} escaped bytes)",
        path.display(),
        stripped.len()
    );

    Ok(stripped)
}

/// Locate and decode the embedded block, returning the raw archive bytes.
pub fn extract(carrier: impl AsRef<Path>) -> Result<Vec<u8>> {
    let escaped = locate(carrier)?;
    Ok(codec::unescape(&escaped))
}

/// Frame raw archive bytes into a complete embedded block.
///
/// This is the exact inverse of [`extract`]: markers, sentinel, and escaped
/// payload, ready to append to a carrier.
pub fn embed(raw: &[u8]) -> Vec<u8> {
    let escaped = codec::escape(raw);

    let mut out =
        Vec::with_capacity(ARCHIVE_BEGIN.len() + ARCHIVE_END.len() + escaped.len() + 2);
    out.extend_from_slice(ARCHIVE_BEGIN);
    out.push(PAYLOAD_SENTINEL);
    out.extend_from_slice(&escaped);
    out.push(b'\n');
    out.extend_from_slice(ARCHIVE_END);
    out
}

/// Append an embedded block to carrier bytes.
///
/// Refuses a carrier that already holds a block: the block format allows
/// exactly one begin/end pair per carrier, and this is where that invariant
/// is enforced. A newline is inserted first when the carrier does not end
/// with one, so the begin marker always starts a fresh line.
pub fn append(carrier: &[u8], raw: &[u8]) -> Result<Vec<u8>> {
    if contains_block(carrier) {
        return Err(Error::BlockPresent);
    }

    let block = embed(raw);
    let mut out = Vec::with_capacity(carrier.len() + block.len() + 1);
    out.extend_from_slice(carrier);
    if !carrier.is_empty() && !carrier.ends_with(b"\n") {
        out.push(b'\n');
    }
    out.extend_from_slice(&block);
    Ok(out)
}

/// Check whether carrier bytes already hold a begin marker at a line start
pub fn contains_block(carrier: &[u8]) -> bool {
    carrier.starts_with(ARCHIVE_BEGIN) || find_subsequence(carrier, b"\n#==>\n").is_some()
}

/// Find a subsequence within a byte slice
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
