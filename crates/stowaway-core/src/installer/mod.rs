//! Self-extractor / installer.
//!
//! This module makes an embedded payload available as real files on disk,
//! exactly once, recovering from partial prior attempts.
//!
//! ## Lifecycle
//!
//! Per target directory the payload subdirectory moves through three states:
//! absent → installed (one extraction), partial → installed (clean, then
//! extraction), installed → installed (no-op). There is no staleness
//! detection — presence alone is trusted, and an installed copy only goes
//! away through external deletion.
//!
//! ## Failure handling
//!
//! A fatal error during installation scrubs the payload subdirectory before
//! propagating, so the next invocation starts from a guaranteed-absent state
//! instead of a corrupted one. Cleanup failures themselves are logged and
//! swallowed. Extraction writes through absolute paths only; the process
//! working directory is never changed.
//!
//! ## Limitations
//!
//! The installer assumes single-process use. Two processes installing into
//! the same target directory concurrently are not coordinated, and the
//! outcome is undefined.

mod archive;

use crate::block;
use crate::error::{Error, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};

/// Where the raw compressed-archive bytes come from
#[derive(Debug, Clone)]
pub enum PayloadSource {
    /// Marker-delimited block inside a carrier file (the legacy text embedding)
    Carrier(PathBuf),
    /// Raw archive bytes supplied directly, e.g. from `include_bytes!`
    Bytes(Vec<u8>),
}

impl PayloadSource {
    /// Payload embedded in a carrier file
    pub fn carrier(path: impl Into<PathBuf>) -> Self {
        Self::Carrier(path.into())
    }

    /// Payload supplied as raw bytes
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(data.into())
    }

    /// Read the raw compressed-archive bytes
    fn read(&self) -> Result<Vec<u8>> {
        match self {
            Self::Carrier(path) => block::extract(path),
            Self::Bytes(data) => Ok(data.clone()),
        }
    }
}

/// Configuration for the installer
#[derive(Debug, Clone)]
pub struct InstallerConfig {
    /// Name of the subdirectory holding the unpacked payload
    pub payload_dir: String,
    /// Keep the temporary archive files after extraction (debugging aid)
    pub keep_temp: bool,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            payload_dir: "payload".to_string(),
            keep_temp: false,
        }
    }
}

impl InstallerConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the payload subdirectory name
    pub fn payload_dir(mut self, name: impl Into<String>) -> Self {
        self.payload_dir = name.into();
        self
    }

    /// Keep temporary archive files after extraction
    pub fn keep_temp(mut self, keep: bool) -> Self {
        self.keep_temp = keep;
        self
    }
}

/// Installs an embedded payload under a target directory
#[derive(Debug, Clone)]
pub struct Installer {
    target: PathBuf,
    source: PayloadSource,
    config: InstallerConfig,
}

impl Installer {
    /// Creates a new installer with default configuration
    pub fn new(target: impl Into<PathBuf>, source: PayloadSource) -> Self {
        Self {
            target: target.into(),
            source,
            config: InstallerConfig::default(),
        }
    }

    /// Creates a new installer with custom configuration
    pub fn with_config(
        target: impl Into<PathBuf>,
        source: PayloadSource,
        config: InstallerConfig,
    ) -> Self {
        Self {
            target: target.into(),
            source,
            config,
        }
    }

    /// Path of the payload subdirectory under the target directory
    pub fn payload_path(&self) -> PathBuf {
        self.target.join(&self.config.payload_dir)
    }

    /// Check whether the payload subdirectory already exists.
    ///
    /// Pure existence check; contents are not validated.
    pub fn is_installed(&self) -> bool {
        self.payload_path().exists()
    }

    /// Remove the payload subdirectory.
    ///
    /// A missing directory counts as success. Other removal failures are
    /// returned to the caller; the install flow itself only ever logs them.
    pub fn clean(&self) -> Result<()> {
        let path = self.payload_path();
        match fs::remove_dir_all(&path) {
            Ok(()) => {
                debug!("removed {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::remove(path, e)),
        }
    }

    /// Run the full extraction into the target directory.
    ///
    /// Any prior partial install is removed first. On a fatal error the
    /// payload subdirectory is scrubbed again before the error propagates.
    /// Returns the absolute target directory path.
    pub fn install(&self) -> Result<PathBuf> {
        if let Err(e) = self.clean() {
            warn!("pre-install cleanup failed: {}", e);
        }

        match self.install_inner() {
            Ok(path) => Ok(path),
            Err(e) => {
                if let Err(cleanup) = self.clean() {
                    warn!("post-failure cleanup failed: {}", cleanup);
                }
                Err(e)
            }
        }
    }

    fn install_inner(&self) -> Result<PathBuf> {
        let raw = self.source.read()?;
        info!(
            "installing payload into {} ({} compressed bytes)",
            self.target.display(),
            raw.len()
        );

        let payload_path = self.payload_path();
        fs::create_dir_all(&payload_path)
            .map_err(|e| Error::directory_create(&payload_path, e))?;

        let compressed = self
            .target
            .join(format!("{}.tar.bz2", self.config.payload_dir));
        fs::write(&compressed, &raw).map_err(|e| Error::file_write(&compressed, e))?;

        let result = self.decompress_and_unpack(&compressed);

        if !self.config.keep_temp {
            self.remove_temp(&compressed);
        }

        result?;
        self.absolute_target()
    }

    fn decompress_and_unpack(&self, compressed: &Path) -> Result<()> {
        let (tar_bytes, method) = archive::decompress(compressed)?;
        debug!(
            "decompressed {} bytes via {:?} decoder",
            tar_bytes.len(),
            method
        );

        let members = archive::unpack(&tar_bytes, &self.target)?;
        info!(
            "unpacked {} archive members into {}",
            members,
            self.target.display()
        );
        Ok(())
    }

    /// Best-effort removal of the transient archive files.
    ///
    /// The external decoder replaces `<name>.tar.bz2` with `<name>.tar`, so
    /// both names are tried.
    fn remove_temp(&self, compressed: &Path) {
        for path in [compressed.to_path_buf(), compressed.with_extension("")] {
            match fs::remove_file(&path) {
                Ok(()) => trace!("removed temporary file {}", path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("failed to remove temporary file {}: {}", path.display(), e),
            }
        }
    }

    /// The idempotent entry point: install only when not yet installed.
    ///
    /// Always returns the resolved absolute target directory path. Intended
    /// to gate startup — nothing that consumes the unpacked payload should
    /// run until this has returned successfully.
    pub fn find_or_install(&self) -> Result<PathBuf> {
        if self.is_installed() {
            debug!(
                "payload already installed under {}",
                self.target.display()
            );
            return self.absolute_target();
        }
        self.install()
    }

    fn absolute_target(&self) -> Result<PathBuf> {
        std::path::absolute(&self.target).map_err(|e| {
            Error::internal(format!(
                "cannot resolve '{}': {}",
                self.target.display(),
                e
            ))
        })
    }
}

/// Install the payload embedded in `carrier` under `target` unless present.
///
/// Convenience wrapper over [`Installer`] with default configuration.
pub fn find_or_install(
    carrier: impl AsRef<Path>,
    target: impl AsRef<Path>,
) -> Result<PathBuf> {
    Installer::new(target.as_ref(), PayloadSource::carrier(carrier.as_ref()))
        .find_or_install()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::TempDir;

    /// Build a bzip2-compressed tar holding the given members
    fn payload_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        let tar_bytes = builder.into_inner().unwrap();

        let mut encoder =
            bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::best());
        encoder.write_all(&tar_bytes).unwrap();
        encoder.finish().unwrap()
    }

    fn default_archive() -> Vec<u8> {
        payload_archive(&[
            ("payload/greeting.txt", b"hello".as_slice()),
            ("payload/sub/nested.txt", b"nested".as_slice()),
        ])
    }

    fn write_carrier(dir: &TempDir, raw: &[u8]) -> PathBuf {
        let content = crate::block::append(b"#!/bin/sh\nexec true\n", raw).unwrap();
        let path = dir.path().join("launcher");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_install_from_carrier() {
        let dir = TempDir::new().unwrap();
        let carrier = write_carrier(&dir, &default_archive());
        let target = dir.path().join("home");
        std::fs::create_dir(&target).unwrap();

        let installer = Installer::new(&target, PayloadSource::carrier(&carrier));
        let installed = installer.install().unwrap();

        assert!(installed.is_absolute());
        assert_eq!(
            std::fs::read(target.join("payload/greeting.txt")).unwrap(),
            b"hello"
        );
        assert_eq!(
            std::fs::read(target.join("payload/sub/nested.txt")).unwrap(),
            b"nested"
        );
    }

    #[test]
    fn test_install_removes_temporary_files() {
        let dir = TempDir::new().unwrap();
        let carrier = write_carrier(&dir, &default_archive());
        let target = dir.path().join("home");
        std::fs::create_dir(&target).unwrap();

        Installer::new(&target, PayloadSource::carrier(&carrier))
            .install()
            .unwrap();

        assert!(!target.join("payload.tar.bz2").exists());
        assert!(!target.join("payload.tar").exists());
    }

    #[test]
    fn test_install_from_bytes() {
        let dir = TempDir::new().unwrap();
        let installer = Installer::new(
            dir.path(),
            PayloadSource::bytes(default_archive()),
        );

        installer.install().unwrap();
        assert!(dir.path().join("payload/greeting.txt").exists());
    }

    #[test]
    fn test_find_or_install_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let installer = Installer::new(
            dir.path(),
            PayloadSource::bytes(default_archive()),
        );

        let first = installer.find_or_install().unwrap();

        // A witness file survives only if the second call extracts nothing
        let witness = dir.path().join("payload/witness");
        std::fs::write(&witness, b"untouched").unwrap();

        let second = installer.find_or_install().unwrap();
        assert_eq!(first, second);
        assert_eq!(std::fs::read(&witness).unwrap(), b"untouched");
    }

    #[test]
    fn test_find_or_install_skips_payload_read_when_installed() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("payload")).unwrap();

        // Garbage bytes would fail any extraction attempt; the skip path
        // must never reach them
        let installer =
            Installer::new(dir.path(), PayloadSource::bytes(b"garbage".to_vec()));

        installer.find_or_install().unwrap();
        assert!(!dir.path().join("payload.tar.bz2").exists());
    }

    #[test]
    fn test_cleanup_on_decode_failure() {
        let dir = TempDir::new().unwrap();
        let installer = Installer::new(
            dir.path(),
            PayloadSource::bytes(b"not a bzip2 stream".to_vec()),
        );

        let err = installer.install().unwrap_err();
        assert!(matches!(err, Error::DecoderUnavailable { .. }));

        assert!(!dir.path().join("payload").exists());
        assert!(!dir.path().join("payload.tar.bz2").exists());
        assert!(!dir.path().join("payload.tar").exists());
    }

    #[test]
    fn test_install_replaces_partial_state() {
        let dir = TempDir::new().unwrap();
        let leftover = dir.path().join("payload/stale.txt");
        std::fs::create_dir_all(leftover.parent().unwrap()).unwrap();
        std::fs::write(&leftover, b"stale").unwrap();

        Installer::new(dir.path(), PayloadSource::bytes(default_archive()))
            .install()
            .unwrap();

        assert!(!leftover.exists());
        assert!(dir.path().join("payload/greeting.txt").exists());
    }

    #[test]
    fn test_clean_tolerates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let installer =
            Installer::new(dir.path(), PayloadSource::bytes(Vec::new()));

        assert!(!installer.is_installed());
        installer.clean().unwrap();
    }

    #[test]
    fn test_custom_payload_dir_name() {
        let dir = TempDir::new().unwrap();
        let archive = payload_archive(&[("maflib/core.py", b"pass".as_slice())]);
        let config = InstallerConfig::new().payload_dir("maflib");

        let installer =
            Installer::with_config(dir.path(), PayloadSource::bytes(archive), config);
        installer.install().unwrap();

        assert!(installer.is_installed());
        assert!(dir.path().join("maflib/core.py").exists());
    }

    #[test]
    fn test_keep_temp_preserves_compressed_file() {
        let dir = TempDir::new().unwrap();
        let config = InstallerConfig::new().keep_temp(true);

        Installer::with_config(
            dir.path(),
            PayloadSource::bytes(default_archive()),
            config,
        )
        .install()
        .unwrap();

        assert!(dir.path().join("payload.tar.bz2").exists());
    }

    #[test]
    fn test_free_function_entry_point() {
        let dir = TempDir::new().unwrap();
        let carrier = write_carrier(&dir, &default_archive());
        let target = dir.path().join("home");
        std::fs::create_dir(&target).unwrap();

        let installed = find_or_install(&carrier, &target).unwrap();
        assert!(installed.join("payload/greeting.txt").exists());
    }
}
