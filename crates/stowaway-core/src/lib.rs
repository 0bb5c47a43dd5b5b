//! # stowaway-core
//!
//! A library for extracting and installing archives embedded in carrier files.
//!
//! A stowaway carrier is a self-extracting launcher: an ordinary file (a
//! script stub, or the running executable itself) with a compressed archive
//! appended to its body as a marker-delimited text block. Before the program
//! does its nominal work, the embedded payload is materialized onto disk so
//! the rest of the process can use it as ordinary files.
//!
//! This crate provides the core functionality for:
//! - Escaping/unescaping archive bytes so they survive storage as one text line
//! - Locating and validating the embedded block inside a carrier file
//! - Installing the payload exactly once, with clean-on-failure recovery
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`block`]: Embedded-block scanning, framing, and the escaping codec
//! - [`installer`]: The install-once / clean-on-failure lifecycle
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use stowaway_core::{Installer, PayloadSource};
//!
//! // Install the payload carried by the running executable, next to it
//! let exe = std::env::current_exe()?;
//! let home = exe.parent().expect("executable has a parent").to_path_buf();
//!
//! let installer = Installer::new(&home, PayloadSource::carrier(&exe));
//! let installed = installer.find_or_install()?;
//! println!("payload available under {}", installed.display());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Payloads may also be linked into the binary directly, skipping the block
//! scan entirely:
//!
//! ```ignore
//! let source = PayloadSource::bytes(include_bytes!("payload.tar.bz2").to_vec());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod block;
pub mod error;
pub mod installer;

// Re-export primary types for convenience
pub use block::codec::{escape, unescape};
pub use error::{Error, Result};
pub use installer::{find_or_install, Installer, InstallerConfig, PayloadSource};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
