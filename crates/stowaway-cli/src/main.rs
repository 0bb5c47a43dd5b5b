//! stowaway - Self-extracting bootstrap launcher
//!
//! This tool packs a directory tree into a compressed archive appended to a
//! stub file, inspects such carriers, and installs the embedded payload onto
//! disk before anything downstream needs it.

use anyhow::{bail, Context, Result};
use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use bzip2::Compression;
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use stowaway_core::{block, Installer, InstallerConfig, PayloadSource};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Self-extracting bootstrap launcher
#[derive(Parser, Debug)]
#[command(name = "stowaway")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract the embedded payload unless it is already installed
    Install(InstallArgs),
    /// Append a compressed payload tree to a stub file, producing a carrier
    Pack(PackArgs),
    /// Report on the payload embedded in a carrier without installing it
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
struct InstallArgs {
    /// Carrier file holding the embedded block (defaults to this executable)
    #[arg(short, long)]
    carrier: Option<PathBuf>,

    /// Directory to install under (defaults to the carrier's parent)
    #[arg(short, long, env = "STOWAWAY_HOME")]
    target: Option<PathBuf>,

    /// Name of the payload subdirectory
    #[arg(short, long, default_value = "payload")]
    name: String,

    /// Redo the extraction even when the payload is already installed
    #[arg(long)]
    force: bool,
}

#[derive(Args, Debug)]
struct PackArgs {
    /// Directory tree to embed as the payload
    #[arg(short, long)]
    payload: PathBuf,

    /// Stub file the embedded block is appended to
    #[arg(short, long)]
    stub: PathBuf,

    /// Output carrier path
    #[arg(short, long)]
    output: PathBuf,

    /// Name of the subdirectory archive members are stored under
    #[arg(short, long, default_value = "payload")]
    name: String,

    /// Overwrite an existing output file
    #[arg(long)]
    force: bool,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Carrier file to inspect (defaults to this executable)
    #[arg(short, long)]
    carrier: Option<PathBuf>,

    /// List archive members
    #[arg(long)]
    list: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .init();

    match cli.command {
        Command::Install(args) => cmd_install(&args),
        Command::Pack(args) => cmd_pack(&args),
        Command::Inspect(args) => cmd_inspect(&args),
    }
}

/// Default the carrier to the running executable, the self-extracting case
fn resolve_carrier(carrier: &Option<PathBuf>) -> Result<PathBuf> {
    match carrier {
        Some(path) => Ok(path.clone()),
        None => std::env::current_exe().context("cannot determine the running executable"),
    }
}

/// Install the embedded payload; the hard prerequisite gate.
///
/// Prints the resolved install directory on success and exits nonzero on any
/// fatal error, so callers can refuse to proceed without the payload.
fn cmd_install(args: &InstallArgs) -> Result<()> {
    let carrier = resolve_carrier(&args.carrier)?;
    if !carrier.is_file() {
        bail!("carrier does not exist: {}", carrier.display());
    }

    let target = match &args.target {
        Some(dir) => dir.clone(),
        None => carrier
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };

    debug!(
        "installing from {} into {}",
        carrier.display(),
        target.display()
    );

    let config = InstallerConfig::new().payload_dir(args.name.clone());
    let installer =
        Installer::with_config(&target, PayloadSource::carrier(&carrier), config);

    let installed = if args.force {
        installer.install()
    } else {
        installer.find_or_install()
    }
    .with_context(|| format!("failed to install payload from {}", carrier.display()))?;

    println!("{}", installed.display());
    Ok(())
}

/// Build a carrier: compress the payload tree and append the embedded block
fn cmd_pack(args: &PackArgs) -> Result<()> {
    if !args.payload.is_dir() {
        bail!("payload directory does not exist: {}", args.payload.display());
    }
    if !args.stub.is_file() {
        bail!("stub file does not exist: {}", args.stub.display());
    }
    if args.output.exists() && !args.force {
        bail!(
            "output already exists: {} (use --force to overwrite)",
            args.output.display()
        );
    }

    let (compressed, members) = build_archive(&args.payload, &args.name)?;
    info!(
        "compressed {} members into {} bytes",
        members,
        compressed.len()
    );

    let stub = fs::read(&args.stub)
        .with_context(|| format!("failed to read stub: {}", args.stub.display()))?;
    let carrier = block::append(&stub, &compressed)
        .with_context(|| format!("cannot embed payload into {}", args.stub.display()))?;

    fs::write(&args.output, &carrier)
        .with_context(|| format!("failed to write carrier: {}", args.output.display()))?;

    // A carrier standing in for an executable stub must stay executable
    #[cfg(unix)]
    {
        let perms = fs::metadata(&args.stub)
            .with_context(|| format!("failed to stat stub: {}", args.stub.display()))?
            .permissions();
        fs::set_permissions(&args.output, perms).with_context(|| {
            format!("failed to set permissions on {}", args.output.display())
        })?;
    }

    println!(
        "Wrote {} ({} members, {} compressed bytes)",
        args.output.display(),
        members,
        compressed.len()
    );
    Ok(())
}

/// Build a bzip2-compressed tar of `payload`, members stored under `name/`.
///
/// Members are appended in sorted path order so identical trees produce
/// identical carrier bytes.
fn build_archive(payload: &Path, name: &str) -> Result<(Vec<u8>, usize)> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut members = 0usize;

    let mut entries: Vec<_> = WalkDir::new(payload)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path() != payload)
        .collect();
    entries.sort_by(|a, b| a.path().cmp(b.path()));

    for entry in entries {
        let relative = entry
            .path()
            .strip_prefix(payload)
            .context("walked path escapes the payload root")?;
        let stored = Path::new(name).join(relative);

        if entry.file_type().is_dir() {
            builder
                .append_dir(&stored, entry.path())
                .with_context(|| format!("failed to add directory {}", entry.path().display()))?;
            members += 1;
        } else if entry.file_type().is_file() {
            builder
                .append_path_with_name(entry.path(), &stored)
                .with_context(|| format!("failed to add file {}", entry.path().display()))?;
            members += 1;
        } else {
            warn!("skipping non-regular file: {}", entry.path().display());
        }
    }

    let tar_bytes = builder
        .into_inner()
        .context("failed to finish the tar stream")?;

    let mut encoder = BzEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(&tar_bytes)
        .context("failed to compress the payload")?;
    let compressed = encoder
        .finish()
        .context("failed to finish the bzip2 stream")?;

    Ok((compressed, members))
}

/// Report on a carrier's embedded payload without installing it
fn cmd_inspect(args: &InspectArgs) -> Result<()> {
    let carrier = resolve_carrier(&args.carrier)?;
    let escaped = block::locate(&carrier)
        .with_context(|| format!("no usable embedded block in {}", carrier.display()))?;
    let raw = stowaway_core::unescape(&escaped);
    let hash = blake3::hash(&raw);

    println!("carrier:          {}", carrier.display());
    println!("escaped bytes:    {}", escaped.len());
    println!("compressed bytes: {}", raw.len());
    println!("payload blake3:   {}", hash.to_hex());

    if args.list {
        for member in list_members(&raw)? {
            println!("{}", member);
        }
    }

    Ok(())
}

/// Decompress the payload and list its tar member paths
fn list_members(raw: &[u8]) -> Result<Vec<String>> {
    let mut decoder = BzDecoder::new(raw);
    let mut tar_bytes = Vec::new();
    decoder
        .read_to_end(&mut tar_bytes)
        .context("payload is not a bzip2 stream")?;

    let mut archive = tar::Archive::new(std::io::Cursor::new(tar_bytes.as_slice()));
    let mut members = Vec::new();
    for entry in archive.entries().context("payload is not a tar archive")? {
        let entry = entry.context("corrupt tar member")?;
        let path = entry.path().context("invalid member path")?;
        members.push(path.display().to_string());
    }

    Ok(members)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_payload(dir: &TempDir) -> PathBuf {
        let root = dir.path().join("tree");
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("greeting.txt"), b"hello").unwrap();
        fs::write(root.join("sub/nested.txt"), b"nested").unwrap();
        root
    }

    #[test]
    fn test_build_archive_lists_members() {
        let dir = TempDir::new().unwrap();
        let root = sample_payload(&dir);

        let (compressed, members) = build_archive(&root, "payload").unwrap();
        assert_eq!(members, 3); // sub/, greeting.txt, sub/nested.txt

        let listed = list_members(&compressed).unwrap();
        assert!(listed.contains(&"payload/greeting.txt".to_string()));
        assert!(listed.contains(&"payload/sub/nested.txt".to_string()));
    }

    #[test]
    fn test_build_archive_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let root = sample_payload(&dir);

        let (first, _) = build_archive(&root, "payload").unwrap();
        let (second, _) = build_archive(&root, "payload").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_pack_then_install_round_trip() {
        let dir = TempDir::new().unwrap();
        let root = sample_payload(&dir);

        let stub = dir.path().join("stub.sh");
        fs::write(&stub, b"#!/bin/sh\nexec true\n").unwrap();

        let carrier = dir.path().join("launcher");
        cmd_pack(&PackArgs {
            payload: root,
            stub,
            output: carrier.clone(),
            name: "payload".to_string(),
            force: false,
        })
        .unwrap();

        let target = dir.path().join("home");
        fs::create_dir(&target).unwrap();
        cmd_install(&InstallArgs {
            carrier: Some(carrier),
            target: Some(target.clone()),
            name: "payload".to_string(),
            force: false,
        })
        .unwrap();

        assert_eq!(
            fs::read(target.join("payload/greeting.txt")).unwrap(),
            b"hello"
        );
        assert_eq!(
            fs::read(target.join("payload/sub/nested.txt")).unwrap(),
            b"nested"
        );
    }

    #[test]
    fn test_pack_refuses_carrier_stub() {
        // A stub that already holds a block must not gain a second one
        let dir = TempDir::new().unwrap();
        let root = sample_payload(&dir);

        let stub = dir.path().join("stub.sh");
        fs::write(&stub, b"#!/bin/sh\n#==>\n#x\n#<==\n").unwrap();

        let result = cmd_pack(&PackArgs {
            payload: root,
            stub,
            output: dir.path().join("launcher"),
            name: "payload".to_string(),
            force: false,
        });
        assert!(result.is_err());
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
