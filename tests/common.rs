//! Shared fixtures for the integration tests.
//!
//! The dispatcher is exercised by calling the `FilesystemMT` methods
//! directly with a request context carrying the test process's own
//! identity, against a temporary backing tree. No kernel mount is needed
//! for that; the real-mount tests build on the same fixtures and skip
//! themselves when mounting is not possible.

use std::path::PathBuf;

use fuse_mt::RequestInfo;
use tempfile::TempDir;
use unsharedfs::{Config, FsMode, UnsharedFs};

/// A request context as the FUSE runtime would deliver it for the current
/// process.
#[allow(dead_code)]
pub fn caller() -> RequestInfo {
    RequestInfo {
        unique: 0,
        uid: nix::unistd::getuid().as_raw(),
        gid: nix::unistd::getgid().as_raw(),
        pid: std::process::id(),
    }
}

/// A request context for a made-up identity with no matching account.
#[allow(dead_code)]
pub fn caller_with_uid(uid: u32) -> RequestInfo {
    RequestInfo {
        unique: 0,
        uid,
        gid: uid,
        pid: std::process::id(),
    }
}

#[allow(dead_code)]
pub struct Fixture {
    pub fs: UnsharedFs,
    pub identity_dir: PathBuf,
    pub backing: TempDir,
}

#[allow(dead_code)]
pub fn base_config(root: &std::path::Path) -> Config {
    Config {
        backing_root: root.to_path_buf(),
        fallback_subdir: None,
        mode: FsMode::Uid,
        check_ownership: true,
        base_uid: nix::unistd::getuid().as_raw(),
        base_gid: nix::unistd::getgid().as_raw(),
        allow_other_set: true,
    }
}

/// Backing tree with an identity directory for the current uid, no
/// fallback.
#[allow(dead_code)]
pub fn fixture() -> Fixture {
    let backing = TempDir::new().unwrap();
    let identity_dir = backing
        .path()
        .join(nix::unistd::getuid().as_raw().to_string());
    std::fs::create_dir(&identity_dir).unwrap();

    let config = base_config(backing.path());
    Fixture {
        fs: UnsharedFs::new(config),
        identity_dir,
        backing,
    }
}

/// Backing tree with only a fallback directory; no identity directories.
#[allow(dead_code)]
pub fn fallback_fixture() -> Fixture {
    let backing = TempDir::new().unwrap();
    let fallback_dir = backing.path().join("default");
    std::fs::create_dir(&fallback_dir).unwrap();

    let mut config = base_config(backing.path());
    config.fallback_subdir = Some("default".to_string());
    Fixture {
        fs: UnsharedFs::new(config),
        identity_dir: fallback_dir,
        backing,
    }
}

/// Empty backing tree: no identity directory, no fallback.
#[allow(dead_code)]
pub fn bare_fixture() -> Fixture {
    let backing = TempDir::new().unwrap();
    let config = base_config(backing.path());
    let identity_dir = backing
        .path()
        .join(nix::unistd::getuid().as_raw().to_string());
    Fixture {
        fs: UnsharedFs::new(config),
        identity_dir,
        backing,
    }
}
