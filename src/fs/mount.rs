use std::ffi::{OsStr, OsString};
use std::path::Path;

use crate::cli::Args;
use crate::config::Config;
use crate::error::{Result, UnsharedFsError};
use crate::fs::UnsharedFs;

/// Size of the dispatch pool. Requests are blocking syscall work, one
/// thread per in-flight request; per-thread fs credentials keep concurrent
/// identities isolated.
const DISPATCH_THREADS: usize = 8;

/// Assemble the option list forwarded to the FUSE runtime. The behavior
/// options were already consumed by the argument parser; only mount options
/// pass through. `-d`/`-f` are accepted for mount-tool compatibility but
/// the session always runs in the foreground of the calling process
/// (`-d` raises the log level instead, handled at startup).
pub fn fuse_options(args: &Args) -> Vec<OsString> {
    let mut opts: Vec<OsString> = Vec::new();
    for o in &args.options {
        opts.push("-o".into());
        opts.push(o.into());
    }
    if args.read_only {
        opts.push("-o".into());
        opts.push("ro".into());
    }
    opts
}

/// Hand control to the FUSE runtime. Blocks until the filesystem is
/// unmounted.
pub fn mount(config: Config, mountpoint: &Path, options: &[OsString]) -> Result<()> {
    let opt_refs: Vec<&OsStr> = options.iter().map(|o| o.as_os_str()).collect();
    let fs = UnsharedFs::new(config);
    fuse_mt::mount(
        fuse_mt::FuseMT::new(fs, DISPATCH_THREADS),
        mountpoint,
        &opt_refs,
    )
    .map_err(|e| UnsharedFsError::Fuse(format!("FUSE mount failed: {}", e)))
}
