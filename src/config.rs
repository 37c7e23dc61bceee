use std::path::PathBuf;

use nix::unistd::{getgid, getuid};

use crate::cli::{validate_fallback_name, Args};
use crate::error::{Result, UnsharedFsError};

/// Which id from the request context selects the identity directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsMode {
    Uid,
    Gid,
}

/// Immutable per-mount state. Built once at startup, shared read-only with
/// every dispatched request, never modified afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    /// Absolute, canonicalized backing root directory.
    pub backing_root: PathBuf,
    /// Optional fallback directory name, relative to the backing root.
    /// When absent, callers without an identity directory are refused.
    pub fallback_subdir: Option<String>,
    pub mode: FsMode,
    /// Pin identity-directory names to their owners. Forced off in gid mode.
    pub check_ownership: bool,
    /// Uid/gid of the mounting process, captured before any credential
    /// manipulation. Every request restores these on exit.
    pub base_uid: u32,
    pub base_gid: u32,
    /// Whether `allow_other` appeared in the `-o` stream. The mount is
    /// refused without it: redirection by caller identity is pointless if
    /// only the mounter can reach the mount point.
    pub allow_other_set: bool,
}

impl Config {
    pub fn from_args(args: &Args) -> Result<Self> {
        let backing_root = args.basedir.canonicalize().map_err(|e| {
            UnsharedFsError::Config(format!(
                "Cannot resolve base directory {}: {}",
                args.basedir.display(),
                e
            ))
        })?;

        if !backing_root.is_dir() {
            return Err(UnsharedFsError::NotADirectory(backing_root));
        }

        if let Some(ref name) = args.fallback {
            validate_fallback_name(name)?;
        }

        let mode = if args.use_gid { FsMode::Gid } else { FsMode::Uid };
        // gid-named directories are group-owned, so the uid-based owner pin
        // cannot apply there.
        let check_ownership = !args.no_check_ownership && mode == FsMode::Uid;

        Ok(Config {
            backing_root,
            fallback_subdir: args.fallback.clone(),
            mode,
            check_ownership,
            base_uid: getuid().as_raw(),
            base_gid: getgid().as_raw(),
            allow_other_set: has_allow_other(&args.options),
        })
    }
}

/// Mount options may arrive fused ("allow_other,ro"), so detection has to
/// split on commas. The option itself is still forwarded to the runtime.
pub fn has_allow_other(options: &[String]) -> bool {
    options
        .iter()
        .flat_map(|o| o.split(','))
        .any(|o| o == "allow_other")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(extra: &[&str], basedir: &str) -> Args {
        let mut argv = vec!["unsharedfs"];
        argv.extend_from_slice(extra);
        argv.push(basedir);
        argv.push("/mnt");
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_has_allow_other_plain() {
        assert!(has_allow_other(&["allow_other".to_string()]));
        assert!(!has_allow_other(&["ro".to_string()]));
        assert!(!has_allow_other(&[]));
    }

    #[test]
    fn test_has_allow_other_fused() {
        assert!(has_allow_other(&["ro,allow_other,noexec".to_string()]));
        assert!(!has_allow_other(&["allow_other_ish".to_string()]));
    }

    #[test]
    fn test_from_args_canonicalizes_backing_root() {
        let dir = tempfile::tempdir().unwrap();
        let args = parse(&["-o", "allow_other"], dir.path().to_str().unwrap());
        let config = Config::from_args(&args).unwrap();
        assert!(config.backing_root.is_absolute());
        assert!(config.allow_other_set);
        assert_eq!(config.mode, FsMode::Uid);
        assert!(config.check_ownership);
    }

    #[test]
    fn test_from_args_missing_backing_root() {
        let args = parse(&[], "/nonexistent/unsharedfs-base");
        assert!(Config::from_args(&args).is_err());
    }

    #[test]
    fn test_from_args_backing_root_not_a_directory() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let args = parse(&[], file.path().to_str().unwrap());
        assert!(Config::from_args(&args).is_err());
    }

    #[test]
    fn test_use_gid_forces_ownership_check_off() {
        let dir = tempfile::tempdir().unwrap();
        let args = parse(&["--use-gid"], dir.path().to_str().unwrap());
        let config = Config::from_args(&args).unwrap();
        assert_eq!(config.mode, FsMode::Gid);
        assert!(!config.check_ownership);
    }

    #[test]
    fn test_no_check_ownership_flag() {
        let dir = tempfile::tempdir().unwrap();
        let args = parse(&["--no-check-ownership"], dir.path().to_str().unwrap());
        let config = Config::from_args(&args).unwrap();
        assert!(!config.check_ownership);
    }

    #[test]
    fn test_fallback_with_separator_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let args = parse(&["--fallback=a/b"], dir.path().to_str().unwrap());
        assert!(Config::from_args(&args).is_err());
    }

    #[test]
    fn test_base_ids_match_process() {
        let dir = tempfile::tempdir().unwrap();
        let args = parse(&[], dir.path().to_str().unwrap());
        let config = Config::from_args(&args).unwrap();
        assert_eq!(config.base_uid, nix::unistd::getuid().as_raw());
        assert_eq!(config.base_gid, nix::unistd::getgid().as_raw());
    }
}
