use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "unsharedfs", version)]
#[command(about = "Redirect file system access to another directory depending on the user id")]
#[command(after_help = "\
All access for a user with a given uid is diverted from MOUNTPOINT/path \
to BASEDIR/uid/path. \"-o allow_other\" is required for regular operation.")]
pub struct Args {
    /// Base directory holding the per-identity directories.
    pub basedir: PathBuf,

    /// Directory where the unified view is mounted.
    pub mountpoint: PathBuf,

    /// When the identity directory for a caller does not exist, divert
    /// access to this directory (relative to BASEDIR) instead.
    #[arg(long, value_name = "DIR")]
    pub fallback: Option<String>,

    /// Allow access to the identity directory even if the owner does not
    /// match the directory name.
    #[arg(long)]
    pub no_check_ownership: bool,

    /// Use the group id (gid) instead of the user id to determine the
    /// diverted path. Implies --no-check-ownership.
    #[arg(long)]
    pub use_gid: bool,

    /// Mount options, forwarded to the FUSE runtime.
    #[arg(short = 'o', value_name = "OPT", action = clap::ArgAction::Append)]
    pub options: Vec<String>,

    /// Enable debug output.
    #[arg(short = 'd')]
    pub debug: bool,

    /// Foreground operation (the filesystem always runs in the foreground;
    /// accepted for mount-tool compatibility).
    #[arg(short = 'f')]
    pub foreground: bool,

    /// Mount strictly read-only.
    #[arg(short = 'r')]
    pub read_only: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_positional_arguments() {
        let args =
            Args::try_parse_from(["unsharedfs", "-o", "allow_other", "/srv/base", "/mnt"]).unwrap();
        assert_eq!(args.basedir, PathBuf::from("/srv/base"));
        assert_eq!(args.mountpoint, PathBuf::from("/mnt"));
        assert_eq!(args.options, vec!["allow_other".to_string()]);
    }

    #[test]
    fn test_parse_repeated_mount_options() {
        let args = Args::try_parse_from([
            "unsharedfs",
            "-o",
            "allow_other",
            "-o",
            "fsname=unsharedfs",
            "/srv/base",
            "/mnt",
        ])
        .unwrap();
        assert_eq!(args.options.len(), 2);
    }

    #[test]
    fn test_parse_behavior_flags() {
        let args = Args::try_parse_from([
            "unsharedfs",
            "--fallback=default",
            "--use-gid",
            "-o",
            "allow_other",
            "/srv/base",
            "/mnt",
        ])
        .unwrap();
        assert_eq!(args.fallback.as_deref(), Some("default"));
        assert!(args.use_gid);
        assert!(!args.no_check_ownership);
    }

    #[test]
    fn test_missing_mountpoint_is_an_error() {
        assert!(Args::try_parse_from(["unsharedfs", "/srv/base"]).is_err());
    }
}
