use std::ffi::OsString;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use fuse_mt::RequestInfo;
use libc::c_int;

use crate::config::{Config, FsMode};

/// Longest backing path the resolver will produce, matching the kernel-side
/// bound. Overflow is a hard error, never a truncation.
const PATH_LIMIT: usize = libc::PATH_MAX as usize;

/// Map a logical path (relative to the mount point, always starting with
/// `/`) to its backing path for the calling identity.
///
/// The candidate identity directory is probed with a single stat per
/// request. Results are deliberately not cached: a stale entry would let a
/// renamed directory slip past the ownership pin below.
///
/// Errors are the errno the failed step chose; the transport negates them
/// on the wire.
pub(crate) fn resolve(config: &Config, req: &RequestInfo, path: &Path) -> Result<PathBuf, c_int> {
    let id = match config.mode {
        FsMode::Uid => req.uid,
        FsMode::Gid => req.gid,
    };

    let mut fpath = OsString::from(config.backing_root.as_os_str());
    fpath.push("/");
    fpath.push(id.to_string());
    if fpath.len() >= PATH_LIMIT {
        tracing::error!("path too long: {:?}", path);
        return Err(libc::ENAMETOOLONG);
    }

    let id_dir = PathBuf::from(fpath);
    match std::fs::metadata(&id_dir) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return match config.fallback_subdir {
                // The fallback is a shared read-only catchall; no ownership
                // check applies on this branch.
                Some(ref fallback) => {
                    let mut fb = OsString::from(config.backing_root.as_os_str());
                    fb.push("/");
                    fb.push(fallback);
                    fb.push(path.as_os_str());
                    if fb.len() >= PATH_LIMIT {
                        tracing::error!("path too long: {:?}", path);
                        return Err(libc::ENAMETOOLONG);
                    }
                    tracing::debug!(
                        "diverting to fallback directory {}/{}",
                        config.backing_root.display(),
                        fallback
                    );
                    Ok(PathBuf::from(fb))
                }
                None => {
                    tracing::warn!(
                        "missing identity directory: {}/{}",
                        config.backing_root.display(),
                        id
                    );
                    Err(libc::EBUSY)
                }
            };
        }
        Err(e) => return Err(e.raw_os_error().unwrap_or(libc::EIO)),
        Ok(meta) => {
            if !meta.is_dir() {
                tracing::error!("not a directory: {}", id_dir.display());
                return Err(libc::ENOTDIR);
            }
            // Pin the directory name to its owner so nobody can rename
            // another user's identity directory into place and harvest
            // their writes.
            if config.check_ownership && meta.uid() != id {
                tracing::error!(
                    "identity directory name does not match owner: {} (owner: {})",
                    id_dir.display(),
                    meta.uid()
                );
                return Err(libc::EACCES);
            }
        }
    }

    let mut fpath = id_dir.into_os_string();
    fpath.push(path.as_os_str());
    if fpath.len() >= PATH_LIMIT {
        tracing::error!("path too long: {:?}", path);
        return Err(libc::ENAMETOOLONG);
    }
    Ok(PathBuf::from(fpath))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn request(uid: u32, gid: u32) -> RequestInfo {
        RequestInfo {
            unique: 0,
            uid,
            gid,
            pid: std::process::id(),
        }
    }

    fn config(root: &Path) -> Config {
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

    fn own_uid() -> u32 {
        nix::unistd::getuid().as_raw()
    }

    #[test]
    fn test_resolves_into_identity_directory() {
        let root = TempDir::new().unwrap();
        let uid = own_uid();
        std::fs::create_dir(root.path().join(uid.to_string())).unwrap();

        let resolved = resolve(
            &config(root.path()),
            &request(uid, 0),
            Path::new("/some/file"),
        )
        .unwrap();
        assert_eq!(
            resolved,
            root.path().join(uid.to_string()).join("some/file")
        );
    }

    #[test]
    fn test_root_logical_path_keeps_trailing_slash_form() {
        let root = TempDir::new().unwrap();
        let uid = own_uid();
        let id_dir = root.path().join(uid.to_string());
        std::fs::create_dir(&id_dir).unwrap();

        let resolved = resolve(&config(root.path()), &request(uid, 0), Path::new("/")).unwrap();
        // "BASE/uid" + "/" still stats as the identity directory itself.
        assert_eq!(
            std::fs::canonicalize(resolved).unwrap(),
            std::fs::canonicalize(&id_dir).unwrap()
        );
    }

    #[test]
    fn test_missing_identity_directory_without_fallback_is_ebusy() {
        let root = TempDir::new().unwrap();
        let err = resolve(&config(root.path()), &request(4242, 0), Path::new("/f")).unwrap_err();
        assert_eq!(err, libc::EBUSY);
    }

    #[test]
    fn test_missing_identity_directory_with_fallback() {
        let root = TempDir::new().unwrap();
        let mut cfg = config(root.path());
        cfg.fallback_subdir = Some("default".to_string());

        let resolved = resolve(&cfg, &request(4242, 0), Path::new("/f")).unwrap();
        assert_eq!(resolved, root.path().join("default").join("f"));
    }

    #[test]
    fn test_fallback_skips_ownership_check() {
        // 4242 is not our uid, and the fallback directory is owned by us,
        // not by 4242; resolution must still succeed.
        let root = TempDir::new().unwrap();
        std::fs::create_dir(root.path().join("default")).unwrap();
        let mut cfg = config(root.path());
        cfg.fallback_subdir = Some("default".to_string());

        assert!(resolve(&cfg, &request(4242, 0), Path::new("/f")).is_ok());
    }

    #[test]
    fn test_identity_entry_that_is_a_file_is_enotdir() {
        let root = TempDir::new().unwrap();
        let uid = own_uid();
        std::fs::write(root.path().join(uid.to_string()), b"not a dir").unwrap();

        let err = resolve(&config(root.path()), &request(uid, 0), Path::new("/f")).unwrap_err();
        assert_eq!(err, libc::ENOTDIR);
    }

    #[test]
    fn test_ownership_mismatch_is_eacces() {
        // A directory named "4242" owned by the current (different) uid.
        let root = TempDir::new().unwrap();
        std::fs::create_dir(root.path().join("4242")).unwrap();

        let err = resolve(&config(root.path()), &request(4242, 0), Path::new("/f")).unwrap_err();
        assert_eq!(err, libc::EACCES);
    }

    #[test]
    fn test_ownership_mismatch_allowed_when_check_disabled() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir(root.path().join("4242")).unwrap();
        let mut cfg = config(root.path());
        cfg.check_ownership = false;

        assert!(resolve(&cfg, &request(4242, 0), Path::new("/f")).is_ok());
    }

    #[test]
    fn test_gid_mode_selects_the_gid() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir(root.path().join("5151")).unwrap();
        let mut cfg = config(root.path());
        cfg.mode = FsMode::Gid;
        cfg.check_ownership = false;

        let resolved = resolve(&cfg, &request(1, 5151), Path::new("/f")).unwrap();
        assert_eq!(resolved, root.path().join("5151").join("f"));
    }

    #[test]
    fn test_overlong_logical_path_is_enametoolong() {
        let root = TempDir::new().unwrap();
        let uid = own_uid();
        std::fs::create_dir(root.path().join(uid.to_string())).unwrap();

        let long = format!("/{}", "a".repeat(PATH_LIMIT));
        let err = resolve(&config(root.path()), &request(uid, 0), Path::new(&long)).unwrap_err();
        assert_eq!(err, libc::ENAMETOOLONG);
    }

    #[test]
    fn test_overlong_fallback_path_is_enametoolong() {
        let root = TempDir::new().unwrap();
        let mut cfg = config(root.path());
        cfg.fallback_subdir = Some("default".to_string());

        let long = format!("/{}", "a".repeat(PATH_LIMIT));
        let err = resolve(&cfg, &request(4242, 0), Path::new(&long)).unwrap_err();
        assert_eq!(err, libc::ENAMETOOLONG);
    }
}
