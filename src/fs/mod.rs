pub mod mount;

pub(crate) mod convert;
pub(crate) mod creds;
pub(crate) mod resolver;
pub(crate) mod syscalls;

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use fuse_mt::{
    CallbackResult, CreatedEntry, DirectoryEntry, FilesystemMT, RequestInfo, ResultCreate,
    ResultData, ResultEmpty, ResultEntry, ResultOpen, ResultReaddir, ResultSlice, ResultStatfs,
    ResultWrite, ResultXattr, Xattr,
};
use libc::c_int;

use crate::config::Config;
use convert::{dt_to_filetype, stat_to_fuse, statvfs_to_fuse, time_or_omit};
use creds::CredGuard;

/// Attribute and entry timeout handed to the kernel; matches the libfuse
/// default. Path resolution itself is never cached.
const TTL: Duration = Duration::from_secs(1);

/// The per-identity redirecting filesystem.
///
/// Holds nothing but the immutable mount configuration: open handles live
/// in the kernel's per-descriptor state, and credentials are per-thread, so
/// concurrent dispatch needs no locks.
pub struct UnsharedFs {
    config: Config,
}

impl UnsharedFs {
    pub fn new(config: Config) -> Self {
        UnsharedFs { config }
    }

    /// Resolve a logical path against the caller's identity. Runs before
    /// the credential switch: the identity-directory probe must see the
    /// directory even when the caller could not.
    fn backing_path(&self, req: &RequestInfo, path: &Path) -> Result<PathBuf, c_int> {
        resolver::resolve(&self.config, req, path)
    }
}

impl FilesystemMT for UnsharedFs {
    fn init(&self, _req: RequestInfo) -> ResultEmpty {
        tracing::info!(
            "initialising unsharedfs with base uid/gid {}/{} at {}",
            self.config.base_uid,
            self.config.base_gid,
            self.config.backing_root.display()
        );
        Ok(())
    }

    fn destroy(&self) {
        tracing::info!(
            "releasing unsharedfs at {}",
            self.config.backing_root.display()
        );
    }

    fn getattr(&self, req: RequestInfo, path: &Path, fh: Option<u64>) -> ResultEntry {
        tracing::debug!("getattr: {:?} (fh={:?})", path, fh);
        let st = match fh {
            Some(fh) => {
                let _creds = CredGuard::acquire(&self.config, &req);
                syscalls::fstat(fh as c_int)?
            }
            None => {
                let fpath = self.backing_path(&req, path)?;
                let _creds = CredGuard::acquire(&self.config, &req);
                syscalls::lstat(&fpath)?
            }
        };
        Ok((TTL, stat_to_fuse(&st)))
    }

    fn chmod(&self, req: RequestInfo, path: &Path, fh: Option<u64>, mode: u32) -> ResultEmpty {
        tracing::debug!("chmod: {:?} to {:#o}", path, mode);
        match fh {
            Some(fh) => {
                let _creds = CredGuard::acquire(&self.config, &req);
                syscalls::fchmod(fh as c_int, mode as libc::mode_t)
            }
            None => {
                let fpath = self.backing_path(&req, path)?;
                let _creds = CredGuard::acquire(&self.config, &req);
                syscalls::chmod(&fpath, mode as libc::mode_t)
            }
        }
    }

    fn chown(
        &self,
        req: RequestInfo,
        path: &Path,
        fh: Option<u64>,
        uid: Option<u32>,
        gid: Option<u32>,
    ) -> ResultEmpty {
        tracing::debug!("chown: {:?} to {:?}:{:?}", path, uid, gid);
        // chown(2) takes -1 for "leave unchanged".
        let uid = uid.unwrap_or(u32::MAX);
        let gid = gid.unwrap_or(u32::MAX);
        match fh {
            Some(fh) => {
                let _creds = CredGuard::acquire(&self.config, &req);
                syscalls::fchown(fh as c_int, uid, gid)
            }
            None => {
                let fpath = self.backing_path(&req, path)?;
                let _creds = CredGuard::acquire(&self.config, &req);
                syscalls::chown(&fpath, uid, gid)
            }
        }
    }

    fn truncate(&self, req: RequestInfo, path: &Path, fh: Option<u64>, size: u64) -> ResultEmpty {
        tracing::debug!("truncate: {:?} to {}", path, size);
        match fh {
            Some(fh) => {
                let _creds = CredGuard::acquire(&self.config, &req);
                syscalls::ftruncate(fh as c_int, size as i64)
            }
            None => {
                let fpath = self.backing_path(&req, path)?;
                let _creds = CredGuard::acquire(&self.config, &req);
                syscalls::truncate(&fpath, size as i64)
            }
        }
    }

    fn utimens(
        &self,
        req: RequestInfo,
        path: &Path,
        fh: Option<u64>,
        atime: Option<SystemTime>,
        mtime: Option<SystemTime>,
    ) -> ResultEmpty {
        tracing::debug!("utimens: {:?} atime={:?} mtime={:?}", path, atime, mtime);
        let times = [time_or_omit(atime), time_or_omit(mtime)];
        match fh {
            Some(fh) => {
                let _creds = CredGuard::acquire(&self.config, &req);
                syscalls::futimens(fh as c_int, &times)
            }
            None => {
                let fpath = self.backing_path(&req, path)?;
                let _creds = CredGuard::acquire(&self.config, &req);
                syscalls::utimensat(&fpath, &times)
            }
        }
    }

    fn readlink(&self, req: RequestInfo, path: &Path) -> ResultData {
        tracing::debug!("readlink: {:?}", path);
        let fpath = self.backing_path(&req, path)?;
        let _creds = CredGuard::acquire(&self.config, &req);
        syscalls::readlink(&fpath)
    }

    fn mknod(
        &self,
        req: RequestInfo,
        parent: &Path,
        name: &OsStr,
        mode: u32,
        rdev: u32,
    ) -> ResultEntry {
        tracing::debug!("mknod: {:?}/{:?} mode={:#o} rdev={}", parent, name, mode, rdev);
        let fpath = self.backing_path(&req, &parent.join(name))?;
        let _creds = CredGuard::acquire(&self.config, &req);

        let mode = mode as libc::mode_t;
        if mode & libc::S_IFMT == libc::S_IFREG {
            // open+close is more portable than mknod for plain files.
            let fd = syscalls::create(&fpath, libc::O_CREAT | libc::O_EXCL | libc::O_WRONLY, mode)?;
            syscalls::close(fd)?;
        } else if mode & libc::S_IFMT == libc::S_IFIFO {
            syscalls::mkfifo(&fpath, mode)?;
        } else {
            syscalls::mknod(&fpath, mode, rdev as libc::dev_t)?;
        }

        let st = syscalls::lstat(&fpath)?;
        Ok((TTL, stat_to_fuse(&st)))
    }

    fn mkdir(&self, req: RequestInfo, parent: &Path, name: &OsStr, mode: u32) -> ResultEntry {
        tracing::debug!("mkdir: {:?}/{:?} mode={:#o}", parent, name, mode);
        let fpath = self.backing_path(&req, &parent.join(name))?;
        let _creds = CredGuard::acquire(&self.config, &req);
        syscalls::mkdir(&fpath, mode as libc::mode_t)?;
        let st = syscalls::lstat(&fpath)?;
        Ok((TTL, stat_to_fuse(&st)))
    }

    fn unlink(&self, req: RequestInfo, parent: &Path, name: &OsStr) -> ResultEmpty {
        tracing::debug!("unlink: {:?}/{:?}", parent, name);
        let fpath = self.backing_path(&req, &parent.join(name))?;
        let _creds = CredGuard::acquire(&self.config, &req);
        syscalls::unlink(&fpath)
    }

    fn rmdir(&self, req: RequestInfo, parent: &Path, name: &OsStr) -> ResultEmpty {
        tracing::debug!("rmdir: {:?}/{:?}", parent, name);
        let fpath = self.backing_path(&req, &parent.join(name))?;
        let _creds = CredGuard::acquire(&self.config, &req);
        syscalls::rmdir(&fpath)
    }

    /// Only the link's own location is diverted; the target string is
    /// stored verbatim, wherever it points.
    fn symlink(
        &self,
        req: RequestInfo,
        parent: &Path,
        name: &OsStr,
        target: &Path,
    ) -> ResultEntry {
        tracing::debug!("symlink: {:?}/{:?} -> {:?}", parent, name, target);
        let flink = self.backing_path(&req, &parent.join(name))?;
        let _creds = CredGuard::acquire(&self.config, &req);
        syscalls::symlink(target, &flink)?;
        let st = syscalls::lstat(&flink)?;
        Ok((TTL, stat_to_fuse(&st)))
    }

    fn rename(
        &self,
        req: RequestInfo,
        parent: &Path,
        name: &OsStr,
        newparent: &Path,
        newname: &OsStr,
    ) -> ResultEmpty {
        tracing::debug!(
            "rename: {:?}/{:?} -> {:?}/{:?}",
            parent,
            name,
            newparent,
            newname
        );
        // Both ends are resolved independently; with per-identity
        // redirection they still land in the same identity subtree.
        let fpath = self.backing_path(&req, &parent.join(name))?;
        let fnewpath = self.backing_path(&req, &newparent.join(newname))?;
        let _creds = CredGuard::acquire(&self.config, &req);
        syscalls::rename(&fpath, &fnewpath)
    }

    fn link(
        &self,
        req: RequestInfo,
        path: &Path,
        newparent: &Path,
        newname: &OsStr,
    ) -> ResultEntry {
        tracing::debug!("link: {:?} -> {:?}/{:?}", path, newparent, newname);
        let fpath = self.backing_path(&req, path)?;
        let fnewpath = self.backing_path(&req, &newparent.join(newname))?;
        let _creds = CredGuard::acquire(&self.config, &req);
        syscalls::link(&fpath, &fnewpath)?;
        let st = syscalls::lstat(&fnewpath)?;
        Ok((TTL, stat_to_fuse(&st)))
    }

    fn open(&self, req: RequestInfo, path: &Path, flags: u32) -> ResultOpen {
        tracing::debug!("open: {:?} flags={:#x}", path, flags);
        let fpath = self.backing_path(&req, path)?;
        let _creds = CredGuard::acquire(&self.config, &req);
        let fd = syscalls::open(&fpath, flags as c_int)?;
        Ok((fd as u64, flags))
    }

    fn read(
        &self,
        req: RequestInfo,
        path: &Path,
        fh: u64,
        offset: u64,
        size: u32,
        callback: impl FnOnce(ResultSlice<'_>) -> CallbackResult,
    ) -> CallbackResult {
        tracing::debug!("read: {:?} {:#x} @ {:#x}", path, size, offset);
        let _creds = CredGuard::acquire(&self.config, &req);
        let mut buf = vec![0u8; size as usize];
        match syscalls::pread(fh as c_int, &mut buf, offset as i64) {
            Ok(n) => callback(Ok(&buf[..n])),
            Err(e) => callback(Err(e)),
        }
    }

    fn write(
        &self,
        req: RequestInfo,
        path: &Path,
        fh: u64,
        offset: u64,
        data: Vec<u8>,
        _flags: u32,
    ) -> ResultWrite {
        tracing::debug!("write: {:?} {:#x} @ {:#x}", path, data.len(), offset);
        let _creds = CredGuard::acquire(&self.config, &req);
        let n = syscalls::pwrite(fh as c_int, &data, offset as i64)?;
        Ok(n as u32)
    }

    fn release(
        &self,
        req: RequestInfo,
        path: &Path,
        fh: u64,
        _flags: u32,
        _lock_owner: u64,
        _flush: bool,
    ) -> ResultEmpty {
        tracing::debug!("release: {:?}", path);
        let _creds = CredGuard::acquire(&self.config, &req);
        syscalls::close(fh as c_int)
    }

    fn fsync(&self, req: RequestInfo, path: &Path, fh: u64, datasync: bool) -> ResultEmpty {
        tracing::debug!("fsync: {:?} datasync={}", path, datasync);
        let _creds = CredGuard::acquire(&self.config, &req);
        if datasync {
            syscalls::fdatasync(fh as c_int)
        } else {
            syscalls::fsync(fh as c_int)
        }
    }

    fn opendir(&self, req: RequestInfo, path: &Path, _flags: u32) -> ResultOpen {
        tracing::debug!("opendir: {:?}", path);
        let fpath = self.backing_path(&req, path)?;
        let _creds = CredGuard::acquire(&self.config, &req);
        let fh = syscalls::opendir(&fpath)?;
        Ok((fh, 0))
    }

    /// The whole backing directory is drained in one pass; offsets are not
    /// tracked (the transport paginates from this listing).
    fn readdir(&self, req: RequestInfo, path: &Path, fh: u64) -> ResultReaddir {
        tracing::debug!("readdir: {:?}", path);
        let _creds = CredGuard::acquire(&self.config, &req);
        let entries = syscalls::read_dir_stream(fh)?;
        Ok(entries
            .into_iter()
            .map(|(name, d_type)| DirectoryEntry {
                name,
                kind: dt_to_filetype(d_type),
            })
            .collect())
    }

    fn releasedir(&self, req: RequestInfo, path: &Path, fh: u64, _flags: u32) -> ResultEmpty {
        tracing::debug!("releasedir: {:?}", path);
        let _creds = CredGuard::acquire(&self.config, &req);
        syscalls::closedir(fh)
    }

    fn statfs(&self, req: RequestInfo, path: &Path) -> ResultStatfs {
        tracing::debug!("statfs: {:?}", path);
        let fpath = self.backing_path(&req, path)?;
        let _creds = CredGuard::acquire(&self.config, &req);
        let sv = syscalls::statvfs(&fpath)?;
        Ok(statvfs_to_fuse(&sv))
    }

    fn setxattr(
        &self,
        req: RequestInfo,
        path: &Path,
        name: &OsStr,
        value: &[u8],
        flags: u32,
        _position: u32,
    ) -> ResultEmpty {
        tracing::debug!("setxattr: {:?} {:?} ({} bytes)", path, name, value.len());
        let fpath = self.backing_path(&req, path)?;
        let _creds = CredGuard::acquire(&self.config, &req);
        syscalls::lsetxattr(&fpath, name, value, flags as c_int)
    }

    fn getxattr(&self, req: RequestInfo, path: &Path, name: &OsStr, size: u32) -> ResultXattr {
        tracing::debug!("getxattr: {:?} {:?} size={}", path, name, size);
        let fpath = self.backing_path(&req, path)?;
        let _creds = CredGuard::acquire(&self.config, &req);
        if size == 0 {
            let len = syscalls::lgetxattr_size(&fpath, name)?;
            Ok(Xattr::Size(len as u32))
        } else {
            let data = syscalls::lgetxattr(&fpath, name, size as usize)?;
            Ok(Xattr::Data(data))
        }
    }

    fn listxattr(&self, req: RequestInfo, path: &Path, size: u32) -> ResultXattr {
        tracing::debug!("listxattr: {:?} size={}", path, size);
        let fpath = self.backing_path(&req, path)?;
        let _creds = CredGuard::acquire(&self.config, &req);
        if size == 0 {
            let len = syscalls::llistxattr_size(&fpath)?;
            Ok(Xattr::Size(len as u32))
        } else {
            let data = syscalls::llistxattr(&fpath, size as usize)?;
            Ok(Xattr::Data(data))
        }
    }

    fn removexattr(&self, req: RequestInfo, path: &Path, name: &OsStr) -> ResultEmpty {
        tracing::debug!("removexattr: {:?} {:?}", path, name);
        let fpath = self.backing_path(&req, path)?;
        let _creds = CredGuard::acquire(&self.config, &req);
        syscalls::lremovexattr(&fpath, name)
    }

    fn access(&self, req: RequestInfo, path: &Path, mask: u32) -> ResultEmpty {
        tracing::debug!("access: {:?} mask={:#o}", path, mask);
        let fpath = self.backing_path(&req, path)?;
        let _creds = CredGuard::acquire(&self.config, &req);
        syscalls::access(&fpath, mask as c_int)
    }

    fn create(
        &self,
        req: RequestInfo,
        parent: &Path,
        name: &OsStr,
        mode: u32,
        flags: u32,
    ) -> ResultCreate {
        tracing::debug!(
            "create: {:?}/{:?} mode={:#o} flags={:#x}",
            parent,
            name,
            mode,
            flags
        );
        let fpath = self.backing_path(&req, &parent.join(name))?;
        let _creds = CredGuard::acquire(&self.config, &req);
        // O_RDWR rather than O_WRONLY: some programs fstat or read back
        // through the handle they were just given.
        let fd = syscalls::create(
            &fpath,
            libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
            mode as libc::mode_t,
        )?;
        let st = syscalls::fstat(fd)?;
        Ok(CreatedEntry {
            ttl: TTL,
            attr: stat_to_fuse(&st),
            fh: fd as u64,
            flags,
        })
    }
}
