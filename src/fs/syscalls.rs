//! Thin wrappers around the host filesystem calls the dispatcher delegates
//! to. Every wrapper makes exactly one call and reports failure as the raw
//! os error number, which the FUSE transport negates on the wire.
//!
//! All pointer arguments handed to libc are NUL-terminated `CString`s (or
//! buffers) created in the same scope, so the unsafe blocks below only rely
//! on the usual contract of the corresponding syscall.

use std::ffi::{CStr, CString, OsStr, OsString};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::Path;

use libc::c_int;

pub(crate) fn to_cstring(path: &Path) -> Result<CString, c_int> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| libc::EINVAL)
}

fn name_to_cstring(name: &OsStr) -> Result<CString, c_int> {
    CString::new(name.as_bytes()).map_err(|_| libc::EINVAL)
}

fn last_errno() -> c_int {
    std::io::Error::last_os_error()
        .raw_os_error()
        .unwrap_or(libc::EIO)
}

fn check(rc: c_int) -> Result<(), c_int> {
    if rc == 0 {
        Ok(())
    } else {
        Err(last_errno())
    }
}

pub(crate) fn lstat(path: &Path) -> Result<libc::stat, c_int> {
    let cpath = to_cstring(path)?;
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    check(unsafe { libc::lstat(cpath.as_ptr(), &mut st) })?;
    Ok(st)
}

pub(crate) fn fstat(fd: c_int) -> Result<libc::stat, c_int> {
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    check(unsafe { libc::fstat(fd, &mut st) })?;
    Ok(st)
}

pub(crate) fn open(path: &Path, flags: c_int) -> Result<c_int, c_int> {
    let cpath = to_cstring(path)?;
    let fd = unsafe { libc::open(cpath.as_ptr(), flags) };
    if fd < 0 {
        Err(last_errno())
    } else {
        Ok(fd)
    }
}

pub(crate) fn create(path: &Path, flags: c_int, mode: libc::mode_t) -> Result<c_int, c_int> {
    let cpath = to_cstring(path)?;
    let fd = unsafe { libc::open(cpath.as_ptr(), flags, mode as libc::c_uint) };
    if fd < 0 {
        Err(last_errno())
    } else {
        Ok(fd)
    }
}

pub(crate) fn close(fd: c_int) -> Result<(), c_int> {
    check(unsafe { libc::close(fd) })
}

pub(crate) fn pread(fd: c_int, buf: &mut [u8], offset: i64) -> Result<usize, c_int> {
    let n = unsafe {
        libc::pread(
            fd,
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len(),
            offset as libc::off_t,
        )
    };
    if n < 0 {
        Err(last_errno())
    } else {
        Ok(n as usize)
    }
}

pub(crate) fn pwrite(fd: c_int, data: &[u8], offset: i64) -> Result<usize, c_int> {
    let n = unsafe {
        libc::pwrite(
            fd,
            data.as_ptr() as *const libc::c_void,
            data.len(),
            offset as libc::off_t,
        )
    };
    if n < 0 {
        Err(last_errno())
    } else {
        Ok(n as usize)
    }
}

pub(crate) fn fsync(fd: c_int) -> Result<(), c_int> {
    check(unsafe { libc::fsync(fd) })
}

pub(crate) fn fdatasync(fd: c_int) -> Result<(), c_int> {
    check(unsafe { libc::fdatasync(fd) })
}

pub(crate) fn ftruncate(fd: c_int, size: i64) -> Result<(), c_int> {
    check(unsafe { libc::ftruncate(fd, size as libc::off_t) })
}

pub(crate) fn truncate(path: &Path, size: i64) -> Result<(), c_int> {
    let cpath = to_cstring(path)?;
    check(unsafe { libc::truncate(cpath.as_ptr(), size as libc::off_t) })
}

pub(crate) fn mkfifo(path: &Path, mode: libc::mode_t) -> Result<(), c_int> {
    let cpath = to_cstring(path)?;
    check(unsafe { libc::mkfifo(cpath.as_ptr(), mode) })
}

pub(crate) fn mknod(path: &Path, mode: libc::mode_t, dev: libc::dev_t) -> Result<(), c_int> {
    let cpath = to_cstring(path)?;
    check(unsafe { libc::mknod(cpath.as_ptr(), mode, dev) })
}

pub(crate) fn mkdir(path: &Path, mode: libc::mode_t) -> Result<(), c_int> {
    let cpath = to_cstring(path)?;
    check(unsafe { libc::mkdir(cpath.as_ptr(), mode) })
}

pub(crate) fn rmdir(path: &Path) -> Result<(), c_int> {
    let cpath = to_cstring(path)?;
    check(unsafe { libc::rmdir(cpath.as_ptr()) })
}

pub(crate) fn unlink(path: &Path) -> Result<(), c_int> {
    let cpath = to_cstring(path)?;
    check(unsafe { libc::unlink(cpath.as_ptr()) })
}

/// The target string is passed through byte for byte; symlink contents are
/// never rewritten to point into the backing tree.
pub(crate) fn symlink(target: &Path, linkpath: &Path) -> Result<(), c_int> {
    let ctarget = to_cstring(target)?;
    let clink = to_cstring(linkpath)?;
    check(unsafe { libc::symlink(ctarget.as_ptr(), clink.as_ptr()) })
}

pub(crate) fn readlink(path: &Path) -> Result<Vec<u8>, c_int> {
    let cpath = to_cstring(path)?;
    let mut buf = vec![0u8; libc::PATH_MAX as usize];
    let n = unsafe {
        libc::readlink(
            cpath.as_ptr(),
            buf.as_mut_ptr() as *mut libc::c_char,
            buf.len(),
        )
    };
    if n < 0 {
        return Err(last_errno());
    }
    buf.truncate(n as usize);
    Ok(buf)
}

pub(crate) fn rename(from: &Path, to: &Path) -> Result<(), c_int> {
    let cfrom = to_cstring(from)?;
    let cto = to_cstring(to)?;
    check(unsafe { libc::rename(cfrom.as_ptr(), cto.as_ptr()) })
}

pub(crate) fn link(from: &Path, to: &Path) -> Result<(), c_int> {
    let cfrom = to_cstring(from)?;
    let cto = to_cstring(to)?;
    check(unsafe { libc::link(cfrom.as_ptr(), cto.as_ptr()) })
}

pub(crate) fn chmod(path: &Path, mode: libc::mode_t) -> Result<(), c_int> {
    let cpath = to_cstring(path)?;
    check(unsafe { libc::chmod(cpath.as_ptr(), mode) })
}

pub(crate) fn fchmod(fd: c_int, mode: libc::mode_t) -> Result<(), c_int> {
    check(unsafe { libc::fchmod(fd, mode) })
}

pub(crate) fn chown(path: &Path, uid: libc::uid_t, gid: libc::gid_t) -> Result<(), c_int> {
    let cpath = to_cstring(path)?;
    check(unsafe { libc::chown(cpath.as_ptr(), uid, gid) })
}

pub(crate) fn fchown(fd: c_int, uid: libc::uid_t, gid: libc::gid_t) -> Result<(), c_int> {
    check(unsafe { libc::fchown(fd, uid, gid) })
}

/// fpath is absolute, so the dirfd parameter is ignored.
pub(crate) fn utimensat(path: &Path, times: &[libc::timespec; 2]) -> Result<(), c_int> {
    let cpath = to_cstring(path)?;
    check(unsafe { libc::utimensat(libc::AT_FDCWD, cpath.as_ptr(), times.as_ptr(), 0) })
}

pub(crate) fn futimens(fd: c_int, times: &[libc::timespec; 2]) -> Result<(), c_int> {
    check(unsafe { libc::futimens(fd, times.as_ptr()) })
}

pub(crate) fn access(path: &Path, mask: c_int) -> Result<(), c_int> {
    let cpath = to_cstring(path)?;
    check(unsafe { libc::access(cpath.as_ptr(), mask) })
}

pub(crate) fn statvfs(path: &Path) -> Result<libc::statvfs, c_int> {
    let cpath = to_cstring(path)?;
    let mut sv: libc::statvfs = unsafe { std::mem::zeroed() };
    check(unsafe { libc::statvfs(cpath.as_ptr(), &mut sv) })?;
    Ok(sv)
}

/// Open a directory stream and hand back the stream pointer as the opaque
/// handle value stored in the FUSE file-info slot.
pub(crate) fn opendir(path: &Path) -> Result<u64, c_int> {
    let cpath = to_cstring(path)?;
    let dp = unsafe { libc::opendir(cpath.as_ptr()) };
    if dp.is_null() {
        Err(last_errno())
    } else {
        Ok(dp as usize as u64)
    }
}

pub(crate) fn closedir(fh: u64) -> Result<(), c_int> {
    check(unsafe { libc::closedir(fh as usize as *mut libc::DIR) })
}

/// Drain a directory stream in a single pass, returning each entry's name
/// and `d_type` byte. Every directory contains at least `.` and `..`, so a
/// null return from the very first readdir(3) is an error and its errno is
/// propagated.
pub(crate) fn read_dir_stream(fh: u64) -> Result<Vec<(OsString, u8)>, c_int> {
    let dp = fh as usize as *mut libc::DIR;
    let mut entries = Vec::new();

    nix::errno::Errno::clear();
    let mut de = unsafe { libc::readdir(dp) };
    if de.is_null() {
        return Err(last_errno());
    }

    while !de.is_null() {
        let name = unsafe { CStr::from_ptr((*de).d_name.as_ptr()) };
        let d_type = unsafe { (*de).d_type };
        entries.push((OsString::from_vec(name.to_bytes().to_vec()), d_type));
        de = unsafe { libc::readdir(dp) };
    }

    Ok(entries)
}

pub(crate) fn lsetxattr(
    path: &Path,
    name: &OsStr,
    value: &[u8],
    flags: c_int,
) -> Result<(), c_int> {
    let cpath = to_cstring(path)?;
    let cname = name_to_cstring(name)?;
    check(unsafe {
        libc::lsetxattr(
            cpath.as_ptr(),
            cname.as_ptr(),
            value.as_ptr() as *const libc::c_void,
            value.len(),
            flags,
        )
    })
}

pub(crate) fn lgetxattr_size(path: &Path, name: &OsStr) -> Result<usize, c_int> {
    let cpath = to_cstring(path)?;
    let cname = name_to_cstring(name)?;
    let n = unsafe { libc::lgetxattr(cpath.as_ptr(), cname.as_ptr(), std::ptr::null_mut(), 0) };
    if n < 0 {
        Err(last_errno())
    } else {
        Ok(n as usize)
    }
}

pub(crate) fn lgetxattr(path: &Path, name: &OsStr, size: usize) -> Result<Vec<u8>, c_int> {
    let cpath = to_cstring(path)?;
    let cname = name_to_cstring(name)?;
    let mut buf = vec![0u8; size];
    let n = unsafe {
        libc::lgetxattr(
            cpath.as_ptr(),
            cname.as_ptr(),
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len(),
        )
    };
    if n < 0 {
        return Err(last_errno());
    }
    buf.truncate(n as usize);
    Ok(buf)
}

pub(crate) fn llistxattr_size(path: &Path) -> Result<usize, c_int> {
    let cpath = to_cstring(path)?;
    let n = unsafe { libc::llistxattr(cpath.as_ptr(), std::ptr::null_mut(), 0) };
    if n < 0 {
        Err(last_errno())
    } else {
        Ok(n as usize)
    }
}

pub(crate) fn llistxattr(path: &Path, size: usize) -> Result<Vec<u8>, c_int> {
    let cpath = to_cstring(path)?;
    let mut buf = vec![0u8; size];
    let n = unsafe {
        libc::llistxattr(
            cpath.as_ptr(),
            buf.as_mut_ptr() as *mut libc::c_char,
            buf.len(),
        )
    };
    if n < 0 {
        return Err(last_errno());
    }
    buf.truncate(n as usize);
    Ok(buf)
}

pub(crate) fn lremovexattr(path: &Path, name: &OsStr) -> Result<(), c_int> {
    let cpath = to_cstring(path)?;
    let cname = name_to_cstring(name)?;
    check(unsafe { libc::lremovexattr(cpath.as_ptr(), cname.as_ptr()) })
}
