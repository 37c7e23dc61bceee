use fuse_mt::{FileAttr, FileType, Statfs};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub(crate) fn mode_to_filetype(mode: libc::mode_t) -> FileType {
    match mode & libc::S_IFMT {
        libc::S_IFDIR => FileType::Directory,
        libc::S_IFREG => FileType::RegularFile,
        libc::S_IFLNK => FileType::Symlink,
        libc::S_IFBLK => FileType::BlockDevice,
        libc::S_IFCHR => FileType::CharDevice,
        libc::S_IFIFO => FileType::NamedPipe,
        libc::S_IFSOCK => FileType::Socket,
        _ => FileType::RegularFile,
    }
}

/// Map a dirent `d_type` byte. Filesystems that don't fill d_type report
/// `DT_UNKNOWN`; the entry kind is advisory and the kernel will stat on
/// demand, so a regular-file placeholder is fine there.
pub(crate) fn dt_to_filetype(d_type: u8) -> FileType {
    match d_type {
        libc::DT_DIR => FileType::Directory,
        libc::DT_REG => FileType::RegularFile,
        libc::DT_LNK => FileType::Symlink,
        libc::DT_BLK => FileType::BlockDevice,
        libc::DT_CHR => FileType::CharDevice,
        libc::DT_FIFO => FileType::NamedPipe,
        libc::DT_SOCK => FileType::Socket,
        _ => FileType::RegularFile,
    }
}

pub(crate) fn stat_to_fuse(st: &libc::stat) -> FileAttr {
    let time = |secs: i64, nanos: i64| {
        if secs >= 0 {
            UNIX_EPOCH + Duration::new(secs as u64, nanos as u32)
        } else {
            UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
        }
    };

    FileAttr {
        size: st.st_size as u64,
        blocks: st.st_blocks as u64,
        atime: time(st.st_atime, st.st_atime_nsec),
        mtime: time(st.st_mtime, st.st_mtime_nsec),
        ctime: time(st.st_ctime, st.st_ctime_nsec),
        crtime: UNIX_EPOCH,
        kind: mode_to_filetype(st.st_mode),
        perm: (st.st_mode & 0o7777) as u16,
        nlink: st.st_nlink as u32,
        uid: st.st_uid,
        gid: st.st_gid,
        rdev: st.st_rdev as u32,
        flags: 0,
    }
}

pub(crate) fn statvfs_to_fuse(sv: &libc::statvfs) -> Statfs {
    Statfs {
        blocks: sv.f_blocks as u64,
        bfree: sv.f_bfree as u64,
        bavail: sv.f_bavail as u64,
        files: sv.f_files as u64,
        ffree: sv.f_ffree as u64,
        bsize: sv.f_bsize as u32,
        namelen: sv.f_namemax as u32,
        frsize: sv.f_frsize as u32,
    }
}

/// Build the utimensat(2) time pair: absent components are left untouched
/// via UTIME_OMIT rather than being reset.
pub(crate) fn time_or_omit(time: Option<SystemTime>) -> libc::timespec {
    match time {
        Some(time) => {
            let (secs, nanos) = match time.duration_since(UNIX_EPOCH) {
                Ok(d) => (d.as_secs() as i64, d.subsec_nanos()),
                Err(before) => {
                    let d = before.duration();
                    (-(d.as_secs() as i64), d.subsec_nanos())
                }
            };
            libc::timespec {
                tv_sec: secs,
                tv_nsec: nanos as libc::c_long,
            }
        }
        None => libc::timespec {
            tv_sec: 0,
            tv_nsec: libc::UTIME_OMIT,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::syscalls;
    use std::io::Write;

    #[test]
    fn test_stat_to_fuse_regular_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"abc").unwrap();
        let st = syscalls::lstat(file.path()).unwrap();
        let attr = stat_to_fuse(&st);
        assert_eq!(attr.size, 3);
        assert_eq!(attr.kind, FileType::RegularFile);
        assert_eq!(attr.uid, nix::unistd::getuid().as_raw());
    }

    #[test]
    fn test_mode_to_filetype() {
        assert_eq!(mode_to_filetype(libc::S_IFDIR | 0o755), FileType::Directory);
        assert_eq!(mode_to_filetype(libc::S_IFLNK | 0o777), FileType::Symlink);
        assert_eq!(mode_to_filetype(libc::S_IFIFO | 0o644), FileType::NamedPipe);
    }

    #[test]
    fn test_dt_to_filetype_unknown_defaults_to_file() {
        assert_eq!(dt_to_filetype(libc::DT_UNKNOWN), FileType::RegularFile);
        assert_eq!(dt_to_filetype(libc::DT_DIR), FileType::Directory);
    }

    #[test]
    fn test_time_or_omit() {
        let omitted = time_or_omit(None);
        assert_eq!(omitted.tv_nsec, libc::UTIME_OMIT);

        let at_epoch = time_or_omit(Some(UNIX_EPOCH + Duration::new(10, 500)));
        assert_eq!(at_epoch.tv_sec, 10);
        assert_eq!(at_epoch.tv_nsec, 500);
    }
}
