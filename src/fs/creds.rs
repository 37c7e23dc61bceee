use fuse_mt::RequestInfo;
use nix::unistd::{setfsgid, setfsuid, Gid, Uid};

use crate::config::Config;

/// Scoped switch of the calling thread's filesystem credentials to the
/// request's identity. Dropping the guard restores the mount owner's
/// identity on every exit path, including panics unwinding through a
/// callback.
///
/// setfsuid/setfsgid affect only file-permission checks and only the
/// current thread, so concurrent requests on other dispatch threads can
/// carry different identities without interference, and switching back
/// never requires re-acquiring privilege.
pub(crate) struct CredGuard {
    base_uid: u32,
    base_gid: u32,
    req_uid: u32,
    req_gid: u32,
    active: bool,
}

impl CredGuard {
    pub(crate) fn acquire(config: &Config, req: &RequestInfo) -> CredGuard {
        // Some internal fuse calls carry an empty context; there is no
        // principal to impersonate for those.
        if req.pid == 0 {
            return CredGuard {
                base_uid: config.base_uid,
                base_gid: config.base_gid,
                req_uid: 0,
                req_gid: 0,
                active: false,
            };
        }

        // gid first: once the fsuid drops privilege, changing the fsgid
        // would no longer be permitted.
        //
        // setfsgid returns the previous value on success and the current
        // value on failure, so anything other than the base id means the
        // switch did not happen. The failure is logged but not propagated:
        // the host call that follows will fail with the permission error
        // that is the correct thing to report.
        let prev_gid = setfsgid(Gid::from_raw(req.gid));
        if prev_gid.as_raw() != config.base_gid {
            tracing::warn!(
                "failed to set fsgid from {} to {}",
                config.base_gid,
                req.gid
            );
        }
        let prev_uid = setfsuid(Uid::from_raw(req.uid));
        if prev_uid.as_raw() != config.base_uid {
            tracing::warn!(
                "failed to set fsuid from {} to {}",
                config.base_uid,
                req.uid
            );
        }

        CredGuard {
            base_uid: config.base_uid,
            base_gid: config.base_gid,
            req_uid: req.uid,
            req_gid: req.gid,
            active: true,
        }
    }
}

impl Drop for CredGuard {
    fn drop(&mut self) {
        if !self.active {
            return;
        }

        let prev_uid = setfsuid(Uid::from_raw(self.base_uid));
        if prev_uid.as_raw() != self.req_uid {
            tracing::warn!(
                "failed to restore fsuid from {} to {}",
                self.req_uid,
                self.base_uid
            );
        }
        let prev_gid = setfsgid(Gid::from_raw(self.base_gid));
        if prev_gid.as_raw() != self.req_gid {
            tracing::warn!(
                "failed to restore fsgid from {} to {}",
                self.req_gid,
                self.base_gid
            );
        }
    }
}
