//! Prepare a backing directory tree for unsharedfs.
//!
//! Creates `ROOTDIR/<id>` for each selected principal, owned by that
//! principal, so that a subsequent `unsharedfs ROOTDIR MOUNTPOINT` can
//! divert each caller into its own directory. This tool is a setup helper;
//! the filesystem itself only cares about the resulting tree shape.

use std::ffi::CStr;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use clap::Parser;
use nix::unistd::{chown, Gid, Group, Uid, User};

use unsharedfs::error::{Result, UnsharedFsError};

#[derive(Parser, Debug)]
#[command(name = "unsharedfs-mkdirs", version)]
#[command(about = "Create per-identity directories under an unsharedfs backing root")]
struct Args {
    /// Backing root directory (must exist).
    rootdir: PathBuf,

    /// Users (or groups with --use-gid) to create identity directories
    /// for, by name or numeric id.
    users: Vec<String>,

    /// Create a directory for every entry in the account database whose id
    /// falls within the range below.
    #[arg(short = 'a', long)]
    all: bool,

    #[arg(long, value_name = "ID", default_value_t = 1000)]
    uid_min: u32,

    #[arg(long, value_name = "ID", default_value_t = 60000)]
    uid_max: u32,

    /// Name directories by group id and give them group ownership, for an
    /// unsharedfs mount running with --use-gid.
    #[arg(long)]
    use_gid: bool,

    /// Also create a "default" directory for use with --fallback=default.
    #[arg(long)]
    with_default: bool,

    /// Operate even if the root directory is not empty.
    #[arg(long)]
    force: bool,
}

/// One directory to create: its decimal name and the ownership it gets.
struct Principal {
    id: u32,
    owner_uid: Option<Uid>,
    owner_gid: Gid,
    label: String,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("UNSHAREDFS_LOG").unwrap_or_else(|_| "info".to_string()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    if !args.rootdir.is_dir() {
        return Err(UnsharedFsError::NotADirectory(args.rootdir.clone()));
    }
    if !args.all && args.users.is_empty() {
        return Err(UnsharedFsError::Config(
            "No users given; name users explicitly or pass --all".to_string(),
        ));
    }

    if !args.force && fs::read_dir(&args.rootdir)?.next().is_some() {
        return Err(UnsharedFsError::Config(format!(
            "{} is not empty; pass --force to use it anyway",
            args.rootdir.display()
        )));
    }

    let principals = if args.all {
        if args.use_gid {
            enumerate_groups(args.uid_min, args.uid_max)
        } else {
            enumerate_users(args.uid_min, args.uid_max)
        }
    } else {
        resolve_principals(&args.users, args.use_gid)?
    };

    for principal in &principals {
        create_identity_dir(&args.rootdir, principal, args.use_gid)?;
    }

    if args.with_default {
        let path = args.rootdir.join("default");
        if path.exists() {
            tracing::info!("{} already exists, skipping", path.display());
        } else {
            fs::create_dir(&path)?;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
            tracing::info!("created fallback directory {}", path.display());
        }
    }

    tracing::info!(
        "prepared {} identity directories under {}",
        principals.len(),
        args.rootdir.display()
    );
    Ok(())
}

fn create_identity_dir(rootdir: &Path, principal: &Principal, use_gid: bool) -> Result<()> {
    let path = rootdir.join(principal.id.to_string());
    if path.exists() {
        tracing::info!("{} already exists, skipping", path.display());
        return Ok(());
    }

    fs::create_dir(&path)?;
    // Group-shared in gid mode, private otherwise.
    let mode = if use_gid { 0o770 } else { 0o700 };
    fs::set_permissions(&path, fs::Permissions::from_mode(mode))?;
    chown(&path, principal.owner_uid, Some(principal.owner_gid)).map_err(|e| {
        UnsharedFsError::Config(format!(
            "Cannot chown {} to {}: {}",
            path.display(),
            principal.label,
            e
        ))
    })?;

    tracing::info!("created {} for {}", path.display(), principal.label);
    Ok(())
}

fn resolve_principals(names: &[String], use_gid: bool) -> Result<Vec<Principal>> {
    names
        .iter()
        .map(|name| {
            if use_gid {
                lookup_group(name)
            } else {
                lookup_user(name)
            }
        })
        .collect()
}

fn lookup_user(name: &str) -> Result<Principal> {
    let user = match name.parse::<u32>() {
        Ok(uid) => User::from_uid(Uid::from_raw(uid)),
        Err(_) => User::from_name(name),
    }
    .map_err(|e| UnsharedFsError::Config(format!("Cannot look up user {}: {}", name, e)))?
    .ok_or_else(|| UnsharedFsError::Config(format!("No such user: {}", name)))?;

    Ok(Principal {
        id: user.uid.as_raw(),
        owner_uid: Some(user.uid),
        owner_gid: user.gid,
        label: format!("user {}", user.name),
    })
}

fn lookup_group(name: &str) -> Result<Principal> {
    let group = match name.parse::<u32>() {
        Ok(gid) => Group::from_gid(Gid::from_raw(gid)),
        Err(_) => Group::from_name(name),
    }
    .map_err(|e| UnsharedFsError::Config(format!("Cannot look up group {}: {}", name, e)))?
    .ok_or_else(|| UnsharedFsError::Config(format!("No such group: {}", name)))?;

    Ok(Principal {
        id: group.gid.as_raw(),
        owner_uid: None,
        owner_gid: group.gid,
        label: format!("group {}", group.name),
    })
}

/// Walk the password database. getpwent(3) keeps static state, so the walk
/// happens in one uninterrupted sweep.
fn enumerate_users(uid_min: u32, uid_max: u32) -> Vec<Principal> {
    let mut principals = Vec::new();
    unsafe {
        libc::setpwent();
        loop {
            let pw = libc::getpwent();
            if pw.is_null() {
                break;
            }
            let uid = (*pw).pw_uid;
            if uid < uid_min || uid > uid_max {
                continue;
            }
            let name = CStr::from_ptr((*pw).pw_name).to_string_lossy().into_owned();
            principals.push(Principal {
                id: uid,
                owner_uid: Some(Uid::from_raw(uid)),
                owner_gid: Gid::from_raw((*pw).pw_gid),
                label: format!("user {}", name),
            });
        }
        libc::endpwent();
    }
    principals
}

fn enumerate_groups(gid_min: u32, gid_max: u32) -> Vec<Principal> {
    let mut principals = Vec::new();
    unsafe {
        libc::setgrent();
        loop {
            let gr = libc::getgrent();
            if gr.is_null() {
                break;
            }
            let gid = (*gr).gr_gid;
            if gid < gid_min || gid > gid_max {
                continue;
            }
            let name = CStr::from_ptr((*gr).gr_name).to_string_lossy().into_owned();
            principals.push(Principal {
                id: gid,
                owner_uid: None,
                owner_gid: Gid::from_raw(gid),
                label: format!("group {}", name),
            });
        }
        libc::endgrent();
    }
    principals
}
