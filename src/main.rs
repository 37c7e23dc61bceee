use clap::Parser;

mod cli;
mod config;
mod error;
mod fs;

use cli::Args;
use config::Config;
use error::UnsharedFsError;

fn main() {
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("UNSHAREDFS_LOG").unwrap_or_else(|_| default_level.to_string()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn run(args: Args) -> error::Result<i32> {
    let config = Config::from_args(&args)?;

    if !config.allow_other_set {
        return Err(UnsharedFsError::Config(
            "allow_other is not set. Specify \"-o allow_other\" to allow other users to access \
             the mount point"
                .to_string(),
        ));
    }

    // Without root the fs-credential switch cannot succeed and the runtime
    // reports the mounter's uid for every request; the mount still works,
    // it just redirects everyone to the mounter's identity directory.
    if !nix::unistd::Uid::effective().is_root() {
        tracing::warn!("file system needs root privileges for proper function");
        tracing::warn!(
            "all accesses will be redirected to {}/{} and be executed under the uid of the \
             current user",
            config.backing_root.display(),
            config.base_uid
        );
    }

    let options = fs::mount::fuse_options(&args);
    fs::mount::mount(config, &args.mountpoint, &options)?;
    Ok(0)
}
