pub mod cli;
pub mod config;
pub mod error;
pub mod fs;

pub use cli::Args;
pub use config::{Config, FsMode};
pub use error::{Result, UnsharedFsError};
pub use fs::UnsharedFs;
