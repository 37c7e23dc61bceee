use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, UnsharedFsError>;

#[derive(Error, Debug)]
pub enum UnsharedFsError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("FUSE error: {0}")]
    Fuse(String),
}
