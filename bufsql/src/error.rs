//! Error types for bufsql.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::store::StoreError;
use crate::upload::UploadError;

pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("could not read buffer file at '{}'", path.display())]
    BufferMissing { path: PathBuf },

    #[error("no country code registered for '{code}'")]
    CountryCodeMissing { code: String },
}

impl IngestError {
    pub fn buffer_missing(path: impl Into<PathBuf>) -> Self {
        Self::BufferMissing { path: path.into() }
    }

    pub fn country_code_missing(code: impl Into<String>) -> Self {
        Self::CountryCodeMissing { code: code.into() }
    }
}
