use crate::wg::{config::ParseError, uapi::UapiError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("parse error: {0}")]
    ParseError(#[from] ParseError),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("uapi error: {0}")]
    UapiError(#[from] UapiError),
}
