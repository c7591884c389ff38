//! Top-level error type aggregating subsystem errors, for the boundary
//! where `main` needs one shared return type. Manual `Display`/`Error`
//! impl, matching the host project's top-level network error rather than
//! deriving `thiserror` at the aggregate level.

use std::fmt;

use crate::config::ConfigError;
use crate::crypto::CryptoError;
use crate::store::StoreError;

#[derive(Debug)]
pub enum CoreError {
    Config(ConfigError),
    Crypto(CryptoError),
    Store(StoreError),
    Io(std::io::Error),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::Config(e) => write!(f, "configuration error: {}", e),
            CoreError::Crypto(e) => write!(f, "crypto error: {}", e),
            CoreError::Store(e) => write!(f, "store error: {}", e),
            CoreError::Io(e) => write!(f, "io error: {}", e),
        }
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CoreError::Config(e) => Some(e),
            CoreError::Crypto(e) => Some(e),
            CoreError::Store(e) => Some(e),
            CoreError::Io(e) => Some(e),
        }
    }
}

impl From<ConfigError> for CoreError {
    fn from(e: ConfigError) -> Self {
        CoreError::Config(e)
    }
}

impl From<CryptoError> for CoreError {
    fn from(e: CryptoError) -> Self {
        CoreError::Crypto(e)
    }
}

impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        CoreError::Store(e)
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Io(e)
    }
}
