//! Defines the validator's crate-wide error type.

use std::{error, fmt, io};
use crate::commons::storage::StoreError;
use crate::config::ConfigError;
use crate::server::ranking::RankingError;
use crate::validation::locator::LocatorError;


//------------ Error ---------------------------------------------------------

#[derive(Debug)]
pub enum Error {
    //-----------------------------------------------------------------
    // System Issues
    //-----------------------------------------------------------------

    /// An IO error with some context.
    Io(ValidatorIoError),

    /// The object store reported an error.
    Storage(StoreError),

    /// The configuration could not be used.
    Config(ConfigError),

    //-----------------------------------------------------------------
    // Trust Anchor Issues
    //-----------------------------------------------------------------

    /// A trust anchor locator file could not be loaded.
    Locator(LocatorError),

    /// Two locators describe a trust anchor with the same identity.
    DuplicateTrustAnchor(String),

    /// A trust anchor with the given name is not known.
    UnknownTrustAnchor(String),

    //-----------------------------------------------------------------
    // Peripheral Data
    //-----------------------------------------------------------------

    /// The AS ranking data could not be loaded.
    Ranking(RankingError),

}

impl Error {
    pub fn io_error_with_context(context: String, cause: io::Error) -> Self {
        Error::Io(ValidatorIoError::new(context, cause))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => err.fmt(f),
            Error::Storage(err) => write!(f, "Storage error: {err}"),
            Error::Config(err) => write!(f, "Configuration error: {err}"),
            Error::Locator(err) => err.fmt(f),
            Error::DuplicateTrustAnchor(name) => {
                write!(f, "Duplicate trust anchor '{name}'")
            }
            Error::UnknownTrustAnchor(name) => {
                write!(f, "Unknown trust anchor '{name}'")
            }
            Error::Ranking(err) => write!(f, "Cannot load AS rankings: {err}"),
        }
    }
}

impl error::Error for Error { }

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Error::Storage(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<LocatorError> for Error {
    fn from(err: LocatorError) -> Self {
        Error::Locator(err)
    }
}

impl From<RankingError> for Error {
    fn from(err: RankingError) -> Self {
        Error::Ranking(err)
    }
}


//------------ ValidatorIoError ----------------------------------------------

/// An IO error together with what we were trying to do.
#[derive(Debug)]
pub struct ValidatorIoError {
    context: String,
    cause: io::Error,
}

impl ValidatorIoError {
    pub fn new(context: String, cause: io::Error) -> Self {
        ValidatorIoError { context, cause }
    }
}

impl fmt::Display for ValidatorIoError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.context, self.cause)
    }
}

impl error::Error for ValidatorIoError { }

impl From<ValidatorIoError> for Error {
    fn from(err: ValidatorIoError) -> Self {
        Error::Io(err)
    }
}
