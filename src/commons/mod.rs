//! Common types used by the various validator components.
pub mod error;
pub mod ext_serde;
pub mod storage;

pub use self::error::Error;

//------------ Response Aliases ----------------------------------------------

pub type ValidatorEmptyResult = std::result::Result<(), self::error::Error>;
pub type ValidatorResult<T> = std::result::Result<T, self::error::Error>;
