//! Validating RPKI repositories.
//!
//! The [`process`] module runs a complete validation of one trust anchor,
//! using the [`walker`] to go through its repository tree and a
//! [`fetch::RepoFetcher`] to keep the object store up to date.

pub mod checks;
pub mod fetch;
pub mod locator;
pub mod object;
pub mod options;
pub mod process;
pub mod walker;
