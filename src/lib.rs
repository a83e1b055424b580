//! The _RPKI validator_ library crate.

pub mod commons;
pub mod config;
pub mod constants;
pub mod server;
pub mod validation;

#[cfg(test)]
mod test;
