//! Persistent storage of repository objects.

use std::fmt;
use crate::constants::{BROKEN_NS, CERTIFICATES_NS, DOWNLOADS_NS, OBJECTS_NS};

pub use self::store::{
    BrokenObject, DownloadedObject, ObjectStore, ObjectType, StoreError,
    StoredCertificate, StoredObject,
};

mod backends;
mod store;


//------------ Namespace -----------------------------------------------------

/// The separate areas of the object store.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Namespace {
    /// The raw bytes of everything fetched from repositories.
    Downloads,

    /// Resource certificates that passed validation.
    Certificates,

    /// Manifests, CRLs, and ROAs that passed validation.
    Objects,

    /// Downloads that could not be parsed.
    Broken,
}

impl Namespace {
    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Downloads => DOWNLOADS_NS,
            Namespace::Certificates => CERTIFICATES_NS,
            Namespace::Objects => OBJECTS_NS,
            Namespace::Broken => BROKEN_NS,
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
