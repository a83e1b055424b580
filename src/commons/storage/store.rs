//! The object store.

use std::{error, fmt};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use rpki::crypto::KeyIdentifier;
use rpki::{rrdp, uri};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;
use super::Namespace;
use super::backends::{Backend, BackendError};


//------------ ObjectStore ---------------------------------------------------

/// Byte-level storage for repository objects.
///
/// Fetchers put the raw bytes of everything they download into the store.
/// The validation walk reads them from there and afterwards records what
/// it found: valid certificates and other objects keyed by the key
/// identifier of their issuer and their URI, and objects that could not be
/// parsed at all keyed by their URI only.
///
/// The store is safe to share between concurrent validation runs. Each
/// individual read or write is atomic.
#[derive(Debug)]
pub struct ObjectStore {
    backend: Backend,
}

impl ObjectStore {
    /// Opens the store for the given storage URI.
    ///
    /// Supported schemes are `memory:` and `local://`.
    pub fn new(storage_uri: &Url) -> Result<Self, StoreError> {
        Ok(ObjectStore { backend: Backend::new(storage_uri)? })
    }

    fn get<T: DeserializeOwned>(
        &self, namespace: Namespace, key: &str
    ) -> Result<Option<T>, StoreError> {
        match self.backend.get(namespace, key)? {
            Some(value) => {
                serde_json::from_value(value).map(Some).map_err(|err| {
                    StoreError::deserialize(namespace, key, err)
                })
            }
            None => Ok(None)
        }
    }

    fn put<T: Serialize>(
        &self, namespace: Namespace, key: &str, value: &T
    ) -> Result<(), StoreError> {
        let value = serde_json::to_value(value).map_err(|err| {
            StoreError::serialize(namespace, key, err)
        })?;
        self.backend.store(namespace, key, value)?;
        Ok(())
    }

    /// Returns the number of values stored in the given namespace.
    #[cfg(test)]
    pub fn count(&self, namespace: Namespace) -> Result<usize, StoreError> {
        Ok(self.backend.list_keys(namespace)?.len())
    }
}

/// # Downloads
impl ObjectStore {
    pub fn get_download(
        &self, uri: &uri::Rsync
    ) -> Result<Option<DownloadedObject>, StoreError> {
        self.get(Namespace::Downloads, &uri.to_string())
    }

    pub fn put_download(
        &self, object: &DownloadedObject
    ) -> Result<(), StoreError> {
        self.put(Namespace::Downloads, &object.uri.to_string(), object)
    }

    /// Returns the locations of all downloads.
    pub fn download_uris(&self) -> Result<Vec<uri::Rsync>, StoreError> {
        let keys = self.backend.list_keys(Namespace::Downloads)?;
        Ok(keys.iter().filter_map(|key| key.parse().ok()).collect())
    }

    /// Forgets about a download, e.g., because it vanished upstream.
    pub fn remove_download(&self, uri: &uri::Rsync) -> Result<(), StoreError> {
        Ok(self.backend.delete(Namespace::Downloads, &uri.to_string())?)
    }
}

/// # Validated objects
impl ObjectStore {
    #[cfg(test)]
    pub fn get_certificate(
        &self, aki: KeyIdentifier, uri: &uri::Rsync
    ) -> Result<Option<StoredCertificate>, StoreError> {
        self.get(Namespace::Certificates, &issued_key(aki, uri))
    }

    pub fn put_certificate(
        &self, cert: &StoredCertificate
    ) -> Result<(), StoreError> {
        self.put(
            Namespace::Certificates, &issued_key(cert.aki, &cert.uri), cert
        )
    }

    #[cfg(test)]
    pub fn get_object(
        &self, aki: KeyIdentifier, uri: &uri::Rsync
    ) -> Result<Option<StoredObject>, StoreError> {
        self.get(Namespace::Objects, &issued_key(aki, uri))
    }

    pub fn put_object(&self, object: &StoredObject) -> Result<(), StoreError> {
        self.put(
            Namespace::Objects, &issued_key(object.aki, &object.uri), object
        )
    }

    pub fn get_broken(
        &self, uri: &uri::Rsync
    ) -> Result<Option<BrokenObject>, StoreError> {
        self.get(Namespace::Broken, &uri.to_string())
    }

    pub fn put_broken(&self, object: &BrokenObject) -> Result<(), StoreError> {
        self.put(Namespace::Broken, &object.uri.to_string(), object)
    }
}

fn issued_key(aki: KeyIdentifier, uri: &uri::Rsync) -> String {
    format!("{aki}-{uri}")
}


//------------ DownloadedObject ----------------------------------------------

/// The raw bytes of an object as they were last downloaded.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct DownloadedObject {
    pub uri: uri::Rsync,
    pub hash: rrdp::Hash,
    #[serde(
        deserialize_with = "crate::commons::ext_serde::de_bytes",
        serialize_with = "crate::commons::ext_serde::ser_bytes"
    )]
    pub encoded: Bytes,
    pub download_time: DateTime<Utc>,
}

impl DownloadedObject {
    /// Creates a new download of the given bytes, downloaded just now.
    pub fn new(uri: uri::Rsync, encoded: Bytes) -> Self {
        DownloadedObject {
            uri,
            hash: rrdp::Hash::from_data(encoded.as_ref()),
            encoded,
            download_time: Utc::now(),
        }
    }
}


//------------ StoredCertificate ---------------------------------------------

/// A resource certificate that passed validation.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct StoredCertificate {
    pub ski: KeyIdentifier,
    pub aki: KeyIdentifier,
    pub hash: rrdp::Hash,
    pub uri: uri::Rsync,
    #[serde(
        deserialize_with = "crate::commons::ext_serde::de_bytes",
        serialize_with = "crate::commons::ext_serde::ser_bytes"
    )]
    pub encoded: Bytes,
    pub download_time: DateTime<Utc>,
    pub validation_time: DateTime<Utc>,
}


//------------ StoredObject --------------------------------------------------

/// Any other repository object that passed validation.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct StoredObject {
    pub aki: KeyIdentifier,
    pub hash: rrdp::Hash,
    pub uri: uri::Rsync,
    pub object_type: ObjectType,
    #[serde(
        deserialize_with = "crate::commons::ext_serde::de_bytes",
        serialize_with = "crate::commons::ext_serde::ser_bytes"
    )]
    pub encoded: Bytes,
    pub download_time: DateTime<Utc>,
    pub validation_time: DateTime<Utc>,
}


//------------ ObjectType ----------------------------------------------------

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Crl,
    Manifest,
    Roa,
}


//------------ BrokenObject --------------------------------------------------

/// An object whose bytes could not be parsed at all.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct BrokenObject {
    pub uri: uri::Rsync,
    pub hash: rrdp::Hash,
    #[serde(
        deserialize_with = "crate::commons::ext_serde::de_bytes",
        serialize_with = "crate::commons::ext_serde::ser_bytes"
    )]
    pub encoded: Bytes,
    pub message: String,
    pub download_time: DateTime<Utc>,
}

impl BrokenObject {
    pub fn new(download: &DownloadedObject, message: impl fmt::Display) -> Self {
        BrokenObject {
            uri: download.uri.clone(),
            hash: download.hash,
            encoded: download.encoded.clone(),
            message: message.to_string(),
            download_time: download.download_time,
        }
    }
}


//------------ StoreError ----------------------------------------------------

#[derive(Debug)]
pub enum StoreError {
    Backend(BackendError),
    Deserialize {
        namespace: Namespace,
        key: String,
        err: String,
    },
    Serialize {
        namespace: Namespace,
        key: String,
        err: String,
    },
}

impl StoreError {
    fn deserialize(
        namespace: Namespace, key: &str, err: impl fmt::Display
    ) -> Self {
        StoreError::Deserialize {
            namespace, key: key.into(), err: err.to_string()
        }
    }

    fn serialize(
        namespace: Namespace, key: &str, err: impl fmt::Display
    ) -> Self {
        StoreError::Serialize {
            namespace, key: key.into(), err: err.to_string()
        }
    }
}

impl From<BackendError> for StoreError {
    fn from(err: BackendError) -> Self {
        StoreError::Backend(err)
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StoreError::Backend(err) => err.fmt(f),
            StoreError::Deserialize { namespace, key, err } => {
                write!(f,
                    "failed to deserialize value for key '{key}' \
                    in namespace '{namespace}': {err}"
                )
            }
            StoreError::Serialize { namespace, key, err } => {
                write!(f,
                    "failed to serialize value for key '{key}' \
                    in namespace '{namespace}': {err}"
                )
            }
        }
    }
}

impl error::Error for StoreError { }


//------------ Tests --------------------------------------------------------
